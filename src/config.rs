use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

use crate::services::pipeline::PipelineConfig;

/// Which content-addressed backend receives the extraction results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Ipfs,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ipfs" => Ok(Self::Ipfs),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown store `{}` (expected `ipfs` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_origin: String,
    pub tika_text_url: String,
    pub tika_meta_url: String,
    pub ipfs_api_url: String,
    pub store: StoreKind,
    pub pin: bool,
    pub concurrency: usize,
    pub extraction_timeout: Duration,
    pub max_extraction_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Extract text and metadata from new objects into IPFS")]
pub struct Args {
    /// Host to bind to (overrides INGEST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides INGEST_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Public origin objects are fetched from (overrides INGEST_STORAGE_ORIGIN)
    #[arg(long)]
    pub storage_origin: Option<String>,

    /// Tika plain-text endpoint (overrides INGEST_TIKA_TEXT_URL)
    #[arg(long)]
    pub tika_text_url: Option<String>,

    /// Tika metadata endpoint (overrides INGEST_TIKA_META_URL)
    #[arg(long)]
    pub tika_meta_url: Option<String>,

    /// IPFS HTTP API base URL (overrides INGEST_IPFS_API_URL)
    #[arg(long)]
    pub ipfs_api_url: Option<String>,

    /// Content store backend: `ipfs` or `memory` (overrides INGEST_STORE)
    #[arg(long)]
    pub store: Option<StoreKind>,

    /// Pin published content (overrides INGEST_PIN)
    #[arg(long)]
    pub pin: Option<bool>,

    /// Records processed concurrently per batch (overrides INGEST_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request extraction timeout in seconds (overrides INGEST_EXTRACTION_TIMEOUT_SECS)
    #[arg(long)]
    pub extraction_timeout_secs: Option<u64>,

    /// Upper bound on a single extraction response (overrides INGEST_MAX_EXTRACTION_BYTES)
    #[arg(long)]
    pub max_extraction_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("INGEST_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("INGEST_PORT", 8080u16)?;
        let env_origin =
            env::var("INGEST_STORAGE_ORIGIN").unwrap_or_else(|_| "https://s3.amazonaws.com".into());
        let env_text =
            env::var("INGEST_TIKA_TEXT_URL").unwrap_or_else(|_| "http://tika:9998/tika".into());
        let env_meta =
            env::var("INGEST_TIKA_META_URL").unwrap_or_else(|_| "http://tika:9998/meta".into());
        let env_ipfs = env::var("INGEST_IPFS_API_URL")
            .unwrap_or_else(|_| "https://cluster.underlay.store".into());
        let env_store = env_parsed("INGEST_STORE", StoreKind::Ipfs)?;
        let env_pin = env_parsed("INGEST_PIN", true)?;
        let env_concurrency = env_parsed("INGEST_CONCURRENCY", 4usize)?;
        let env_timeout = env_parsed("INGEST_EXTRACTION_TIMEOUT_SECS", 60u64)?;
        let env_max_bytes = env_parsed("INGEST_MAX_EXTRACTION_BYTES", 64 * 1024 * 1024usize)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_origin: args.storage_origin.unwrap_or(env_origin),
            tika_text_url: args.tika_text_url.unwrap_or(env_text),
            tika_meta_url: args.tika_meta_url.unwrap_or(env_meta),
            ipfs_api_url: args.ipfs_api_url.unwrap_or(env_ipfs),
            store: args.store.unwrap_or(env_store),
            pin: args.pin.unwrap_or(env_pin),
            concurrency: args.concurrency.unwrap_or(env_concurrency).max(1),
            extraction_timeout: Duration::from_secs(
                args.extraction_timeout_secs.unwrap_or(env_timeout),
            ),
            max_extraction_bytes: args.max_extraction_bytes.unwrap_or(env_max_bytes),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            storage_origin: self.storage_origin.clone(),
            concurrency: self.concurrency,
        }
    }
}

/// Read `key` from the environment and parse it, falling back to `default`
/// when the variable is unset.
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arguments_win_over_defaults() {
        let args = Args::parse_from([
            "object-ingest",
            "--port",
            "9100",
            "--store",
            "memory",
            "--concurrency",
            "0",
            "--storage-origin",
            "http://minio:9000",
        ]);
        let cfg = AppConfig::merge(args).unwrap();

        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.storage_origin, "http://minio:9000");
        assert_eq!(cfg.pipeline().storage_origin, "http://minio:9000");
    }

    #[test]
    fn store_kind_parses_case_insensitively() {
        assert_eq!("IPFS".parse::<StoreKind>().unwrap(), StoreKind::Ipfs);
        assert!("s3".parse::<StoreKind>().is_err());
    }
}
