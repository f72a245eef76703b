use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, StoreKind};
use services::{
    content_store::{ContentStore, IpfsStore, MemoryStore},
    extraction_client::TikaClient,
    pipeline::Pipeline,
    publisher::Publisher,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-ingest with config: {:?}", cfg);

    // --- Initialize clients ---
    let http = TikaClient::http_client(cfg.extraction_timeout)
        .context("building HTTP client")?;
    let extractor = Arc::new(TikaClient::new(
        http.clone(),
        cfg.tika_text_url.clone(),
        cfg.tika_meta_url.clone(),
        cfg.max_extraction_bytes,
    ));

    let store: Arc<dyn ContentStore> = match cfg.store {
        StoreKind::Ipfs => Arc::new(IpfsStore::new(http, cfg.ipfs_api_url.clone(), cfg.pin)),
        StoreKind::Memory => {
            tracing::warn!("Using in-memory content store; published blocks are not persisted");
            Arc::new(MemoryStore::new())
        }
    };

    match store.check().await {
        Ok(detail) => tracing::info!("Connected to {}", detail),
        Err(err) => tracing::warn!("Content store not reachable yet: {}", err),
    }

    // --- Initialize core service ---
    let pipeline = Pipeline::new(cfg.pipeline(), extractor, Publisher::new(store));
    let shutdown = CancellationToken::new();

    // --- Build router ---
    let state = AppState::new(pipeline, shutdown.clone());
    let app: Router = routes::routes::routes().with_state(state.clone());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    // In-flight records may still be waiting on both extraction requests.
    let grace = cfg.extraction_timeout * 2;
    tracing::info!("Waiting up to {:?} for background batches", grace);
    if tokio::time::timeout(grace, state.drain()).await.is_err() {
        tracing::warn!("Background batches still running after {:?}; exiting", grace);
    }

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, cancelling `token` so that queued records
/// of in-progress batches are not started.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received; no new records will be started");
    token.cancel();
}
