//! src/services/content_store.rs
//!
//! Content-addressed backends. `IpfsStore` talks to an IPFS node (or cluster
//! proxy) over its HTTP RPC API; `MemoryStore` computes identical CIDv1s
//! locally and keeps blocks in memory, for local runs and tests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};
use thiserror::Error;
use tracing::debug;

use crate::{
    models::outcome::ContentId,
    services::{
        cid::{DAG_CBOR_CODEC, RAW_CODEC, cid_v1, encode_dag_cbor},
        extraction_client::error_excerpt,
    },
};

/// Format the published metadata bytes are parsed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
}

impl SourceFormat {
    /// Name the IPFS API uses for this input codec.
    pub fn codec(self) -> &'static str {
        match self {
            SourceFormat::Json => "json",
        }
    }
}

/// Structured encoding blocks are stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetEncoding {
    DagCbor,
}

impl TargetEncoding {
    pub fn codec(self) -> &'static str {
        match self {
            TargetEncoding::DagCbor => "dag-cbor",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content store request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("content store returned {status}: {excerpt}")]
    Status { status: StatusCode, excerpt: String },
    #[error("unexpected content store response: {0}")]
    Response(String),
    #[error("content store lock poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store raw bytes, returning their content identifier.
    async fn add(&self, bytes: Bytes) -> StoreResult<ContentId>;

    /// Store a parsed document re-encoded as `target`, returning the
    /// identifier of the encoded block.
    async fn dag_put(
        &self,
        value: &Value,
        source: SourceFormat,
        target: TargetEncoding,
    ) -> StoreResult<ContentId>;

    /// Cheap connectivity check; returns a short description of the backend.
    async fn check(&self) -> StoreResult<String>;
}

/// [`ContentStore`] backed by the IPFS HTTP RPC API (`/api/v0/...`).
#[derive(Clone, Debug)]
pub struct IpfsStore {
    http: Client,
    api_url: String,
    pin: bool,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Deserialize)]
struct DagPutResponse {
    #[serde(rename = "Cid")]
    cid: CidLink,
}

#[derive(Deserialize)]
struct CidLink {
    #[serde(rename = "/")]
    link: String,
}

#[derive(Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

impl IpfsStore {
    pub fn new(http: Client, api_url: impl Into<String>, pin: bool) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            pin,
        }
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, command)
    }

    /// POST an RPC command, optionally with a single multipart file, and
    /// return the raw response body.
    async fn call(
        &self,
        command: &str,
        query: &[(&str, &str)],
        payload: Option<Bytes>,
    ) -> StoreResult<Bytes> {
        let endpoint = self.endpoint(command);
        let mut request = self.http.post(&endpoint).query(query);
        if let Some(payload) = payload {
            let part = Part::stream(payload).file_name("data");
            request = request.multipart(Form::new().part("file", part));
        }

        let request_err = |source| StoreError::Request {
            endpoint: endpoint.clone(),
            source,
        };
        let response = request.send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            let excerpt = error_excerpt(response).await;
            return Err(StoreError::Status { status, excerpt });
        }
        response.bytes().await.map_err(request_err)
    }

    fn pin_flag(&self) -> &'static str {
        if self.pin { "true" } else { "false" }
    }
}

/// Parse a JSON reply. `add` may stream one JSON object per line; the final
/// line describes the added root.
fn parse_reply<T: for<'de> Deserialize<'de>>(body: &[u8]) -> StoreResult<T> {
    let text = String::from_utf8_lossy(body);
    let last = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| StoreError::Response("empty body".into()))?;
    serde_json::from_str(last).map_err(|err| StoreError::Response(err.to_string()))
}

#[async_trait]
impl ContentStore for IpfsStore {
    async fn add(&self, bytes: Bytes) -> StoreResult<ContentId> {
        let body = self
            .call(
                "add",
                &[("pin", self.pin_flag()), ("cid-version", "1")],
                Some(bytes),
            )
            .await?;
        let reply: AddResponse = parse_reply(&body)?;
        debug!("ipfs add -> {}", reply.hash);
        Ok(ContentId::new(reply.hash))
    }

    async fn dag_put(
        &self,
        value: &Value,
        source: SourceFormat,
        target: TargetEncoding,
    ) -> StoreResult<ContentId> {
        let payload = serde_json::to_vec(value)
            .map_err(|err| StoreError::Response(format!("re-serialising document: {}", err)))?;
        let body = self
            .call(
                "dag/put",
                &[
                    ("input-codec", source.codec()),
                    ("store-codec", target.codec()),
                    ("pin", self.pin_flag()),
                ],
                Some(Bytes::from(payload)),
            )
            .await?;
        let reply: DagPutResponse = parse_reply(&body)?;
        debug!("ipfs dag put -> {}", reply.cid.link);
        Ok(ContentId::new(reply.cid.link))
    }

    async fn check(&self) -> StoreResult<String> {
        let body = self.call("id", &[], None).await?;
        let reply: IdResponse = parse_reply(&body)?;
        Ok(format!("ipfs node {}", reply.id))
    }
}

/// In-process [`ContentStore`] computing CIDv1 identifiers locally.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<ContentId, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cid: &ContentId) -> StoreResult<Option<Bytes>> {
        Ok(self.blocks.read()?.get(cid).cloned())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.blocks.read()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.blocks.read()?.is_empty())
    }

    fn insert(&self, codec: u64, block: Bytes) -> StoreResult<ContentId> {
        let cid = cid_v1(codec, &block);
        self.blocks.write()?.insert(cid.clone(), block);
        Ok(cid)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn add(&self, bytes: Bytes) -> StoreResult<ContentId> {
        self.insert(RAW_CODEC, bytes)
    }

    async fn dag_put(
        &self,
        value: &Value,
        _source: SourceFormat,
        target: TargetEncoding,
    ) -> StoreResult<ContentId> {
        match target {
            TargetEncoding::DagCbor => {
                self.insert(DAG_CBOR_CODEC, Bytes::from(encode_dag_cbor(value)))
            }
        }
    }

    async fn check(&self) -> StoreResult<String> {
        if self.is_empty()? {
            return Ok("memory store (empty)".into());
        }
        Ok(format!("memory store ({} blocks)", self.len()?))
    }
}
