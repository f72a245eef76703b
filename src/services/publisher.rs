//! Publishes extraction results to the content-addressed store.

use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    models::outcome::ContentId,
    services::content_store::{ContentStore, SourceFormat, StoreError, TargetEncoding},
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("document is not valid {format:?}: {source}")]
    Parse {
        format: SourceFormat,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PublishResult<T> = Result<T, PublishError>;

/// Thin front over a [`ContentStore`]: raw bytes go in as-is, structured
/// documents are parsed first so only well-formed input reaches the store.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ContentStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Store `bytes` verbatim.
    pub async fn publish_raw(&self, bytes: Bytes) -> PublishResult<ContentId> {
        Ok(self.store.add(bytes).await?)
    }

    /// Parse `bytes` as `source`, then store the document encoded as
    /// `target`. The identifier covers the encoded form, so documents that
    /// differ only in key order or whitespace share an identifier.
    pub async fn publish_structured(
        &self,
        bytes: &[u8],
        source: SourceFormat,
        target: TargetEncoding,
    ) -> PublishResult<ContentId> {
        let value: Value = match source {
            SourceFormat::Json => serde_json::from_slice(bytes)
                .map_err(|source_err| PublishError::Parse {
                    format: source,
                    source: source_err,
                })?,
        };
        Ok(self.store.dag_put(&value, source, target).await?)
    }
}
