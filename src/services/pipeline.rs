//! src/services/pipeline.rs
//!
//! Pipeline: the per-record extraction-and-addressing flow. For every
//! notification record the object URL is resolved, then two independent
//! branches run side by side:
//!
//! - text: extract plain text, publish the bytes raw
//! - metadata: extract JSON metadata, publish it re-encoded as DAG-CBOR
//!
//! Every failure is contained to the branch it happened in and recorded in
//! that record's outcome; nothing escalates to the batch.

use chrono::Utc;
use futures::{StreamExt, stream};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    models::{
        notification::NotificationRecord,
        outcome::{BatchReport, Branch, BranchOutcome, ContentId, RecordOutcome, Stage},
    },
    services::{
        content_store::{SourceFormat, TargetEncoding},
        extraction_client::{ExtractError, Extractor},
        publisher::{PublishError, Publisher},
        url_resolver,
    },
};

/// Settings the pipeline needs, injected at construction.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Origin objects are publicly reachable under, e.g. `https://s3.amazonaws.com`.
    pub storage_origin: String,

    /// Maximum records processed at once within a batch.
    pub concurrency: usize,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{branch} extraction failed: {source}")]
    ExtractionFailed {
        branch: Branch,
        #[source]
        source: ExtractError,
    },
    #[error("{branch} publish failed: {source}")]
    PublishFailed {
        branch: Branch,
        #[source]
        source: PublishError,
    },
}

impl RecordError {
    fn stage(&self) -> Stage {
        match self {
            RecordError::ExtractionFailed { .. } => Stage::Extraction,
            RecordError::PublishFailed { .. } => Stage::Publish,
        }
    }
}

/// Orchestrates extraction and publication for batches of notifications.
///
/// Cheap to clone; the extractor and publisher are shared.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    extractor: Arc<dyn Extractor>,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, extractor: Arc<dyn Extractor>, publisher: Publisher) -> Self {
        Self {
            config,
            extractor,
            publisher,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Process every record of a decoded batch.
    ///
    /// Records run concurrently, at most `concurrency` at a time, and their
    /// outcomes are reported in batch order. Once `cancel` fires no further
    /// records are started; records already in flight finish normally.
    pub async fn process_batch(
        &self,
        batch_id: Uuid,
        records: Vec<NotificationRecord>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let started_at = Utc::now();
        let received = records.len();
        let span = info_span!("batch", %batch_id, records = received);

        async move {
            let (created, skipped): (Vec<_>, Vec<_>) = records
                .into_iter()
                .partition(NotificationRecord::is_object_created);
            for record in &skipped {
                info!(
                    "skipping {} event for {}/{}",
                    record.event_name,
                    record.bucket(),
                    record.key()
                );
            }

            let results: Vec<Option<RecordOutcome>> = stream::iter(created)
                .map(|record| {
                    let cancel = cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        Some(self.process_record(&record).await)
                    }
                })
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await;

            let cancelled = results.iter().filter(|r| r.is_none()).count();
            let outcomes: Vec<RecordOutcome> = results.into_iter().flatten().collect();
            let published: usize = outcomes.iter().map(RecordOutcome::published).sum();

            if cancelled > 0 {
                warn!("cancelled before {} record(s) could start", cancelled);
            }
            info!(
                "batch done: {} processed, {} skipped, {} identifiers published",
                outcomes.len(),
                skipped.len(),
                published
            );

            BatchReport {
                batch_id,
                received,
                outcomes,
                skipped: skipped.len(),
                cancelled,
                started_at,
                finished_at: Utc::now(),
            }
        }
        .instrument(span)
        .await
    }

    /// Run both branches for one record. Always returns an outcome; branch
    /// failures are logged and recorded, never propagated.
    pub async fn process_record(&self, record: &NotificationRecord) -> RecordOutcome {
        let (bucket, key) = (record.bucket(), record.key());
        let url = url_resolver::resolve(&self.config.storage_origin, bucket, key);
        debug!("processing {}", url);

        let (text, metadata) = tokio::join!(self.text_branch(&url), self.metadata_branch(&url));

        RecordOutcome {
            bucket: bucket.to_string(),
            key: key.to_string(),
            text: settle(bucket, key, Branch::Text, text),
            metadata: settle(bucket, key, Branch::Metadata, metadata),
            url,
        }
    }

    async fn text_branch(&self, url: &str) -> Result<ContentId, RecordError> {
        let text = self
            .extractor
            .extract_text(url)
            .await
            .map_err(|source| RecordError::ExtractionFailed {
                branch: Branch::Text,
                source,
            })?;

        self.publisher
            .publish_raw(text)
            .await
            .map_err(|source| RecordError::PublishFailed {
                branch: Branch::Text,
                source,
            })
    }

    async fn metadata_branch(&self, url: &str) -> Result<ContentId, RecordError> {
        let metadata = self
            .extractor
            .extract_metadata(url)
            .await
            .map_err(|source| RecordError::ExtractionFailed {
                branch: Branch::Metadata,
                source,
            })?;

        self.publisher
            .publish_structured(&metadata, SourceFormat::Json, TargetEncoding::DagCbor)
            .await
            .map_err(|source| RecordError::PublishFailed {
                branch: Branch::Metadata,
                source,
            })
    }
}

/// Reduce a branch result to its recorded outcome, logging failures.
fn settle(
    bucket: &str,
    key: &str,
    branch: Branch,
    result: Result<ContentId, RecordError>,
) -> BranchOutcome {
    match result {
        Ok(cid) => {
            info!("published {} for {}/{} as {}", branch, bucket, key, cid);
            BranchOutcome::Published { cid }
        }
        Err(err) => {
            warn!("{}/{}: {}", bucket, key, err);
            BranchOutcome::Failed {
                stage: err.stage(),
                reason: err.to_string(),
            }
        }
    }
}
