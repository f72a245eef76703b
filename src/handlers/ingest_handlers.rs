//! HTTP handler for incoming object-storage notifications.
//! Decodes the batch and hands it to the `Pipeline`; individual record
//! failures never change the response.

use crate::{errors::AppError, models::notification::decode_batch, state::AppState};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Query params accepted by `POST /new`.
#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    /// Process the batch inside the request and return the report.
    #[serde(default)]
    pub wait: bool,
}

/// Body returned when a batch is accepted for background processing.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub batch_id: Uuid,
    pub accepted: usize,
    pub status: String,
}

/// `POST /new`
///
/// By default the batch is processed on a task tracked by the state, so
/// shutdown can wait for it, and the caller gets `202 Accepted` immediately. With `?wait=true` the batch runs within the
/// request and the `BatchReport` is returned. A body that is not a batch of
/// notification records is rejected with 400 and nothing is processed.
pub async fn ingest_batch(
    State(state): State<AppState>,
    Query(query): Query<IngestQuery>,
    body: Bytes,
) -> Result<Response, AppError> {
    let records = decode_batch(&body).map_err(|err| {
        warn!("rejecting notification batch: {}", err);
        AppError::from(err)
    })?;

    let batch_id = Uuid::new_v4();
    let accepted = records.len();
    info!("received batch {} with {} record(s)", batch_id, accepted);

    let cancel = state.shutdown.child_token();
    if query.wait {
        let report = state
            .pipeline
            .process_batch(batch_id, records, cancel)
            .await;
        return Ok((StatusCode::OK, Json(report)).into_response());
    }

    let pipeline = state.pipeline.clone();
    state.tasks.spawn(
        async move {
            pipeline.process_batch(batch_id, records, cancel).await;
        }
        .instrument(info_span!("ingest_task")),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            batch_id,
            accepted,
            status: "accepted".into(),
        }),
    )
        .into_response())
}
