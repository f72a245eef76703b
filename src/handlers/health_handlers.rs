//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the content store is reachable

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness check; always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness check that asks the content store to identify itself (IPFS
/// `id`; always succeeds for the in-memory store).
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let store_check = match state.pipeline.publisher().store().check().await {
        Ok(detail) => CheckStatus {
            ok: true,
            detail: Some(detail),
            error: None,
        },
        Err(e) => CheckStatus {
            ok: false,
            detail: None,
            error: Some(e.to_string()),
        },
    };

    let overall_ok = store_check.ok;
    let mut checks = HashMap::new();
    checks.insert("content_store".to_string(), store_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HashMap<String, CheckStatus>,
}

#[derive(Serialize, Deserialize)]
pub struct CheckStatus {
    pub ok: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
}
