//! Defines the routes of the ingest service.
//!
//! ## Structure
//! - `POST /new`: accept a batch of object-creation notifications
//! - `GET  /healthz`: liveness
//! - `GET  /readyz`: readiness (content store reachable)
//!
//! Other methods on `/new` get axum's default 405.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        ingest_handlers::ingest_batch,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the service.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/new", post(ingest_batch))
}
