//! Core data models for the ingest service.
//!
//! Notifications arrive as JSON and are decoded with `serde`; outcomes are
//! serialised back when a caller asks to wait for a batch.

pub mod notification;
pub mod outcome;
