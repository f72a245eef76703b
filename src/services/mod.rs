//! Services behind the HTTP layer: URL resolution, the Tika extraction
//! client, content-addressed publication, and the batch pipeline tying them
//! together.

pub mod cid;
pub mod content_store;
pub mod extraction_client;
pub mod pipeline;
pub mod publisher;
pub mod url_resolver;
