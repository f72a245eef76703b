//! src/services/extraction_client.rs
//!
//! Client for the document-analysis service (Apache Tika server). Each object
//! is analysed twice: once for plain text and once for JSON metadata. Tika
//! fetches the object itself from the URL passed in the `fileUrl` header, so
//! requests are `PUT`s with an empty body.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Response, StatusCode, header};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Header Tika reads the remote document location from.
pub const FILE_URL_HEADER: &str = "fileUrl";

const ERROR_EXCERPT_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("extraction service returned {status}: {excerpt}")]
    Status { status: StatusCode, excerpt: String },
    #[error("reading extraction response failed: {0}")]
    Body(#[source] reqwest::Error),
    #[error("extraction response exceeded {limit} bytes")]
    TooLarge { limit: usize },
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// The two extraction operations the pipeline needs. Implementations must be
/// safe to share between concurrently processed records.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Plain-text rendition of the document at `url`.
    async fn extract_text(&self, url: &str) -> ExtractResult<Bytes>;

    /// Metadata of the document at `url`, as JSON bytes.
    async fn extract_metadata(&self, url: &str) -> ExtractResult<Bytes>;
}

/// [`Extractor`] backed by a Tika server.
#[derive(Clone, Debug)]
pub struct TikaClient {
    http: Client,
    text_url: String,
    meta_url: String,
    max_body_bytes: usize,
}

impl TikaClient {
    pub fn new(
        http: Client,
        text_url: impl Into<String>,
        meta_url: impl Into<String>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            http,
            text_url: text_url.into(),
            meta_url: meta_url.into(),
            max_body_bytes,
        }
    }

    /// Build a dedicated HTTP client whose requests time out after `timeout`.
    pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
        Client::builder().timeout(timeout).build()
    }

    /// Issue one extraction request and read the full response body.
    ///
    /// The response is owned by this function, so its connection is released
    /// on every return path, including the error ones.
    async fn put(&self, endpoint: &str, accept: &'static str, file_url: &str) -> ExtractResult<Bytes> {
        let mut response = self
            .http
            .put(endpoint)
            .header(FILE_URL_HEADER, file_url)
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(|source| ExtractError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let excerpt = error_excerpt(response).await;
            return Err(ExtractError::Status { status, excerpt });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(ExtractError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(ExtractError::Body)? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(ExtractError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("{} returned {} bytes for {}", endpoint, body.len(), file_url);
        Ok(body.freeze())
    }
}

/// Read at most `ERROR_EXCERPT_LEN` bytes of an error reply, then drop the
/// response without draining the rest.
pub(crate) async fn error_excerpt(mut response: Response) -> String {
    let mut head = BytesMut::new();
    while head.len() < ERROR_EXCERPT_LEN {
        match response.chunk().await {
            Ok(Some(chunk)) => head.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    head.truncate(ERROR_EXCERPT_LEN);
    String::from_utf8_lossy(&head).trim().to_string()
}

#[async_trait]
impl Extractor for TikaClient {
    async fn extract_text(&self, url: &str) -> ExtractResult<Bytes> {
        self.put(&self.text_url, "text/plain", url).await
    }

    async fn extract_metadata(&self, url: &str) -> ExtractResult<Bytes> {
        self.put(&self.meta_url, "application/json", url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::put,
    };
    use tokio::net::TcpListener;

    /// Echoes the headers Tika would act on so the test can assert on them.
    async fn echo(path: &'static str, headers: HeaderMap) -> String {
        let accept = headers
            .get("accept")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let file_url = headers
            .get(FILE_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        format!("{}|{}|{}", path, accept, file_url)
    }

    async fn spawn_stub() -> String {
        let app = Router::new()
            .route("/tika", put(|h: HeaderMap| echo("tika", h)))
            .route("/meta", put(|h: HeaderMap| echo("meta", h)))
            .route(
                "/broken",
                put(|| async { (AxumStatus::UNPROCESSABLE_ENTITY, "parse failure") }),
            )
            .route("/large", put(|| async { "x".repeat(1024) }))
            .route(
                "/noisy",
                put(|| async { (AxumStatus::BAD_GATEWAY, "e".repeat(4 << 20)) }),
            )
            .route(
                "/slow",
                put(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "late"
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    fn client(base: &str, text: &str, meta: &str, limit: usize) -> TikaClient {
        client_with_timeout(base, text, meta, limit, Duration::from_secs(5))
    }

    fn client_with_timeout(
        base: &str,
        text: &str,
        meta: &str,
        limit: usize,
        timeout: Duration,
    ) -> TikaClient {
        TikaClient::new(
            TikaClient::http_client(timeout).unwrap(),
            format!("{}{}", base, text),
            format!("{}{}", base, meta),
            limit,
        )
    }

    #[tokio::test]
    async fn text_and_metadata_hit_distinct_endpoints() {
        let base = spawn_stub().await;
        let tika = client(&base, "/tika", "/meta", 1 << 20);
        let url = "https://s3.amazonaws.com/b1/k1.pdf";

        let text = tika.extract_text(url).await.unwrap();
        assert_eq!(&text[..], format!("tika|text/plain|{}", url).as_bytes());

        let meta = tika.extract_metadata(url).await.unwrap();
        assert_eq!(&meta[..], format!("meta|application/json|{}", url).as_bytes());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let base = spawn_stub().await;
        let tika = client(&base, "/broken", "/meta", 1 << 20);

        match tika.extract_text("https://example.org/b/k").await {
            Err(ExtractError::Status { status, excerpt }) => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(excerpt, "parse failure");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_bodies_are_cut_to_an_excerpt() {
        let base = spawn_stub().await;
        let tika = client(&base, "/noisy", "/noisy", 1 << 20);

        match tika.extract_metadata("https://example.org/b/k").await {
            Err(ExtractError::Status { status, excerpt }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(excerpt.len(), ERROR_EXCERPT_LEN);
                assert!(excerpt.chars().all(|c| c == 'e'));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let base = spawn_stub().await;
        let tika = client_with_timeout(&base, "/tika", "/slow", 1 << 20, Duration::from_millis(100));

        match tika.extract_metadata("https://example.org/b/k").await {
            Err(ExtractError::Request { source, .. }) => assert!(source.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
        // the text endpoint answers well inside the same budget
        assert!(tika.extract_text("https://example.org/b/k").await.is_ok());
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let base = spawn_stub().await;
        let tika = client(&base, "/large", "/large", 100);

        assert!(matches!(
            tika.extract_text("https://example.org/b/k").await,
            Err(ExtractError::TooLarge { limit: 100 })
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}", addr);
        let tika = client(&base, "/tika", "/meta", 1 << 20);
        assert!(matches!(
            tika.extract_metadata("https://example.org/b/k").await,
            Err(ExtractError::Request { .. })
        ));
    }
}
