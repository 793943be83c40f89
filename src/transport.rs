//! Byte-chunk transport feeding the SSE decoder.
//!
//! The driver only needs an ordered sequence of byte chunks; the trait seam
//! keeps the run loop testable without a live backend.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::Serialize;

/// Ordered source of raw stream bytes.
///
/// `next_chunk` returns `Ok(None)` on orderly end of stream. Chunk boundaries
/// carry no meaning; frames may split anywhere.
#[async_trait]
pub trait EventTransport: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Request body for starting an agent run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(rename = "runId", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// SSE-over-HTTP transport backed by reqwest.
pub struct HttpEventTransport {
    response: reqwest::Response,
}

impl HttpEventTransport {
    /// POST the run request and hold the streaming response open.
    ///
    /// Non-2xx responses are drained for their body and returned as
    /// [`TransportError::Status`] before any event is decoded.
    pub async fn connect(
        client: &reqwest::Client,
        url: &str,
        request: &RunRequest,
    ) -> Result<Self, TransportError> {
        let response = client
            .post(url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(status.as_u16(), body));
        }
        Ok(Self { response })
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let chunk = self.response.chunk().await?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}
