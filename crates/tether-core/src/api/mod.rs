//! HTTP client for the agent endpoint.
//!
//! Three operations: open a streamed turn, invoke synchronously, and fetch
//! a thread's server-side state. The streamed body is handed to the framer
//! in [`sse`] untouched.

pub mod error;
pub mod sse;
mod wire;

pub use error::{ApiError, StreamError};
pub use sse::{DEFAULT_EVENT, SseEvent, SseEventStream, frame_event_stream};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AgentConfig;
use crate::session::dispatch::{extract_files, extract_messages, extract_todos};
use crate::session::thread::{Message, ThreadStateSnapshot};

pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
}

impl AgentClient {
    pub fn new(config: &AgentConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Open a streamed turn and return the framed event stream.
    ///
    /// The token also guards the framer: cancelling it abandons the request
    /// (or the body read, once streaming) without surfacing an error.
    pub async fn stream(
        &self,
        thread_id: &str,
        messages: &[Message],
        token: CancellationToken,
    ) -> Result<SseEventStream, ApiError> {
        let url = format!("{}/stream", self.base_url);
        debug!(
            target: "api::client",
            thread_id,
            message_count = messages.len(),
            "opening event stream"
        );

        let request = self
            .http
            .post(&url)
            .json(&wire::stream_request_body(thread_id, messages));

        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ApiError::Cancelled),
            result = request.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), details));
        }

        Ok(frame_event_stream(response.bytes_stream(), token))
    }

    /// Run a turn to completion without streaming; returns the raw result.
    pub async fn invoke(
        &self,
        thread_id: &str,
        messages: &[Message],
        token: CancellationToken,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/invoke", self.base_url);
        let request = self
            .http
            .post(&url)
            .json(&wire::stream_request_body(thread_id, messages));

        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ApiError::Cancelled),
            result = request.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), details));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::ResponseParsingError {
            details: e.to_string(),
        })
    }

    /// Fetch the agent's stored state for a thread. An unknown thread is an
    /// empty snapshot, not an error.
    pub async fn thread_state(&self, thread_id: &str) -> Result<ThreadStateSnapshot, ApiError> {
        let url = format!("{}/threads/{}/state", self.base_url, thread_id);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(target: "api::client", thread_id, "no server-side state");
            return Ok(ThreadStateSnapshot::default());
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), details));
        }

        let body = response.text().await?;
        let payload: Value =
            serde_json::from_str(&body).map_err(|e| ApiError::ResponseParsingError {
                details: e.to_string(),
            })?;

        // State may arrive bare or wrapped under `values`.
        let values = payload.get("values").unwrap_or(&payload);
        Ok(ThreadStateSnapshot {
            todos: values
                .get("todos")
                .and_then(extract_todos)
                .unwrap_or_default(),
            files: values
                .get("files")
                .and_then(extract_files)
                .unwrap_or_default(),
            messages: values
                .get("messages")
                .map(extract_messages)
                .unwrap_or_default(),
        })
    }
}
