//! Outbound HTTP for control, eventing and descriptor retrieval.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::message::{StreamRequest, StreamResponse};

/// Sends a [`StreamRequest`] to the absolute URL in its `uri` and returns the response.
///
/// HTTP error statuses are returned as responses, not errors; only failures to
/// obtain a response at all are errors.
#[async_trait]
pub trait StreamClient: Send + Sync + 'static {
    async fn send(&self, request: StreamRequest) -> Result<StreamResponse>;
}

/// [`StreamClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpStreamClient {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpStreamClient {
    /// Create a client with the given per-request timeout and `USER-AGENT`.
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

#[async_trait]
impl StreamClient for HttpStreamClient {
    async fn send(&self, request: StreamRequest) -> Result<StreamResponse> {
        let url = url::Url::parse(&request.uri)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", request.uri, e)))?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        trace!(%request, "Sending stream request");

        let mut builder = self
            .client
            .request(method, url)
            .headers(request.headers)
            .body(request.body);
        builder = builder.header(reqwest::header::USER_AGENT, self.user_agent.as_str());

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        trace!(%status, size = body.len(), "Received stream response");

        Ok(StreamResponse {
            status,
            headers,
            body,
        })
    }
}
