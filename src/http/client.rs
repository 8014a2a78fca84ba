//! Outbound HTTP capability.
//!
//! # Responsibilities
//! - Define the single outbound-fetch contract stages depend on
//! - Provide the production reqwest-backed implementation
//! - Provide a scripted client for unit tests
//!
//! # Design Decisions
//! - One fetch per call, no internal retries; retry policy, if any,
//!   belongs to the surrounding deployment
//! - Upstream non-2xx statuses are returned as responses, not errors;
//!   only transport-level failures become `Error::Upstream`
//! - Bodies are buffered on the way in and out, matching the pipeline's
//!   `Bytes` types

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::routing::context::{PipelineRequest, PipelineResponse};

/// Outbound HTTP fetch, injected into the router context.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn fetch(&self, request: PipelineRequest) -> Result<PipelineResponse>;
}

/// Production client backed by reqwest (connection pooling, TLS).
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        let outbound = reqwest::Request::try_from(request)
            .map_err(|e| Error::Upstream(format!("request conversion failed: {e}")))?;

        let upstream = self
            .inner
            .execute(outbound)
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| Error::Upstream(format!("reading upstream body failed: {e}")))?;

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
