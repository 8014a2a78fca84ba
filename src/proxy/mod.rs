//! Handler stage library.
//!
//! # Data Flow
//! ```text
//! Router pipeline
//!     → cookies.rs   (identity in/out of Cookie / Set-Cookie)
//!     → personas.rs  (profiles, variations, Engage webhook)
//!     → assets.rs    (CDN proxying + response enrichment)
//!     → tapi.rs      (event forwarding to the tracking API)
//!     → origin.rs    (page proxying, early-exit gate, 404)
//!     → snippet.rs   (snippet generation + HTML injection)
//! ```
//!
//! # Design Decisions
//! - Every stage is a free async function with the single stage contract;
//!   composition lives entirely in the façade's assembly
//! - Proxy stages perform at most one upstream fetch and never retry
//! - Enrichment stages skip non-200 responses unchanged
//! - "No data" (missing cookie, unknown profile) is a `None` context
//!   field, never an error

pub mod assets;
pub mod cookies;
pub mod origin;
pub mod personas;
pub mod snippet;
pub mod source_function;
pub mod tapi;

use bytes::Bytes;
use http::{header, StatusCode, Uri};

use crate::error::{Error, Result};
use crate::routing::context::{JsonMap, PipelineRequest, PipelineResponse};

/// Build a bodyless GET request for a derived upstream URL.
pub(crate) fn get_request(url: &str) -> Result<PipelineRequest> {
    let uri: Uri = url
        .parse()
        .map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    let mut request = http::Request::new(Bytes::new());
    *request.uri_mut() = uri;
    Ok(request)
}

/// Plain-text response with the given status.
pub(crate) fn text_response(status: StatusCode, body: &str) -> PipelineResponse {
    let mut response = http::Response::new(Bytes::copy_from_slice(body.as_bytes()));
    *response.status_mut() = status;
    response
}

/// Response body as text (lossy; upstream assets are UTF-8).
pub(crate) fn body_text(response: &PipelineResponse) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

/// Swap a response body, keeping status and headers and fixing the
/// Content-Length header.
pub(crate) fn replace_body(mut response: PipelineResponse, body: String) -> PipelineResponse {
    let bytes = Bytes::from(body);
    if let Ok(len) = http::HeaderValue::from_str(&bytes.len().to_string()) {
        response.headers_mut().insert(header::CONTENT_LENGTH, len);
    }
    *response.body_mut() = bytes;
    response
}

/// Swap a request body, fixing the Content-Length header.
pub(crate) fn replace_request_body(
    mut request: PipelineRequest,
    body: String,
) -> PipelineRequest {
    let bytes = Bytes::from(body);
    if let Ok(len) = http::HeaderValue::from_str(&bytes.len().to_string()) {
        request.headers_mut().insert(header::CONTENT_LENGTH, len);
    }
    *request.body_mut() = bytes;
    request
}

/// Parse a request/response body that must be a JSON object.
pub(crate) fn json_object(bytes: &Bytes) -> Result<JsonMap> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(Error::Payload(serde::de::Error::custom(
            "expected a JSON object",
        ))),
    }
}

/// Last path segment of a request URI (the TAPI call method).
pub(crate) fn last_path_segment(request: &PipelineRequest) -> Option<&str> {
    request
        .uri()
        .path()
        .rsplit('/')
        .find(|segment| !segment.is_empty())
}
