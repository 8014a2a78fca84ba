//! Tracking API forwarding.
//!
//! # Responsibilities
//! - Forward event calls to the tracking endpoint at `/v1/:method`
//! - Inject the real write key server-side when the browser only has the
//!   redacted one
//! - Stamp library metadata and, optionally, edge geo context onto the
//!   event payload
//!
//! # Design Decisions
//! - The write key travels in the Authorization header, never in the
//!   forwarded body
//! - Geo context is read from the standard edge headers when the hosting
//!   runtime provides them; absence is not an error
//! - Upstream status passes through verbatim

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::HeaderValue;

use crate::error::Result;
use crate::routing::context::{PipelineRequest, PipelineResponse, RouterContext, Triple};

/// Tracking call methods that carry a full event context object.
const CONTEXT_METHODS: [&str; 3] = ["i", "t", "p"];

/// Geo headers set by edge runtimes, mapped to payload field names.
const EDGE_GEO_HEADERS: [(&str, &str); 9] = [
    ("cf-ipcountry", "country"),
    ("cf-region", "region"),
    ("cf-region-code", "regionCode"),
    ("cf-ipcity", "city"),
    ("cf-ipcontinent", "continent"),
    ("cf-postal-code", "postalCode"),
    ("cf-iplatitude", "latitude"),
    ("cf-iplongitude", "longitude"),
    ("cf-timezone", "timezone"),
];

/// Swap the redacted write key for the real one: drop `writeKey` from the
/// body and authenticate with a Basic header instead.
pub async fn inject_writekey(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let mut body = super::json_object(request.body())?;
    body.remove("writeKey");

    let credentials = BASE64.encode(format!("{}:", context.settings.write_key));
    let mut request =
        super::replace_request_body(request, serde_json::Value::Object(body).to_string());
    if let Ok(value) = HeaderValue::from_str(&format!("Basic {credentials}")) {
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, value);
    }

    Ok((request, response, context))
}

/// Mark events as having passed through this proxy.
pub async fn inject_metadata(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let mut body = super::json_object(request.body())?;

    let metadata = body
        .entry("_metadata")
        .or_insert_with(|| serde_json::json!({}));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.insert("jsRuntime".to_string(), "edge-proxy".into());
    }

    let event_context = body
        .entry("context")
        .or_insert_with(|| serde_json::json!({}));
    if let Some(event_context) = event_context.as_object_mut() {
        let library = event_context
            .entry("library")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(library) = library.as_object_mut() {
            library.insert("name".to_string(), "analytics-edge".into());
            library.insert(
                "version".to_string(),
                env!("CARGO_PKG_VERSION").into(),
            );
        }
    }

    let request =
        super::replace_request_body(request, serde_json::Value::Object(body).to_string());
    Ok((request, response, context))
}

/// Merge edge geo information into the event context for identify, track
/// and page calls.
pub async fn include_edge_traits_in_context(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let method = super::last_path_segment(&request).unwrap_or_default();
    if !CONTEXT_METHODS.contains(&method) {
        return Ok((request, response, context));
    }

    let mut edge = serde_json::Map::new();
    for (header_name, field) in EDGE_GEO_HEADERS {
        if let Some(value) = request
            .headers()
            .get(header_name)
            .and_then(|v| v.to_str().ok())
        {
            edge.insert(field.to_string(), value.into());
        }
    }
    if edge.is_empty() {
        return Ok((request, response, context));
    }

    let mut body = super::json_object(request.body())?;
    let event_context = body
        .entry("context")
        .or_insert_with(|| serde_json::json!({}));
    if let Some(event_context) = event_context.as_object_mut() {
        event_context.insert("edge".to_string(), edge.into());
    }

    let request =
        super::replace_request_body(request, serde_json::Value::Object(body).to_string());
    Ok((request, response, context))
}

/// Forward the call to the tracking endpoint. The endpoint already carries
/// the `/v1` suffix, so the target is `{endpoint}/{method}`.
pub async fn handle_tapi(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let method = super::last_path_segment(&request)
        .unwrap_or_default()
        .to_string();
    let url = format!("{}/{method}", context.settings.tracking_api_endpoint);

    let mut upstream_request = crate::routing::context::clone_request(&request);
    *upstream_request.uri_mut() = url
        .parse()
        .map_err(|e| crate::error::Error::InvalidUrl(format!("{url}: {e}")))?;

    let upstream = context.http.fetch(upstream_request).await?;
    Ok((request, Some(upstream), context))
}
