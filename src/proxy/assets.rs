//! Analytics asset proxying and response enrichment.
//!
//! # Responsibilities
//! - Fetch the analytics library, project settings, and bundle assets
//!   from the CDN, keyed by the configured write key
//! - Rewrite proxied settings so the browser talks to this proxy instead
//!   of the analytics vendor
//! - Keep the write key out of anything served to browsers
//!
//! # Design Decisions
//! - Proxy stages pass upstream errors through verbatim so customers see
//!   the real upstream failure, not a masked one
//! - Enrichment stages skip non-200 responses unchanged
//! - Exactly one upstream fetch per stage invocation, no retries

use http::{header, HeaderValue, StatusCode};

use crate::error::Result;
use crate::routing::context::{PipelineRequest, PipelineResponse, RouterContext, Triple};

pub(crate) const REDACTED: &str = "REDACTED";

/// Serve the analytics library from the CDN.
pub async fn handle_ajs(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let url = format!(
        "{}/analytics.js/v1/{}/analytics.min.js",
        context.settings.base_cdn_url, context.settings.write_key
    );
    let upstream = context.http.fetch(super::get_request(&url)?).await?;
    Ok((request, Some(upstream), context))
}

/// Proxy the project settings JSON. The write key in the request path is
/// ignored; the real key comes from configuration.
pub async fn handle_settings(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let url = format!(
        "{}/v1/projects/{}/settings",
        context.settings.base_cdn_url, context.settings.write_key
    );
    let upstream = context.http.fetch(super::get_request(&url)?).await?;
    Ok((request, Some(upstream), context))
}

/// Proxy bundle and destination assets verbatim: strip the route prefix
/// and forward the rest of the path to the CDN untouched.
pub async fn handle_bundles(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let prefix = format!("/{}/", context.settings.route_prefix);
    let path = request.uri().path().replacen(&prefix, "/", 1);
    let url = format!("{}{path}", context.settings.base_cdn_url);
    let upstream = context.http.fetch(super::get_request(&url)?).await?;
    Ok((request, Some(upstream), context))
}

/// Point the settings' apiHost at this proxy so event calls flow through
/// the first-party domain.
pub async fn configure_api_host(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return Ok((request, other, context)),
    };

    let mut settings: serde_json::Value = serde_json::from_slice(response.body())?;
    let api_host = format!(
        "{}/{}/evs",
        context.host, context.settings.route_prefix
    );

    if let Some(segment_io) = settings
        .pointer_mut("/integrations/Segment.io")
        .and_then(|v| v.as_object_mut())
    {
        segment_io.insert("apiHost".to_string(), api_host.clone().into());
    }
    if let Some(metrics) = settings.pointer_mut("/metrics").and_then(|v| v.as_object_mut()) {
        metrics.insert("host".to_string(), api_host.into());
    }

    let response = super::replace_body(response, settings.to_string());
    Ok((request, Some(response), context))
}

/// Allow settings to be fetched cross-origin.
pub async fn handle_cors(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let mut response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return Ok((request, other, context)),
    };
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    Ok((request, Some(response), context))
}

/// Replace every occurrence of the write key in the response body.
pub async fn redact_writekey(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return Ok((request, other, context)),
    };

    let body = super::body_text(&response).replace(&context.settings.write_key, REDACTED);
    let response = super::replace_body(response, body);
    Ok((request, Some(response), context))
}

/// Strip the sourcemap reference so browsers stop asking for a map we
/// don't serve.
pub async fn remove_sourcemap_reference(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return Ok((request, other, context)),
    };

    let mut body = super::body_text(&response);
    if let Some(start) = body.find("//#") {
        let end = body[start..]
            .find('\n')
            .map(|offset| start + offset)
            .unwrap_or(body.len());
        body.replace_range(start..end, "");
    }

    let response = super::replace_body(response, body);
    Ok((request, Some(response), context))
}

/// Prepend identity calls to the analytics library so the browser state
/// matches the server-side cookies, plus a reset hook that clears them.
pub async fn append_id_calls_to_ajs(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return Ok((request, other, context)),
    };

    let anonymous_call = match &context.anonymous_id {
        Some(id) => format!("analytics.setAnonymousId(\"{id}\");"),
        None => String::new(),
    };
    let id_call = match (&context.user_id, &context.client_side_traits) {
        (Some(user_id), Some(traits)) => {
            format!("analytics.identify(\"{user_id}\", {traits});")
        }
        (Some(user_id), None) => format!("analytics.identify(\"{user_id}\");"),
        (None, _) => String::new(),
    };
    let reset_handler = format!(
        "analytics.on('reset', function() {{ fetch('https://{}/{}/reset', {{credentials:\"include\"}}) }});",
        context.host, context.settings.route_prefix
    );

    let body = format!(
        "\n    {anonymous_call}{id_call}\n    {reset_handler}\n    {}",
        super::body_text(&response)
    );
    let response = super::replace_body(response, body);
    Ok((request, Some(response), context))
}

/// Point the library's CDN at this proxy and force credentials on event
/// calls so cookies flow on cross-origin setups.
pub async fn append_ajs_custom_configuration(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return Ok((request, other, context)),
    };

    let cdn_configuration = format!(
        "analytics._cdn = \"https://{}/{}\";",
        context.host, context.settings.route_prefix
    );
    let content = super::body_text(&response)
        .replace("method:\"post\"", "method:\"post\",credentials:\"include\"");

    let body = format!("\n    {cdn_configuration}\n    {content}");
    let response = super::replace_body(response, body);
    Ok((request, Some(response), context))
}
