//! Origin fetching.
//!
//! # Responsibilities
//! - Forward visitor requests to the origin, optionally rebased onto a
//!   configured origin URL
//! - Short-circuit pipelines early for pages that no variation or
//!   enrichment stage can affect
//! - Serve a 404 when origin proxying is disabled

use http::{header, StatusCode};

use crate::error::Result;
use crate::routing::context::{
    clone_request, PipelineRequest, PipelineResponse, RouterContext, Triple,
};

fn origin_url(request: &PipelineRequest, context: &RouterContext) -> String {
    let path = request.uri().path();
    let query = request
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    match &context.settings.origin_base_url {
        Some(base) => format!("{}{path}{query}", base.trim_end_matches('/')),
        None => format!("https://{}{path}{query}", context.host),
    }
}

async fn fetch_origin(
    request: &PipelineRequest,
    context: &RouterContext,
) -> Result<PipelineResponse> {
    let mut upstream = clone_request(request);
    let url = origin_url(request, context);
    *upstream.uri_mut() = url
        .parse()
        .map_err(|e| crate::error::Error::InvalidUrl(format!("{url}: {e}")))?;
    // the origin sees its own host, not the edge's
    upstream.headers_mut().remove(header::HOST);
    context.http.fetch(upstream).await
}

/// Fetch the page from the origin, replacing any earlier response.
pub async fn handle_origin(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    if response.is_some() {
        return Ok((request, response, context));
    }
    let response = fetch_origin(&request, &context).await?;
    Ok((request, Some(response), context))
}

/// Fetch the origin up front and stop the pipeline when the page cannot
/// be personalized: no registered variation targets it, or it is not an
/// HTML document.
pub async fn handle_origin_with_early_exit(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    let path = request.uri().path();
    let has_variation = context.variations.iter().any(|v| v.route == path);
    if has_variation {
        // later stages resolve traits and pick the variant before fetching
        return Ok((request, response, context));
    }

    let origin_response = fetch_origin(&request, &context).await?;
    let is_html = origin_response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false);
    if !is_html {
        tracing::debug!(path = %request.uri().path(), "non-HTML origin response, exiting early");
        context.early_exit = true;
    }
    Ok((request, Some(origin_response), context))
}

/// Terminal stage for deployments that do not proxy the origin.
pub async fn handle_with_404(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response = super::text_response(StatusCode::NOT_FOUND, "Not Found");
    Ok((request, Some(response), context))
}
