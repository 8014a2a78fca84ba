//! Identity cookie handling.
//!
//! # Responsibilities
//! - Read `ajs_anonymous_id` / `ajs_user_id` from inbound Cookie headers
//! - Append HttpOnly identity cookies to successful responses
//! - Clear both cookies on reset
//!
//! # Design Decisions
//! - Cookies are scoped to the registrable domain so identity survives
//!   subdomain hops; falls back to the raw host when the public-suffix
//!   lookup has no answer
//! - A missing anonymous id is replaced with a fresh uuid v4 at
//!   enrichment time, never earlier
//! - `Access-Control-Allow-Credentials` rides along for CORS setups
//!   where the proxy and the customer site are on different hosts

use http::{header, HeaderValue, StatusCode};
use uuid::Uuid;

use crate::error::Result;
use crate::routing::context::{PipelineRequest, PipelineResponse, RouterContext, Triple};

pub const ANONYMOUS_ID_COOKIE: &str = "ajs_anonymous_id";
pub const USER_ID_COOKIE: &str = "ajs_user_id";
const ONE_YEAR_SECS: u64 = 31_536_000;

/// Read one cookie value from the request's Cookie header.
pub fn get_cookie(request: &PipelineRequest, name: &str) -> Option<String> {
    let header = request.headers().get(header::COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(name) {
            return parts.next().map(str::to_string);
        }
    }
    None
}

/// Cookie scope for a host: the registrable domain, or the host itself
/// when none can be derived (IP literals, localhost).
pub fn cookie_domain(host: &str) -> String {
    let bare = host.split(':').next().unwrap_or(host);
    psl::domain_str(bare).unwrap_or(bare).to_string()
}

fn identity_cookie(name: &str, value: &str, domain: &str, max_age: u64) -> String {
    format!("{name}={value}; Domain={domain}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax")
}

fn append_cookie(response: &mut PipelineResponse, cookie: String) {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

/// Resolve identity from the inbound Cookie header into the context.
pub async fn extract_id_from_cookie(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    context.anonymous_id = get_cookie(&request, ANONYMOUS_ID_COOKIE);
    context.user_id = get_cookie(&request, USER_ID_COOKIE);
    Ok((request, response, context))
}

/// Resolve identity from a JSON event payload (tracking calls carry it in
/// the body). The request is re-serialized so later stages observe the
/// same body they would have parsed.
pub async fn extract_id_from_payload(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    let body = super::json_object(request.body())?;

    if let Some(user_id) = body.get("userId").and_then(|v| v.as_str()) {
        context.user_id = Some(user_id.to_string());
    }
    if let Some(anonymous_id) = body.get("anonymousId").and_then(|v| v.as_str()) {
        context.anonymous_id = Some(anonymous_id.to_string());
    }

    let request = super::replace_request_body(request, serde_json::Value::Object(body).to_string());
    Ok((request, response, context))
}

/// Append identity cookies to a successful response. Generates a fresh
/// anonymous id when the context carries none.
pub async fn enrich_response_with_id_cookies(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    let Some(mut response) = response else {
        return Ok((request, None, context));
    };
    if response.status() != StatusCode::OK {
        return Ok((request, Some(response), context));
    }

    let domain = cookie_domain(&context.host);
    let anonymous_id = context
        .anonymous_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::debug!(
        anonymous_id = %anonymous_id,
        user_id = context.user_id.as_deref().unwrap_or(""),
        "appending identity cookies"
    );

    append_cookie(
        &mut response,
        identity_cookie(ANONYMOUS_ID_COOKIE, &anonymous_id, &domain, ONE_YEAR_SECS),
    );
    if let Some(user_id) = &context.user_id {
        append_cookie(
            &mut response,
            identity_cookie(USER_ID_COOKIE, user_id, &domain, ONE_YEAR_SECS),
        );
    }

    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );

    context.anonymous_id = Some(anonymous_id);
    Ok((request, Some(response), context))
}

/// Clear both identity cookies (Max-Age=0) and answer with a success body.
pub async fn reset_cookies(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let domain = cookie_domain(&context.host);
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://{domain}"));

    let mut response = super::text_response(StatusCode::OK, "Success!");
    append_cookie(
        &mut response,
        identity_cookie(ANONYMOUS_ID_COOKIE, "", &domain, 0),
    );
    append_cookie(&mut response, identity_cookie(USER_ID_COOKIE, "", &domain, 0));
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    if let Ok(value) = HeaderValue::from_str(&origin) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }

    Ok((request, Some(response), context))
}
