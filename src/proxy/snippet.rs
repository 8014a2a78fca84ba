//! Analytics bootstrap snippet.
//!
//! # Responsibilities
//! - Render the inline loader script that pages need to pick up the
//!   proxied analytics bundle
//! - Inject that script into HTML responses flowing back to the visitor
//!
//! # Design Decisions
//! - `snippet` is a pure function of its inputs so it can be rendered and
//!   asserted on without a request in flight
//! - The loader path embeds a fresh UUID per render, which keeps the
//!   bundle URL out of shared caches

use http::{header, StatusCode};
use uuid::Uuid;

use crate::error::Result;
use crate::routing::context::{PipelineRequest, PipelineResponse, RouterContext, Triple};

const SNIPPET_VERSION: &str = "4.15.3";

const METHODS: &str = "\"trackSubmit\",\"trackClick\",\"trackLink\",\"trackForm\",\"pageview\",\
\"identify\",\"reset\",\"group\",\"track\",\"ready\",\"alias\",\"debug\",\"page\",\"once\",\
\"off\",\"on\",\"addSourceMiddleware\",\"addIntegrationMiddleware\",\"setAnonymousId\",\
\"addDestinationMiddleware\"";

/// Render the minified bootstrap snippet. The loader and bundles are
/// addressed through the proxy host so first-party cookies apply.
pub fn snippet(host: &str, write_key: &str, route_prefix: &str, initial_page_view: bool) -> String {
    let base = format!("{host}/{route_prefix}");
    let ajs_path = format!("/ajs/{}", Uuid::new_v4());
    let page_call = if initial_page_view {
        "analytics.page();"
    } else {
        ""
    };

    format!(
        "!function(){{var analytics=window.analytics=window.analytics||[];\
if(!analytics.initialize)if(analytics.invoked)window.console&&console.error&&\
console.error(\"Segment snippet included twice.\");else{{analytics.invoked=!0;\
analytics.methods=[{METHODS}];\
analytics.factory=function(e){{return function(){{var t=Array.prototype.slice.call(arguments);\
t.unshift(e);analytics.push(t);return analytics}}}};\
for(var e=0;e<analytics.methods.length;e++){{var key=analytics.methods[e];\
analytics[key]=analytics.factory(key)}}\
analytics.load=function(key,e){{var t=document.createElement(\"script\");\
t.type=\"text/javascript\";t.async=!0;t.src=\"https://{base}{ajs_path}\";\
var n=document.getElementsByTagName(\"script\")[0];n.parentNode.insertBefore(t,n);\
analytics._loadOptions=e}};\
analytics._cdn=\"https://{base}\";\
analytics._writeKey=\"{write_key}\";\
analytics.SNIPPET_VERSION=\"{SNIPPET_VERSION}\";\
analytics.load(\"{write_key}\");{page_call}}}}}();"
    )
}

fn inject(response: Option<PipelineResponse>, script: &str) -> Option<PipelineResponse> {
    let response = match response {
        Some(r) if r.status() == StatusCode::OK => r,
        other => return other,
    };

    let Ok(html) = std::str::from_utf8(response.body()) else {
        return Some(response);
    };
    let Some(head_end) = html.find("</head>") else {
        return Some(response);
    };

    let mut patched = String::with_capacity(html.len() + script.len() + 17);
    patched.push_str(&html[..head_end]);
    patched.push_str("<script>");
    patched.push_str(script);
    patched.push_str("</script>");
    patched.push_str(&html[head_end..]);
    Some(super::replace_body(response, patched))
}

/// Inject the bootstrap snippet into an HTML page.
pub async fn enrich_with_ajs(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let script = snippet(
        &context.host,
        &context.settings.write_key,
        &context.settings.route_prefix,
        context.settings.snippet_initial_page_view,
    );
    let response = inject(response, &script);
    Ok((request, response, context))
}

/// Same as [`enrich_with_ajs`], with the write key withheld from the page.
pub async fn enrich_with_ajs_no_write_key(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let script = snippet(
        &context.host,
        super::assets::REDACTED,
        &context.settings.route_prefix,
        context.settings.snippet_initial_page_view,
    );
    let response = inject(response, &script);
    Ok((request, response, context))
}
