//! Route classification.
//!
//! # Responsibilities
//! - Hold the ordered `(method, route, pattern)` rule table
//! - Classify `(method, path)` into a route name plus captured params
//! - Guarantee totality via a configured fallback route
//!
//! # Design Decisions
//! - The rule table is derived deterministically from the route prefix at
//!   construction and never mutated afterward; it is shared read-only
//!   across concurrent requests
//! - First match wins; rule order encodes priority
//! - Method comparison is exact (http::Method is already case-normalized);
//!   path comparison is case-sensitive
//! - Exactly one fallback route per table

use std::fmt;

use http::Method;

use crate::routing::pattern::{PathParams, PathPattern};

/// The closed set of request categories the proxy knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Proxied project settings JSON.
    Settings,
    /// Analytics-next bundle assets.
    Bundles,
    /// Destination/action bundle assets.
    Destinations,
    /// Tracking API event calls.
    Tapi,
    /// Source function invocation.
    SourceFunction,
    /// Engage incoming webhook.
    Personas,
    /// The analytics library itself.
    Ajs,
    /// Identity cookie reset.
    Reset,
    /// Page proxy with enrichment.
    Root,
    /// Verbatim origin proxy for anything without a dedicated pipeline.
    Bypass,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Route::Settings => "settings",
            Route::Bundles => "bundles",
            Route::Destinations => "destinations",
            Route::Tapi => "tapi",
            Route::SourceFunction => "source-function",
            Route::Personas => "personas",
            Route::Ajs => "ajs",
            Route::Reset => "reset",
            Route::Root => "root",
            Route::Bypass => "bypass",
        };
        f.write_str(name)
    }
}

/// Result of classifying one request. Produced fresh per request.
#[derive(Debug)]
pub struct RouteMatch {
    pub route: Route,
    pub params: PathParams,
}

/// Ordered rule table mapping `(method, path)` to a route.
#[derive(Debug)]
pub struct RouteTable {
    rules: Vec<(Method, Route, PathPattern)>,
    fallback: Route,
}

impl RouteTable {
    /// Build the canonical rule table for a route prefix. The prefix is the
    /// first path segment under which all proxy routes live (e.g. `"seg"`).
    pub fn new(route_prefix: &str, fallback: Route) -> Self {
        let raw: Vec<(Method, Route, String)> = vec![
            (
                Method::GET,
                Route::Settings,
                format!("{route_prefix}/v1/projects/:writeKey/settings"),
            ),
            (
                Method::GET,
                Route::Bundles,
                format!("{route_prefix}/analytics-next/bundles/:bundleName"),
            ),
            (
                Method::GET,
                Route::Destinations,
                format!("{route_prefix}/next-integrations/*"),
            ),
            (Method::POST, Route::Tapi, format!("{route_prefix}/evs/:method")),
            (
                Method::GET,
                Route::SourceFunction,
                format!("{route_prefix}/sf/:function"),
            ),
            (Method::POST, Route::Personas, format!("{route_prefix}/personas")),
            (Method::GET, Route::Ajs, format!("{route_prefix}/ajs/:hash")),
            (Method::POST, Route::Reset, format!("{route_prefix}/reset")),
            (Method::GET, Route::Reset, format!("{route_prefix}/reset")),
            (Method::GET, Route::Root, "*".to_string()),
        ];

        let rules = raw
            .into_iter()
            .map(|(method, route, pattern)| (method, route, PathPattern::compile(&pattern)))
            .collect();

        Self { rules, fallback }
    }

    /// Classify a request. Total: unmatched requests resolve to the
    /// fallback route with empty params.
    pub fn match_route(&self, method: &Method, path: &str) -> RouteMatch {
        for (rule_method, route, pattern) in &self.rules {
            if rule_method != method {
                continue;
            }
            if let Some(params) = pattern.matches(path) {
                return RouteMatch {
                    route: *route,
                    params,
                };
            }
        }

        RouteMatch {
            route: self.fallback,
            params: PathParams::new(),
        }
    }
}
