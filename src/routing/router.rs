//! Pipeline registry and executor.
//!
//! # Responsibilities
//! - Accumulate, per route, the ordered stage list (fluent registration
//!   with conditional appension)
//! - Execute one inbound request: match, seed context, run stages in order
//! - Enforce early-exit and the configured failure policy
//!
//! # Design Decisions
//! - Registration happens once, at instance construction; `handle` only
//!   reads the frozen pipelines (the registry is not touched per request)
//! - Stages run strictly sequentially; each observes exactly the triple
//!   its predecessor returned
//! - A matched route with no registered pipeline is a configuration error
//!   (`NoHandlersForRoute`), never silently proxied
//! - Failure policy is a single explicit choice per instance: strict
//!   propagation, or containment that degrades to a verbatim origin fetch

use std::collections::HashMap;

use http::header;

use crate::config::FailurePolicy;
use crate::error::{Error, Result};
use crate::routing::context::{clone_request, ContextSeed, Handler, PipelineRequest, Triple};
use crate::routing::matcher::{Route, RouteTable};

/// The request router: rule table + per-route pipelines + default context.
pub struct Router {
    table: RouteTable,
    pipelines: HashMap<Route, Vec<Handler>>,
    seed: ContextSeed,
    failure_policy: FailurePolicy,
}

/// Fluent registration handle returned by [`Router::register`].
pub struct PipelineBuilder<'a> {
    router: &'a mut Router,
    route: Route,
}

impl<'a> PipelineBuilder<'a> {
    /// Append a stage unconditionally.
    pub fn handler(self, stage: Handler) -> Self {
        self.router
            .pipelines
            .entry(self.route)
            .or_default()
            .push(stage);
        self
    }

    /// Append a stage only when `enabled` is true. Centralizes the
    /// feature-flag matrix at assembly time instead of branching inside
    /// stage bodies.
    pub fn handler_if(self, stage: Handler, enabled: bool) -> Self {
        if enabled {
            self.handler(stage)
        } else {
            self
        }
    }
}

impl Router {
    pub fn new(route_prefix: &str, fallback: Route, seed: ContextSeed, failure_policy: FailurePolicy) -> Self {
        Self {
            table: RouteTable::new(route_prefix, fallback),
            pipelines: HashMap::new(),
            seed,
            failure_policy,
        }
    }

    /// Begin (or continue) registering stages for a route. Additive:
    /// registering the same route twice appends, it does not replace.
    pub fn register(&mut self, route: Route) -> PipelineBuilder<'_> {
        self.pipelines.entry(route).or_default();
        PipelineBuilder { router: self, route }
    }

    /// Handle one inbound request, returning the final triple.
    pub async fn handle(&self, request: PipelineRequest) -> Result<Triple> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let matched = self.table.match_route(&method, &path);
        let handlers = self
            .pipelines
            .get(&matched.route)
            .filter(|stages| !stages.is_empty())
            .ok_or(Error::NoHandlersForRoute(matched.route))?;

        tracing::debug!(
            route = %matched.route,
            %method,
            %path,
            stages = handlers.len(),
            "executing pipeline"
        );

        // Kept around only when the failure policy needs a verbatim replay.
        let original = matches!(self.failure_policy, FailurePolicy::OriginFallback)
            .then(|| clone_request(&request));

        let mut context = self.seed.build(matched.route, matched.params, host);
        let mut current = request;
        let mut response = None;

        for stage in handlers {
            let saved_context = original.as_ref().map(|_| context.clone());

            match stage.call(current, response, context).await {
                Ok((next_request, next_response, next_context)) => {
                    current = next_request;
                    response = next_response;
                    context = next_context;
                }
                Err(error) => {
                    let Some(original) = original else {
                        return Err(error);
                    };
                    let context = saved_context.unwrap_or_else(|| {
                        self.seed.build(matched.route, Default::default(), String::new())
                    });

                    tracing::error!(
                        route = %matched.route,
                        stage = stage.name(),
                        %error,
                        "pipeline failed, degrading to verbatim origin proxy"
                    );

                    let mut replay = clone_request(&original);
                    if replay.uri().authority().is_none() {
                        let target = format!(
                            "https://{}{}",
                            context.host,
                            replay
                                .uri()
                                .path_and_query()
                                .map(|pq| pq.as_str())
                                .unwrap_or("/")
                        );
                        if let Ok(uri) = target.parse() {
                            *replay.uri_mut() = uri;
                        }
                    }
                    let fallback = context.http.fetch(replay).await?;
                    return Ok((original, Some(fallback), context));
                }
            }

            if context.early_exit {
                tracing::debug!(route = %matched.route, stage = stage.name(), "early exit");
                break;
            }
        }

        Ok((current, response, context))
    }
}
