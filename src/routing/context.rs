//! Request-scoped pipeline context and the stage contract.
//!
//! # Responsibilities
//! - Define the buffered request/response types threaded through pipelines
//! - Define `RouterContext`, the closed, typed bag of request-scoped values
//! - Define `Handler`, the type-erased async stage contract
//!
//! # Design Decisions
//! - Bodies are fully buffered (`Bytes`); stages read and rewrite them
//!   freely without streaming bookkeeping
//! - The context is moved through stages by value: a stage owns its input
//!   and returns its output, so no stage can observe a successor's writes
//! - Typed named fields instead of a stringly-keyed bag; one explicit
//!   `extensions` map remains for genuinely dynamic per-stage data
//! - Collaborators (outbound fetch, profile storage) are injected handles
//!   carried by the context, never ambient globals

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::config::EdgeSettings;
use crate::error::Result;
use crate::http::client::HttpClient;
use crate::routing::matcher::Route;
use crate::routing::pattern::PathParams;
use crate::storage::ProfileStore;

/// Inbound request with a fully buffered body.
pub type PipelineRequest = http::Request<Bytes>;

/// Response with a fully buffered body.
pub type PipelineResponse = http::Response<Bytes>;

/// The triple threaded through every stage.
pub type Triple = (PipelineRequest, Option<PipelineResponse>, RouterContext);

/// JSON object, as produced by profile lookups and webhook payloads.
pub type JsonMap = serde_json::Map<String, Value>;

/// Evaluates resolved traits into an alternative origin path, or `None`
/// to fetch the literal route.
pub type VariationFn = dyn Fn(Option<&JsonMap>) -> Option<String> + Send + Sync;

/// Reduces the full trait set to the subset safe to expose to the client.
pub type TraitsFn = dyn Fn(&JsonMap) -> Option<Value> + Send + Sync;

/// A server-side content variation, registered at construction time and
/// consulted per request by the variations stage.
#[derive(Clone)]
pub struct Variation {
    /// Origin path the variation applies to (e.g. `/pricing`).
    pub route: String,
    pub evaluate: Arc<VariationFn>,
}

/// Request-scoped values threaded through a pipeline. Created fresh per
/// request from the router's seed, destroyed when handling ends.
#[derive(Clone)]
pub struct RouterContext {
    /// Resolved deployment settings (write key, prefix, upstream bases).
    pub settings: Arc<EdgeSettings>,
    /// Outbound fetch capability.
    pub http: Arc<dyn HttpClient>,
    /// Profile storage, when configured.
    pub storage: Option<Arc<dyn ProfileStore>>,
    /// Variations registered on this instance.
    pub variations: Arc<Vec<Variation>>,
    /// Client-side trait reduction, when installed.
    pub traits_fn: Option<Arc<TraitsFn>>,

    /// Host header of the inbound request.
    pub host: String,
    /// The matched route, for downstream observability.
    pub route: Route,
    /// Path parameters captured by the route matcher.
    pub params: PathParams,

    /// Identity resolved from cookies or payload. Absence of identity is
    /// normal and modeled as `None`, never as an error.
    pub user_id: Option<String>,
    pub anonymous_id: Option<String>,
    /// Full traits resolved from storage or the profiles API.
    pub traits: Option<JsonMap>,
    /// Reduced traits destined for the client.
    pub client_side_traits: Option<Value>,

    /// When set by a stage, the executor stops after that stage.
    pub early_exit: bool,
    /// Open extension slot for stage-specific values.
    pub extensions: HashMap<String, Value>,
}

impl std::fmt::Debug for RouterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterContext")
            .field("host", &self.host)
            .field("route", &self.route)
            .field("params", &self.params)
            .field("user_id", &self.user_id)
            .field("anonymous_id", &self.anonymous_id)
            .field("traits", &self.traits)
            .field("client_side_traits", &self.client_side_traits)
            .field("early_exit", &self.early_exit)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Per-instance ingredients from which each request's context is seeded.
#[derive(Clone)]
pub struct ContextSeed {
    pub settings: Arc<EdgeSettings>,
    pub http: Arc<dyn HttpClient>,
    pub storage: Option<Arc<dyn ProfileStore>>,
    pub variations: Arc<Vec<Variation>>,
    pub traits_fn: Option<Arc<TraitsFn>>,
}

impl ContextSeed {
    /// Build the initial context for one matched request.
    pub fn build(&self, route: Route, params: PathParams, host: String) -> RouterContext {
        RouterContext {
            settings: self.settings.clone(),
            http: self.http.clone(),
            storage: self.storage.clone(),
            variations: self.variations.clone(),
            traits_fn: self.traits_fn.clone(),
            host,
            route,
            params,
            user_id: None,
            anonymous_id: None,
            traits: None,
            client_side_traits: None,
            early_exit: false,
            extensions: HashMap::new(),
        }
    }
}

type StageFn = dyn Fn(PipelineRequest, Option<PipelineResponse>, RouterContext) -> BoxFuture<'static, Result<Triple>>
    + Send
    + Sync;

/// A single pipeline stage: an async function over the request/response/
/// context triple. Stateless across invocations; all persistent state
/// lives in the injected collaborators.
#[derive(Clone)]
pub struct Handler {
    name: &'static str,
    func: Arc<StageFn>,
}

impl Handler {
    /// Wrap an async function as a named stage.
    pub fn new<F, Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(PipelineRequest, Option<PipelineResponse>, RouterContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = Result<Triple>> + Send + 'static,
    {
        Self {
            name,
            func: Arc::new(move |request, response, context| {
                Box::pin(func(request, response, context))
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(
        &self,
        request: PipelineRequest,
        response: Option<PipelineResponse>,
        context: RouterContext,
    ) -> BoxFuture<'static, Result<Triple>> {
        (self.func)(request, response, context)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Duplicate a buffered request. Used by the executor to keep the original
/// request available for resilient-mode origin fallback; body bytes are
/// shared, not copied.
pub fn clone_request(request: &PipelineRequest) -> PipelineRequest {
    let mut cloned = http::Request::new(request.body().clone());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.version_mut() = request.version();
    *cloned.headers_mut() = request.headers().clone();
    cloned
}
