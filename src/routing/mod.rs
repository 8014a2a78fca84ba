//! Routing subsystem: the core of the proxy.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → matcher.rs (ordered rule table → route + params)
//!     → router.rs (pipeline lookup, context seeding)
//!     → stages run in registration order, threading
//!       (request, response, context)
//!     → final Response extracted by the façade
//!
//! Rule Compilation (at construction):
//!     route prefix
//!     → canonical pattern list
//!     → pattern.rs tokenizer
//!     → frozen, shareable RouteTable
//! ```
//!
//! # Design Decisions
//! - Rule table compiled once, immutable at runtime, no locking
//! - First match wins; registration order = execution order
//! - Deterministic: same input always matches the same route
//! - One explicit fallback route per router instance

pub mod context;
pub mod matcher;
pub mod pattern;
pub mod router;

pub use context::{
    ContextSeed, Handler, JsonMap, PipelineRequest, PipelineResponse, RouterContext, TraitsFn,
    Triple, Variation, VariationFn,
};
pub use matcher::{Route, RouteMatch, RouteTable};
pub use pattern::{PathParams, PathPattern};
pub use router::{PipelineBuilder, Router};
