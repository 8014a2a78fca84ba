//! Error taxonomy for the edge proxy.
//!
//! # Responsibilities
//! - Distinguish configuration errors from per-request upstream failures
//! - Keep stage errors propagatable with `?` through the pipeline
//!
//! # Design Decisions
//! - `NoHandlersForRoute` is a deployment misconfiguration, fatal per request
//! - Upstream non-200s are NOT errors; stages pass them through verbatim
//! - Malformed JSON in a request body is a stage error, contained or
//!   propagated according to the configured failure policy

use crate::routing::Route;

/// Errors surfaced by the router, the stage library, and the collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route matched but no pipeline was registered for it.
    #[error("no handlers registered for route '{0}'")]
    NoHandlersForRoute(Route),

    /// The pipeline completed without producing a response.
    #[error("pipeline for route '{0}' produced no response")]
    NoResponse(Route),

    /// Outbound fetch failed at the transport level (DNS, connect, TLS).
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// A request or upstream body that must be JSON could not be parsed.
    #[error("invalid JSON payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Storage collaborator failed.
    #[error("profile storage error: {0}")]
    Storage(String),

    /// A derived upstream URL was not a valid URI.
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, Error>;
