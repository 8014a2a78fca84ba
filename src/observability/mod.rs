//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows through all subsystems via the server middleware

pub mod logging;
