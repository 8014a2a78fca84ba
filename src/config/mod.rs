//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → pipeline assembly at proxy construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; it fully determines pipeline
//!   composition, so changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    EdgeConfig, EdgeFeatures, EdgeSettings, FailurePolicy, ListenerConfig, ObservabilityConfig,
};
