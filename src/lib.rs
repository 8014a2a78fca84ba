//! Edge Proxy Library
//!
//! A first-party analytics edge proxy: sits between website visitors, the
//! site's origin, and the analytics platform, serving the analytics assets
//! and tracking API from the site's own domain while managing identity
//! cookies, profile-driven content variations, and HTML enrichment at the
//! edge.

pub mod config;
pub mod edge;
pub mod error;
pub mod http;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod storage;

pub use config::{load_config, EdgeConfig, EdgeFeatures, EdgeSettings, FailurePolicy};
pub use edge::{EdgeProxy, EdgeProxyBuilder};
pub use error::{Error, Result};
pub use http::HttpServer;
pub use storage::{MemoryStore, ProfileStore};
