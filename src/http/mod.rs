//! HTTP subsystem: the inbound server and the outbound client.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, body buffering)
//!     → [edge pipeline handles the request]
//!     → client.rs (outbound fetches to origin / CDN / APIs)
//!     → Send to client
//! ```

pub mod client;
pub mod server;

pub use client::{HttpClient, ReqwestClient};
pub use server::HttpServer;
