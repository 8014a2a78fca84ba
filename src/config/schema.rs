//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge
//! proxy. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Deployment settings: write key, route prefix, upstream endpoints.
    pub settings: EdgeSettings,

    /// Per-feature toggles driving pipeline assembly.
    pub features: EdgeFeatures,

    /// What to do when a pipeline stage fails.
    pub failure_policy: FailurePolicy,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Deployment settings consumed by the router context and stage library.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeSettings {
    /// The analytics project write key. Required.
    pub write_key: String,

    /// First path segment under which all proxy routes live.
    pub route_prefix: String,

    /// Base URL of the analytics CDN being proxied.
    pub base_cdn_url: String,

    /// Tracking API endpoint events are forwarded to.
    pub tracking_api_endpoint: String,

    /// Profiles API base URL.
    pub profiles_api_endpoint: String,

    /// Personas space ID, required for the profiles API feature.
    pub personas_space_id: Option<String>,

    /// Personas API token, required for the profiles API feature.
    pub personas_token: Option<String>,

    /// Basic-auth username for the Engage incoming webhook.
    pub engage_webhook_username: Option<String>,

    /// Basic-auth password for the Engage incoming webhook.
    pub engage_webhook_password: Option<String>,

    /// Whether the injected snippet fires an initial page call.
    pub snippet_initial_page_view: bool,

    /// Base URL requests are proxied to for root/bypass routes. When
    /// unset, the inbound request URL is fetched as-is (edge-style
    /// deployments where DNS already points at the origin).
    pub origin_base_url: Option<String>,

    /// Endpoint source-function calls are forwarded to.
    pub source_function_endpoint: Option<String>,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            write_key: String::new(),
            route_prefix: "seg".to_string(),
            base_cdn_url: "https://cdn.segment.com".to_string(),
            tracking_api_endpoint: "https://api.segment.io/v1".to_string(),
            profiles_api_endpoint: "https://profiles.segment.com".to_string(),
            personas_space_id: None,
            personas_token: None,
            engage_webhook_username: None,
            engage_webhook_password: None,
            snippet_initial_page_view: true,
            origin_base_url: None,
            source_function_endpoint: None,
        }
    }
}

/// Feature toggles. Pipeline composition is decided from these once, at
/// instance construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeFeatures {
    /// Merge edge geo information into tracking payloads.
    pub edge_context: bool,

    /// Evaluate registered content variations on page requests.
    pub edge_variations: bool,

    /// Inject the analytics snippet into proxied HTML pages.
    pub ajs_injection: bool,

    /// Proxy unmatched page requests to the origin (vs. 404).
    pub proxy_origin: bool,

    /// Maintain HttpOnly identity cookies server-side.
    pub server_side_cookies: bool,

    /// Keep the write key out of anything served to browsers.
    pub redact_writekey: bool,

    /// Expose a reduced trait set to the client.
    pub client_side_traits: bool,

    /// Accept Engage incoming webhooks to update stored profiles.
    pub engage_incoming_webhook: bool,

    /// Fall back to the profiles API when a profile is not in storage.
    pub use_profiles_api: bool,
}

impl Default for EdgeFeatures {
    fn default() -> Self {
        Self {
            edge_context: true,
            edge_variations: true,
            ajs_injection: true,
            proxy_origin: true,
            server_side_cookies: true,
            redact_writekey: true,
            client_side_traits: true,
            engage_incoming_webhook: true,
            use_profiles_api: true,
        }
    }
}

/// Failure containment policy for the pipeline executor. One policy per
/// deployment; the two modes are never blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stage errors propagate to the caller (availability traded for
    /// debuggability).
    #[default]
    Strict,

    /// Stage errors are contained; the request degrades to a verbatim
    /// origin fetch (debuggability traded for availability).
    OriginFallback,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
