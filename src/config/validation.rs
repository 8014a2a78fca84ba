//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check cross-field requirements (webhook auth pair, profiles API creds)
//! - Validate value shapes (bind address, upstream URLs, route prefix)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: EdgeConfig -> Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::EdgeConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "not a valid socket address",
        ));
    }

    let settings = &config.settings;
    if settings.write_key.is_empty() {
        errors.push(ValidationError::new("settings.write_key", "must be set"));
    }

    if settings.route_prefix.is_empty() || settings.route_prefix.contains('/') {
        errors.push(ValidationError::new(
            "settings.route_prefix",
            "must be a single non-empty path segment",
        ));
    }

    for (field, value) in [
        ("settings.base_cdn_url", Some(&settings.base_cdn_url)),
        (
            "settings.tracking_api_endpoint",
            Some(&settings.tracking_api_endpoint),
        ),
        (
            "settings.profiles_api_endpoint",
            Some(&settings.profiles_api_endpoint),
        ),
        ("settings.origin_base_url", settings.origin_base_url.as_ref()),
        (
            "settings.source_function_endpoint",
            settings.source_function_endpoint.as_ref(),
        ),
    ] {
        if let Some(value) = value {
            if Url::parse(value).is_err() {
                errors.push(ValidationError::new(field, "not a valid URL"));
            }
        }
    }

    let features = &config.features;
    if features.engage_incoming_webhook
        && (settings.engage_webhook_username.is_none()
            || settings.engage_webhook_password.is_none())
    {
        errors.push(ValidationError::new(
            "settings.engage_webhook_username",
            "engage webhook enabled but basic-auth credentials are not configured",
        ));
    }

    if features.use_profiles_api
        && (features.client_side_traits || features.edge_variations)
        && (settings.personas_space_id.is_none() || settings.personas_token.is_none())
    {
        errors.push(ValidationError::new(
            "settings.personas_space_id",
            "profiles API enabled but personas credentials are not configured",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
