//! Profiles, audiences and content variations.
//!
//! # Responsibilities
//! - Accept Engage incoming webhooks and fold audience traits into the
//!   stored profile
//! - Resolve a visitor's traits from edge storage, falling back to the
//!   profiles API with a short-lived cache
//! - Evaluate registered content variations against resolved traits
//! - Reduce traits to the client-exposable subset
//!
//! # Design Decisions
//! - Webhook auth failures are 401, configuration gaps are 403; the two
//!   are deliberately distinguishable
//! - Non-identify / non-audience events never mutate storage and never
//!   produce a 5xx
//! - Profiles API failures are logged and swallowed: a missing profile
//!   degrades personalization, it must not break the page
//! - Cache population is last-write-wins; concurrent misses may race

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::{header, StatusCode, Uri};

use crate::error::Result;
use crate::routing::context::{
    JsonMap, PipelineRequest, PipelineResponse, RouterContext, Triple,
};

const PROFILE_CACHE_TTL: Duration = Duration::from_secs(120);

fn profile_index(user_id: &str) -> String {
    format!("user_id:{user_id}")
}

/// Engage incoming webhook: authenticate, then merge audience traits into
/// the stored profile.
pub async fn handle_personas_webhook(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let Some(encoded) = authorization.strip_prefix("Basic ") else {
        tracing::debug!("webhook rejected, basic authentication required");
        let response =
            super::text_response(StatusCode::UNAUTHORIZED, "Basic authentication required");
        return Ok((request, Some(response), context));
    };

    let decoded = BASE64
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default();
    let (username, password) = decoded.split_once(':').unwrap_or(("", ""));

    let expected_username = context.settings.engage_webhook_username.as_deref();
    let expected_password = context.settings.engage_webhook_password.as_deref();
    if username.is_empty()
        || password.is_empty()
        || Some(username) != expected_username
        || Some(password) != expected_password
    {
        tracing::debug!("webhook rejected, invalid basic authentication credentials");
        let response = super::text_response(
            StatusCode::UNAUTHORIZED,
            "Invalid basic authentication credentials",
        );
        return Ok((request, Some(response), context));
    }

    let Some(storage) = context.storage.clone() else {
        tracing::debug!("webhook rejected, profile storage is not configured");
        let response = super::text_response(StatusCode::FORBIDDEN, "Storage not available");
        return Ok((request, Some(response), context));
    };

    let event = super::json_object(request.body())?;
    if event.get("type").and_then(|v| v.as_str()) != Some("identify") {
        tracing::debug!("ignoring incoming webhook, not an identify event");
        let response =
            super::text_response(StatusCode::FORBIDDEN, "Segment identify event not found.");
        return Ok((request, Some(response), context));
    }

    let computation_class = event
        .get("context")
        .and_then(|c| c.get("personas"))
        .and_then(|p| p.get("computation_class"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if computation_class != "audience" {
        tracing::debug!("ignoring incoming webhook, not an audience computation");
        let response = super::text_response(StatusCode::OK, "Ok");
        return Ok((request, Some(response), context));
    }

    let Some(user_id) = event.get("userId").and_then(|v| v.as_str()) else {
        let response =
            super::text_response(StatusCode::FORBIDDEN, "Segment identify event not found.");
        return Ok((request, Some(response), context));
    };
    let traits = event
        .get("traits")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let index = profile_index(user_id);
    let mut profile: JsonMap = match storage.get(&index).await? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => JsonMap::new(),
    };
    // new traits overlay, existing non-conflicting traits survive
    profile.extend(traits);

    storage
        .put(&index, serde_json::Value::Object(profile).to_string(), None)
        .await?;
    tracing::debug!(user_id, "audience updated");

    let response = super::text_response(StatusCode::OK, &format!("{computation_class} updated"));
    Ok((request, Some(response), context))
}

/// Placeholder pipeline for deployments with the webhook disabled.
pub async fn engage_webhook_disabled(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let response =
        super::text_response(StatusCode::NOT_IMPLEMENTED, "Engage incoming webhook disabled");
    Ok((request, Some(response), context))
}

/// Swap the fetched path when a registered variation has an opinion about
/// this route.
pub async fn handle_variations(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let path = request.uri().path().to_string();
    let variations = context.variations.clone();
    for variation in variations.iter() {
        if variation.route != path {
            continue;
        }

        let origin_path = (variation.evaluate)(context.traits.as_ref());
        tracing::debug!(
            route = %variation.route,
            origin_path = origin_path.as_deref().unwrap_or("<none>"),
            "evaluated variation"
        );

        if let Some(origin_path) = origin_path {
            let mut parts = request.uri().clone().into_parts();
            let path_and_query = match request.uri().query() {
                Some(query) => format!("{origin_path}?{query}"),
                None => origin_path,
            };
            parts.path_and_query = Some(path_and_query.parse().map_err(|e| {
                crate::error::Error::InvalidUrl(format!("variation path: {e}"))
            })?);
            let uri = Uri::from_parts(parts)
                .map_err(|e| crate::error::Error::InvalidUrl(format!("variation uri: {e}")))?;

            let mut request = request;
            *request.uri_mut() = uri;
            return Ok((request, response, context));
        }
    }
    Ok((request, response, context))
}

/// Reduce resolved traits to the client-exposable subset.
pub async fn handle_client_side_traits(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    if let (Some(traits_fn), Some(traits)) = (context.traits_fn.clone(), context.traits.as_ref()) {
        context.client_side_traits = traits_fn(traits);
    }
    Ok((request, response, context))
}

/// Look up the visitor's profile in edge storage.
pub async fn extract_profile_from_edge(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    let (Some(user_id), Some(storage)) = (context.user_id.clone(), context.storage.clone()) else {
        return Ok((request, response, context));
    };

    match storage.get(&profile_index(&user_id)).await? {
        Some(raw) => {
            context.traits = Some(serde_json::from_str(&raw)?);
        }
        None => {
            tracing::debug!(user_id, "profile not found in edge storage");
        }
    }
    Ok((request, response, context))
}

/// Query the profiles API for audiences when storage had no answer, and
/// cache the result briefly.
pub async fn extract_profile_from_segment(
    request: PipelineRequest,
    response: Option<PipelineResponse>,
    mut context: RouterContext,
) -> Result<Triple> {
    let settings = context.settings.clone();
    let (Some(user_id), Some(space_id), Some(token), Some(storage)) = (
        context.user_id.clone(),
        settings.personas_space_id.clone(),
        settings.personas_token.clone(),
        context.storage.clone(),
    ) else {
        return Ok((request, response, context));
    };
    // traits already resolved from the edge, nothing to do
    if context.traits.is_some() {
        return Ok((request, response, context));
    }

    let index = profile_index(&user_id);
    let url = format!(
        "{}/v1/spaces/{space_id}/collections/users/profiles/{index}/traits?limit=200&class=audience",
        settings.profiles_api_endpoint
    );

    let mut api_request = match super::get_request(&url) {
        Ok(r) => r,
        Err(error) => {
            tracing::error!(user_id, %error, "profiles API url invalid");
            return Ok((request, response, context));
        }
    };
    let credentials = BASE64.encode(format!("{token}:"));
    if let Ok(value) = http::HeaderValue::from_str(&format!("Basic {credentials}")) {
        api_request
            .headers_mut()
            .insert(header::AUTHORIZATION, value);
    }

    match context.http.fetch(api_request).await {
        Ok(api_response) if api_response.status() == StatusCode::OK => {
            let payload: serde_json::Value = serde_json::from_slice(api_response.body())?;
            let traits = payload
                .get("traits")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();

            storage
                .put(
                    &index,
                    serde_json::Value::Object(traits.clone()).to_string(),
                    Some(PROFILE_CACHE_TTL),
                )
                .await?;
            context.traits = Some(traits);
        }
        Ok(api_response) => {
            tracing::debug!(
                user_id,
                status = api_response.status().as_u16(),
                "profiles API had no profile"
            );
        }
        Err(error) => {
            tracing::error!(user_id, %error, "error querying profiles API");
        }
    }

    Ok((request, response, context))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::config::EdgeSettings;
    use crate::http::client::testing::ScriptedClient;
    use crate::routing::context::Variation;
    use crate::routing::matcher::Route;
    use crate::storage::{MemoryStore, ProfileStore};

    fn context_with(
        client: Arc<ScriptedClient>,
        storage: Option<Arc<MemoryStore>>,
    ) -> RouterContext {
        RouterContext {
            settings: Arc::new(EdgeSettings {
                write_key: "wk".to_string(),
                engage_webhook_username: Some("user".to_string()),
                engage_webhook_password: Some("pass".to_string()),
                personas_space_id: Some("spa_1".to_string()),
                personas_token: Some("tok_1".to_string()),
                ..EdgeSettings::default()
            }),
            http: client,
            storage: storage.map(|s| s as Arc<dyn ProfileStore>),
            variations: Arc::new(Vec::new()),
            traits_fn: None,
            host: "customer.example.com".to_string(),
            route: Route::Personas,
            params: HashMap::new(),
            user_id: None,
            anonymous_id: None,
            traits: None,
            client_side_traits: None,
            early_exit: false,
            extensions: HashMap::new(),
        }
    }

    fn webhook_request(auth: Option<&str>, body: serde_json::Value) -> PipelineRequest {
        let mut request = http::Request::new(Bytes::from(body.to_string()));
        *request.method_mut() = http::Method::POST;
        *request.uri_mut() = "/seg/personas".parse().unwrap();
        if let Some(auth) = auth {
            request
                .headers_mut()
                .insert(header::AUTHORIZATION, auth.parse().unwrap());
        }
        request
    }

    fn valid_auth() -> String {
        format!("Basic {}", BASE64.encode("user:pass"))
    }

    fn audience_event(traits: serde_json::Value) -> serde_json::Value {
        json!({
            "type": "identify",
            "userId": "u1",
            "traits": traits,
            "context": { "personas": { "computation_class": "audience" } }
        })
    }

    #[tokio::test]
    async fn missing_auth_is_401_and_storage_untouched() {
        let storage = Arc::new(MemoryStore::new());
        let context = context_with(Arc::new(ScriptedClient::not_found()), Some(storage.clone()));
        let request = webhook_request(None, audience_event(json!({"cool_people": true})));

        let (_, response, _) = handle_personas_webhook(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(storage.get("user_id:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_credentials_are_401() {
        let context = context_with(
            Arc::new(ScriptedClient::not_found()),
            Some(Arc::new(MemoryStore::new())),
        );
        let auth = format!("Basic {}", BASE64.encode("user:wrong"));
        let request = webhook_request(Some(&auth), audience_event(json!({})));

        let (_, response, _) = handle_personas_webhook(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_storage_is_403() {
        let context = context_with(Arc::new(ScriptedClient::not_found()), None);
        let request = webhook_request(Some(&valid_auth()), audience_event(json!({})));

        let (_, response, _) = handle_personas_webhook(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn non_identify_event_is_403_without_storage_writes() {
        let storage = Arc::new(MemoryStore::new());
        let context = context_with(Arc::new(ScriptedClient::not_found()), Some(storage.clone()));
        let request = webhook_request(
            Some(&valid_auth()),
            json!({"type": "track", "userId": "u1", "event": "x"}),
        );

        let (_, response, _) = handle_personas_webhook(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::FORBIDDEN);
        assert_eq!(storage.get("user_id:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_audience_computation_is_a_200_no_op() {
        let storage = Arc::new(MemoryStore::new());
        let context = context_with(Arc::new(ScriptedClient::not_found()), Some(storage.clone()));
        let request = webhook_request(
            Some(&valid_auth()),
            json!({
                "type": "identify",
                "userId": "u1",
                "traits": {"score": 1},
                "context": { "personas": { "computation_class": "computed_trait" } }
            }),
        );

        let (_, response, _) = handle_personas_webhook(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::OK);
        assert_eq!(storage.get("user_id:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn audience_traits_create_a_profile() {
        let storage = Arc::new(MemoryStore::new());
        let context = context_with(Arc::new(ScriptedClient::not_found()), Some(storage.clone()));
        let request = webhook_request(
            Some(&valid_auth()),
            audience_event(json!({"cool_people": true})),
        );

        let (_, response, _) = handle_personas_webhook(request, None, context).await.unwrap();
        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"audience updated");

        let stored = storage.get("user_id:u1").await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&stored).unwrap(),
            json!({"cool_people": true})
        );
    }

    #[tokio::test]
    async fn audience_traits_merge_with_existing_profile() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .put("user_id:u1", json!({"mac_users": true}).to_string(), None)
            .await
            .unwrap();
        let context = context_with(Arc::new(ScriptedClient::not_found()), Some(storage.clone()));
        let request = webhook_request(
            Some(&valid_auth()),
            audience_event(json!({"cool_people": true})),
        );

        handle_personas_webhook(request, None, context).await.unwrap();

        let stored = storage.get("user_id:u1").await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&stored).unwrap(),
            json!({"mac_users": true, "cool_people": true})
        );
    }

    #[tokio::test]
    async fn variation_rewrites_the_fetched_path() {
        let mut context = context_with(Arc::new(ScriptedClient::not_found()), None);
        context.traits = Some(
            json!({"beta_testers": true})
                .as_object()
                .cloned()
                .unwrap(),
        );
        context.variations = Arc::new(vec![Variation {
            route: "/pricing".to_string(),
            evaluate: Arc::new(|traits| {
                traits
                    .and_then(|t| t.get("beta_testers"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
                    .then(|| "/pricing-beta".to_string())
            }),
        }]);

        let mut request = http::Request::new(Bytes::new());
        *request.uri_mut() = "https://customer.example.com/pricing?x=1".parse().unwrap();

        let (request, _, _) = handle_variations(request, None, context).await.unwrap();
        assert_eq!(request.uri().path(), "/pricing-beta");
        assert_eq!(request.uri().query(), Some("x=1"));
    }

    #[tokio::test]
    async fn variation_without_opinion_keeps_the_route() {
        let mut context = context_with(Arc::new(ScriptedClient::not_found()), None);
        context.variations = Arc::new(vec![Variation {
            route: "/pricing".to_string(),
            evaluate: Arc::new(|_| None),
        }]);

        let mut request = http::Request::new(Bytes::new());
        *request.uri_mut() = "/pricing".parse().unwrap();

        let (request, _, _) = handle_variations(request, None, context).await.unwrap();
        assert_eq!(request.uri().path(), "/pricing");
    }

    #[tokio::test]
    async fn profile_comes_from_edge_storage_when_cached() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .put("user_id:u1", json!({"vip": true}).to_string(), None)
            .await
            .unwrap();
        let mut context =
            context_with(Arc::new(ScriptedClient::not_found()), Some(storage));
        context.user_id = Some("u1".to_string());

        let request = http::Request::new(Bytes::new());
        let (_, _, context) = extract_profile_from_edge(request, None, context).await.unwrap();
        assert_eq!(
            context.traits,
            json!({"vip": true}).as_object().cloned()
        );
    }

    #[tokio::test]
    async fn profiles_api_fills_the_cache_on_miss() {
        let client = Arc::new(ScriptedClient::new(|_| {
            let body = json!({"traits": {"cool_people": true}}).to_string();
            let mut response = http::Response::new(Bytes::from(body));
            *response.status_mut() = StatusCode::OK;
            response
        }));
        let storage = Arc::new(MemoryStore::new());
        let mut context = context_with(client.clone(), Some(storage.clone()));
        context.user_id = Some("u1".to_string());

        let request = http::Request::new(Bytes::new());
        let (_, _, context) = extract_profile_from_segment(request, None, context)
            .await
            .unwrap();

        assert_eq!(
            context.traits,
            json!({"cool_people": true}).as_object().cloned()
        );
        assert!(storage.get("user_id:u1").await.unwrap().is_some());

        let recorded = client.requests();
        assert!(recorded[0].url.contains("/v1/spaces/spa_1/"));
        assert!(recorded[0].url.contains("user_id:u1"));
        assert!(recorded[0].url.contains("class=audience"));
    }

    #[tokio::test]
    async fn profiles_api_failure_degrades_gracefully() {
        let client = Arc::new(ScriptedClient::with_body(500, "boom"));
        let storage = Arc::new(MemoryStore::new());
        let mut context = context_with(client, Some(storage.clone()));
        context.user_id = Some("u1".to_string());

        let request = http::Request::new(Bytes::new());
        let (_, _, context) = extract_profile_from_segment(request, None, context)
            .await
            .unwrap();
        assert!(context.traits.is_none());
        assert_eq!(storage.get("user_id:u1").await.unwrap(), None);
    }
}
