//! Audience, variation and failure-policy tests driving the assembled proxy.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::{header, StatusCode};
use serde_json::json;

use edge_proxy::{
    EdgeProxy, EdgeSettings, Error, FailurePolicy, MemoryStore, ProfileStore,
};

mod common;
use common::{get, post, response, upstream_world, MockClient};

fn personas_settings() -> EdgeSettings {
    EdgeSettings {
        engage_webhook_username: Some("hook-user".to_string()),
        engage_webhook_password: Some("hook-pass".to_string()),
        personas_space_id: Some("spa_1".to_string()),
        personas_token: Some("tok_1".to_string()),
        ..common::settings()
    }
}

fn webhook_auth() -> String {
    format!("Basic {}", BASE64.encode("hook-user:hook-pass"))
}

fn audience_event(user_id: &str, traits: serde_json::Value) -> String {
    json!({
        "type": "identify",
        "userId": user_id,
        "traits": traits,
        "context": { "personas": { "computation_class": "audience" } }
    })
    .to_string()
}

#[tokio::test]
async fn webhook_creates_then_merges_audience_profiles() {
    let storage = Arc::new(MemoryStore::new());
    let proxy = EdgeProxy::builder(personas_settings())
        .http_client(MockClient::new(upstream_world))
        .profile_storage(storage.clone())
        .build();

    let mut request = post(
        "/seg/personas",
        &audience_event("u1", json!({"cool_people": true})),
    );
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, webhook_auth().parse().unwrap());
    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"audience updated");

    // a second audience lands next to the first, not over it
    let mut request = post(
        "/seg/personas",
        &audience_event("u1", json!({"mac_users": true})),
    );
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, webhook_auth().parse().unwrap());
    proxy.handle(request).await.unwrap();

    let stored = storage.get("user_id:u1").await.unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&stored).unwrap(),
        json!({"cool_people": true, "mac_users": true})
    );
}

#[tokio::test]
async fn unauthenticated_webhook_leaves_storage_untouched() {
    let storage = Arc::new(MemoryStore::new());
    let proxy = EdgeProxy::builder(personas_settings())
        .http_client(MockClient::new(upstream_world))
        .profile_storage(storage.clone())
        .build();

    let request = post(
        "/seg/personas",
        &audience_event("u1", json!({"cool_people": true})),
    );
    let response = proxy.handle(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(storage.get("user_id:u1").await.unwrap(), None);
}

#[tokio::test]
async fn variations_pick_pages_using_webhook_fed_profiles() {
    let storage = Arc::new(MemoryStore::new());
    let client = MockClient::new(upstream_world);
    let proxy = EdgeProxy::builder(personas_settings())
        .http_client(client.clone())
        .profile_storage(storage)
        .variation("/pricing", |traits| {
            traits
                .and_then(|t| t.get("beta_testers"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
                .then(|| "/pricing-beta".to_string())
        })
        .build();

    let mut request = post(
        "/seg/personas",
        &audience_event("u1", json!({"beta_testers": true})),
    );
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, webhook_auth().parse().unwrap());
    proxy.handle(request).await.unwrap();

    let mut request = get("/pricing");
    request
        .headers_mut()
        .insert(header::COOKIE, "ajs_user_id=u1".parse().unwrap());
    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fetched: Vec<_> = client.requests().iter().map(|r| r.path.clone()).collect();
    assert!(fetched.contains(&"/pricing-beta".to_string()));
    assert!(!fetched.contains(&"/pricing".to_string()));
}

#[tokio::test]
async fn profiles_api_backfills_when_storage_is_cold() {
    let storage = Arc::new(MemoryStore::new());
    let client = MockClient::new(|recorded| {
        if recorded.url.contains("profiles.segment.com") {
            Ok(response(
                StatusCode::OK,
                "application/json",
                &json!({"traits": {"beta_testers": true}}).to_string(),
            ))
        } else {
            upstream_world(recorded)
        }
    });
    let proxy = EdgeProxy::builder(personas_settings())
        .http_client(client.clone())
        .profile_storage(storage.clone())
        .variation("/pricing", |traits| {
            traits
                .and_then(|t| t.get("beta_testers"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
                .then(|| "/pricing-beta".to_string())
        })
        .build();

    let mut request = get("/pricing");
    request
        .headers_mut()
        .insert(header::COOKIE, "ajs_user_id=u1".parse().unwrap());
    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fetched: Vec<_> = client.requests().iter().map(|r| r.path.clone()).collect();
    assert!(fetched.contains(&"/pricing-beta".to_string()));
    // the profile is now cached at the edge
    assert!(storage.get("user_id:u1").await.unwrap().is_some());
}

#[tokio::test]
async fn strict_mode_surfaces_pipeline_failures() {
    let client = MockClient::new(|recorded| {
        if recorded.url.contains("cdn.segment.com") {
            Err(Error::Upstream("cdn unreachable".into()))
        } else {
            upstream_world(recorded)
        }
    });
    let proxy = EdgeProxy::builder(common::settings())
        .http_client(client)
        .build();

    let err = proxy
        .handle(get("/seg/ajs/ee0e98bd-8efe-4395-8d4a-5fdbd4dea0ba"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upstream(_)));
}

#[tokio::test]
async fn origin_fallback_mode_degrades_to_plain_proxying() {
    let client = MockClient::new(|recorded| {
        if recorded.url.contains("cdn.segment.com") {
            Err(Error::Upstream("cdn unreachable".into()))
        } else {
            upstream_world(recorded)
        }
    });
    let proxy = EdgeProxy::builder(common::settings())
        .http_client(client.clone())
        .failure_policy(FailurePolicy::OriginFallback)
        .build();

    let response = proxy
        .handle(get("/seg/ajs/ee0e98bd-8efe-4395-8d4a-5fdbd4dea0ba"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // the degraded fetch replayed the visitor's request against the host
    let last = client.requests().into_iter().last().unwrap();
    assert_eq!(last.path, "/seg/ajs/ee0e98bd-8efe-4395-8d4a-5fdbd4dea0ba");
}
