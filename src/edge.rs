//! The edge proxy façade.
//!
//! # Responsibilities
//! - Assemble per-route pipelines from settings and feature flags, once,
//!   at construction
//! - Expose the single `handle` entry point the HTTP server drives
//! - Offer profile lookup for host applications embedding the proxy
//!
//! # Data Flow
//! Builder collects settings, features, collaborators, variations and the
//! client-side traits reduction; `build` freezes them into a [`Router`]
//! whose pipelines encode the full feature matrix. Per request, `handle`
//! delegates to the router and unwraps the response half of the triple.

use std::sync::Arc;

use crate::config::{EdgeFeatures, EdgeSettings, FailurePolicy};
use crate::error::{Error, Result};
use crate::http::client::{HttpClient, ReqwestClient};
use crate::proxy::{assets, cookies, origin, personas, snippet, source_function, tapi};
use crate::routing::context::{
    ContextSeed, Handler, JsonMap, PipelineRequest, PipelineResponse, TraitsFn, Variation,
};
use crate::routing::matcher::Route;
use crate::routing::router::Router;
use crate::storage::ProfileStore;

macro_rules! stage {
    ($func:path) => {
        Handler::new(stringify!($func), $func)
    };
}

/// Builder for [`EdgeProxy`]. Everything that shapes pipeline assembly is
/// collected here; after [`build`](Self::build) the instance is immutable.
pub struct EdgeProxyBuilder {
    settings: EdgeSettings,
    features: EdgeFeatures,
    failure_policy: FailurePolicy,
    http: Option<Arc<dyn HttpClient>>,
    storage: Option<Arc<dyn ProfileStore>>,
    variations: Vec<Variation>,
    traits_fn: Option<Arc<TraitsFn>>,
}

impl EdgeProxyBuilder {
    pub fn new(settings: EdgeSettings) -> Self {
        Self {
            settings,
            features: EdgeFeatures::default(),
            failure_policy: FailurePolicy::default(),
            http: None,
            storage: None,
            variations: Vec::new(),
            traits_fn: None,
        }
    }

    pub fn features(mut self, features: EdgeFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Replace the outbound HTTP client (defaults to reqwest).
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    pub fn profile_storage(mut self, storage: Arc<dyn ProfileStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Register a content variation: when a visitor requests `route`, the
    /// evaluation function picks the origin path to serve instead, based
    /// on the visitor's resolved traits. Returning `None` serves the
    /// literal route.
    pub fn variation<F>(mut self, route: &str, evaluate: F) -> Self
    where
        F: Fn(Option<&JsonMap>) -> Option<String> + Send + Sync + 'static,
    {
        self.variations.push(Variation {
            route: route.to_string(),
            evaluate: Arc::new(evaluate),
        });
        self
    }

    /// Install the reduction that derives the client-exposable trait set
    /// from a full profile.
    pub fn client_side_traits<F>(mut self, reduce: F) -> Self
    where
        F: Fn(&JsonMap) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        self.traits_fn = Some(Arc::new(reduce));
        self
    }

    /// Freeze the configuration into a ready instance. Pipelines for every
    /// route are assembled here, exactly once.
    pub fn build(self) -> EdgeProxy {
        let settings = Arc::new(self.settings);
        let http = self.http.unwrap_or_else(|| Arc::new(ReqwestClient::new()));
        let features = self.features;

        let seed = ContextSeed {
            settings: settings.clone(),
            http: http.clone(),
            storage: self.storage.clone(),
            variations: Arc::new(self.variations),
            traits_fn: self.traits_fn,
        };
        let mut router = Router::new(
            &settings.route_prefix,
            Route::Bypass,
            seed,
            self.failure_policy,
        );

        router.register(Route::Bundles).handler(stage!(assets::handle_bundles));
        router
            .register(Route::Destinations)
            .handler(stage!(assets::handle_bundles));

        router
            .register(Route::Ajs)
            .handler_if(
                stage!(cookies::extract_id_from_cookie),
                features.server_side_cookies || features.client_side_traits,
            )
            .handler_if(
                stage!(personas::extract_profile_from_edge),
                features.client_side_traits,
            )
            .handler_if(
                stage!(personas::extract_profile_from_segment),
                features.use_profiles_api && features.client_side_traits,
            )
            .handler(stage!(assets::handle_ajs))
            .handler_if(
                stage!(cookies::enrich_response_with_id_cookies),
                features.server_side_cookies,
            )
            .handler_if(
                stage!(personas::handle_client_side_traits),
                features.client_side_traits,
            )
            .handler_if(
                stage!(assets::append_id_calls_to_ajs),
                features.server_side_cookies || features.client_side_traits,
            )
            .handler(stage!(assets::append_ajs_custom_configuration))
            .handler(stage!(assets::remove_sourcemap_reference))
            .handler_if(stage!(assets::redact_writekey), features.redact_writekey);

        router
            .register(Route::Settings)
            .handler(stage!(assets::handle_settings))
            .handler(stage!(assets::configure_api_host))
            .handler_if(stage!(assets::redact_writekey), features.redact_writekey)
            .handler(stage!(assets::handle_cors));

        router
            .register(Route::Tapi)
            .handler_if(stage!(tapi::inject_writekey), features.redact_writekey)
            .handler(stage!(tapi::inject_metadata))
            .handler_if(
                stage!(cookies::extract_id_from_cookie),
                features.server_side_cookies,
            )
            .handler_if(
                stage!(cookies::extract_id_from_payload),
                features.server_side_cookies,
            )
            .handler_if(
                stage!(tapi::include_edge_traits_in_context),
                features.edge_context,
            )
            .handler(stage!(tapi::handle_tapi))
            .handler(stage!(cookies::enrich_response_with_id_cookies));

        if features.proxy_origin {
            router
                .register(Route::Root)
                .handler(stage!(origin::handle_origin_with_early_exit))
                .handler_if(
                    stage!(cookies::extract_id_from_cookie),
                    features.server_side_cookies || features.edge_variations,
                )
                .handler_if(
                    stage!(personas::extract_profile_from_edge),
                    features.edge_variations,
                )
                .handler_if(
                    stage!(personas::extract_profile_from_segment),
                    features.edge_variations && features.use_profiles_api,
                )
                .handler_if(stage!(personas::handle_variations), features.edge_variations)
                .handler(stage!(origin::handle_origin))
                .handler_if(
                    stage!(cookies::enrich_response_with_id_cookies),
                    features.server_side_cookies,
                )
                .handler_if(
                    stage!(snippet::enrich_with_ajs),
                    features.ajs_injection && !features.redact_writekey,
                )
                .handler_if(
                    stage!(snippet::enrich_with_ajs_no_write_key),
                    features.ajs_injection && features.redact_writekey,
                );
        } else {
            router.register(Route::Root).handler(stage!(origin::handle_with_404));
        }

        if features.engage_incoming_webhook {
            router
                .register(Route::Personas)
                .handler(stage!(personas::handle_personas_webhook));
        } else {
            router
                .register(Route::Personas)
                .handler(stage!(personas::engage_webhook_disabled));
        }

        router.register(Route::Reset).handler(stage!(cookies::reset_cookies));
        router
            .register(Route::SourceFunction)
            .handler(stage!(source_function::handle_source_function));
        router.register(Route::Bypass).handler(stage!(origin::handle_origin));

        EdgeProxy {
            router,
            settings,
            http,
            storage: self.storage,
        }
    }
}

/// A fully assembled proxy instance. Cheap to share behind an `Arc`;
/// `handle` takes `&self` and carries no per-request state.
pub struct EdgeProxy {
    router: Router,
    settings: Arc<EdgeSettings>,
    http: Arc<dyn HttpClient>,
    storage: Option<Arc<dyn ProfileStore>>,
}

impl EdgeProxy {
    pub fn builder(settings: EdgeSettings) -> EdgeProxyBuilder {
        EdgeProxyBuilder::new(settings)
    }

    /// Handle one inbound request end to end.
    pub async fn handle(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        let (_, response, context) = self.router.handle(request).await?;
        response.ok_or(Error::NoResponse(context.route))
    }

    /// Resolve the profile of the visitor behind `request`, if they carry
    /// an identity cookie. Returns `None` when the visitor is anonymous or
    /// no profile exists.
    pub async fn get_profile(&self, request: &PipelineRequest) -> Result<Option<JsonMap>> {
        let Some(user_id) = cookies::get_cookie(request, cookies::USER_ID_COOKIE) else {
            return Ok(None);
        };
        let Some(storage) = &self.storage else {
            return Ok(None);
        };

        let index = format!("user_id:{user_id}");
        if let Some(raw) = storage.get(&index).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        let (Some(space_id), Some(token)) = (
            &self.settings.personas_space_id,
            &self.settings.personas_token,
        ) else {
            return Ok(None);
        };

        use base64::Engine as _;
        let url = format!(
            "{}/v1/spaces/{space_id}/collections/users/profiles/{index}/traits?limit=200",
            self.settings.profiles_api_endpoint
        );
        let mut api_request = crate::proxy::get_request(&url)?;
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{token}:"));
        if let Ok(value) = http::HeaderValue::from_str(&format!("Basic {credentials}")) {
            api_request
                .headers_mut()
                .insert(http::header::AUTHORIZATION, value);
        }

        let api_response = self.http.fetch(api_request).await?;
        if api_response.status() != http::StatusCode::OK {
            return Ok(None);
        }
        let payload: serde_json::Value = serde_json::from_slice(api_response.body())?;
        let traits = payload.get("traits").and_then(|v| v.as_object()).cloned();
        if let Some(traits) = &traits {
            storage
                .put(
                    &index,
                    serde_json::Value::Object(traits.clone()).to_string(),
                    Some(std::time::Duration::from_secs(120)),
                )
                .await?;
        }
        Ok(traits)
    }
}
