//! Source function forwarding.

use http::StatusCode;

use crate::error::Result;
use crate::routing::context::{
    clone_request, PipelineRequest, PipelineResponse, RouterContext, Triple,
};

/// Forward the event batch to the configured source function, or report
/// the capability as unavailable.
pub async fn handle_source_function(
    request: PipelineRequest,
    _response: Option<PipelineResponse>,
    context: RouterContext,
) -> Result<Triple> {
    let Some(endpoint) = context.settings.source_function_endpoint.clone() else {
        let response =
            super::text_response(StatusCode::NOT_IMPLEMENTED, "Source function not configured");
        return Ok((request, Some(response), context));
    };

    let function = match context.params.get("function") {
        Some(f) => f.clone(),
        None => super::last_path_segment(&request).unwrap_or_default().to_string(),
    };
    let url = format!("{}/{function}", endpoint.trim_end_matches('/'));

    let mut upstream = clone_request(&request);
    *upstream.uri_mut() = url
        .parse()
        .map_err(|e| crate::error::Error::InvalidUrl(format!("{url}: {e}")))?;
    let response = context.http.fetch(upstream).await?;
    Ok((request, Some(response), context))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::config::EdgeSettings;
    use crate::http::client::testing::ScriptedClient;
    use crate::routing::matcher::Route;

    fn context_with(client: Arc<ScriptedClient>, endpoint: Option<&str>) -> RouterContext {
        RouterContext {
            settings: Arc::new(EdgeSettings {
                source_function_endpoint: endpoint.map(str::to_string),
                ..EdgeSettings::default()
            }),
            http: client,
            storage: None,
            variations: Arc::new(Vec::new()),
            traits_fn: None,
            host: "customer.example.com".to_string(),
            route: Route::SourceFunction,
            params: HashMap::from([("function".to_string(), "sf_abc".to_string())]),
            user_id: None,
            anonymous_id: None,
            traits: None,
            client_side_traits: None,
            early_exit: false,
            extensions: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn batches_forward_to_the_named_function() {
        let client = Arc::new(ScriptedClient::with_body(200, "ok"));
        let context = context_with(client.clone(), Some("https://fn.example.com/"));

        let mut request = http::Request::new(Bytes::from_static(b"{\"batch\":[]}"));
        *request.method_mut() = http::Method::POST;
        *request.uri_mut() = "/seg/sf/sf_abc".parse().unwrap();

        let (_, response, _) = handle_source_function(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::OK);

        let recorded = client.requests();
        assert_eq!(recorded[0].url, "https://fn.example.com/sf_abc");
        assert_eq!(recorded[0].body.as_ref(), b"{\"batch\":[]}");
    }

    #[tokio::test]
    async fn unconfigured_endpoint_is_501() {
        let context = context_with(Arc::new(ScriptedClient::not_found()), None);
        let request = http::Request::new(Bytes::new());

        let (_, response, _) = handle_source_function(request, None, context).await.unwrap();
        assert_eq!(response.unwrap().status(), StatusCode::NOT_IMPLEMENTED);
    }
}
