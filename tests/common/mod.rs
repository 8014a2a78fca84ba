//! Shared utilities for integration testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Request, Response, StatusCode};

use edge_proxy::http::HttpClient;
use edge_proxy::{EdgeSettings, Error, Result};

/// One outbound request as the proxy issued it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub url: String,
    pub path: String,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

type Responder = dyn Fn(&RecordedRequest) -> Result<Response<Bytes>> + Send + Sync;

/// Programmable outbound client: records every request and answers from a
/// scripted responder, so tests never touch the network.
pub struct MockClient {
    responder: Box<Responder>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl MockClient {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RecordedRequest) -> Result<Response<Bytes>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            recorded: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let recorded = RecordedRequest {
            method: request.method().clone(),
            url: request.uri().to_string(),
            path: request.uri().path().to_string(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        };
        let response = (self.responder)(&recorded);
        self.recorded.lock().unwrap().push(recorded);
        response
    }
}

/// An outbound client that fails every fetch, for degradation tests.
#[allow(dead_code)]
pub struct FailingClient;

#[async_trait]
impl HttpClient for FailingClient {
    async fn fetch(&self, _request: Request<Bytes>) -> Result<Response<Bytes>> {
        Err(Error::Upstream("connection refused".into()))
    }
}

pub const WRITE_KEY: &str = "THIS_IS_A_WRITE_KEY";

pub fn settings() -> EdgeSettings {
    EdgeSettings {
        write_key: WRITE_KEY.to_string(),
        ..EdgeSettings::default()
    }
}

pub fn response(status: StatusCode, content_type: &str, body: &str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type.parse().unwrap());
    response
}

/// A responder that mimics the upstream world: an HTML origin, the CDN
/// serving the analytics loader and settings, and the tracking endpoint.
pub fn upstream_world(recorded: &RecordedRequest) -> Result<Response<Bytes>> {
    let response = if recorded.url.contains("/analytics.js/v1/") {
        response(
            StatusCode::OK,
            "application/javascript",
            &format!(
                "!function(){{window.analytics={{}}}}();\nvar k=\"{WRITE_KEY}\";\n//# sourceMappingURL=analytics.min.js.map\n"
            ),
        )
    } else if recorded.url.contains("/settings") {
        response(
            StatusCode::OK,
            "application/json",
            &format!(
                "{{\"integrations\":{{\"Segment.io\":{{\"apiKey\":\"{WRITE_KEY}\",\"apiHost\":\"api.segment.io/v1\"}}}},\"metrics\":{{\"host\":\"api.segment.io/v1\"}}}}"
            ),
        )
    } else if recorded.url.contains("api.segment.io") {
        response(StatusCode::OK, "application/json", "{\"success\":true}")
    } else {
        response(
            StatusCode::OK,
            "text/html; charset=utf-8",
            "<html><head><title>page</title></head><body>welcome</body></html>",
        )
    };
    Ok(response)
}

/// Build an inbound GET for the proxy with the visitor's Host header set.
pub fn get(path: &str) -> Request<Bytes> {
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = path.parse().unwrap();
    request
        .headers_mut()
        .insert(header::HOST, "customer.example.com".parse().unwrap());
    request
}

/// Build an inbound POST with a body.
pub fn post(path: &str, body: &str) -> Request<Bytes> {
    let mut request = Request::new(Bytes::from(body.to_string()));
    *request.method_mut() = http::Method::POST;
    *request.uri_mut() = path.parse().unwrap();
    request
        .headers_mut()
        .insert(header::HOST, "customer.example.com".parse().unwrap());
    request
}
