//! Proxy mode: forward requests to the active project's dev server.
//!
//! # Responsibilities
//! - Rewrite the request URI and `Host` for the upstream
//! - Strip hop-by-hop headers in both directions
//! - Stream request and response bodies without buffering
//! - Map upstream failures to 502 Bad Gateway
//!
//! # Design Decisions
//! - No retries: a dev server that is down should be visible immediately
//! - Upstream requests always use HTTP/1.1

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::http::request::{request_id, X_REQUEST_ID};
use crate::routing::Upstream;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone)]
pub struct ProxyForwarder {
    client: Client<HttpConnector, Body>,
}

impl ProxyForwarder {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }

    /// Forward `request` to `upstream` and relay whatever comes back.
    pub async fn forward(&self, upstream: &Upstream, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();
        let request_id = request_id(&parts.headers).to_string();

        let uri = match upstream.uri_for(parts.uri.path_and_query()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Unforwardable request URI");
                return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        match HeaderValue::from_str(upstream.authority().as_str()) {
            Ok(host) => {
                parts.headers.insert(header::HOST, host);
            }
            Err(_) => {
                parts.headers.remove(header::HOST);
            }
        }
        if let Ok(id) = HeaderValue::from_str(&request_id) {
            parts.headers.insert(X_REQUEST_ID, id);
        }

        parts.uri = uri;
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let target = parts.uri.clone();

        tracing::debug!(request_id = %request_id, method = %method, uri = %target, "Forwarding request");

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                tracing::debug!(request_id = %request_id, status = %parts.status, "Upstream responded");
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    uri = %target,
                    error = %e,
                    "Upstream request failed"
                );
                (StatusCode::BAD_GATEWAY, format!("Upstream {upstream} unavailable")).into_response()
            }
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
