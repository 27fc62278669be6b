//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum Router with the dispatch handler
//! - Wire up middleware (request ID, tracing)
//! - Resolve each request against the route table and hand it to the target
//! - Run the change dispatcher alongside the listener
//! - Graceful shutdown: release long-polls, then drain connections
//!
//! # Design Decisions
//! - A single catch-all handler; the route table, not Axum, decides where a
//!   request goes, so project switches never rebuild the Router
//! - Only the API carries a request timeout; change waits have their own

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::changes::{spawn_dispatcher, ChangeBroadcaster};
use crate::http::api::{api_router, ApiState};
use crate::http::changes::wait_for_change;
use crate::http::proxy::ProxyForwarder;
use crate::http::request::{request_id, with_request_id};
use crate::http::static_files::{serve_mounted, serve_project};
use crate::lifecycle::startup::Services;
use crate::routing::{RouteTable, RouteTarget};
use crate::watch::ChangeEvent;

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub broadcaster: Arc<ChangeBroadcaster>,
    pub api: Router,
    pub proxy: ProxyForwarder,
    pub wait_timeout: Duration,
}

/// HTTP server for the development server.
pub struct HttpServer {
    router: Router,
    broadcaster: Arc<ChangeBroadcaster>,
    events: Option<mpsc::UnboundedReceiver<ChangeEvent>>,
}

impl HttpServer {
    pub fn new(mut services: Services) -> Self {
        let config = &services.config;
        let api = api_router(
            ApiState {
                switcher: Arc::clone(&services.switcher),
                broadcaster: Arc::clone(&services.broadcaster),
            },
            Duration::from_secs(config.api.request_timeout_secs),
        );

        let state = AppState {
            routes: Arc::clone(&services.routes),
            broadcaster: Arc::clone(&services.broadcaster),
            api,
            proxy: ProxyForwarder::new(Duration::from_secs(config.proxy.connect_timeout_secs)),
            wait_timeout: Duration::from_secs(config.changes.wait_timeout_secs),
        };

        Self {
            router: Self::build_router(state),
            broadcaster: Arc::clone(&services.broadcaster),
            events: services.take_events(),
        }
    }

    fn build_router(state: AppState) -> Router {
        let router = Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(state)
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request.headers()),
                )
            }));
        with_request_id(router)
    }

    /// The fully layered router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(mut self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let dispatcher = self
            .events
            .take()
            .map(|events| spawn_dispatcher(events, Arc::clone(&self.broadcaster), shutdown.resubscribe()));

        let broadcaster = Arc::clone(&self.broadcaster);
        let mut shutdown = shutdown;
        let drain = async move {
            let _ = shutdown.recv().await;
            let released = broadcaster.close();
            tracing::info!(released, "Releasing pending change waits");
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(drain)
            .await?;

        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                tracing::warn!(error = %e, "Change dispatcher ended abnormally");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve the request path and hand the request to the matched target.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(route) = state.routes.resolve(request.uri().path()) else {
        tracing::debug!(path = %request.uri().path(), "No route matched");
        return (StatusCode::NOT_FOUND, "No active project").into_response();
    };

    match route.target {
        RouteTarget::ChangeWait if !matches!(*request.method(), Method::GET | Method::HEAD) => {
            let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            response
        }
        RouteTarget::ChangeWait => wait_for_change(&state.broadcaster, state.wait_timeout, request.uri()).await,
        RouteTarget::Api => match state.api.oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        },
        RouteTarget::Redirect { location } => Redirect::temporary(&location).into_response(),
        RouteTarget::Dashboard { root, mount } => serve_mounted(&root, &mount, request).await,
        RouteTarget::Static { root } => serve_project(&root, request).await,
        RouteTarget::Proxy(upstream) => state.proxy.forward(&upstream, request).await,
    }
}
