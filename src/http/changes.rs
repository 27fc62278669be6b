//! Long-poll change endpoint.
//!
//! `GET /_/api/changes?since=<generation>` answers `{"changed": bool, "generation": n}`.
//! The request is held open until a change newer than `since` exists, the
//! wait timeout elapses, or the server shuts down. A client that disconnects
//! drops the handler future, which unregisters its waiter.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::changes::ChangeBroadcaster;

#[derive(Debug, Default, Deserialize)]
struct ChangesQuery {
    since: Option<u64>,
}

pub async fn wait_for_change(broadcaster: &Arc<ChangeBroadcaster>, timeout: Duration, uri: &Uri) -> Response {
    let query = match Query::<ChangesQuery>::try_from_uri(uri) {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let outcome = broadcaster.wait(query.since, timeout).await;
    tracing::trace!(
        since = ?query.since,
        changed = outcome.changed,
        generation = outcome.generation,
        "Change wait answered"
    );

    let mut response = Json(outcome).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
