//! Project management API, mounted under `/_/api`.
//!
//! # Endpoints
//! - `GET  /_/api/status`
//! - `GET  /_/api/projects`
//! - `POST /_/api/projects/activate` `{path, targetHost?, muteList?}`
//! - `POST /_/api/projects/remove` `{path}`
//! - `POST /_/api/projects/mute` `{path, muteList}`
//!
//! Errors are JSON `{"error": "..."}` with 404 for unknown or missing
//! projects, 400 for invalid descriptors and 500 when saving fails.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::timeout::TimeoutLayer;

use crate::changes::ChangeBroadcaster;
use crate::project::{ActivationError, Project, ProjectDescriptor, ProjectSwitcher, SwitcherState};

#[derive(Clone)]
pub struct ApiState {
    pub switcher: Arc<ProjectSwitcher>,
    pub broadcaster: Arc<ChangeBroadcaster>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub version: String,
    pub state: SwitcherState,
    pub active_project: Option<Project>,
    pub generation: u64,
    pub waiters: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectsBody {
    pub projects: Vec<Project>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PathBody {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteBody {
    pub path: PathBuf,
    pub mute_list: Vec<String>,
}

/// Build the API router. Every request is bounded by `request_timeout`.
pub fn api_router(state: ApiState, request_timeout: Duration) -> Router {
    let routes = Router::new()
        .route("/status", get(status))
        .route("/projects", get(list_projects))
        .route("/projects/activate", post(activate))
        .route("/projects/remove", post(remove))
        .route("/projects/mute", post(mute));

    Router::new()
        .nest("/_/api", routes)
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
}

async fn status(State(state): State<ApiState>) -> Json<StatusBody> {
    Json(StatusBody {
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: state.switcher.state(),
        active_project: state.switcher.active_project(),
        generation: state.broadcaster.generation(),
        waiters: state.broadcaster.waiter_count(),
    })
}

async fn list_projects(State(state): State<ApiState>) -> Json<ProjectsBody> {
    Json(ProjectsBody {
        projects: state.switcher.projects(),
    })
}

async fn activate(
    State(state): State<ApiState>,
    Json(descriptor): Json<ProjectDescriptor>,
) -> Result<Json<Project>, ActivationError> {
    state.switcher.activate(descriptor).await.map(Json)
}

async fn remove(
    State(state): State<ApiState>,
    Json(body): Json<PathBody>,
) -> Result<Json<Project>, ActivationError> {
    state.switcher.remove(&body.path).await.map(Json)
}

async fn mute(
    State(state): State<ApiState>,
    Json(body): Json<MuteBody>,
) -> Result<Json<Project>, ActivationError> {
    state
        .switcher
        .set_mute_list(&body.path, body.mute_list)
        .await
        .map(Json)
}

impl IntoResponse for ActivationError {
    fn into_response(self) -> Response {
        let status = match &self {
            ActivationError::ProjectNotFound(_) | ActivationError::UnknownProject(_) => StatusCode::NOT_FOUND,
            ActivationError::InvalidTargetHost(_) | ActivationError::InvalidMutePattern(_) => StatusCode::BAD_REQUEST,
            ActivationError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Project API request failed");
        } else {
            tracing::debug!(error = %self, "Project API request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
