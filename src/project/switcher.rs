//! Project activation.
//!
//! # Responsibilities
//! - Validate an activation request before touching any state
//! - Keep the registry, the route tail and the watcher in agreement
//! - Persist the registry after every change
//!
//! # Design Decisions
//! - Activations (and removals, mute list edits) are serialized by an async
//!   mutex; request routing never waits on it
//! - The registry lock is held only for in-memory edits, never across
//!   `.await` or disk I/O
//! - Watch failures are logged, a project without a watcher still serves
//! - A failed save is reported after the in-memory switch has happened

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::project::model::{normalize_root, Project, ProjectDescriptor};
use crate::project::registry::ProjectRegistry;
use crate::project::store::{ProjectStore, StoreError};
use crate::routing::{InvalidUpstream, PathPattern, Route, RouteTable, RouteTarget, Upstream};
use crate::watch::{DirectoryWatcher, ExcludeSet, WatchError};

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("project directory {} does not exist", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("no project registered at {}", .0.display())]
    UnknownProject(PathBuf),

    #[error(transparent)]
    InvalidTargetHost(#[from] InvalidUpstream),

    #[error("invalid mute list: {0}")]
    InvalidMutePattern(#[source] WatchError),

    #[error("failed to persist projects: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitcherState {
    Idle,
    Activating,
}

/// Owns the registry and applies every change to routes, watches and store.
pub struct ProjectSwitcher {
    registry: Mutex<ProjectRegistry>,
    routes: Arc<RouteTable>,
    watcher: Arc<DirectoryWatcher>,
    store: Arc<dyn ProjectStore>,
    dashboard_entry: String,
    activation: tokio::sync::Mutex<()>,
    activating: AtomicBool,
}

impl std::fmt::Debug for ProjectSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSwitcher")
            .field("registry", &*self.lock_registry())
            .field("state", &self.state())
            .finish()
    }
}

/// Marks the switcher busy for as long as it lives.
struct Busy<'a>(&'a AtomicBool);

impl<'a> Busy<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ProjectSwitcher {
    pub fn new(
        registry: ProjectRegistry,
        routes: Arc<RouteTable>,
        watcher: Arc<DirectoryWatcher>,
        store: Arc<dyn ProjectStore>,
        dashboard_entry: impl Into<String>,
    ) -> Self {
        Self {
            registry: Mutex::new(registry),
            routes,
            watcher,
            store,
            dashboard_entry: dashboard_entry.into(),
            activation: tokio::sync::Mutex::new(()),
            activating: AtomicBool::new(false),
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, ProjectRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SwitcherState {
        if self.activating.load(Ordering::SeqCst) {
            SwitcherState::Activating
        } else {
            SwitcherState::Idle
        }
    }

    pub fn projects(&self) -> Vec<Project> {
        self.lock_registry().projects().to_vec()
    }

    pub fn active_project(&self) -> Option<Project> {
        self.lock_registry().active_project().cloned()
    }

    /// Make the project described by `descriptor` the one being served.
    ///
    /// A path inside an already registered root activates that project.
    /// Unknown roots are registered first.
    pub async fn activate(&self, descriptor: ProjectDescriptor) -> Result<Project, ActivationError> {
        let _serial = self.activation.lock().await;
        let _busy = Busy::enter(&self.activating);

        let root = normalize_root(&descriptor.path);
        if !root.is_dir() {
            warn!(path = %root.display(), "Activation of missing directory rejected");
            return Err(ActivationError::ProjectNotFound(root));
        }

        let (previous, mut project) = {
            let registry = self.lock_registry();
            let previous = registry.active_project().map(|p| p.path.clone());
            let project = match registry.find(&root) {
                Some(existing) => {
                    let mut project = existing.clone();
                    descriptor.apply_to(&mut project);
                    project
                }
                None => match registry.find_by_ancestor_path(&root) {
                    Some(ancestor) => ancestor.clone(),
                    None => descriptor.into_project(root),
                },
            };
            (previous, project)
        };

        let excludes = ExcludeSet::new(&project.mute_list).map_err(ActivationError::InvalidMutePattern)?;
        let upstream = project
            .target_host
            .as_deref()
            .map(Upstream::parse)
            .transpose()?;

        project.active = true;
        let snapshot = {
            let mut registry = self.lock_registry();
            match registry.find_mut(&project.path) {
                Some(existing) => *existing = project.clone(),
                None => {
                    registry.add(project.clone());
                }
            }
            registry.activate(&project.path);
            registry.clone()
        };

        self.routes
            .replace_dynamic_tail(self.build_tail(&project.path, upstream.as_ref()));
        self.rearm_watch(previous.as_deref(), &project.path, excludes);

        info!(
            path = %project.path.display(),
            upstream = project.target_host.as_deref().unwrap_or("-"),
            muted = project.mute_list.len(),
            "Project activated"
        );

        self.store.save(&snapshot)?;
        Ok(project)
    }

    /// Unregister the project rooted at `path`. An active project stops being served.
    pub async fn remove(&self, path: &Path) -> Result<Project, ActivationError> {
        let _serial = self.activation.lock().await;

        let root = normalize_root(path);
        let (removed, snapshot) = {
            let mut registry = self.lock_registry();
            let removed = registry
                .remove(&root)
                .ok_or_else(|| ActivationError::UnknownProject(root.clone()))?;
            (removed, registry.clone())
        };

        if removed.active {
            self.routes.replace_dynamic_tail(Vec::new());
            self.watcher.remove_watch(&removed.path);
        }
        info!(path = %removed.path.display(), was_active = removed.active, "Project removed");

        self.store.save(&snapshot)?;
        Ok(removed)
    }

    /// Replace the mute list of a registered project.
    pub async fn set_mute_list(&self, path: &Path, patterns: Vec<String>) -> Result<Project, ActivationError> {
        let _serial = self.activation.lock().await;

        let excludes = ExcludeSet::new(&patterns).map_err(ActivationError::InvalidMutePattern)?;
        let root = normalize_root(path);
        let (project, snapshot) = {
            let mut registry = self.lock_registry();
            let project = registry
                .find_mut(&root)
                .ok_or_else(|| ActivationError::UnknownProject(root.clone()))?;
            project.mute_list = patterns;
            let project = project.clone();
            (project, registry.clone())
        };

        if project.active {
            self.rearm_watch(None, &project.path, excludes);
        }
        info!(path = %project.path.display(), muted = project.mute_list.len(), "Mute list updated");

        self.store.save(&snapshot)?;
        Ok(project)
    }

    /// Re-activate the project that was active when the registry was saved.
    ///
    /// A persisted project whose directory is gone is left inactive, and
    /// that is saved so the store stops reporting it as active.
    pub async fn restore(&self) -> Result<Option<Project>, ActivationError> {
        let Some(active) = self.active_project() else {
            return Ok(None);
        };

        if !active.path.is_dir() {
            warn!(path = %active.path.display(), "Previously active project is missing, nothing served");
            let snapshot = {
                let mut registry = self.lock_registry();
                registry.deactivate_all();
                registry.clone()
            };
            if let Err(e) = self.store.save(&snapshot) {
                warn!(error = %e, "Failed to persist deactivated registry");
            }
            return Ok(None);
        }

        self.activate(ProjectDescriptor::from(&active)).await.map(Some)
    }

    fn build_tail(&self, root: &Path, upstream: Option<&Upstream>) -> Vec<Route> {
        match upstream {
            Some(upstream) => vec![Route::new(PathPattern::Any, RouteTarget::Proxy(upstream.clone()))],
            None => vec![
                Route::new(
                    PathPattern::exact("/"),
                    RouteTarget::Redirect {
                        location: self.dashboard_entry.clone(),
                    },
                ),
                Route::new(
                    PathPattern::Any,
                    RouteTarget::Static {
                        root: root.to_path_buf(),
                    },
                ),
            ],
        }
    }

    fn rearm_watch(&self, previous: Option<&Path>, root: &Path, excludes: ExcludeSet) {
        if let Some(previous) = previous.filter(|p| *p != root) {
            self.watcher.remove_watch(previous);
        }
        if let Err(e) = self.watcher.add_watch_with(root, excludes) {
            warn!(root = %root.display(), error = %e, "Project served without live reload");
        }
    }
}
