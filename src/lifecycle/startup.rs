//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the persisted project registry
//! - Initialize subsystems in dependency order
//! - Install the fixed routes and the dashboard self-reload watch
//! - Restore the previously active project
//!
//! # Design Decisions
//! - A broken store or watcher backend is fatal
//! - A persisted project that can no longer be served is not
//! - Listeners start last (traffic only when ready), in `main`

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::changes::ChangeBroadcaster;
use crate::config::ServerConfig;
use crate::project::{ProjectStore, ProjectSwitcher, StoreError};
use crate::routing::{dashboard_entry, dashboard_routes, RouteTable};
use crate::watch::{ChangeEvent, DirectoryWatcher, WatchError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Everything the server needs, wired together.
pub struct Services {
    pub config: ServerConfig,
    pub routes: Arc<RouteTable>,
    pub broadcaster: Arc<ChangeBroadcaster>,
    pub watcher: Arc<DirectoryWatcher>,
    pub switcher: Arc<ProjectSwitcher>,
    events: Option<mpsc::UnboundedReceiver<ChangeEvent>>,
}

impl Services {
    /// The watcher's event stream. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ChangeEvent>> {
        self.events.take()
    }
}

/// Build every subsystem from `config` and the projects in `store`.
pub async fn initialize(config: ServerConfig, store: Arc<dyn ProjectStore>) -> Result<Services, StartupError> {
    let registry = store.load()?;

    let (watcher, events) = DirectoryWatcher::new(Duration::from_millis(config.watch.debounce_ms))?;
    let watcher = Arc::new(watcher);

    let routes = Arc::new(RouteTable::new());
    routes.install_fixed_routes(dashboard_routes(&config.dashboard.resource_dir));

    if config.dashboard.dev_mode {
        if let Err(e) = watcher.add_pinned_watch(&config.dashboard.resource_dir, &[]) {
            tracing::warn!(
                dir = %config.dashboard.resource_dir.display(),
                error = %e,
                "Dashboard resources will not live reload"
            );
        }
    }

    let switcher = Arc::new(ProjectSwitcher::new(
        registry,
        Arc::clone(&routes),
        Arc::clone(&watcher),
        store,
        dashboard_entry(),
    ));

    match switcher.restore().await {
        Ok(Some(project)) => tracing::info!(path = %project.path.display(), "Restored active project"),
        Ok(None) => tracing::info!("No active project"),
        Err(e) => tracing::warn!(error = %e, "Could not restore active project"),
    }

    Ok(Services {
        config,
        routes,
        broadcaster: Arc::new(ChangeBroadcaster::new()),
        watcher,
        switcher,
        events: Some(events),
    })
}
