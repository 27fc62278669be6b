//! Project list persistence.
//!
//! The registry is loaded once at startup and saved after every change made
//! through the switcher. The on-disk shape is a JSON document:
//!
//! ```json
//! { "projects": [ { "path": "/srv/site", "muteList": [], "active": true } ] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::model::Project;
use crate::project::registry::ProjectRegistry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project store {path} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project store {path} is malformed: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load/save seam for the project registry.
pub trait ProjectStore: Send + Sync {
    fn load(&self) -> Result<ProjectRegistry, StoreError>;

    fn save(&self, registry: &ProjectRegistry) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    projects: Vec<Project>,
}

/// JSON file backed store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProjectStore for JsonFileStore {
    fn load(&self) -> Result<ProjectRegistry, StoreError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No project store yet, starting empty");
            return Ok(ProjectRegistry::new());
        }

        let content = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        let file: StoreFile = serde_json::from_slice(&content).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let registry = ProjectRegistry::from_projects(file.projects);
        tracing::info!(
            path = %self.path.display(),
            projects = registry.len(),
            "Loaded project store"
        );
        Ok(registry)
    }

    fn save(&self, registry: &ProjectRegistry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let file = StoreFile {
            projects: registry.projects().to_vec(),
        };
        let content = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        // Write beside the target and rename so readers never see a torn file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content).map_err(|e| self.io_error(e))?;
        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), projects = registry.len(), "Saved project store");
        Ok(())
    }
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<ProjectRegistry>,
    saves: std::sync::atomic::AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new(initial: ProjectRegistry) -> Self {
        Self {
            saved: Mutex::new(initial),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Last successfully saved registry.
    pub fn snapshot(&self) -> ProjectRegistry {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ProjectStore for MemoryStore {
    fn load(&self) -> Result<ProjectRegistry, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, registry: &ProjectRegistry) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "store unavailable"),
            });
        }
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = registry.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
