//! Project management subsystem.
//!
//! # Data Flow
//! ```text
//! Activation request (API, CLI, restore at startup)
//!     → switcher.rs (validate, serialize)
//!     → registry.rs (single active project)
//!     → routing::RouteTable (tail swap) + watch::DirectoryWatcher (re-arm)
//!     → store.rs (persist)
//! ```

pub mod model;
pub mod registry;
pub mod store;
pub mod switcher;

pub use model::{normalize_root, Project, ProjectDescriptor};
pub use registry::ProjectRegistry;
pub use store::{JsonFileStore, MemoryStore, ProjectStore, StoreError};
pub use switcher::{ActivationError, ProjectSwitcher, SwitcherState};
