//! Filesystem watch subsystem.
//!
//! # Data Flow
//! ```text
//! notify callback (watcher thread)
//!     → unbounded channel
//!     → watcher.rs event loop (owning root lookup, mute list, debounce)
//!     → ChangeEvent stream
//!     → changes::dispatcher (one notify() per event)
//! ```
//!
//! # Design Decisions
//! - One OS watcher for all roots; roots are added and removed individually
//! - Mute lists are globs relative to the watched root
//! - A vanished root is dropped, never fatal

pub mod patterns;
pub mod watcher;

use std::path::PathBuf;

use thiserror::Error;

pub use patterns::ExcludeSet;
pub use watcher::{ChangeEvent, DirectoryWatcher};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher failed: {0}")]
    Notify(#[from] notify::Error),

    #[error("invalid mute pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("watch root {} is unavailable", .0.display())]
    RootUnavailable(PathBuf),
}
