//! Local development server with live reload.
//!
//! Serves one active project at a time, either from disk or by proxying to
//! the project's own dev server, and wakes long-polling browsers whenever a
//! watched file changes.

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;

// Projects and live reload
pub mod changes;
pub mod project;
pub mod watch;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::{initialize, Services, Shutdown};
pub use project::{Project, ProjectDescriptor, ProjectSwitcher};
