//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → routing::RouteTable (resolve path)
//!     → changes.rs | api.rs | static_files.rs | proxy.rs
//!     → Send to client
//! ```

pub mod api;
pub mod changes;
pub mod proxy;
pub mod request;
pub mod server;
pub mod static_files;

pub use proxy::ProxyForwarder;
pub use request::{request_id, with_request_id, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
