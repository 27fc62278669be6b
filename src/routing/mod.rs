//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → table.rs (snapshot lookup, fixed routes first)
//!     → matcher.rs (evaluate path patterns)
//!     → Return: matched Route or None
//!
//! Project activation:
//!     Project
//!     → switcher builds the new tail (static or proxy)
//!     → table.rs swaps in a new snapshot
//! ```
//!
//! # Design Decisions
//! - Fixed routes installed at startup, never removed
//! - Only the dynamic tail changes, and only as a whole
//! - Deterministic: same input always matches same route
//! - First match wins

pub mod matcher;
pub mod table;
pub mod target;

use std::path::Path;

pub use matcher::PathPattern;
pub use table::{Route, RouteSnapshot, RouteTable};
pub use target::{InvalidUpstream, RouteTarget, Upstream};

/// Mount point of the dashboard and its API.
pub const DASHBOARD_MOUNT: &str = "/_";

/// Long-poll change endpoint.
pub const CHANGES_PATH: &str = "/_/api/changes";

/// Live-reload client served from the dashboard resources.
pub const RELOAD_SCRIPT: &str = "/_/reload.js";

/// Prefix shared by every API route.
pub const API_PREFIX: &str = "/_/api/";

/// Dashboard landing page, versioned so browsers drop stale copies.
pub fn dashboard_entry() -> String {
    format!("{DASHBOARD_MOUNT}/index.html?ver={}", env!("CARGO_PKG_VERSION"))
}

/// The fixed route prefix: change endpoint, API, dashboard redirect and
/// dashboard resources, in that order.
pub fn dashboard_routes(resource_dir: &Path) -> Vec<Route> {
    vec![
        Route::new(PathPattern::exact(CHANGES_PATH), RouteTarget::ChangeWait),
        Route::new(PathPattern::prefix(API_PREFIX), RouteTarget::Api),
        Route::new(
            PathPattern::exact(DASHBOARD_MOUNT),
            RouteTarget::Redirect {
                location: dashboard_entry(),
            },
        ),
        Route::new(
            PathPattern::exact(format!("{DASHBOARD_MOUNT}/")),
            RouteTarget::Redirect {
                location: dashboard_entry(),
            },
        ),
        Route::new(
            PathPattern::prefix(format!("{DASHBOARD_MOUNT}/")),
            RouteTarget::Dashboard {
                root: resource_dir.to_path_buf(),
                mount: DASHBOARD_MOUNT.to_string(),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_routes_resolve_in_order() {
        let table = RouteTable::new();
        table.install_fixed_routes(dashboard_routes(Path::new("/opt/dashboard")));

        assert_eq!(table.resolve("/_/api/changes").unwrap().target, RouteTarget::ChangeWait);
        assert_eq!(table.resolve("/_/api/status").unwrap().target, RouteTarget::Api);
        assert!(matches!(
            table.resolve("/_").unwrap().target,
            RouteTarget::Redirect { .. }
        ));
        assert!(matches!(
            table.resolve("/_/").unwrap().target,
            RouteTarget::Redirect { .. }
        ));
        assert!(matches!(
            table.resolve("/_/reload.js").unwrap().target,
            RouteTarget::Dashboard { .. }
        ));
        assert!(table.resolve("/index.html").is_none());
    }

    #[test]
    fn dashboard_entry_is_versioned() {
        assert!(dashboard_entry().starts_with("/_/index.html?ver="));
    }
}
