//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the fixed prefix (dashboard, API, change endpoint)
//! - Store the dynamic tail serving the active project
//! - Look up the first matching route for a request path
//!
//! # Design Decisions
//! - Each generation of routes is an immutable snapshot
//! - The tail is replaced by swapping the whole snapshot, so a request sees
//!   either the old tail or the new one and never a mix
//! - Fixed routes are always consulted first and cannot be shadowed
//! - Explicit `None` rather than a silent default

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::routing::matcher::PathPattern;
use crate::routing::target::RouteTarget;

/// A single route entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: PathPattern,
    pub target: RouteTarget,
}

impl Route {
    pub fn new(pattern: PathPattern, target: RouteTarget) -> Self {
        Self { pattern, target }
    }
}

/// One immutable generation of the route table.
#[derive(Debug)]
pub struct RouteSnapshot {
    fixed: Arc<[Route]>,
    dynamic: Arc<[Route]>,
}

impl Default for RouteSnapshot {
    fn default() -> Self {
        Self {
            fixed: Arc::from(Vec::new()),
            dynamic: Arc::from(Vec::new()),
        }
    }
}

impl RouteSnapshot {
    /// First route matching `path`, fixed routes first.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.fixed
            .iter()
            .chain(self.dynamic.iter())
            .find(|route| route.pattern.matches(path))
    }

    pub fn fixed(&self) -> &[Route] {
        &self.fixed
    }

    pub fn dynamic(&self) -> &[Route] {
        &self.dynamic
    }
}

/// The server's mutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    current: ArcSwap<RouteSnapshot>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the routes that never change. Called once at startup.
    pub fn install_fixed_routes(&self, routes: Vec<Route>) {
        let routes: Arc<[Route]> = Arc::from(routes);
        self.current.rcu(|current| RouteSnapshot {
            fixed: Arc::clone(&routes),
            dynamic: Arc::clone(&current.dynamic),
        });
        tracing::debug!(routes = routes.len(), "Fixed routes installed");
    }

    /// Replace the active project's routes as a single unit.
    pub fn replace_dynamic_tail(&self, routes: Vec<Route>) {
        let routes: Arc<[Route]> = Arc::from(routes);
        self.current.rcu(|current| RouteSnapshot {
            fixed: Arc::clone(&current.fixed),
            dynamic: Arc::clone(&routes),
        });
        tracing::debug!(routes = routes.len(), "Dynamic routes replaced");
    }

    /// First route matching `path` in the current snapshot.
    pub fn resolve(&self, path: &str) -> Option<Route> {
        self.current.load().resolve(path).cloned()
    }

    /// The current snapshot, for callers that need a consistent view.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.current.load_full()
    }

    pub fn dynamic_tail(&self) -> Vec<Route> {
        self.current.load().dynamic().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn static_tail(root: &str) -> Vec<Route> {
        vec![
            Route::new(
                PathPattern::exact("/"),
                RouteTarget::Redirect {
                    location: "/_/index.html".into(),
                },
            ),
            Route::new(
                PathPattern::Any,
                RouteTarget::Static {
                    root: PathBuf::from(root),
                },
            ),
        ]
    }

    #[test]
    fn fixed_routes_win_over_catch_all() {
        let table = RouteTable::new();
        table.install_fixed_routes(vec![
            Route::new(PathPattern::exact("/_/api/changes"), RouteTarget::ChangeWait),
            Route::new(PathPattern::prefix("/_/api/"), RouteTarget::Api),
        ]);
        table.replace_dynamic_tail(static_tail("/a"));

        assert_eq!(table.resolve("/_/api/changes").unwrap().target, RouteTarget::ChangeWait);
        assert_eq!(table.resolve("/_/api/projects").unwrap().target, RouteTarget::Api);
        assert!(matches!(
            table.resolve("/").unwrap().target,
            RouteTarget::Redirect { .. }
        ));
        assert_eq!(
            table.resolve("/index.html").unwrap().target,
            RouteTarget::Static { root: PathBuf::from("/a") }
        );
    }

    #[test]
    fn empty_tail_resolves_nothing() {
        let table = RouteTable::new();
        table.install_fixed_routes(vec![Route::new(PathPattern::prefix("/_/api/"), RouteTarget::Api)]);
        assert!(table.resolve("/index.html").is_none());

        table.replace_dynamic_tail(static_tail("/a"));
        table.replace_dynamic_tail(Vec::new());
        assert!(table.resolve("/index.html").is_none());
        assert_eq!(table.snapshot().fixed().len(), 1);
    }

    #[test]
    fn concurrent_readers_never_see_a_mixed_tail() {
        let table = Arc::new(RouteTable::new());
        table.replace_dynamic_tail(static_tail("/a"));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let snapshot = table.snapshot();
                        let tail = snapshot.dynamic();
                        assert!(tail == static_tail("/a").as_slice() || tail == static_tail("/b").as_slice());

                        let target = table.resolve("/app.js").unwrap().target;
                        assert!(
                            target == RouteTarget::Static { root: PathBuf::from("/a") }
                                || target == RouteTarget::Static { root: PathBuf::from("/b") }
                        );
                    }
                })
            })
            .collect();

        for i in 0..2_000 {
            let root = if i % 2 == 0 { "/b" } else { "/a" };
            table.replace_dynamic_tail(static_tail(root));
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
