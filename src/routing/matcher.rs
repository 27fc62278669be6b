//! Route path matching.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching
//! - `Any` is the catch-all used by the active project's tail

/// Condition a request path must satisfy for a route to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// The whole path equals this value.
    Exact(String),
    /// The path starts with this value.
    Prefix(String),
    /// Every path.
    Any,
}

impl PathPattern {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Returns true if `path` satisfies this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => path == expected,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Any => true,
        }
    }
}
