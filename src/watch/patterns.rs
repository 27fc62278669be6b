//! Mute list compilation and matching.

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::watch::WatchError;

/// Compiled exclusion globs for one watched root.
///
/// Patterns are matched against paths relative to the root. A path is
/// excluded when it, or any directory above it, matches:
///
/// ```text
/// node_modules      excludes node_modules/pkg/index.js
/// *.log             excludes logs/debug.log
/// build/**/*.map    excludes build/js/app.js.map
/// ```
#[derive(Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    set: Option<GlobSet>,
}

impl fmt::Debug for ExcludeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExcludeSet")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self, WatchError> {
        let normalized: Vec<String> = patterns
            .iter()
            .map(|p| normalize_pattern(p))
            .filter(|p| !p.is_empty())
            .collect();

        if normalized.is_empty() {
            return Ok(Self::default());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &normalized {
            let glob = Glob::new(pattern).map_err(|source| WatchError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| WatchError::InvalidPattern {
            pattern: normalized.join(", "),
            source,
        })?;

        Ok(Self {
            patterns: normalized,
            set: Some(set),
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a root-relative path falls under the mute list.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let Some(set) = &self.set else {
            return false;
        };
        relative
            .ancestors()
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .any(|ancestor| set.is_match(to_slash(ancestor)))
    }
}

fn normalize_pattern(pattern: &str) -> String {
    let pattern = pattern.trim().replace('\\', "/");
    let pattern = pattern.trim_start_matches("./").trim_start_matches('/');
    pattern.trim_end_matches('/').to_string()
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
