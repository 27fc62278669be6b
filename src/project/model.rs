//! Project data model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A registered content root.
///
/// A project with a `target_host` is served in proxy mode; otherwise its
/// files are served directly from `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Absolute directory root. Unique within a registry.
    pub path: PathBuf,

    /// Upstream dev server address (e.g. "localhost:4000").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,

    /// Glob patterns, relative to `path`, that never trigger a reload.
    #[serde(default)]
    pub mute_list: Vec<String>,

    #[serde(default)]
    pub active: bool,
}

impl Project {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target_host: None,
            mute_list: Vec::new(),
            active: false,
        }
    }

    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = normalize_host(&host.into());
        self
    }

    pub fn with_mute_list(mut self, patterns: Vec<String>) -> Self {
        self.mute_list = patterns;
        self
    }

    /// Whether requests for this project are forwarded upstream.
    pub fn is_proxy(&self) -> bool {
        self.target_host.is_some()
    }
}

/// Activation request as received from the API or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub path: PathBuf,

    /// `Some("")` switches an existing project back to static mode.
    #[serde(default)]
    pub target_host: Option<String>,

    #[serde(default)]
    pub mute_list: Option<Vec<String>>,
}

impl ProjectDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    pub fn with_mute_list(mut self, patterns: Vec<String>) -> Self {
        self.mute_list = Some(patterns);
        self
    }

    /// Override the settings of an already registered project.
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(host) = &self.target_host {
            project.target_host = normalize_host(host);
        }
        if let Some(patterns) = &self.mute_list {
            project.mute_list = patterns.clone();
        }
    }

    /// Build a fresh, inactive project rooted at `root`.
    pub fn into_project(self, root: PathBuf) -> Project {
        let mut project = Project::new(root);
        self.apply_to(&mut project);
        project
    }
}

impl From<&Project> for ProjectDescriptor {
    fn from(project: &Project) -> Self {
        Self {
            path: project.path.clone(),
            target_host: project.target_host.clone(),
            mute_list: Some(project.mute_list.clone()),
        }
    }
}

fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim();
    (!host.is_empty()).then(|| host.to_string())
}

/// Turn a user supplied directory into the key used by the registry.
///
/// Existing paths are canonicalized so the same directory reached through
/// different spellings maps to one project. Missing paths are made absolute
/// against the working directory.
pub fn normalize_root(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_fields() {
        let project = Project::new("/srv/site")
            .with_target_host("localhost:4000")
            .with_mute_list(vec!["node_modules".into()]);
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["targetHost"], "localhost:4000");
        assert_eq!(json["muteList"][0], "node_modules");
        assert_eq!(json["active"], false);
    }

    #[test]
    fn descriptor_overrides_only_given_fields() {
        let mut project = Project::new("/srv/site").with_mute_list(vec!["*.log".into()]);
        ProjectDescriptor::new("/srv/site")
            .with_target_host("localhost:3000")
            .apply_to(&mut project);
        assert_eq!(project.target_host.as_deref(), Some("localhost:3000"));
        assert_eq!(project.mute_list, vec!["*.log".to_string()]);

        ProjectDescriptor::new("/srv/site")
            .with_target_host("  ")
            .apply_to(&mut project);
        assert!(!project.is_proxy());
    }

    #[test]
    fn descriptor_parses_minimal_json() {
        let descriptor: ProjectDescriptor =
            serde_json::from_str(r#"{"path": "/srv/site"}"#).unwrap();
        assert_eq!(descriptor.path, PathBuf::from("/srv/site"));
        assert!(descriptor.target_host.is_none());
        assert!(descriptor.mute_list.is_none());
    }

    #[test]
    fn normalize_root_canonicalizes_existing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("site");
        std::fs::create_dir(&nested).unwrap();

        let dotted = dir.path().join("site").join("..").join("site");
        assert_eq!(normalize_root(&dotted), nested.canonicalize().unwrap());

        let missing = dir.path().join("missing");
        assert_eq!(normalize_root(&missing), missing);
    }
}
