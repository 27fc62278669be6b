//! Ordered collection of known projects.
//!
//! # Invariants
//! - No two projects share a root
//! - At most one project is active
//! - Insertion order is preserved (it is what the dashboard lists and what
//!   gets persisted)

use std::path::Path;

use crate::project::model::Project;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted data.
    ///
    /// Duplicate roots keep their first occurrence and only the first active
    /// project stays active, so hand-edited files cannot break the invariants.
    pub fn from_projects(projects: Vec<Project>) -> Self {
        let mut registry = Self::new();
        let mut seen_active = false;
        for mut project in projects {
            if project.active {
                if seen_active {
                    tracing::warn!(path = %project.path.display(), "Ignoring second active project");
                    project.active = false;
                }
                seen_active = true;
            }
            registry.add(project);
        }
        registry
    }

    /// Insert a project unless its root is already registered.
    ///
    /// Returns `false` when the project was a duplicate and nothing changed.
    pub fn add(&mut self, project: Project) -> bool {
        if self.find(&project.path).is_some() {
            tracing::debug!(path = %project.path.display(), "Duplicate project ignored");
            return false;
        }
        self.projects.push(project);
        true
    }

    /// Exact root lookup.
    pub fn find(&self, path: &Path) -> Option<&Project> {
        self.projects.iter().find(|p| p.path == path)
    }

    pub fn find_mut(&mut self, path: &Path) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.path == path)
    }

    /// Project whose root is the nearest ancestor of (or equal to) `path`.
    pub fn find_by_ancestor_path(&self, path: &Path) -> Option<&Project> {
        self.projects
            .iter()
            .filter(|p| path.starts_with(&p.path))
            .max_by_key(|p| p.path.components().count())
    }

    /// Make the project at `path` the only active one.
    ///
    /// Returns `false` if no project has that root; every project is left
    /// inactive in that case.
    pub fn activate(&mut self, path: &Path) -> bool {
        let mut found = false;
        for project in &mut self.projects {
            project.active = project.path == path;
            found |= project.active;
        }
        found
    }

    pub fn deactivate_all(&mut self) {
        for project in &mut self.projects {
            project.active = false;
        }
    }

    pub fn active_project(&self) -> Option<&Project> {
        self.projects.iter().find(|p| p.active)
    }

    pub fn remove(&mut self, path: &Path) -> Option<Project> {
        let index = self.projects.iter().position(|p| p.path == path)?;
        Some(self.projects.remove(index))
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn into_projects(self) -> Vec<Project> {
        self.projects
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
