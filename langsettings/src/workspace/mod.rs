// SPDX-License-Identifier: GPL-3.0-or-later

//! The workspace model the providers attach settings to.
//!
//! A workspace is a set of named projects, each rooted at a filesystem
//! location. Files and folders inside a project are addressed by a
//! workspace path (`/Project/folder/file.cpp`). The engine only talks to
//! the workspace through the [`ResourceLookup`] trait; [`FsWorkspace`]
//! is the implementation backed by the local filesystem.

mod filesystem;
mod members;

pub use filesystem::{FsWorkspace, canonicalize_lenient, normalize_lexically};
pub use members::MemberIndex;

use std::fmt;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    File,
    Folder,
    Project,
}

/// A handle to a workspace resource. The resource itself may not exist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resource {
    pub kind: ResourceKind,
    pub project: String,
    /// Path relative to the project root, empty for the project itself.
    pub relative: PathBuf,
    /// Absolute filesystem location.
    pub location: PathBuf,
}

impl Resource {
    pub fn project(name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Resource {
            kind: ResourceKind::Project,
            project: name.into(),
            relative: PathBuf::new(),
            location: location.into(),
        }
    }

    /// Creates a handle for a member of this container.
    pub fn member(&self, relative: &Path, kind: ResourceKind) -> Resource {
        Resource {
            kind,
            project: self.project.clone(),
            relative: self.relative.join(relative),
            location: self.location.join(relative),
        }
    }

    /// The workspace path of the resource: `/Project/relative`.
    pub fn full_path(&self) -> PathBuf {
        let root = Path::new("/").join(&self.project);
        if self.relative.as_os_str().is_empty() { root } else { root.join(&self.relative) }
    }

    pub fn is_container(&self) -> bool {
        self.kind != ResourceKind::File
    }

    /// The containing folder or project. Projects have no parent.
    pub fn parent(&self) -> Option<Resource> {
        if self.kind == ResourceKind::Project {
            return None;
        }
        let relative = self.relative.parent()?.to_path_buf();
        let location = self.location.parent()?.to_path_buf();
        let kind =
            if relative.as_os_str().is_empty() { ResourceKind::Project } else { ResourceKind::Folder };
        Some(Resource { kind, project: self.project.clone(), relative, location })
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_path().display())
    }
}

/// Queries the resource model of the workspace.
pub trait ResourceLookup: Send + Sync {
    /// All projects of the workspace, in a stable order.
    fn projects(&self) -> Vec<Resource>;

    fn project(&self, name: &str) -> Option<Resource> {
        self.projects().into_iter().find(|project| project.project == name)
    }

    /// Projects the given project declares as references.
    fn referenced_projects(&self, project: &Resource) -> Vec<Resource>;

    /// Finds an existing member of a container by relative path.
    fn find_member(&self, container: &Resource, relative: &Path) -> Option<Resource>;

    /// Every existing file and folder below the project.
    fn members(&self, project: &Resource) -> Vec<Resource>;

    /// Handles for the location in every project containing it, existing or not.
    fn resources_for_location(&self, location: &Path, container: bool) -> Vec<Resource>;

    /// The languages associated with a file name, by extension.
    fn languages(&self, file_name: &str) -> Vec<String>;

    /// Maps a remote path to its local counterpart, if a mapping applies.
    fn mapped_path(&self, path: &Path) -> Option<PathBuf>;

    fn exists(&self, resource: &Resource) -> bool {
        match resource.kind {
            ResourceKind::File => resource.location.is_file(),
            _ => resource.location.is_dir(),
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Canonical form of a path that may not exist entirely.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        canonicalize_lenient(path)
    }

    /// Existing members of the project whose relative path ends with `suffix`.
    fn find_by_suffix(&self, project: &Resource, suffix: &Path, container: bool) -> Vec<Resource> {
        if !is_searchable(suffix) {
            return vec![];
        }
        self.members(project).into_iter().filter(|member| matches_suffix(member, suffix, container)).collect()
    }
}

fn is_searchable(suffix: &Path) -> bool {
    !suffix.as_os_str().is_empty() && is_plain_relative(suffix)
}

fn matches_suffix(member: &Resource, suffix: &Path, container: bool) -> bool {
    member.is_container() == container && member.relative.ends_with(suffix)
}

/// A relative path made of normal components only, no `.` or `..`.
pub fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|component| matches!(component, Component::Normal(_)))
}
