// SPDX-License-Identifier: GPL-3.0-or-later

//! Turns path arguments of a command line into workspace or filesystem
//! locations.
//!
//! Resolution happens in the context of one command line. The source file
//! the line compiles determines two anchors:
//!
//! - the *mapped root*: when an absolute source path appears inside a
//!   project under a different prefix, absolute option paths are
//!   re-rooted the same way;
//! - the *build directory*: the directory relative option paths are
//!   rooted at, derived from the source location minus the relative
//!   source name, or taken from the build's working directory.
//!
//! A resolved location that lies inside a project is reported as a
//! workspace path. Anything else is reported as a filesystem path, or
//! verbatim when nothing is known about it.

mod cwd;

pub use cwd::WorkingDirectoryTracker;

use crate::entry::{Flags, Kind};
use crate::workspace::{Resource, ResourceKind, ResourceLookup, normalize_lexically};
use std::path::{Component, Path, PathBuf};

/// The anchors of one command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinePaths {
    pub mapped_root: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
}

/// Where the build runs, outside of what the line itself tells.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildLocation<'a> {
    /// Top of the working directory tracker.
    pub tracker_top: Option<&'a Path>,
    /// The configured directory the builder is started in.
    pub builder_cwd: Option<&'a Path>,
}

pub struct PathResolver<'a> {
    lookup: &'a dyn ResourceLookup,
    project: Option<&'a Resource>,
}

impl<'a> PathResolver<'a> {
    pub fn new(lookup: &'a dyn ResourceLookup, project: Option<&'a Resource>) -> Self {
        Self { lookup, project }
    }

    /// Finds the workspace file a command line compiles.
    pub fn find_resource(&self, parsed_name: &str, location: BuildLocation<'_>) -> Option<Resource> {
        if parsed_name.is_empty() {
            return None;
        }
        let name = Path::new(parsed_name);

        if let Some(top) = location.tracker_top {
            if let Some(found) = self.file_for_location(&top.join(name)) {
                return Some(found);
            }
        }
        if name.is_absolute() {
            if let Some(found) = self.file_for_location(name) {
                return Some(found);
            }
        }
        if let Some(found) = self.unique_suffix_match(name) {
            return Some(found);
        }
        if let Some(cwd) = location.builder_cwd {
            if let Some(found) = self.file_for_location(&cwd.join(name)) {
                return Some(found);
            }
        }
        self.project
            .and_then(|project| self.lookup.find_member(project, name))
            .filter(|found| found.kind == ResourceKind::File)
    }

    /// Computes the anchors for a line compiling `resource`.
    pub fn line_paths(
        &self,
        resource: Option<&Resource>,
        parsed_name: &str,
        location: BuildLocation<'_>,
    ) -> LinePaths {
        let mapped_root = resource.map(|resource| mapped_root(&resource.location, Path::new(parsed_name)));
        let build_dir = self.build_dir(resource, parsed_name, mapped_root.as_deref(), location);
        LinePaths { mapped_root, build_dir }
    }

    fn build_dir(
        &self,
        resource: Option<&Resource>,
        parsed_name: &str,
        mapped_root: Option<&Path>,
        location: BuildLocation<'_>,
    ) -> Option<PathBuf> {
        let derived = resource
            .filter(|_| !parsed_name.is_empty() && !Path::new(parsed_name).is_absolute())
            .and_then(|resource| find_base_location(&resource.location, parsed_name))
            .map(|base| match mapped_root {
                Some(root) => root.join(strip_root(&base)),
                None => base,
            });

        derived
            .or_else(|| location.tracker_top.map(Path::to_path_buf))
            .or_else(|| location.builder_cwd.map(Path::to_path_buf))
            .or_else(|| self.project.map(|project| project.location.clone()))
            .or_else(|| {
                resource.map(|resource| match resource.kind {
                    ResourceKind::File => resource
                        .location
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| resource.location.clone()),
                    _ => resource.location.clone(),
                })
            })
    }

    /// Resolves one path argument.
    pub fn resolve(&self, kind: Kind, raw: &str, paths: &LinePaths) -> (String, Flags) {
        let token = Path::new(raw);
        // The build directory already carries the mapped root when derived from the source.
        let base = if token.is_absolute() {
            paths.mapped_root.clone()
        } else {
            paths.build_dir.clone().or_else(|| paths.mapped_root.clone())
        };
        let location = match &base {
            Some(base) => Some(self.lookup.canonicalize(&base.join(strip_root(token)))),
            None if token.is_absolute() => Some(self.lookup.canonicalize(token)),
            None => None,
        };

        if let Some(location) = &location {
            if let Some(resource) = self.resource_for_location(location, kind, token.is_absolute()) {
                return (workspace_name(&resource), Flags::WORKSPACE_PATH | Flags::RESOLVED);
            }
        }

        let mapped = location.as_ref().and_then(|location| self.lookup.mapped_path(location));
        let filesystem = match (&mapped, &location) {
            (Some(mapped), _) => Some(self.lookup.canonicalize(mapped)),
            (None, Some(location)) => Some(location.clone()),
            (None, None) => None,
        };
        if let Some(path) = filesystem.as_ref().filter(|path| self.lookup.path_exists(path)) {
            return (path.to_string_lossy().into_owned(), Flags::NONE);
        }

        if let Some(resource) = self.find_in_workspace(token, kind.is_container()) {
            return (workspace_name(&resource), Flags::WORKSPACE_PATH | Flags::RESOLVED);
        }

        match (token.is_absolute(), filesystem) {
            (true, Some(path)) if mapped.is_some() => (path.to_string_lossy().into_owned(), Flags::NONE),
            (false, Some(path)) => (path.to_string_lossy().into_owned(), Flags::NONE),
            _ => (raw.to_string(), Flags::NONE),
        }
    }

    /// Picks the workspace resource at a location, preferring the current project.
    ///
    /// Relative arguments may point to not-yet-existing members of a
    /// project; absolute ones must exist.
    fn resource_for_location(&self, location: &Path, kind: Kind, absolute: bool) -> Option<Resource> {
        let candidates: Vec<Resource> = self
            .lookup
            .resources_for_location(location, kind.is_container())
            .into_iter()
            .filter(|resource| resource.is_container() == kind.is_container())
            .filter(|resource| !absolute || self.lookup.exists(resource))
            .collect();
        self.prefer_current_project(candidates)
    }

    fn file_for_location(&self, location: &Path) -> Option<Resource> {
        let location = self.lookup.canonicalize(location);
        let candidates: Vec<Resource> = self
            .lookup
            .resources_for_location(&location, false)
            .into_iter()
            .filter(|resource| resource.kind == ResourceKind::File && self.lookup.exists(resource))
            .collect();
        self.prefer_current_project(candidates)
    }

    fn prefer_current_project(&self, candidates: Vec<Resource>) -> Option<Resource> {
        let preferred = self.project.and_then(|project| {
            candidates.iter().find(|candidate| candidate.project == project.project).cloned()
        });
        preferred.or_else(|| candidates.into_iter().next())
    }

    /// A source name found by its trailing path segments in the current project.
    fn unique_suffix_match(&self, name: &Path) -> Option<Resource> {
        let project = self.project?;
        let suffix = searchable_suffix(name)?;
        let mut found = self.lookup.find_by_suffix(project, &suffix, false);
        if found.len() == 1 { found.pop() } else { None }
    }

    /// Looks up a path by its trailing segments in every project.
    ///
    /// The current project wins, then referenced projects, then the rest.
    /// More than one match in a group is ambiguous and ends the search.
    fn find_in_workspace(&self, token: &Path, container: bool) -> Option<Resource> {
        let suffix = searchable_suffix(token)?;

        let mut referenced: Vec<Resource> = vec![];
        if let Some(project) = self.project {
            let mut found = self.lookup.find_by_suffix(project, &suffix, container);
            match found.len() {
                1 => return found.pop(),
                0 => {}
                _ => return None,
            }
            referenced = self.lookup.referenced_projects(project);
        }

        let search_group = |group: &[Resource]| -> Option<Resource> {
            let mut result = None;
            for project in group {
                let mut found = self.lookup.find_by_suffix(project, &suffix, container);
                match (found.len(), &result) {
                    (0, _) => {}
                    (1, None) => result = found.pop(),
                    _ => return None,
                }
            }
            result
        };

        if let Some(found) = search_group(&referenced) {
            return Some(found);
        }

        let others: Vec<Resource> = self
            .lookup
            .projects()
            .into_iter()
            .filter(|project| {
                self.project.is_none_or(|current| current.project != project.project)
                    && !referenced.iter().any(|reference| reference.project == project.project)
            })
            .collect();
        search_group(&others)
    }
}

fn workspace_name(resource: &Resource) -> String {
    resource.full_path().to_string_lossy().into_owned()
}

/// The path without its root, so it can be joined below another one.
fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// The relative form of a path suitable for suffix search, if any.
fn searchable_suffix(path: &Path) -> Option<PathBuf> {
    let suffix = normalize_lexically(&strip_root(path));
    let plain = suffix.components().all(|component| matches!(component, Component::Normal(_)));
    if suffix.as_os_str().is_empty() || !plain { None } else { Some(suffix) }
}

/// The location where the tree of an absolute source name is rooted.
///
/// For a file at `/ws/project/src/file.c` compiled as `/src/file.c` the
/// mapped root is `/ws/project`. Without such a mapping it is `/`.
fn mapped_root(location: &Path, parsed_name: &Path) -> PathBuf {
    let root = PathBuf::from("/");
    if !parsed_name.is_absolute() {
        return root;
    }
    let stripped = strip_root(parsed_name);
    let parsed: Vec<_> = stripped.components().collect();
    let actual: Vec<_> = location.components().collect();
    if parsed.is_empty() || actual.len() <= parsed.len() {
        return root;
    }
    let split = actual.len() - parsed.len();
    if actual[split..] == parsed[..] {
        actual[..split].iter().collect()
    } else {
        root
    }
}

/// Removes the relative source name from the end of the file location.
///
/// Returns `None` if the name does not match the location or navigates
/// upwards, as `..` cannot be undone reliably.
fn find_base_location(location: &Path, relative_name: &str) -> Option<PathBuf> {
    let mut base = location.to_path_buf();
    for segment in relative_name.rsplit(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return None,
            segment => {
                if base.file_name()? != segment {
                    return None;
                }
                base.pop();
            }
        }
    }
    Some(base)
}
