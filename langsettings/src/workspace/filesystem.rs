// SPDX-License-Identifier: GPL-3.0-or-later

use super::{Resource, ResourceKind, ResourceLookup};
use crate::config;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Workspace backed by project directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    projects: Vec<ProjectRoot>,
    mappings: Vec<config::PathMapping>,
    languages: Vec<config::Language>,
}

#[derive(Debug, Clone)]
struct ProjectRoot {
    resource: Resource,
    references: Vec<String>,
}

impl FsWorkspace {
    pub fn new(workspace: &config::Workspace) -> Self {
        let projects = workspace
            .projects
            .iter()
            .map(|project| ProjectRoot {
                resource: Resource::project(&project.name, canonicalize_lenient(&project.location)),
                references: project.references.clone(),
            })
            .collect();

        Self { projects, mappings: workspace.mappings.clone(), languages: workspace.languages.clone() }
    }
}

impl ResourceLookup for FsWorkspace {
    fn projects(&self) -> Vec<Resource> {
        self.projects.iter().map(|root| root.resource.clone()).collect()
    }

    fn referenced_projects(&self, project: &Resource) -> Vec<Resource> {
        self.projects
            .iter()
            .find(|root| root.resource.project == project.project)
            .map(|root| root.references.iter().filter_map(|name| self.project(name)).collect())
            .unwrap_or_default()
    }

    fn find_member(&self, container: &Resource, relative: &Path) -> Option<Resource> {
        let relative = normalize_lexically(relative);
        if relative.is_absolute() || relative.starts_with("..") {
            return None;
        }
        if relative.as_os_str().is_empty() {
            return Some(container.clone());
        }
        let location = container.location.join(&relative);
        if location.is_dir() {
            Some(container.member(&relative, ResourceKind::Folder))
        } else if location.is_file() {
            Some(container.member(&relative, ResourceKind::File))
        } else {
            None
        }
    }

    fn members(&self, project: &Resource) -> Vec<Resource> {
        WalkDir::new(&project.location)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&project.location).ok()?;
                let kind =
                    if entry.path().is_dir() { ResourceKind::Folder } else { ResourceKind::File };
                Some(project.member(relative, kind))
            })
            .collect()
    }

    fn resources_for_location(&self, location: &Path, container: bool) -> Vec<Resource> {
        self.projects
            .iter()
            .filter_map(|root| {
                let relative = location.strip_prefix(&root.resource.location).ok()?;
                if relative.as_os_str().is_empty() {
                    return Some(root.resource.clone());
                }
                let kind = if container { ResourceKind::Folder } else { ResourceKind::File };
                Some(root.resource.member(relative, kind))
            })
            .collect()
    }

    fn languages(&self, file_name: &str) -> Vec<String> {
        let Some((_, extension)) = file_name.rsplit_once('.') else {
            return vec![];
        };
        self.languages
            .iter()
            .filter(|language| language.extensions.iter().any(|ext| ext.eq_ignore_ascii_case(extension)))
            .map(|language| language.id.clone())
            .collect()
    }

    fn mapped_path(&self, path: &Path) -> Option<PathBuf> {
        self.mappings.iter().find_map(|mapping| {
            let rest = path.strip_prefix(&mapping.from).ok()?;
            if rest.as_os_str().is_empty() { Some(mapping.to.clone()) } else { Some(mapping.to.join(rest)) }
        })
    }
}

/// Canonicalizes the existing prefix of a path and normalizes the rest.
///
/// Symbolic links are followed component by component, so `link/..`
/// denotes the parent of the link target. Once a component does not
/// exist the remaining components are applied lexically.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    let mut physical = path.is_absolute();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            Component::Normal(name) => {
                result.push(name);
                if physical {
                    match fs::canonicalize(&result) {
                        Ok(canonical) => result = canonical,
                        Err(_) => physical = false,
                    }
                }
            }
        }
    }
    result
}

/// Removes `.` components and folds `..` into the preceding component.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }
    result
}
