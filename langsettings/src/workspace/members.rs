// SPDX-License-Identifier: GPL-3.0-or-later

use super::{Resource, ResourceLookup, is_searchable, matches_suffix};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// A lookup that walks each project tree at most once.
///
/// Meant to live for one provider run: members created or removed while
/// it is alive are not seen.
pub struct MemberIndex<'a> {
    lookup: &'a dyn ResourceLookup,
    members: Mutex<HashMap<String, Arc<Vec<Resource>>>>,
}

impl<'a> MemberIndex<'a> {
    pub fn new(lookup: &'a dyn ResourceLookup) -> Self {
        Self { lookup, members: Mutex::new(HashMap::new()) }
    }

    fn project_members(&self, project: &Resource) -> Arc<Vec<Resource>> {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        members.entry(project.project.clone()).or_insert_with(|| Arc::new(self.lookup.members(project))).clone()
    }
}

impl ResourceLookup for MemberIndex<'_> {
    fn projects(&self) -> Vec<Resource> {
        self.lookup.projects()
    }

    fn project(&self, name: &str) -> Option<Resource> {
        self.lookup.project(name)
    }

    fn referenced_projects(&self, project: &Resource) -> Vec<Resource> {
        self.lookup.referenced_projects(project)
    }

    fn find_member(&self, container: &Resource, relative: &Path) -> Option<Resource> {
        self.lookup.find_member(container, relative)
    }

    fn members(&self, project: &Resource) -> Vec<Resource> {
        self.project_members(project).as_ref().clone()
    }

    fn resources_for_location(&self, location: &Path, container: bool) -> Vec<Resource> {
        self.lookup.resources_for_location(location, container)
    }

    fn languages(&self, file_name: &str) -> Vec<String> {
        self.lookup.languages(file_name)
    }

    fn mapped_path(&self, path: &Path) -> Option<PathBuf> {
        self.lookup.mapped_path(path)
    }

    fn exists(&self, resource: &Resource) -> bool {
        self.lookup.exists(resource)
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.lookup.path_exists(path)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        self.lookup.canonicalize(path)
    }

    fn find_by_suffix(&self, project: &Resource, suffix: &Path, container: bool) -> Vec<Resource> {
        if !is_searchable(suffix) {
            return vec![];
        }
        self.project_members(project)
            .iter()
            .filter(|member| matches_suffix(member, suffix, container))
            .cloned()
            .collect()
    }
}
