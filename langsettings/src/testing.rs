// SPDX-License-Identifier: GPL-3.0-or-later

//! Testing utilities shared by the unit tests.
//!
//! [`TestWorkspace`] lays out project trees in a temporary directory and
//! hands out the matching [`FsWorkspace`].

use crate::config;
use crate::launcher::{LaunchError, LaunchOutcome, LaunchRequest, ProcessLauncher, Stream};
use crate::provider::RunContext;
use crate::provider::state::{Configuration, Detector};
use crate::scheduler::CancellationToken;
use crate::workspace::{FsWorkspace, Resource, ResourceLookup};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct TestWorkspace {
    _dir: TempDir,
    pub root: PathBuf,
    projects: Vec<config::Project>,
    mappings: Vec<config::PathMapping>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        // Canonical, as the temporary directory may sit behind a symlink.
        let root = dir.path().canonicalize().unwrap();
        Self { _dir: dir, root, projects: vec![], mappings: vec![] }
    }

    /// Adds a project rooted at `<root>/<name>`.
    pub fn with_project(mut self, name: &str, references: &[&str]) -> Self {
        let location = self.root.join(name);
        fs::create_dir_all(&location).unwrap();
        self.projects.push(config::Project {
            name: name.to_string(),
            location,
            references: references.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    pub fn with_mapping(mut self, from: &str, to: &Path) -> Self {
        self.mappings.push(config::PathMapping { from: PathBuf::from(from), to: to.to_path_buf() });
        self
    }

    /// Creates an empty file (and its parents) below the root.
    pub fn file(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "").unwrap();
        path
    }

    /// Creates a directory below the root.
    pub fn folder(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn workspace_config(&self) -> config::Workspace {
        config::Workspace {
            projects: self.projects.clone(),
            mappings: self.mappings.clone(),
            languages: config::default_languages(),
        }
    }

    pub fn lookup(&self) -> FsWorkspace {
        FsWorkspace::new(&self.workspace_config())
    }

    pub fn project(&self, name: &str) -> Resource {
        self.lookup().project(name).unwrap()
    }
}

/// Delegates to a workspace and counts how often project trees are walked.
pub struct CountingLookup {
    inner: FsWorkspace,
    walks: AtomicUsize,
}

impl CountingLookup {
    pub fn new(inner: FsWorkspace) -> Self {
        Self { inner, walks: AtomicUsize::new(0) }
    }

    pub fn member_walks(&self) -> usize {
        self.walks.load(Ordering::SeqCst)
    }
}

impl ResourceLookup for CountingLookup {
    fn projects(&self) -> Vec<Resource> {
        self.inner.projects()
    }

    fn referenced_projects(&self, project: &Resource) -> Vec<Resource> {
        self.inner.referenced_projects(project)
    }

    fn find_member(&self, container: &Resource, relative: &Path) -> Option<Resource> {
        self.inner.find_member(container, relative)
    }

    fn members(&self, project: &Resource) -> Vec<Resource> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        self.inner.members(project)
    }

    fn resources_for_location(&self, location: &Path, container: bool) -> Vec<Resource> {
        self.inner.resources_for_location(location, container)
    }

    fn languages(&self, file_name: &str) -> Vec<String> {
        self.inner.languages(file_name)
    }

    fn mapped_path(&self, path: &Path) -> Option<PathBuf> {
        self.inner.mapped_path(path)
    }
}

pub fn build_output_configuration(id: &str) -> Configuration {
    Configuration {
        id: id.to_string(),
        name: "Build Output Parser".to_string(),
        languages: vec!["c".to_string(), "c++".to_string()],
        scope: None,
        project: None,
        resolve_paths: true,
        detector: Detector::BuildOutput {
            compiler_pattern: crate::options::compiler::DEFAULT_COMPILER_PATTERN.to_string(),
            version_pattern: crate::options::compiler::DEFAULT_VERSION_PATTERN.to_string(),
        },
    }
}

/// A launcher that replays canned output and records the requests.
pub struct ScriptedLauncher {
    output: Vec<(Stream, String)>,
    requests: Mutex<Vec<LaunchRequest>>,
}

impl ScriptedLauncher {
    pub fn new(output: Vec<(Stream, String)>) -> Self {
        Self { output, requests: Mutex::new(vec![]) }
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(
        &self,
        request: &LaunchRequest,
        cancellation: &CancellationToken,
        sink: &mut dyn FnMut(Stream, &str),
    ) -> Result<LaunchOutcome, LaunchError> {
        self.requests.lock().unwrap().push(request.clone());
        if cancellation.is_cancelled() {
            return Ok(LaunchOutcome::Cancelled);
        }
        for (stream, line) in &self.output {
            sink(*stream, line);
        }
        Ok(LaunchOutcome::Exited { code: Some(0) })
    }
}

pub fn toolchain() -> Vec<config::Toolchain> {
    vec![
        config::Toolchain { language: "c".into(), compiler: "gcc".into(), flags: vec![] },
        config::Toolchain { language: "c++".into(), compiler: "g++".into(), flags: vec!["-std=c++17".into()] },
    ]
}

pub fn run_context(workspace: &TestWorkspace, launcher: Arc<dyn ProcessLauncher>) -> RunContext {
    RunContext {
        lookup: Arc::new(workspace.lookup()),
        launcher,
        environment: BTreeMap::from([("HOME".to_string(), workspace.root.to_string_lossy().into_owned())]),
        toolchain: toolchain(),
        languages: config::default_languages(),
        builder_cwd: None,
        state_location: workspace.path(".state"),
        build_parsers: BTreeMap::new(),
    }
}
