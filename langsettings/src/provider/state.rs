// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration and lifecycle shared by every provider.
//!
//! A run goes through the phases
//! `Idle -> Started -> (Language -> Started)* -> Idle`. Starting a run
//! keeps a snapshot of the previous state so a cancelled run can leave the
//! provider exactly as it was.

use crate::entry::Entry;
use crate::options::compiler::{DEFAULT_COMPILER_PATTERN, DEFAULT_VERSION_PATTERN};
use crate::workspace::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The granularity a provider attaches its entries to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceScope {
    File,
    Folder,
    Project,
    Global,
}

/// The detector specific part of a provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum Detector {
    /// Parses compiler invocations from build output.
    BuildOutput {
        #[serde(default = "default_compiler_pattern")]
        compiler_pattern: String,
        #[serde(default = "default_version_pattern")]
        version_pattern: String,
    },
    /// Runs the compiler to report its builtin settings.
    BuiltinSpecs {
        command: String,
        #[serde(default)]
        console: bool,
    },
    /// Reads a `compile_commands.json` file.
    CompilationDatabase {
        #[serde(default)]
        path: PathBuf,
        #[serde(default)]
        build_parser: String,
        #[serde(default)]
        exclude_files: bool,
    },
}

impl Detector {
    pub fn kind(&self) -> &'static str {
        match self {
            Detector::BuildOutput { .. } => "build-output",
            Detector::BuiltinSpecs { .. } => "builtin-specs",
            Detector::CompilationDatabase { .. } => "compilation-database",
        }
    }

    fn default_scope(&self) -> ResourceScope {
        match self {
            Detector::BuiltinSpecs { .. } => ResourceScope::Global,
            _ => ResourceScope::File,
        }
    }
}

/// The user facing configuration of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Language ids the provider handles; empty means every language.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ResourceScope>,
    /// Name of the project the provider collects for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default = "default_true")]
    pub resolve_paths: bool,
    #[serde(flatten)]
    pub detector: Detector,
}

impl Configuration {
    pub fn resource_scope(&self) -> ResourceScope {
        self.scope.unwrap_or_else(|| self.detector.default_scope())
    }

    pub fn is_language_in_scope(&self, language: Option<&str>) -> bool {
        match language {
            Some(language) => self.languages.is_empty() || self.languages.iter().any(|l| l == language),
            None => self.languages.is_empty(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_compiler_pattern() -> String {
    DEFAULT_COMPILER_PATTERN.to_string()
}

fn default_version_pattern() -> String {
    DEFAULT_VERSION_PATTERN.to_string()
}

/// The key entries are stored under.
///
/// `resource` is the workspace path of the file, folder or project; it
/// is `None` for settings that apply globally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Language(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    storage: BTreeMap<StorageKey, Vec<Entry>>,
    executed: bool,
}

/// Collected entries of a provider and the state of its current run.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub configuration: Configuration,
    storage: BTreeMap<StorageKey, Vec<Entry>>,
    executed: bool,
    phase: Phase,
    snapshot: Option<Snapshot>,
}

impl PartialEq for ProviderState {
    fn eq(&self, other: &Self) -> bool {
        self.configuration == other.configuration
            && self.storage == other.storage
            && self.executed == other.executed
    }
}

impl ProviderState {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            storage: BTreeMap::new(),
            executed: false,
            phase: Phase::Idle,
            snapshot: None,
        }
    }

    /// Restores a persisted state.
    pub fn restore(
        configuration: Configuration,
        storage: BTreeMap<StorageKey, Vec<Entry>>,
        executed: bool,
    ) -> Self {
        Self { storage, executed, ..Self::new(configuration) }
    }

    pub fn startup(&mut self) {
        self.snapshot =
            Some(Snapshot { storage: std::mem::take(&mut self.storage), executed: self.executed });
        self.executed = false;
        self.phase = Phase::Started;
    }

    pub fn startup_for_language(&mut self, language: &str) {
        self.phase = Phase::Language(language.to_string());
    }

    pub fn shutdown_for_language(&mut self) {
        self.phase = Phase::Started;
    }

    /// The language of the bracket currently open, if any.
    pub fn current_language(&self) -> Option<&str> {
        match &self.phase {
            Phase::Language(language) => Some(language),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Finishes the run and marks the provider executed.
    pub fn shutdown(&mut self) {
        self.executed = true;
        self.snapshot = None;
        self.phase = Phase::Idle;
    }

    /// Abandons the run and brings back the state from before it.
    pub fn abort(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.storage = snapshot.storage;
            self.executed = snapshot.executed;
        }
        self.phase = Phase::Idle;
    }

    /// Replaces the entries under the key. Empty entries remove the key.
    pub fn set_entries(&mut self, resource: Option<PathBuf>, language: Option<String>, entries: Vec<Entry>) {
        let key = StorageKey { resource, language };
        if entries.is_empty() {
            self.storage.remove(&key);
        } else {
            self.storage.insert(key, entries);
        }
    }

    /// Entries for a resource (`None` for global) and language.
    ///
    /// Returns `None` when the provider has nothing to say: it never ran,
    /// the resource has a different granularity than the provider scope,
    /// or no entries were collected for the key. A global provider that
    /// ran without output answers with an empty list for the languages
    /// it handles.
    pub fn entries(&self, resource: Option<&Resource>, language: Option<&str>) -> Option<Vec<Entry>> {
        let scope = self.configuration.resource_scope();
        let matching = match (scope, resource.map(|r| r.kind)) {
            (ResourceScope::Global, None) => true,
            (ResourceScope::File, Some(ResourceKind::File)) => true,
            (ResourceScope::Folder, Some(ResourceKind::Folder)) => true,
            (ResourceScope::Project, Some(ResourceKind::Project)) => true,
            _ => false,
        };
        if !matching {
            return None;
        }

        let key = StorageKey {
            resource: resource.map(Resource::full_path),
            language: language.map(str::to_string),
        };
        if let Some(entries) = self.storage.get(&key) {
            return Some(entries.clone());
        }
        if self.executed && scope == ResourceScope::Global && self.configuration.is_language_in_scope(language) {
            return Some(vec![]);
        }
        None
    }

    /// All stored entries by key.
    pub fn storage(&self) -> &BTreeMap<StorageKey, Vec<Entry>> {
        &self.storage
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn is_empty(&self) -> bool {
        !self.executed && self.storage.is_empty()
    }

    /// Drops every entry and forgets the provider ever ran.
    pub fn clear(&mut self) {
        self.storage.clear();
        self.executed = false;
        self.snapshot = None;
        self.phase = Phase::Idle;
    }

    /// A never-run state with the same configuration.
    pub fn shallow_copy(&self) -> Self {
        Self::new(self.configuration.clone())
    }

    /// The storage key for entries of `resource` at the configured scope.
    pub fn key_resource(&self, resource: Option<&Resource>) -> Option<PathBuf> {
        match self.configuration.resource_scope() {
            ResourceScope::Global => None,
            ResourceScope::File => resource.map(Resource::full_path),
            ResourceScope::Folder => resource.map(|resource| match resource.kind {
                ResourceKind::File => resource.parent().unwrap_or_else(|| resource.clone()).full_path(),
                _ => resource.full_path(),
            }),
            ResourceScope::Project => resource.map(|resource| Resource::project(&resource.project, "").full_path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Flags;
    use std::path::Path;

    fn configuration(scope: Option<ResourceScope>, detector: Detector) -> Configuration {
        Configuration {
            id: "provider.id".into(),
            name: "Provider".into(),
            languages: vec!["c++".into()],
            scope,
            project: None,
            resolve_paths: true,
            detector,
        }
    }

    fn build_output(scope: Option<ResourceScope>) -> Configuration {
        configuration(
            scope,
            Detector::BuildOutput {
                compiler_pattern: default_compiler_pattern(),
                version_pattern: default_version_pattern(),
            },
        )
    }

    fn builtins() -> Configuration {
        configuration(None, Detector::BuiltinSpecs { command: "${COMMAND} -E -dM ${INPUTS}".into(), console: false })
    }

    fn file() -> Resource {
        Resource::project("Project", "/p").member(Path::new("folder/file.cpp"), ResourceKind::File)
    }

    #[test]
    fn test_never_run_is_empty() {
        let sut = ProviderState::new(builtins());

        assert!(sut.is_empty());
        assert!(!sut.executed());
        assert_eq!(sut.entries(None, Some("c++")), None);
    }

    #[test]
    fn test_global_executed_without_output() {
        let mut sut = ProviderState::new(builtins());
        sut.startup();
        sut.shutdown();

        assert!(!sut.is_empty());
        assert_eq!(sut.entries(None, Some("c++")), Some(vec![]));
        // out of language scope
        assert_eq!(sut.entries(None, Some("c")), None);
        // resources are not answered by a global provider
        assert_eq!(sut.entries(Some(&file()), Some("c++")), None);
    }

    #[test]
    fn test_scope_isolation() {
        let entries = vec![Entry::include_path("/usr/include", Flags::NONE)];
        let file = file();
        let folder = file.parent().unwrap();
        let project = folder.parent().unwrap();

        for (scope, expected) in [
            (ResourceScope::File, &file),
            (ResourceScope::Folder, &folder),
            (ResourceScope::Project, &project),
        ] {
            let mut sut = ProviderState::new(build_output(Some(scope)));
            sut.startup();
            let key = sut.key_resource(Some(&file));
            sut.set_entries(key, Some("c++".into()), entries.clone());
            sut.shutdown();

            for resource in [&file, &folder, &project] {
                let result = sut.entries(Some(resource), Some("c++"));
                if resource == expected {
                    assert_eq!(result, Some(entries.clone()), "{scope:?} {resource}");
                } else {
                    assert_eq!(result, None, "{scope:?} {resource}");
                }
            }
            assert_eq!(sut.entries(None, Some("c++")), None);
        }
    }

    #[test]
    fn test_abort_restores_previous_run() {
        let entries = vec![Entry::macro_defined("A", "1", Flags::NONE)];
        let mut sut = ProviderState::new(builtins());
        sut.startup();
        sut.set_entries(None, Some("c++".into()), entries.clone());
        sut.shutdown();
        let before = sut.clone();

        sut.startup();
        sut.startup_for_language("c++");
        assert_eq!(sut.current_language(), Some("c++"));
        sut.set_entries(None, Some("c++".into()), vec![]);
        sut.abort();

        assert_eq!(sut, before);
        assert!(!sut.is_running());
        assert_eq!(sut.entries(None, Some("c++")), Some(entries));
    }

    #[test]
    fn test_new_run_replaces_entries() {
        let mut sut = ProviderState::new(build_output(None));
        let key = Some(file().full_path());
        sut.startup();
        sut.set_entries(key.clone(), Some("c++".into()), vec![Entry::macro_defined("A", "1", Flags::NONE)]);
        sut.shutdown();

        sut.startup();
        sut.set_entries(key, Some("c++".into()), vec![Entry::macro_defined("B", "2", Flags::NONE)]);
        sut.shutdown();

        assert_eq!(sut.storage().len(), 1);
        assert_eq!(sut.entries(Some(&file()), Some("c++")), Some(vec![Entry::macro_defined("B", "2", Flags::NONE)]));
    }

    #[test]
    fn test_clear_and_copies() {
        let mut sut = ProviderState::new(builtins());
        sut.startup();
        sut.set_entries(None, Some("c++".into()), vec![Entry::macro_defined("A", "1", Flags::NONE)]);
        sut.shutdown();

        let deep = sut.clone();
        assert_eq!(deep, sut);

        let shallow = sut.shallow_copy();
        assert!(shallow.is_empty());
        assert_eq!(shallow.configuration, sut.configuration);
        assert_ne!(shallow, sut);

        sut.clear();
        assert!(sut.is_empty());
        assert_eq!(sut, shallow);
    }

    #[test]
    fn test_configuration_from_yaml() {
        let content = r#"
            id: gcc.builtins
            name: GCC Builtins
            kind: builtin-specs
            command: "${COMMAND} ${FLAGS} -E -P -v -dD ${INPUTS}"
            console: true
            languages: [c, c++]
        "#;
        let result: Configuration = serde_yml::from_str(content).unwrap();

        assert_eq!(result.resource_scope(), ResourceScope::Global);
        assert!(result.resolve_paths);
        assert_eq!(
            result.detector,
            Detector::BuiltinSpecs { command: "${COMMAND} ${FLAGS} -E -P -v -dD ${INPUTS}".into(), console: true }
        );

        let content = r#"
            id: cdb
            kind: compilation-database
            path: build/compile_commands.json
            build-parser: gcc.build
            exclude-files: true
            resolve-paths: false
        "#;
        let result: Configuration = serde_yml::from_str(content).unwrap();

        assert_eq!(result.resource_scope(), ResourceScope::File);
        assert!(!result.resolve_paths);
        assert_eq!(
            result.detector,
            Detector::CompilationDatabase {
                path: "build/compile_commands.json".into(),
                build_parser: "gcc.build".into(),
                exclude_files: true,
            }
        );
    }
}
