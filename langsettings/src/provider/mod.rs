// SPDX-License-Identifier: GPL-3.0-or-later

//! Language settings providers.
//!
//! Three kinds of providers exist, each wrapping a [`ProviderState`]:
//!
//! - [`BuildCommandParser`] reads compiler invocations from build output,
//! - [`BuiltinSpecsDetector`] runs the compiler to learn its defaults,
//! - [`CompilationDatabase`] reads a `compile_commands.json` file.
//!
//! Providers are created from their [`Configuration`] through the
//! [`REGISTRY`] table.

pub mod build_output;
pub mod builtins;
pub mod cdb;
pub mod state;

pub use build_output::{BuildCommandParser, ParseContext};
pub use builtins::BuiltinSpecsDetector;
pub use cdb::{CompilationDatabase, DatabaseError};
pub use state::{Configuration, Detector, ProviderState, ResourceScope, StorageKey};

use crate::config;
use crate::entry::Entry;
use crate::launcher::{LaunchError, ProcessLauncher};
use crate::scheduler::CancellationToken;
use crate::workspace::{Resource, ResourceLookup};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors of a provider run, or of creating a provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider '{id}' is not a {expected} provider")]
    WrongKind { id: String, expected: &'static str },
    #[error("Invalid compiler pattern for provider '{id}': {source}")]
    CompilerPattern {
        id: String,
        #[source]
        source: regex_lite::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Failed to probe '{language}': {source}")]
    Launch {
        language: String,
        #[source]
        source: LaunchError,
    },
    #[error("No toolchain configured for language '{language}'")]
    MissingToolchain { language: String },
    #[error("Failed to prepare the input file in {path}: {source}", path = path.display())]
    SpecFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Provider '{id}' failed for {} language(s): {}", failures.len(), join_errors(failures))]
    Languages { id: String, failures: Vec<ProviderError> },
    #[error("Provider '{id}' runs only on build output")]
    NotSchedulable { id: String },
}

fn join_errors(errors: &[ProviderError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Errors of building the provider set from configurations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No provider registered for kind '{kind}' (provider '{id}')")]
    UnknownKind { id: String, kind: String },
    #[error("Duplicate provider id '{id}'")]
    DuplicateId { id: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Everything a run needs from its surroundings.
#[derive(Clone)]
pub struct RunContext {
    pub lookup: Arc<dyn ResourceLookup>,
    pub launcher: Arc<dyn ProcessLauncher>,
    /// The environment snapshot the probes run with.
    pub environment: BTreeMap<String, String>,
    pub toolchain: Vec<config::Toolchain>,
    pub languages: Vec<config::Language>,
    pub builder_cwd: Option<PathBuf>,
    /// Directory for files the providers create, like the probe input.
    pub state_location: PathBuf,
    /// Configurations of the build-output parsers, by id.
    pub build_parsers: BTreeMap<String, Configuration>,
}

impl RunContext {
    pub fn toolchain_for(&self, language: &str) -> Option<&config::Toolchain> {
        self.toolchain.iter().find(|toolchain| toolchain.language == language)
    }

    /// The first extension registered for the language.
    pub fn extension_for(&self, language: &str) -> Option<String> {
        self.languages
            .iter()
            .find(|candidate| candidate.id == language)
            .and_then(|candidate| candidate.extensions.first().cloned())
    }

    /// The project a provider is configured for, if it exists.
    pub fn project_for(&self, configuration: &Configuration) -> Option<Resource> {
        configuration.project.as_deref().and_then(|name| self.lookup.project(name))
    }
}

/// The outcome of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    /// The provider ran to completion.
    pub executed: bool,
    /// The stored entries differ from those before the run.
    pub changed: bool,
    pub cancelled: bool,
}

impl RunResult {
    pub fn completed(changed: bool) -> Self {
        Self { executed: true, changed, cancelled: false }
    }

    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn cancelled() -> Self {
        Self { cancelled: true, ..Self::default() }
    }
}

/// The operations common to every provider.
pub trait SettingsProvider {
    fn state(&self) -> &ProviderState;

    fn state_mut(&mut self) -> &mut ProviderState;

    /// Runs the provider. Without `force`, a provider may skip work it
    /// knows to be unchanged.
    fn run(
        &mut self,
        context: &RunContext,
        force: bool,
        cancellation: &CancellationToken,
    ) -> Result<RunResult, ProviderError>;

    fn id(&self) -> &str {
        &self.state().configuration.id
    }

    fn configuration(&self) -> &Configuration {
        &self.state().configuration
    }

    fn entries(&self, resource: Option<&Resource>, language: Option<&str>) -> Option<Vec<Entry>> {
        self.state().entries(resource, language)
    }
}

impl SettingsProvider for BuildCommandParser {
    fn state(&self) -> &ProviderState {
        BuildCommandParser::state(self)
    }

    fn state_mut(&mut self) -> &mut ProviderState {
        BuildCommandParser::state_mut(self)
    }

    fn run(&mut self, _: &RunContext, _: bool, _: &CancellationToken) -> Result<RunResult, ProviderError> {
        Err(ProviderError::NotSchedulable { id: self.state().configuration.id.clone() })
    }
}

impl SettingsProvider for BuiltinSpecsDetector {
    fn state(&self) -> &ProviderState {
        BuiltinSpecsDetector::state(self)
    }

    fn state_mut(&mut self) -> &mut ProviderState {
        BuiltinSpecsDetector::state_mut(self)
    }

    fn run(
        &mut self,
        context: &RunContext,
        _force: bool,
        cancellation: &CancellationToken,
    ) -> Result<RunResult, ProviderError> {
        BuiltinSpecsDetector::run(self, context, cancellation)
    }
}

impl SettingsProvider for CompilationDatabase {
    fn state(&self) -> &ProviderState {
        CompilationDatabase::state(self)
    }

    fn state_mut(&mut self) -> &mut ProviderState {
        CompilationDatabase::state_mut(self)
    }

    fn run(
        &mut self,
        context: &RunContext,
        force: bool,
        cancellation: &CancellationToken,
    ) -> Result<RunResult, ProviderError> {
        CompilationDatabase::run(self, context, force, cancellation)
    }
}

/// A provider of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    BuildOutput(BuildCommandParser),
    BuiltinSpecs(BuiltinSpecsDetector),
    CompilationDatabase(CompilationDatabase),
}

impl Provider {
    fn inner(&self) -> &dyn SettingsProvider {
        match self {
            Provider::BuildOutput(provider) => provider,
            Provider::BuiltinSpecs(provider) => provider,
            Provider::CompilationDatabase(provider) => provider,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SettingsProvider {
        match self {
            Provider::BuildOutput(provider) => provider,
            Provider::BuiltinSpecs(provider) => provider,
            Provider::CompilationDatabase(provider) => provider,
        }
    }

    /// A never-run provider with the same configuration.
    pub fn shallow_copy(&self) -> Self {
        match self {
            Provider::BuildOutput(provider) => Provider::BuildOutput(provider.shallow_copy()),
            Provider::BuiltinSpecs(provider) => Provider::BuiltinSpecs(provider.shallow_copy()),
            Provider::CompilationDatabase(provider) => Provider::CompilationDatabase(provider.shallow_copy()),
        }
    }
}

impl SettingsProvider for Provider {
    fn state(&self) -> &ProviderState {
        self.inner().state()
    }

    fn state_mut(&mut self) -> &mut ProviderState {
        self.inner_mut().state_mut()
    }

    fn run(
        &mut self,
        context: &RunContext,
        force: bool,
        cancellation: &CancellationToken,
    ) -> Result<RunResult, ProviderError> {
        self.inner_mut().run(context, force, cancellation)
    }
}

/// How a provider kind is created.
pub struct Registration {
    pub kind: &'static str,
    pub name: &'static str,
    pub create: fn(Configuration) -> Result<Provider, ProviderError>,
}

/// The known provider kinds.
pub static REGISTRY: &[Registration] = &[
    Registration {
        kind: "build-output",
        name: "Compiler Build Output Parser",
        create: |configuration| BuildCommandParser::new(configuration).map(Provider::BuildOutput),
    },
    Registration {
        kind: "builtin-specs",
        name: "Compiler Builtin Settings Detector",
        create: |configuration| BuiltinSpecsDetector::new(configuration).map(Provider::BuiltinSpecs),
    },
    Registration {
        kind: "compilation-database",
        name: "Compilation Database Parser",
        create: |configuration| CompilationDatabase::new(configuration).map(Provider::CompilationDatabase),
    },
];

/// Creates a provider from its configuration.
pub fn create(configuration: Configuration) -> Result<Provider, RegistryError> {
    let kind = configuration.detector.kind();
    let registration = REGISTRY.iter().find(|registration| registration.kind == kind).ok_or_else(|| {
        RegistryError::UnknownKind { id: configuration.id.clone(), kind: kind.to_string() }
    })?;
    log::debug!("Creating {} '{}'", registration.name, configuration.id);
    Ok((registration.create)(configuration)?)
}

/// Creates every configured provider, rejecting duplicate ids.
pub fn create_all(configurations: &[Configuration]) -> Result<Vec<Provider>, RegistryError> {
    let mut seen = HashSet::new();
    configurations
        .iter()
        .map(|configuration| {
            if !seen.insert(configuration.id.as_str()) {
                return Err(RegistryError::DuplicateId { id: configuration.id.clone() });
            }
            create(configuration.clone())
        })
        .collect()
}
