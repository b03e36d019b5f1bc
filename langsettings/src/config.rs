// SPDX-License-Identifier: GPL-3.0-or-later

//! This module defines the configuration of the application.
//!
//! The configuration is either loaded from a file or used with default
//! values, which are defined in the code. It describes the workspace the
//! settings are collected for, the toolchain the compiler probes run, and
//! the providers which collect the settings.
//!
//! The configuration file syntax is based on the YAML format.
//! The default configuration file name is `langsettings.yml`.
//!
//! The configuration file location is searched in the following order:
//! 1. The current working directory
//! 2. The local configuration directory of the user
//! 3. The configuration directory of the user
//! 4. The local configuration directory of the application
//! 5. The configuration directory of the application
//!
//! ```yaml
//! schema: 1.0
//!
//! workspace:
//!   projects:
//!     - name: app
//!       location: /home/user/src/app
//!       references: [lib]
//!     - name: lib
//!       location: /home/user/src/lib
//!   mappings:
//!     - from: /build/agent/src
//!       to: /home/user/src
//!   languages:
//!     - id: c
//!       extensions: [c, h]
//!     - id: c++
//!       extensions: [cpp, cc, cxx, hpp]
//!
//! toolchain:
//!   - language: c
//!     compiler: gcc
//!   - language: c++
//!     compiler: g++
//!     flags: [-std=c++17]
//!
//! providers:
//!   - id: gcc-build-output
//!     kind: build-output
//!     scope: file
//!   - id: gcc-builtins
//!     kind: builtin-specs
//!     command: ${COMMAND} ${FLAGS} -E -P -v -dD "${INPUTS}"
//!     console: false
//!   - id: cdb
//!     kind: compilation-database
//!     path: build/compile_commands.json
//!     build-parser: gcc-build-output
//!     exclude-files: true
//!
//! scheduler:
//!   workers: 2
//! ```

// Re-Export the types and the loader module content.
pub use loader::{ConfigError, Loader};
pub use types::*;
pub use validation::Validator;

mod types {
    use crate::options::compiler::{DEFAULT_COMPILER_PATTERN, DEFAULT_VERSION_PATTERN};
    use crate::provider::{Configuration, Detector};
    use serde::Deserialize;
    use std::fmt;
    use std::path::PathBuf;

    /// Represents the application configuration.
    #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
    pub struct Main {
        #[serde(deserialize_with = "validate_schema_version")]
        pub schema: String,
        #[serde(default)]
        pub workspace: Workspace,
        #[serde(default = "default_toolchain")]
        pub toolchain: Vec<Toolchain>,
        #[serde(default = "default_providers")]
        pub providers: Vec<Configuration>,
        #[serde(default)]
        pub scheduler: Scheduler,
    }

    impl Default for Main {
        fn default() -> Self {
            Self {
                schema: String::from(SUPPORTED_SCHEMA_VERSION),
                workspace: Workspace::default(),
                toolchain: default_toolchain(),
                providers: default_providers(),
                scheduler: Scheduler::default(),
            }
        }
    }

    impl fmt::Display for Main {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, "Configuration:")?;
            match serde_yml::to_string(self) {
                Ok(yaml_string) => {
                    for line in yaml_string.lines() {
                        writeln!(f, "{line}")?;
                    }
                    Ok(())
                }
                Err(error) => writeln!(f, "<can't be serialized: {error}>"),
            }
        }
    }

    /// The projects the settings are collected for.
    #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
    pub struct Workspace {
        #[serde(default)]
        pub projects: Vec<Project>,
        /// Translates paths of a remote build machine to the local disk.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub mappings: Vec<PathMapping>,
        #[serde(default = "default_languages")]
        pub languages: Vec<Language>,
    }

    impl Default for Workspace {
        fn default() -> Self {
            Self { projects: vec![], mappings: vec![], languages: default_languages() }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    pub struct Project {
        pub name: String,
        pub location: PathBuf,
        /// Names of the projects this one depends on.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub references: Vec<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    pub struct PathMapping {
        pub from: PathBuf,
        pub to: PathBuf,
    }

    /// A language and the file extensions (without the dot) it owns.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    pub struct Language {
        pub id: String,
        pub extensions: Vec<String>,
    }

    /// The compiler which probes the builtin settings of a language.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    pub struct Toolchain {
        pub language: String,
        pub compiler: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub flags: Vec<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    pub struct Scheduler {
        #[serde(default = "default_workers")]
        pub workers: usize,
    }

    impl Default for Scheduler {
        fn default() -> Self {
            Self { workers: default_workers() }
        }
    }

    const SUPPORTED_SCHEMA_VERSION: &str = "1.0";
    const DEFAULT_BUILTINS_COMMAND: &str = r#"${COMMAND} ${FLAGS} -E -P -v -dD "${INPUTS}""#;

    pub fn default_languages() -> Vec<Language> {
        let language = |id: &str, extensions: &[&str]| Language {
            id: id.to_string(),
            extensions: extensions.iter().map(|extension| extension.to_string()).collect(),
        };
        vec![language("c", &["c"]), language("c++", &["cpp", "cc", "cxx", "c++", "cp", "cu"])]
    }

    fn default_toolchain() -> Vec<Toolchain> {
        vec![
            Toolchain { language: "c".into(), compiler: "gcc".into(), flags: vec![] },
            Toolchain { language: "c++".into(), compiler: "g++".into(), flags: vec![] },
        ]
    }

    fn default_providers() -> Vec<Configuration> {
        vec![
            Configuration {
                id: "gcc-build-output".into(),
                name: "GCC Build Output Parser".into(),
                languages: vec![],
                scope: None,
                project: None,
                resolve_paths: true,
                detector: Detector::BuildOutput {
                    compiler_pattern: DEFAULT_COMPILER_PATTERN.into(),
                    version_pattern: DEFAULT_VERSION_PATTERN.into(),
                },
            },
            Configuration {
                id: "gcc-builtins".into(),
                name: "GCC Builtin Compiler Settings".into(),
                languages: vec![],
                scope: None,
                project: None,
                resolve_paths: true,
                detector: Detector::BuiltinSpecs { command: DEFAULT_BUILTINS_COMMAND.into(), console: false },
            },
        ]
    }

    fn default_workers() -> usize {
        2
    }

    // Custom deserialization function to validate the schema version
    fn validate_schema_version<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let schema: String = Deserialize::deserialize(deserializer)?;
        if schema != SUPPORTED_SCHEMA_VERSION {
            use serde::de::Error;
            Err(Error::custom(format!(
                "Unsupported schema version: {schema}. Expected: {SUPPORTED_SCHEMA_VERSION}"
            )))
        } else {
            Ok(schema)
        }
    }
}

pub mod validation {

    use super::types::*;
    use crate::options::compiler::CompilerRecognizer;
    use crate::provider::{Configuration, Detector};
    use std::collections::HashSet;
    use thiserror::Error;

    /// Trait for validating configuration objects
    pub trait Validator<T> {
        type Error: std::error::Error;

        fn validate(config: &T) -> Result<(), Self::Error>;
    }

    /// Validation errors for configuration
    #[derive(Debug, Error)]
    pub enum ValidationError {
        #[error("Empty string value for field '{field}'")]
        EmptyString { field: String },
        #[error("Duplicate {field} entry at: {idx}")]
        DuplicateEntry { field: &'static str, idx: usize },
        #[error("Unknown project '{name}' referenced by '{field}'")]
        UnknownProject { field: String, name: String },
        #[error("Invalid pattern for field '{field}': {source}")]
        InvalidPattern {
            field: String,
            #[source]
            source: regex_lite::Error,
        },
        #[error("Empty list for field '{field}'")]
        EmptyList { field: String },
        #[error("Value of field '{field}' must be positive")]
        NotPositive { field: &'static str },
        #[error("Multiple validation errors: {errors:?}")]
        Multiple { errors: Vec<ValidationError> },
    }

    /// Combinator for collecting and handling validation errors
    #[derive(Default)]
    struct ValidationCollector {
        errors: Vec<ValidationError>,
    }

    impl ValidationCollector {
        fn new() -> Self {
            Self { errors: Vec::new() }
        }

        fn add(&mut self, error: ValidationError) {
            self.errors.push(error);
        }

        fn add_result(&mut self, result: Result<(), ValidationError>) {
            if let Err(error) = result {
                match error {
                    ValidationError::Multiple { errors } => {
                        self.errors.extend(errors);
                    }
                    single_error => self.errors.push(single_error),
                }
            }
        }

        fn finish(mut self) -> Result<(), ValidationError> {
            match self.errors.len() {
                0 => Ok(()),
                1 => Err(self.errors.remove(0)),
                _ => Err(ValidationError::Multiple { errors: self.errors }),
            }
        }
    }

    impl Validator<Main> for Main {
        type Error = ValidationError;

        fn validate(config: &Main) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::new();

            collector.add_result(Workspace::validate(&config.workspace));

            for (idx, toolchain) in config.toolchain.iter().enumerate() {
                if toolchain.compiler.trim().is_empty() {
                    collector.add(ValidationError::EmptyString { field: format!("toolchain[{idx}].compiler") });
                }
            }

            let mut seen_ids = HashSet::new();
            for (idx, provider) in config.providers.iter().enumerate() {
                collector.add_result(validate_provider(idx, provider));
                if !seen_ids.insert(&provider.id) {
                    collector.add(ValidationError::DuplicateEntry { field: "providers.id", idx });
                }
                if let Some(project) = &provider.project
                    && !config.workspace.projects.iter().any(|candidate| &candidate.name == project)
                {
                    collector.add(ValidationError::UnknownProject {
                        field: format!("providers[{idx}].project"),
                        name: project.clone(),
                    });
                }
            }

            if config.scheduler.workers == 0 {
                collector.add(ValidationError::NotPositive { field: "scheduler.workers" });
            }

            collector.finish()
        }
    }

    impl Validator<Workspace> for Workspace {
        type Error = ValidationError;

        fn validate(config: &Workspace) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::new();

            let mut seen_names = HashSet::new();
            for (idx, project) in config.projects.iter().enumerate() {
                if project.name.is_empty() {
                    collector.add(ValidationError::EmptyString { field: format!("workspace.projects[{idx}].name") });
                }
                if !seen_names.insert(&project.name) {
                    collector.add(ValidationError::DuplicateEntry { field: "workspace.projects.name", idx });
                }
            }
            for project in &config.projects {
                for reference in &project.references {
                    if !config.projects.iter().any(|candidate| &candidate.name == reference) {
                        collector.add(ValidationError::UnknownProject {
                            field: format!("workspace.projects.{}.references", project.name),
                            name: reference.clone(),
                        });
                    }
                }
            }

            let mut seen_languages = HashSet::new();
            for (idx, language) in config.languages.iter().enumerate() {
                if language.extensions.is_empty() {
                    collector.add(ValidationError::EmptyList {
                        field: format!("workspace.languages[{idx}].extensions"),
                    });
                }
                if !seen_languages.insert(&language.id) {
                    collector.add(ValidationError::DuplicateEntry { field: "workspace.languages.id", idx });
                }
            }

            collector.finish()
        }
    }

    fn validate_provider(idx: usize, config: &Configuration) -> Result<(), ValidationError> {
        let mut collector = ValidationCollector::new();

        if config.id.trim().is_empty() {
            collector.add(ValidationError::EmptyString { field: format!("providers[{idx}].id") });
        }
        match &config.detector {
            Detector::BuildOutput { compiler_pattern, version_pattern } => {
                if let Err(source) = CompilerRecognizer::new(compiler_pattern, version_pattern) {
                    collector.add(ValidationError::InvalidPattern {
                        field: format!("providers[{idx}].compiler-pattern"),
                        source,
                    });
                }
            }
            Detector::BuiltinSpecs { command, .. } => {
                if command.trim().is_empty() {
                    collector.add(ValidationError::EmptyString { field: format!("providers[{idx}].command") });
                }
            }
            Detector::CompilationDatabase { .. } => {}
        }

        collector.finish()
    }

}

pub mod loader {
    use super::{Main, Validator};
    use directories::{BaseDirs, ProjectDirs};
    use log::{debug, info};
    use std::fs::OpenOptions;
    use std::path::{Path, PathBuf};
    use thiserror::Error;

    pub const CONFIG_FILE_NAME: &str = "langsettings.yml";

    pub struct Loader {}

    impl Loader {
        /// Loads the configuration from the specified file or the default locations.
        ///
        /// If the configuration file is specified, it will be used. Otherwise, the default locations
        /// will be searched for the configuration file. If the configuration file is not found, the
        /// default configuration will be returned.
        pub fn load(context: &crate::context::Context, filename: &Option<String>) -> Result<Main, ConfigError> {
            if let Some(path) = filename {
                Self::from_file(Path::new(path))
            } else {
                for location in Self::file_locations(context) {
                    debug!("Checking configuration file: {}", location.display());
                    if location.exists() {
                        return Self::from_file(location.as_path());
                    }
                }
                debug!("Configuration file not found. Using the default configuration.");
                Ok(Main::default())
            }
        }

        /// The default locations where the configuration file can be found.
        ///
        /// The locations are searched in the following order:
        /// - The current working directory.
        /// - The local configuration directory of the user.
        /// - The configuration directory of the user.
        /// - The local configuration directory of the application.
        /// - The configuration directory of the application.
        fn file_locations(context: &crate::context::Context) -> Vec<PathBuf> {
            let mut locations = Vec::new();

            locations.push(context.current_directory.clone());
            if let Some(base_dirs) = BaseDirs::new() {
                locations.push(base_dirs.config_local_dir().to_path_buf());
                locations.push(base_dirs.config_dir().to_path_buf());
            }
            if let Some(proj_dirs) = ProjectDirs::from("org", "langsettings", "langsettings") {
                locations.push(proj_dirs.config_local_dir().to_path_buf());
                locations.push(proj_dirs.config_dir().to_path_buf());
            }
            locations.dedup();
            locations.iter().map(|p| p.join(CONFIG_FILE_NAME)).collect()
        }

        /// Loads the configuration from the specified file.
        pub fn from_file(path: &Path) -> Result<Main, ConfigError> {
            info!("Loading configuration file: {}", path.display());

            let reader = OpenOptions::new()
                .read(true)
                .open(path)
                .map_err(|source| ConfigError::FileAccess { path: path.to_path_buf(), source })?;

            let content: Main = Self::from_reader(reader)
                .map_err(|source| ConfigError::ParseError { path: path.to_path_buf(), source })?;

            Main::validate(&content)
                .map_err(|source| ConfigError::ValidationError { path: path.to_path_buf(), source })?;

            Ok(content)
        }

        /// Define the deserialization format of the config file.
        fn from_reader<R, T>(rdr: R) -> serde_yml::Result<T>
        where
            R: std::io::Read,
            T: serde::de::DeserializeOwned,
        {
            serde_yml::from_reader(rdr)
        }
    }

    /// Represents all possible configuration-related errors.
    #[derive(Debug, Error)]
    pub enum ConfigError {
        /// Error when opening or reading a configuration file.
        #[error("Failed to access configuration file '{path}': {source}")]
        FileAccess {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        /// Error when parsing the configuration file format.
        #[error("Failed to parse configuration from file '{path}': {source}")]
        ParseError {
            path: PathBuf,
            #[source]
            source: serde_yml::Error,
        },
        /// Error when configuration validation fails.
        #[error("Configuration validation failed for '{path}': {source}")]
        ValidationError {
            path: PathBuf,
            #[source]
            source: crate::config::validation::ValidationError,
        },
    }

}
