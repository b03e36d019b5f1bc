// SPDX-License-Identifier: GPL-3.0-or-later

//! Stores provider states between invocations.
//!
//! The document is JSON. Every provider is written with its configuration
//! attributes, whether it ran, the signature of its last run and its
//! entries. Reading a document gives back equal providers.

use crate::entry::Entry;
use crate::provider::{
    BuildCommandParser, BuiltinSpecsDetector, CompilationDatabase, Configuration, Detector, Provider,
    ProviderError, ProviderState, ResourceScope, SettingsProvider, StorageKey,
};
use crate::rerun::RunSignature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCHEMA: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub schema: String,
    #[serde(default)]
    pub providers: Vec<ProviderRecord>,
}

/// A provider as written to the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProviderRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ResourceScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub keep_relative_paths: bool,
    /// The command template of a detector, the compiler pattern of a parser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdb_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_parser_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdb_modified_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_files: Option<bool>,
    #[serde(default)]
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<RunSignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<StoredEntries>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntries {
    #[serde(flatten)]
    pub key: StorageKey,
    pub entries: Vec<Entry>,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to access {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}", path = path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported state schema '{found}', expected '{SCHEMA}'")]
    Schema { found: String },
    #[error("Unknown provider kind '{kind}' for '{id}'")]
    UnknownKind { id: String, kind: String },
    #[error("Missing attribute '{attribute}' for '{id}'")]
    MissingAttribute { id: String, attribute: &'static str },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// A restored provider with the signature of its last run.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    pub provider: Provider,
    pub signature: Option<RunSignature>,
}

impl ProviderRecord {
    pub fn from_provider(provider: &Provider, signature: Option<&RunSignature>) -> Self {
        let state = provider.state();
        let configuration = &state.configuration;
        let mut record = ProviderRecord {
            id: configuration.id.clone(),
            name: configuration.name.clone(),
            kind: configuration.detector.kind().to_string(),
            languages: configuration.languages.clone(),
            scope: configuration.scope,
            project: configuration.project.clone(),
            keep_relative_paths: !configuration.resolve_paths,
            parameter: None,
            version_pattern: None,
            console: None,
            cdb_path: None,
            build_parser_id: None,
            cdb_modified_time: None,
            exclude_files: None,
            executed: state.executed(),
            signature: signature.cloned(),
            entries: state
                .storage()
                .iter()
                .map(|(key, entries)| StoredEntries { key: key.clone(), entries: entries.clone() })
                .collect(),
        };
        match &configuration.detector {
            Detector::BuildOutput { compiler_pattern, version_pattern } => {
                record.parameter = Some(compiler_pattern.clone());
                record.version_pattern = Some(version_pattern.clone());
            }
            Detector::BuiltinSpecs { command, console } => {
                record.parameter = Some(command.clone());
                record.console = Some(*console);
            }
            Detector::CompilationDatabase { path, build_parser, exclude_files } => {
                record.cdb_path = Some(path.clone());
                record.build_parser_id = Some(build_parser.clone());
                record.exclude_files = Some(*exclude_files);
                if let Provider::CompilationDatabase(database) = provider {
                    record.cdb_modified_time = database.modified_time();
                }
            }
        }
        record
    }

    pub fn configuration(&self) -> Result<Configuration, PersistenceError> {
        let missing = |attribute| PersistenceError::MissingAttribute { id: self.id.clone(), attribute };
        let detector = match self.kind.as_str() {
            "build-output" => Detector::BuildOutput {
                compiler_pattern: self.parameter.clone().ok_or_else(|| missing("parameter"))?,
                version_pattern: self.version_pattern.clone().unwrap_or_default(),
            },
            "builtin-specs" => Detector::BuiltinSpecs {
                command: self.parameter.clone().ok_or_else(|| missing("parameter"))?,
                console: self.console.unwrap_or_default(),
            },
            "compilation-database" => Detector::CompilationDatabase {
                path: self.cdb_path.clone().unwrap_or_default(),
                build_parser: self.build_parser_id.clone().unwrap_or_default(),
                exclude_files: self.exclude_files.unwrap_or_default(),
            },
            other => return Err(PersistenceError::UnknownKind { id: self.id.clone(), kind: other.to_string() }),
        };
        Ok(Configuration {
            id: self.id.clone(),
            name: self.name.clone(),
            languages: self.languages.clone(),
            scope: self.scope,
            project: self.project.clone(),
            resolve_paths: !self.keep_relative_paths,
            detector,
        })
    }

    pub fn restore(&self) -> Result<Restored, PersistenceError> {
        let configuration = self.configuration()?;
        let storage: BTreeMap<StorageKey, Vec<Entry>> =
            self.entries.iter().map(|stored| (stored.key.clone(), stored.entries.clone())).collect();
        let state = ProviderState::restore(configuration, storage, self.executed);

        let provider = match &state.configuration.detector {
            Detector::BuildOutput { .. } => Provider::BuildOutput(BuildCommandParser::from_state(state)?),
            Detector::BuiltinSpecs { .. } => Provider::BuiltinSpecs(BuiltinSpecsDetector::from_state(state)?),
            Detector::CompilationDatabase { .. } => {
                Provider::CompilationDatabase(CompilationDatabase::from_state(state, self.cdb_modified_time)?)
            }
        };
        Ok(Restored { provider, signature: self.signature.clone() })
    }
}

impl Document {
    pub fn new(providers: Vec<ProviderRecord>) -> Self {
        Self { schema: SCHEMA.to_string(), providers }
    }

    pub fn restore_all(&self) -> Result<Vec<Restored>, PersistenceError> {
        self.providers.iter().map(ProviderRecord::restore).collect()
    }
}

/// Reads a document. A missing file reads as an empty document.
pub fn load(path: &Path) -> Result<Document, PersistenceError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new(vec![])),
        Err(source) => return Err(PersistenceError::Io { path: path.to_path_buf(), source }),
    };
    let document: Document = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| PersistenceError::Json { path: path.to_path_buf(), source })?;
    if document.schema != SCHEMA {
        return Err(PersistenceError::Schema { found: document.schema });
    }
    Ok(document)
}

pub fn save(path: &Path, document: &Document) -> Result<(), PersistenceError> {
    let io_error = |source| PersistenceError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = fs::File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)
        .map_err(|source| PersistenceError::Json { path: path.to_path_buf(), source })?;
    writer.write_all(b"\n").map_err(io_error)?;
    writer.flush().map_err(io_error)
}
