// SPDX-License-Identifier: GPL-3.0-or-later

//! Reads settings from a JSON compilation database.
//!
//! The database is a JSON array of records as defined by the LLVM project
//! [documentation](https://clang.llvm.org/docs/JSONCompilationDatabase.html).
//! Every record is handed to a fresh copy of a build-output parser,
//! attributed to the source file the record names.

mod record;

pub use record::{Record, RecordCommand};

use super::build_output::{BuildCommandParser, ParseContext};
use super::state::{Configuration, Detector, ProviderState};
use super::{ProviderError, RunContext, RunResult};
use crate::resolver::BuildLocation;
use crate::scheduler::CancellationToken;
use crate::tokenizer::tokenize;
use crate::workspace::{MemberIndex, Resource, ResourceKind, ResourceLookup};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Structured failures of reading the database.
///
/// None of them changes the provider state.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Compilation database path is not set")]
    EmptyPath,
    #[error("Compilation database not found: {path}", path = path.display())]
    NotFound { path: PathBuf },
    #[error("Compilation database is a directory: {path}", path = path.display())]
    IsDirectory { path: PathBuf },
    #[error("Failed to read compilation database {path}: {source}", path = path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse compilation database {path}: {source}", path = path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Build parser is not set")]
    MissingBuildParser,
    #[error("Unknown build parser: {id}")]
    UnknownBuildParser { id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationDatabase {
    state: ProviderState,
    modified_time: Option<u64>,
    excluded: Vec<PathBuf>,
}

impl CompilationDatabase {
    pub fn new(configuration: Configuration) -> Result<Self, ProviderError> {
        Self::from_state(ProviderState::new(configuration), None)
    }

    pub(crate) fn from_state(state: ProviderState, modified_time: Option<u64>) -> Result<Self, ProviderError> {
        match &state.configuration.detector {
            Detector::CompilationDatabase { .. } => Ok(Self { state, modified_time, excluded: vec![] }),
            _ => Err(ProviderError::WrongKind { id: state.configuration.id.clone(), expected: "compilation-database" }),
        }
    }

    pub fn state(&self) -> &ProviderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProviderState {
        &mut self.state
    }

    pub fn shallow_copy(&self) -> Self {
        Self { state: self.state.shallow_copy(), modified_time: None, excluded: vec![] }
    }

    /// Modification time of the database at the last parse, in milliseconds since the epoch.
    pub fn modified_time(&self) -> Option<u64> {
        self.modified_time
    }

    /// Source files of the workspace that no record mentions.
    ///
    /// Only collected with the exclude-files option enabled.
    pub fn excluded_files(&self) -> &[PathBuf] {
        &self.excluded
    }

    fn settings(&self) -> (&Path, &str, bool) {
        match &self.state.configuration.detector {
            Detector::CompilationDatabase { path, build_parser, exclude_files } => {
                (path.as_path(), build_parser.as_str(), *exclude_files)
            }
            _ => (Path::new(""), "", false),
        }
    }

    /// Parses the database unless it is unchanged since the last parse.
    pub fn run(
        &mut self,
        context: &RunContext,
        force: bool,
        cancellation: &CancellationToken,
    ) -> Result<RunResult, ProviderError> {
        let id = self.state.configuration.id.clone();
        let (configured, parser_id, exclude_files) = self.settings();
        let parser_id = parser_id.to_string();
        let project = context.project_for(&self.state.configuration);
        let path = database_path(configured, project.as_ref(), context.builder_cwd.as_deref())?;

        let parser_configuration = match context.build_parsers.get(&parser_id) {
            _ if parser_id.is_empty() => return Err(DatabaseError::MissingBuildParser.into()),
            Some(configuration) => configuration,
            None => return Err(DatabaseError::UnknownBuildParser { id: parser_id }.into()),
        };
        let mut parser_configuration = parser_configuration.clone();
        parser_configuration.scope = Some(self.state.configuration.resource_scope());
        parser_configuration.languages = self.state.configuration.languages.clone();
        parser_configuration.resolve_paths = self.state.configuration.resolve_paths;
        let mut parser = BuildCommandParser::new(parser_configuration)?;

        let metadata = fs::metadata(&path).map_err(|source| DatabaseError::Read { path: path.clone(), source })?;
        let modified_time = metadata.modified().ok().and_then(millis_since_epoch);
        if !force && self.state.executed() && modified_time.is_some() && modified_time == self.modified_time {
            log::info!("{id}: {} is unchanged", path.display());
            return Ok(RunResult::skipped());
        }

        let records = read_records(&path)?;
        log::info!("{id}: {} records in {}", records.len(), path.display());

        let previous = self.state.storage().clone();
        let database_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let members = MemberIndex::new(context.lookup.as_ref());
        let lookup: &dyn ResourceLookup = &members;

        self.state.startup();
        parser.state_mut().startup();
        for record in &records {
            if cancellation.is_cancelled() {
                self.state.abort();
                log::info!("{id}: cancelled");
                return Ok(RunResult::cancelled());
            }
            process_record(&mut parser, record, lookup, &database_dir);
        }
        parser.state_mut().shutdown();

        for (key, entries) in parser.state().storage() {
            self.state.set_entries(key.resource.clone(), key.language.clone(), entries.clone());
        }
        self.state.shutdown();
        self.modified_time = modified_time;
        self.excluded = if exclude_files { self.unmentioned_sources(lookup, project.as_ref()) } else { vec![] };

        let changed = previous != *self.state.storage();
        log::info!("{id}: finished, changed: {changed}");
        Ok(RunResult::completed(changed))
    }

    fn unmentioned_sources(&self, lookup: &dyn ResourceLookup, project: Option<&Resource>) -> Vec<PathBuf> {
        let projects = match project {
            Some(project) => vec![project.clone()],
            None => lookup.projects(),
        };
        let mentioned: Vec<PathBuf> = self.state.storage().keys().filter_map(|key| key.resource.clone()).collect();
        projects
            .iter()
            .flat_map(|project| lookup.members(project))
            .filter(|member| member.kind == ResourceKind::File)
            .filter(|member| {
                member
                    .location
                    .file_name()
                    .is_some_and(|name| !lookup.languages(&name.to_string_lossy()).is_empty())
            })
            .map(|member| member.full_path())
            .filter(|full_path| !mentioned.contains(full_path))
            .collect()
    }
}

fn database_path(
    configured: &Path,
    project: Option<&Resource>,
    builder_cwd: Option<&Path>,
) -> Result<PathBuf, DatabaseError> {
    if configured.as_os_str().is_empty() {
        return Err(DatabaseError::EmptyPath);
    }
    let path = match (project, builder_cwd) {
        _ if configured.is_absolute() => configured.to_path_buf(),
        (Some(project), _) => project.location.join(configured),
        (None, Some(cwd)) => cwd.join(configured),
        (None, None) => configured.to_path_buf(),
    };
    if !path.exists() {
        return Err(DatabaseError::NotFound { path });
    }
    if path.is_dir() {
        return Err(DatabaseError::IsDirectory { path });
    }
    Ok(path)
}

fn read_records(path: &Path) -> Result<Vec<Record>, DatabaseError> {
    let file = fs::File::open(path).map_err(|source| DatabaseError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|source| DatabaseError::Parse { path: path.to_path_buf(), source })
}

fn millis_since_epoch(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().and_then(|duration| u64::try_from(duration.as_millis()).ok())
}

fn process_record(parser: &mut BuildCommandParser, record: &Record, lookup: &dyn ResourceLookup, database_dir: &Path) {
    let directory = record
        .directory
        .as_ref()
        .filter(|directory| directory.is_dir())
        .cloned()
        .unwrap_or_else(|| database_dir.to_path_buf());

    let location = lookup.canonicalize(&directory.join(&record.file));
    let Some(resource) = lookup
        .resources_for_location(&location, false)
        .into_iter()
        .find(|resource| resource.kind == ResourceKind::File && lookup.exists(resource))
    else {
        log::debug!("Skipping record, not in the workspace: {}", location.display());
        return;
    };

    let tokens = match &record.command {
        Some(RecordCommand::Arguments(arguments)) => arguments.clone(),
        Some(RecordCommand::Line(line)) => tokenize(line),
        None => {
            log::warn!("Skipping record without command: {}", record.file);
            return;
        }
    };

    let project = lookup.project(&resource.project);
    let context = ParseContext { lookup, project: project.as_ref(), builder_cwd: Some(&directory) };
    let location = BuildLocation { tracker_top: Some(&directory), builder_cwd: Some(&directory) };
    if !parser.process_tokens(&tokens, context, location, Some((&resource, &record.file))) {
        log::debug!("No settings from the record of {}", record.file);
    }
}
