// SPDX-License-Identifier: GPL-3.0-or-later

//! Wires the command line, the configuration and the captured context into
//! a running session.
//!
//! The state file connects the invocations. Providers whose configuration
//! did not change are restored from it, with their entries and the
//! signature of their last run. When the mode finished, the entries of the
//! providers it ran are reported and the state is written back.

use crate::context::Context;
use crate::launcher::SystemLauncher;
use crate::persistence::{self, Document, PersistenceError, Restored, StoredEntries};
use crate::provider::{self, Configuration, Provider, RegistryError, RunContext, SettingsProvider};
use crate::scheduler::CancellationToken;
use crate::session::{Outcome, Session, Trigger};
use crate::workspace::FsWorkspace;
use crate::{args, config};
use anyhow::Context as AnyhowContext;
use directories::ProjectDirs;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::{env, fs};

const KIND_BUILD_OUTPUT: &str = "build-output";
const KIND_BUILTIN_SPECS: &str = "builtin-specs";
const KIND_COMPILATION_DATABASE: &str = "compilation-database";

/// Represent the modes the application can run in.
///
/// Parsing a build log runs on the caller thread. The builtin and the
/// database detection are scheduled on the session workers and joined by
/// their family.
pub enum Mode {
    Parse { application: Application, input: Option<PathBuf>, provider: String },
    Detect { application: Application, family: &'static str, providers: Vec<String>, force: bool },
}

/// The session and the files it reports to.
pub struct Application {
    session: Session,
    state: Option<PathBuf>,
    output: Option<PathBuf>,
    reported: Vec<String>,
}

impl Mode {
    /// Configure the application mode based on the command line arguments and the configuration.
    ///
    /// The provider identifiers are checked here, so a typo is reported
    /// before anything runs.
    pub fn configure(
        context: Context,
        args: args::Arguments,
        config: config::Main,
    ) -> Result<Self, ConfigurationError> {
        let state = args.state.map(PathBuf::from);
        let output = args.output.map(PathBuf::from);

        let (family, requested) = match &args.mode {
            args::Mode::Parse { provider, .. } => (KIND_BUILD_OUTPUT, provider),
            args::Mode::Builtins { provider, .. } => (KIND_BUILTIN_SPECS, provider),
            args::Mode::Database { provider, .. } => (KIND_COMPILATION_DATABASE, provider),
        };
        let selected = select_providers(&config.providers, family, requested.as_deref())?;

        let document = match &state {
            Some(path) => persistence::load(path)?,
            None => Document::new(vec![]),
        };
        let restored = restore(&config.providers, &document)?;

        let run_context = run_context(&context, &config, state.as_deref())?;
        let cancellation = CancellationToken::new();
        if let Err(error) = cancellation.cancel_on_signals() {
            log::warn!("Failed to install signal handlers: {error}");
        }
        let session = Session::new(restored, run_context, config.scheduler.workers, cancellation);

        match args.mode {
            args::Mode::Parse { input, .. } => {
                log::debug!("Mode: parse build output");
                let provider = selected.into_iter().next().ok_or(ConfigurationError::NoProvider { kind: family })?;
                let application = Application { session, state, output, reported: vec![provider.clone()] };
                Ok(Self::Parse { application, input: input.map(PathBuf::from), provider })
            }
            args::Mode::Builtins { force, .. } | args::Mode::Database { force, .. } => {
                log::debug!("Mode: detect with {family} providers");
                let application = Application { session, state, output, reported: selected.clone() };
                Ok(Self::Detect { application, family, providers: selected, force })
            }
        }
    }

    /// It actually runs the application mode.
    ///
    /// These errors are all run-time errors, the user was passing valid
    /// arguments and configuration.
    pub fn run(self) -> ExitCode {
        let (application, status) = match self {
            Self::Parse { application, input, provider } => {
                let status = parse(&application.session, input.as_deref(), &provider);
                (application, status)
            }
            Self::Detect { application, family, providers, force } => {
                let status = detect(&application.session, family, &providers, force);
                (application, status)
            }
        };
        let status = status.and_then(|success| application.finish().map(|_| success));
        match status {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(error) => {
                log::error!("langsettings: {error:#}");
                ExitCode::FAILURE
            }
        }
    }
}

fn parse(session: &Session, input: Option<&Path>, provider: &str) -> anyhow::Result<bool> {
    let mut content = Vec::new();
    match input {
        Some(path) => {
            fs::File::open(path)
                .and_then(|mut file| file.read_to_end(&mut content))
                .with_context(|| format!("Failed to read build log {}", path.display()))?;
        }
        None => {
            io::stdin().lock().read_to_end(&mut content).with_context(|| "Failed to read build log from stdin")?;
        }
    }
    let lines = String::from_utf8_lossy(&content).lines().map(str::to_string).collect::<Vec<_>>();

    let count = session.parse_build_output(provider, lines)?;
    log::info!("Provider '{provider}' recognized {count} compiler invocations");
    Ok(true)
}

fn detect(session: &Session, family: &str, providers: &[String], force: bool) -> anyhow::Result<bool> {
    for id in providers {
        if !session.request_run(id, Trigger::Explicit { force }) {
            log::debug!("Run of '{id}' is already queued");
        }
    }
    session.join(family);

    let mut success = true;
    for id in providers {
        match session.outcome(id) {
            Some(Outcome::Finished(result)) if result.cancelled => log::warn!("Provider '{id}' was cancelled"),
            Some(Outcome::Finished(result)) if !result.executed => log::info!("Provider '{id}' is up to date"),
            Some(Outcome::Finished(result)) => {
                log::info!("Provider '{id}' finished, entries changed: {}", result.changed)
            }
            Some(Outcome::Failed(message)) => {
                log::error!("Provider '{id}' failed: {message}");
                success = false;
            }
            None => log::warn!("Provider '{id}' did not run"),
        }
    }
    Ok(success)
}

/// The entries one provider reports.
#[derive(Debug, Serialize)]
struct Report {
    provider: String,
    kind: &'static str,
    executed: bool,
    entries: Vec<StoredEntries>,
}

impl Application {
    /// Writes the report and the state file.
    fn finish(self) -> anyhow::Result<()> {
        let reports: Vec<Report> = self
            .session
            .providers()
            .iter()
            .filter(|provider| self.reported.iter().any(|id| id == provider.id()))
            .map(report)
            .collect();

        match &self.output {
            Some(path) => {
                let file = fs::File::create(path)
                    .with_context(|| format!("Failed to create output file {}", path.display()))?;
                write_report(io::BufWriter::new(file), &reports)
                    .with_context(|| format!("Failed to write output file {}", path.display()))?;
            }
            None => write_report(io::stdout().lock(), &reports).with_context(|| "Failed to write the output")?,
        }

        if let Some(path) = &self.state {
            persistence::save(path, &self.session.document())?;
            log::info!("State saved to {}", path.display());
        }
        Ok(())
    }
}

fn report(provider: &Provider) -> Report {
    let state = provider.state();
    Report {
        provider: provider.id().to_string(),
        kind: state.configuration.detector.kind(),
        executed: state.executed(),
        entries: state
            .storage()
            .iter()
            .map(|(key, entries)| StoredEntries { key: key.clone(), entries: entries.clone() })
            .collect(),
    }
}

fn write_report<W: Write>(mut writer: W, reports: &[Report]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, reports)?;
    writeln!(writer)?;
    writer.flush()
}

/// Picks the providers of a kind, or checks the one asked for.
fn select_providers(
    configurations: &[Configuration],
    kind: &'static str,
    requested: Option<&str>,
) -> Result<Vec<String>, ConfigurationError> {
    match requested {
        Some(id) => {
            let configuration = configurations
                .iter()
                .find(|configuration| configuration.id == id)
                .ok_or_else(|| ConfigurationError::UnknownProvider { id: id.to_string() })?;
            if configuration.detector.kind() != kind {
                return Err(ConfigurationError::WrongKind { id: id.to_string(), expected: kind });
            }
            Ok(vec![id.to_string()])
        }
        None => {
            let selected: Vec<String> = configurations
                .iter()
                .filter(|configuration| configuration.detector.kind() == kind)
                .map(|configuration| configuration.id.clone())
                .collect();
            if selected.is_empty() {
                return Err(ConfigurationError::NoProvider { kind });
            }
            Ok(selected)
        }
    }
}

/// Creates the configured providers, taking over the stored state of those
/// which are configured the same way as when the state was saved.
fn restore(configurations: &[Configuration], document: &Document) -> Result<Vec<Restored>, ConfigurationError> {
    let providers = provider::create_all(configurations)?;

    let mut restored = Vec::with_capacity(providers.len());
    for provider in providers {
        let record = document.providers.iter().find(|record| record.id == provider.id());
        let unchanged = record.is_some_and(|record| {
            record.configuration().is_ok_and(|stored| stored == provider.state().configuration)
        });
        match record {
            Some(record) if unchanged => {
                log::debug!("Restoring provider '{}' from the state", record.id);
                restored.push(record.restore()?);
            }
            Some(record) => {
                log::info!("Configuration of '{}' changed, its stored state is dropped", record.id);
                restored.push(Restored { provider, signature: None });
            }
            None => restored.push(Restored { provider, signature: None }),
        }
    }
    Ok(restored)
}

fn run_context(
    context: &Context,
    config: &config::Main,
    state: Option<&Path>,
) -> Result<RunContext, ConfigurationError> {
    let mut workspace = config.workspace.clone();
    if workspace.projects.is_empty() {
        let name = context
            .current_directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        log::debug!("No project configured, using '{name}' at the current directory");
        workspace.projects.push(config::Project {
            name,
            location: context.current_directory.clone(),
            references: vec![],
        });
    }

    let state_location = context.current_directory.join(state_location(state));
    fs::create_dir_all(&state_location)
        .map_err(|source| ConfigurationError::StateLocation { path: state_location.clone(), source })?;

    let build_parsers: BTreeMap<String, Configuration> = config
        .providers
        .iter()
        .filter(|configuration| configuration.detector.kind() == KIND_BUILD_OUTPUT)
        .map(|configuration| (configuration.id.clone(), configuration.clone()))
        .collect();

    Ok(RunContext {
        lookup: Arc::new(FsWorkspace::new(&workspace)),
        launcher: Arc::new(SystemLauncher),
        environment: context.environment_snapshot(),
        toolchain: config.toolchain.clone(),
        languages: workspace.languages.clone(),
        builder_cwd: Some(context.current_directory.clone()),
        state_location,
        build_parsers,
    })
}

/// The directory next to the state file, or the cache directory of the user.
fn state_location(state: Option<&Path>) -> PathBuf {
    let beside_state = state
        .and_then(Path::parent)
        .map(|parent| if parent.as_os_str().is_empty() { Path::new(".") } else { parent })
        .map(Path::to_path_buf);
    let cache = || ProjectDirs::from("org", "langsettings", "langsettings").map(|dirs| dirs.cache_dir().to_path_buf());
    beside_state
        .or_else(cache)
        .unwrap_or_else(|| env::temp_dir().join("langsettings"))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Unknown provider '{id}'")]
    UnknownProvider { id: String },
    #[error("Provider '{id}' is not a {expected} provider")]
    WrongKind { id: String, expected: &'static str },
    #[error("No {kind} provider is configured")]
    NoProvider { kind: &'static str },
    #[error("Failed to create state directory {path}: {source}", path = path.display())]
    StateLocation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
