// SPDX-License-Identifier: GPL-3.0-or-later

//! Detects the builtin settings of a compiler by running it.
//!
//! For every language the detector resolves the configured command
//! template, launches it, and classifies each output line. The entries of
//! one language are stored under the global key of that language, marked
//! builtin and read-only.

pub mod classifier;
pub mod command;

use super::state::{Configuration, Detector, ProviderState};
use super::{ProviderError, RunContext, RunResult};
use crate::entry::{self, Entry, Flags, Kind};
use crate::environment::PROBE_ENVIRONMENT;
use crate::launcher::{LaunchOutcome, LaunchRequest, Stream};
use crate::resolver::{LinePaths, PathResolver};
use crate::scheduler::CancellationToken;
use crate::workspace::MemberIndex;
use classifier::{Classified, OutputClassifier};
use command::{CommandInputs, EnvironmentVariables, SpecFile, VAR_COMMAND, VAR_INPUTS, resolve_command, uses_variable};

/// The console output target of the probe.
pub const CONSOLE_TARGET: &str = "langsettings::console";

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinSpecsDetector {
    state: ProviderState,
}

enum LanguageRun {
    Completed,
    Cancelled,
}

impl BuiltinSpecsDetector {
    pub fn new(configuration: Configuration) -> Result<Self, ProviderError> {
        Self::from_state(ProviderState::new(configuration))
    }

    pub(crate) fn from_state(state: ProviderState) -> Result<Self, ProviderError> {
        match &state.configuration.detector {
            Detector::BuiltinSpecs { .. } => Ok(Self { state }),
            _ => Err(ProviderError::WrongKind { id: state.configuration.id.clone(), expected: "builtin-specs" }),
        }
    }

    pub fn state(&self) -> &ProviderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProviderState {
        &mut self.state
    }

    pub fn shallow_copy(&self) -> Self {
        Self { state: self.state.shallow_copy() }
    }

    /// The command template, as configured.
    pub fn command(&self) -> &str {
        match &self.state.configuration.detector {
            Detector::BuiltinSpecs { command, .. } => command,
            _ => "",
        }
    }

    fn console(&self) -> bool {
        matches!(self.state.configuration.detector, Detector::BuiltinSpecs { console: true, .. })
    }

    /// The languages this detector probes.
    pub fn languages(&self, context: &RunContext) -> Vec<String> {
        if self.state.configuration.languages.is_empty() {
            context.toolchain.iter().map(|toolchain| toolchain.language.clone()).collect()
        } else {
            self.state.configuration.languages.clone()
        }
    }

    /// Probes every language in scope.
    ///
    /// A language that fails does not stop the others; the failures are
    /// reported together after the run. Cancellation restores the state
    /// from before the run.
    pub fn run(&mut self, context: &RunContext, cancellation: &CancellationToken) -> Result<RunResult, ProviderError> {
        let id = self.state.configuration.id.clone();
        let previous = self.state.storage().clone();
        let mut failures = vec![];

        log::info!("{id}: detecting builtin settings");
        self.state.startup();
        for language in self.languages(context) {
            if cancellation.is_cancelled() {
                self.state.abort();
                log::info!("{id}: cancelled");
                return Ok(RunResult::cancelled());
            }

            self.state.startup_for_language(&language);
            let outcome = self.run_for_language(&language, context, cancellation);
            self.state.shutdown_for_language();

            match outcome {
                Ok(LanguageRun::Completed) => {}
                Ok(LanguageRun::Cancelled) => {
                    self.state.abort();
                    log::info!("{id}: cancelled");
                    return Ok(RunResult::cancelled());
                }
                Err(error) => {
                    log::error!("{id}: {error}");
                    failures.push(error);
                }
            }
        }
        self.state.shutdown();

        let changed = previous != *self.state.storage();
        log::info!("{id}: finished, changed: {changed}");
        if failures.is_empty() {
            Ok(RunResult::completed(changed))
        } else {
            Err(ProviderError::Languages { id, failures })
        }
    }

    fn run_for_language(
        &mut self,
        language: &str,
        context: &RunContext,
        cancellation: &CancellationToken,
    ) -> Result<LanguageRun, ProviderError> {
        let template = self.command().to_string();
        let toolchain = context.toolchain_for(language);
        if toolchain.is_none() && uses_variable(&template, VAR_COMMAND) {
            return Err(ProviderError::MissingToolchain { language: language.to_string() });
        }

        let extension = context.extension_for(language);
        let spec_file = match (&extension, uses_variable(&template, VAR_INPUTS)) {
            (Some(extension), true) => Some(
                SpecFile::prepare(&context.state_location, extension)
                    .map_err(|source| ProviderError::SpecFile { path: context.state_location.clone(), source })?,
            ),
            _ => None,
        };

        let inputs = CommandInputs {
            compiler: toolchain.map(|toolchain| toolchain.compiler.as_str()),
            flags: toolchain.map(|toolchain| toolchain.flags.as_slice()).unwrap_or_default(),
            inputs: spec_file.as_ref().map(SpecFile::path),
            extension: extension.as_deref(),
        };
        let command = resolve_command(&template, &inputs, &EnvironmentVariables(&context.environment));

        let mut environment = context.environment.clone();
        for (key, value) in PROBE_ENVIRONMENT {
            environment.insert(key.to_string(), value.to_string());
        }
        let project = context.project_for(&self.state.configuration);
        let working_dir = context.builder_cwd.clone().or_else(|| project.as_ref().map(|p| p.location.clone()));
        let request = LaunchRequest { command, environment, working_dir: working_dir.clone() };

        let console = self.console();
        let mut stdout = StreamOutput::default();
        let mut stderr = StreamOutput::default();
        let outcome = context
            .launcher
            .launch(&request, cancellation, &mut |stream, line| {
                if console {
                    log::info!(target: CONSOLE_TARGET, "{line}");
                }
                match stream {
                    Stream::Stdout => stdout.push(line),
                    Stream::Stderr => stderr.push(line),
                }
            })
            .map_err(|source| ProviderError::Launch { language: language.to_string(), source })?;

        match outcome {
            LaunchOutcome::Cancelled => return Ok(LanguageRun::Cancelled),
            LaunchOutcome::Exited { code } if code != Some(0) => {
                log::warn!("{}: '{}' exited with {code:?}", self.state.configuration.id, request.command);
            }
            LaunchOutcome::Exited { .. } => {}
        }

        let members = MemberIndex::new(context.lookup.as_ref());
        let resolver = PathResolver::new(&members, project.as_ref());
        let paths = LinePaths { mapped_root: None, build_dir: working_dir };
        let resolving = self.state.configuration.resolve_paths;
        let builtin = Flags::BUILTIN | Flags::READONLY;
        // The streams are read concurrently; their relative order is not stable.
        let entries: Vec<Entry> = stderr
            .classified
            .into_iter()
            .chain(stdout.classified)
            .map(|found| match found {
                Classified::IncludePath { path, flags } if resolving => {
                    let (name, resolved) = resolver.resolve(Kind::IncludePath, &path, &paths);
                    Entry::include_path(name, builtin | flags | resolved)
                }
                Classified::IncludePath { path, flags } => Entry::include_path(path, builtin | flags),
                Classified::Macro(entry) => entry,
            })
            .collect();
        let entries = entry::dedup(entries);

        log::debug!("{}: {} entries for {language}", self.state.configuration.id, entries.len());
        let key = self.state.key_resource(project.as_ref());
        self.state.set_entries(key, Some(language.to_string()), entries);
        Ok(LanguageRun::Completed)
    }
}

/// The classified lines of one output stream, in the order they were written.
#[derive(Default)]
struct StreamOutput {
    classifier: OutputClassifier,
    classified: Vec<Classified>,
}

impl StreamOutput {
    fn push(&mut self, line: &str) {
        if let Some(found) = self.classifier.classify(line) {
            self.classified.push(found);
        }
    }
}
