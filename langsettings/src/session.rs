// SPDX-License-Identifier: GPL-3.0-or-later

//! Owns the providers of a workspace and schedules their runs.
//!
//! Each provider sits behind its own lock, so runs of one provider are
//! sequential while different providers run in parallel. Run requests go
//! through the [`Scheduler`], which keeps at most one request per
//! provider waiting. Builtin-specs detectors consult their
//! [`RerunPolicy`] before doing any work.

use crate::entry::Entry;
use crate::persistence::{Document, ProviderRecord, Restored};
use crate::provider::{
    BuildCommandParser, ParseContext, Provider, ProviderError, RunContext, RunResult, SettingsProvider,
};
use crate::rerun::{RerunPolicy, RunSignature};
use crate::scheduler::{CancellationToken, Scheduler};
use crate::workspace::Resource;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// What caused a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Asked for by the user; `force` bypasses the change detection.
    Explicit { force: bool },
    /// The environment changed; runs only when the signature differs.
    EnvironmentChanged,
}

impl Trigger {
    fn force(&self) -> bool {
        matches!(self, Trigger::Explicit { force: true })
    }
}

/// The result of the last scheduled run of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Finished(RunResult),
    Failed(String),
}

struct Slot {
    provider: Provider,
    policy: RerunPolicy,
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Session {
    slots: BTreeMap<String, Shared<Slot>>,
    context: Arc<RwLock<RunContext>>,
    outcomes: Shared<BTreeMap<String, Outcome>>,
    scheduler: Scheduler,
}

impl Session {
    pub fn new(providers: Vec<Restored>, context: RunContext, workers: usize, cancellation: CancellationToken) -> Self {
        let slots = providers
            .into_iter()
            .map(|restored| {
                let id = restored.provider.id().to_string();
                let slot = Slot { provider: restored.provider, policy: RerunPolicy::new(restored.signature) };
                (id, Arc::new(Mutex::new(slot)))
            })
            .collect();
        Self {
            slots,
            context: Arc::new(RwLock::new(context)),
            outcomes: Arc::default(),
            scheduler: Scheduler::new(workers, cancellation),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// The run group a provider belongs to.
    pub fn family(&self, id: &str) -> Option<String> {
        self.slots.get(id).map(|slot| lock(slot).provider.configuration().detector.kind().to_string())
    }

    fn context(&self) -> RunContext {
        self.context.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Queues a run of the provider.
    ///
    /// Returns false when the provider is unknown, or a run of it was
    /// already waiting and this request was merged into it.
    pub fn request_run(&self, id: &str, trigger: Trigger) -> bool {
        let Some(slot) = self.slots.get(id) else {
            log::warn!("Unknown provider: {id}");
            return false;
        };
        let family = lock(slot).provider.configuration().detector.kind().to_string();

        let slot = Arc::clone(slot);
        let context = Arc::clone(&self.context);
        let outcomes = Arc::clone(&self.outcomes);
        let key = id.to_string();
        self.scheduler.schedule(
            id,
            &family,
            Box::new(move |cancellation| {
                let context = context.read().unwrap_or_else(PoisonError::into_inner).clone();
                let outcome = match run_slot(&mut lock(&slot), &context, trigger, cancellation) {
                    Ok(result) => Outcome::Finished(result),
                    Err(error) => {
                        log::error!("{error}");
                        Outcome::Failed(error.to_string())
                    }
                };
                lock(&outcomes).insert(key, outcome);
            }),
        )
    }

    /// Replaces the environment snapshot and re-checks every detector.
    ///
    /// Only detectors whose signature changed with the new environment
    /// actually run.
    pub fn environment_changed(&self, environment: BTreeMap<String, String>) {
        self.context.write().unwrap_or_else(PoisonError::into_inner).environment = environment;
        for (id, slot) in &self.slots {
            if matches!(lock(slot).provider, Provider::BuiltinSpecs(_)) {
                self.request_run(id, Trigger::EnvironmentChanged);
            }
        }
    }

    /// Waits until every queued and running job of the family finished.
    pub fn join(&self, family: &str) {
        self.scheduler.join(family);
    }

    pub fn outcome(&self, id: &str) -> Option<Outcome> {
        lock(&self.outcomes).get(id).cloned()
    }

    /// Feeds a build log through a build-output parser.
    pub fn parse_build_output<I>(&self, id: &str, lines: I) -> Result<usize, ProviderError>
    where
        I: IntoIterator<Item = String>,
    {
        let Some(slot) = self.slots.get(id) else {
            return Err(ProviderError::WrongKind { id: id.to_string(), expected: "build-output" });
        };
        let context = self.context();
        let mut slot = lock(slot);
        let Provider::BuildOutput(parser) = &mut slot.provider else {
            return Err(ProviderError::WrongKind { id: id.to_string(), expected: "build-output" });
        };
        Ok(parse_with(parser, &context, lines))
    }

    pub fn entries(&self, id: &str, resource: Option<&Resource>, language: Option<&str>) -> Option<Vec<Entry>> {
        self.slots.get(id).and_then(|slot| lock(slot).provider.entries(resource, language))
    }

    /// Copies of the providers, in id order.
    pub fn providers(&self) -> Vec<Provider> {
        self.slots.values().map(|slot| lock(slot).provider.clone()).collect()
    }

    /// The persistence document of the current provider states.
    pub fn document(&self) -> Document {
        let records = self
            .slots
            .values()
            .map(|slot| {
                let slot = lock(slot);
                ProviderRecord::from_provider(&slot.provider, slot.policy.last())
            })
            .collect();
        Document::new(records)
    }
}

fn parse_with<I>(parser: &mut BuildCommandParser, context: &RunContext, lines: I) -> usize
where
    I: IntoIterator<Item = String>,
{
    let project = context.project_for(&parser.state().configuration);
    let parse_context = ParseContext {
        lookup: context.lookup.as_ref(),
        project: project.as_ref(),
        builder_cwd: context.builder_cwd.as_deref(),
    };
    parser.parse_build_output(lines, parse_context)
}

fn run_slot(
    slot: &mut Slot,
    context: &RunContext,
    trigger: Trigger,
    cancellation: &CancellationToken,
) -> Result<RunResult, ProviderError> {
    let force = trigger.force();
    let detector = match &mut slot.provider {
        Provider::BuiltinSpecs(detector) => detector,
        other => return other.run(context, force, cancellation),
    };

    let signature = RunSignature::capture(detector.command(), &detector.languages(context), context);
    if detector.state().executed() && !slot.policy.should_run(&signature, force) {
        log::info!("{}: unchanged, not running ({trigger:?})", detector.state().configuration.id);
        return Ok(RunResult::skipped());
    }

    let result = detector.run(context, cancellation);
    match &result {
        Ok(result) if result.executed => slot.policy.record(signature),
        Ok(_) => {}
        // The run completed even if some languages failed.
        Err(ProviderError::Languages { .. }) => slot.policy.record(signature),
        Err(_) => slot.policy.forget(),
    }
    result
}
