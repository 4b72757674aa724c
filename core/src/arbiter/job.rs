//! arbiter/job.rs
//! One compression race: registration, task tracking, and the final join.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::arbiter::best::{BestSlot, Candidate};
use crate::arbiter::outcome::RegistrationOutcome;
use crate::arbiter::verify::{Flate2Verifier, LibdeflateVerifier, Verifier};
use crate::candidates::{enqueue_default, CandidateRunner, ToolSet};
use crate::config::RaceConfig;
use crate::engine::{EngineHandle, TaskHandle};
use crate::telemetry::{RaceCounters, RaceSnapshot, Stage};
use crate::types::JobError;
use crate::utils::{lock_unpoisoned, percent_of};

/// Winner of a finished race.
#[derive(Clone, Debug)]
pub struct RaceOutcome {
    pub best: Bytes,
    pub source: String,
    pub snapshot: RaceSnapshot,
}

struct JobShared {
    name: String,
    input: Bytes,
    engine: EngineHandle,
    config: RaceConfig,
    tools: ToolSet,
    primary: Arc<dyn Verifier>,
    secondary: Arc<dyn Verifier>,
    best: BestSlot,
    pending: Mutex<Vec<TaskHandle<()>>>,
    counters: RaceCounters,
    started: Instant,
}

/// Shared handle to one race. Clones refer to the same job, so runners
/// can carry it onto worker threads.
#[derive(Clone)]
pub struct RaceJob {
    shared: Arc<JobShared>,
}

pub struct RaceJobBuilder {
    engine: EngineHandle,
    input: Bytes,
    name: String,
    config: Option<RaceConfig>,
    tools: Option<ToolSet>,
    verifiers: Option<(Arc<dyn Verifier>, Arc<dyn Verifier>)>,
}

impl RaceJobBuilder {
    pub fn config(mut self, config: RaceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use exactly these tools instead of probing the system.
    pub fn tools(mut self, tools: ToolSet) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Replace the two decoders used for verification.
    pub fn verifiers(mut self, primary: Arc<dyn Verifier>, secondary: Arc<dyn Verifier>) -> Self {
        self.verifiers = Some((primary, secondary));
        self
    }

    pub fn build(self) -> Result<RaceJob, JobError> {
        if self.input.is_empty() {
            return Err(JobError::EmptyInput);
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(JobError::BlankName);
        }
        let config = self.config.unwrap_or_default();
        let tools = match self.tools {
            Some(tools) => tools,
            None => ToolSet::discover(&config),
        };
        let (primary, secondary) = self.verifiers.unwrap_or_else(|| {
            (
                Arc::new(Flate2Verifier) as Arc<dyn Verifier>,
                Arc::new(LibdeflateVerifier) as Arc<dyn Verifier>,
            )
        });

        Ok(RaceJob {
            shared: Arc::new(JobShared {
                name: format!("{} ({}B)", name, self.input.len()),
                input: self.input,
                engine: self.engine,
                config,
                tools,
                primary,
                secondary,
                best: BestSlot::new(),
                pending: Mutex::new(Vec::new()),
                counters: RaceCounters::new(),
                started: Instant::now(),
            }),
        })
    }
}

impl RaceJob {
    pub fn builder(engine: EngineHandle, input: impl Into<Bytes>, name: &str) -> RaceJobBuilder {
        RaceJobBuilder {
            engine,
            input: input.into(),
            name: name.to_string(),
            config: None,
            tools: None,
            verifiers: None,
        }
    }

    /// A job with default settings and discovered tools.
    pub fn new(engine: EngineHandle, input: impl Into<Bytes>, name: &str) -> Result<Self, JobError> {
        Self::builder(engine, input, name).build()
    }

    /// Name decorated with the input size, e.g. `"data.bin (1024B)"`.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn input(&self) -> &Bytes {
        &self.shared.input
    }

    pub fn config(&self) -> &RaceConfig {
        &self.shared.config
    }

    pub fn tools(&self) -> &ToolSet {
        &self.shared.tools
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.shared.engine
    }

    pub fn counters(&self) -> &RaceCounters {
        &self.shared.counters
    }

    pub fn best_size(&self) -> Option<usize> {
        self.shared.best.size()
    }

    pub fn best(&self) -> Option<Candidate> {
        self.shared.best.snapshot()
    }

    /// True if a candidate of `size` bytes could still become the best.
    pub fn is_promising(&self, size: usize) -> bool {
        self.shared.best.is_promising(size)
    }

    // -------------------------------------------------------------------------
    // Work tracking
    // -------------------------------------------------------------------------

    /// Submit work that belongs to this job; `run` waits for it.
    pub fn spawn<F>(&self, work: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let handle = self.shared.engine.submit(work);
        self.shared.counters.task_spawned();
        trace!(target: "ultragz::arbiter", job = %self.name(), task = handle.id(), "job task spawned");
        lock_unpoisoned(&self.shared.pending).push(handle);
    }

    /// Submit one candidate runner.
    pub fn enqueue(&self, runner: Box<dyn CandidateRunner>) {
        let job = self.clone();
        self.spawn(move || runner.run(&job));
    }

    /// Wait for every tracked task, including ones spawned while waiting.
    /// Failures are logged and counted; they never stop the join.
    fn join_all(&self) {
        loop {
            let next = lock_unpoisoned(&self.shared.pending).pop();
            let Some(handle) = next else { break };
            if let Err(e) = handle.wait() {
                self.shared.counters.task_failed();
                warn!(
                    target: "ultragz::arbiter",
                    job = %self.name(),
                    task = handle.id(),
                    error = %e,
                    "candidate task failed"
                );
            }
        }
    }

    /// Race every default variant and return the smallest verified result.
    pub fn run(&self) -> Result<RaceOutcome, JobError> {
        self.run_with(enqueue_default)
    }

    /// Race the variants `seed` submits (via `enqueue` or `spawn`).
    pub fn run_with<F>(&self, seed: F) -> Result<RaceOutcome, JobError>
    where
        F: FnOnce(&RaceJob),
    {
        info!(target: "ultragz::arbiter", job = %self.name(), "race started");
        seed(self);
        self.join_all();

        let snapshot = self.telemetry();
        match self.shared.best.snapshot() {
            Some(best) => {
                info!(
                    target: "ultragz::arbiter",
                    job = %self.name(),
                    source = %best.source,
                    size = best.len(),
                    elapsed_ms = snapshot.elapsed.as_millis() as u64,
                    "race finished"
                );
                Ok(RaceOutcome {
                    best: best.bytes,
                    source: best.source,
                    snapshot,
                })
            }
            None => Err(JobError::NoValidCandidate(self.name().to_string())),
        }
    }

    pub fn telemetry(&self) -> RaceSnapshot {
        let best = self.shared.best.snapshot();
        RaceSnapshot::from(
            self.name(),
            &self.shared.counters,
            self.shared.started,
            self.shared.input.len(),
            best.as_ref(),
        )
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Offer a candidate. Cheap size checks run before each decoder so
    /// clearly losing candidates are never fully verified.
    pub fn register(&self, candidate: &Bytes, source: &str) -> RegistrationOutcome {
        let outcome = self.evaluate(candidate, source);
        self.shared.counters.record(outcome, candidate.len());

        match outcome {
            RegistrationOutcome::Improvement => {
                let input_len = self.shared.input.len();
                info!(
                    target: "ultragz::arbiter",
                    job = %self.name(),
                    %source,
                    size = candidate.len(),
                    percent = percent_of(candidate.len(), input_len),
                    "{} improved {} down to {}B ({}%)",
                    source,
                    self.name(),
                    candidate.len(),
                    percent_of(candidate.len(), input_len)
                );
            }
            RegistrationOutcome::Invalid => {
                warn!(
                    target: "ultragz::arbiter",
                    job = %self.name(),
                    %source,
                    size = candidate.len(),
                    "candidate does not decode to the input; rejected"
                );
            }
            RegistrationOutcome::NoImprovement => {
                trace!(target: "ultragz::arbiter", job = %self.name(), %source, size = candidate.len(), "no improvement");
            }
        }
        outcome
    }

    fn evaluate(&self, candidate: &Bytes, source: &str) -> RegistrationOutcome {
        let shared = &self.shared;
        let gate = shared.config.size_gate;

        if candidate.is_empty() {
            return RegistrationOutcome::Invalid;
        }
        if !gate.admits(shared.best.size(), candidate.len()) {
            shared.counters.gated();
            return RegistrationOutcome::NoImprovement;
        }
        if !self.verify(shared.primary.as_ref(), candidate, source) {
            return RegistrationOutcome::Invalid;
        }
        if gate.second_check && !shared.best.is_promising(candidate.len()) {
            shared.counters.second_gate_skip();
            return RegistrationOutcome::NoImprovement;
        }
        if !self.verify(shared.secondary.as_ref(), candidate, source) {
            return RegistrationOutcome::Invalid;
        }
        if shared.best.offer(candidate, source) {
            RegistrationOutcome::Improvement
        } else {
            RegistrationOutcome::NoImprovement
        }
    }

    fn verify(&self, verifier: &dyn Verifier, candidate: &[u8], source: &str) -> bool {
        let started = Instant::now();
        let result = verifier.matches(candidate, &self.shared.input);
        self.shared.counters.add_stage_time(Stage::Verify, started.elapsed());
        match result {
            Ok(true) => true,
            Ok(false) => {
                debug!(target: "ultragz::arbiter", decoder = verifier.name(), %source, "decoded bytes differ from input");
                false
            }
            Err(e) => {
                debug!(target: "ultragz::arbiter", decoder = verifier.name(), %source, error = %e, "decode failed");
                false
            }
        }
    }
}
