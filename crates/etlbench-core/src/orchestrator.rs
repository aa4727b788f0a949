//! Trial orchestration.
//!
//! Runs N independent trials, each with its own driver, sandbox and grader.
//! Every trial is spawned on its own task so a panic becomes a faulted
//! record instead of taking the run down. In concurrent mode a semaphore
//! caps in-flight trials and finished records arrive over an mpsc channel
//! in completion order.
//!
//! On-disk layout of one run:
//!
//! ```text
//! <output_dir>/<YYYYmmdd_HHMMSS>_etl_repair/
//!     run_summary.json
//!     trial_001_passed/
//!         workspace/   (workspace.db, source.db, artifact.sql)
//!         grader/      (source.db, warehouse.db)
//!         transcript.json
//!         result.json
//!         results.txt
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

use etlbench_store::{OrderRecord, RunContext};

use crate::config::{DriverConfig, EngineConfig, EvalConfig};
use crate::domain::{
    EvalError, FaultKind, ResourceCost, Result, RunSummary, Transcript, TrialOutcome, TrialRecord,
};
use crate::driver::Driver;
use crate::engine::ReasoningEngine;
use crate::metrics::METRICS;
use crate::obs;
use crate::reporting;
use crate::sandbox::{Sandbox, SandboxConfig};
use crate::scenario::{
    artifact_digest, build_schedule, extract_artifact, sample_orders, sample_run_context,
    task_prompt, Grader, ScenarioConfig,
};

/// Subdirectory of a trial holding the agent's workspace.
pub const WORKSPACE_DIR: &str = "workspace";
/// Subdirectory of a trial holding the grader's replay databases.
pub const GRADER_DIR: &str = "grader";

/// Regular records per sampled day in the agent's workspace.
const SAMPLE_PER_DAY: usize = 5;

/// How trials are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One trial at a time, in id order.
    Sequential,
    /// All trials spawned, at most `max_concurrency` in flight.
    Concurrent { max_concurrency: usize },
}

/// Called with each record as its trial completes.
pub type CompletionCallback<'a> = &'a (dyn Fn(&TrialRecord) + Send + Sync);

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub run_dir: PathBuf,
    pub summary: RunSummary,
}

/// Shared, read-only inputs of every trial.
struct TrialContext {
    engine: Arc<dyn ReasoningEngine>,
    engine_config: EngineConfig,
    driver_config: DriverConfig,
    sandbox_config: SandboxConfig,
    scenario_config: ScenarioConfig,
    prompt: String,
    sample: Vec<OrderRecord>,
    sample_context: RunContext,
}

/// Runs a batch of trials against one engine.
pub struct Orchestrator {
    context: Arc<TrialContext>,
    trials: usize,
    mode: ExecutionMode,
    output_dir: PathBuf,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.context.engine.name())
            .field("trials", &self.trials)
            .field("mode", &self.mode)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl Orchestrator {
    /// Validate `config` and precompute the workspace sample.
    pub fn new(config: &EvalConfig, engine: Arc<dyn ReasoningEngine>) -> Result<Self> {
        config.validate()?;
        let schedule = build_schedule(&config.scenario)?;
        let sample_context = sample_run_context(&schedule).ok_or_else(|| {
            EvalError::InvalidConfig("scenario has no day to sample".to_string())
        })?;

        let context = TrialContext {
            engine,
            engine_config: config.engine.clone(),
            driver_config: config.driver.clone(),
            sandbox_config: config.sandbox.clone(),
            scenario_config: config.scenario.clone(),
            prompt: task_prompt(&config.scenario),
            sample: sample_orders(&schedule, SAMPLE_PER_DAY),
            sample_context,
        };

        Ok(Self {
            context: Arc::new(context),
            trials: config.orchestrator.trials,
            mode: config.orchestrator.execution_mode(),
            output_dir: config.orchestrator.output_dir.clone(),
        })
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every trial, persist results, and summarise.
    ///
    /// Always yields exactly one record per trial; faults are recorded, not
    /// propagated. Errors only when the run directory or the summary file
    /// cannot be written.
    #[instrument(skip_all, fields(trials = self.trials, mode = ?self.mode))]
    pub async fn run(
        &self,
        on_complete: Option<CompletionCallback<'_>>,
    ) -> anyhow::Result<RunOutput> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let run_dir = create_run_dir(&self.output_dir)?;
        info!(%run_id, run_dir = %run_dir.display(), engine = self.context.engine.name(), "Run started");

        let records = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(&run_dir, on_complete).await,
            ExecutionMode::Concurrent { max_concurrency } => {
                self.run_concurrent(&run_dir, max_concurrency, on_complete)
                    .await
            }
        };

        let summary = RunSummary::from_records(records, started.elapsed());
        reporting::write_run_summary(&run_dir, &summary)?;
        METRICS.flush();
        info!(
            %run_id,
            passed = summary.passed,
            failed = summary.failed,
            pass_rate = summary.pass_rate,
            "Run finished"
        );

        Ok(RunOutput {
            run_id,
            run_dir,
            summary,
        })
    }

    async fn run_sequential(
        &self,
        run_dir: &Path,
        on_complete: Option<CompletionCallback<'_>>,
    ) -> Vec<TrialRecord> {
        let mut records = Vec::with_capacity(self.trials);
        for id in 1..=self.trials {
            let task = tokio::spawn(run_trial(
                Arc::clone(&self.context),
                id,
                run_dir.to_path_buf(),
            ));
            let record = settle(id, task.await, run_dir);
            notify(on_complete, &record);
            records.push(record);
        }
        records
    }

    async fn run_concurrent(
        &self,
        run_dir: &Path,
        max_concurrency: usize,
        on_complete: Option<CompletionCallback<'_>>,
    ) -> Vec<TrialRecord> {
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(self.trials.max(1));

        for id in 1..=self.trials {
            let context = Arc::clone(&self.context);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let run_dir = run_dir.to_path_buf();

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let task = tokio::spawn(run_trial(context, id, run_dir.clone()));
                let record = settle(id, task.await, &run_dir);
                // Receiver only goes away when the run itself is dropped.
                let _ = tx.send(record).await;
            });
        }
        drop(tx);

        let mut records = Vec::with_capacity(self.trials);
        let mut reported = BTreeSet::new();
        while let Some(record) = rx.recv().await {
            reported.insert(record.id());
            notify(on_complete, &record);
            records.push(record);
        }

        for id in (1..=self.trials).filter(|id| !reported.contains(id)) {
            warn!(trial_id = id, "Trial task ended without reporting");
            let record =
                TrialRecord::faulted(id, FaultKind::Panic, "trial task ended without reporting");
            notify(on_complete, &record);
            records.push(record);
        }
        records
    }
}

fn notify(on_complete: Option<CompletionCallback<'_>>, record: &TrialRecord) {
    if let Some(callback) = on_complete {
        callback(record);
    }
}

/// `<output_dir>/<timestamp>_etl_repair`, suffixed when the second is taken.
fn create_run_dir(output_dir: &Path) -> anyhow::Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{stamp}_etl_repair");
    let mut candidate = output_dir.join(&base);
    let mut suffix = 2;
    while candidate.exists() {
        candidate = output_dir.join(format!("{base}_{suffix}"));
        suffix += 1;
    }
    std::fs::create_dir_all(&candidate)
        .with_context(|| format!("create run directory {:?}", candidate))?;
    Ok(candidate)
}

fn pending_dir(run_dir: &Path, id: usize) -> PathBuf {
    run_dir.join(format!("trial_{id:03}"))
}

/// Turn a joined trial task into its record. A panicked task still gets a
/// persisted, faulted record.
fn settle(
    id: usize,
    joined: std::result::Result<TrialRecord, JoinError>,
    run_dir: &Path,
) -> TrialRecord {
    match joined {
        Ok(record) => record,
        Err(join) => {
            let _span = obs::TrialSpan::enter(id);
            let error = EvalError::from(join);
            obs::emit_trial_fault(id, "panic", &error);
            let record = TrialRecord::faulted(id, FaultKind::Panic, error.to_string());
            persist(&pending_dir(run_dir, id), &record);
            record
        }
    }
}

fn persist(trial_dir: &Path, record: &TrialRecord) {
    if let Err(err) = reporting::persist_trial(trial_dir, record) {
        warn!(trial_id = record.id(), error = %format!("{err:#}"), "Could not persist trial");
    }
}

async fn run_trial(context: Arc<TrialContext>, id: usize, run_dir: PathBuf) -> TrialRecord {
    let span = obs::trial_span(id);
    async move {
        METRICS.inc_trials_started();
        obs::emit_trial_started(id, context.engine.name());

        let started = Instant::now();
        let trial_dir = pending_dir(&run_dir, id);
        let record = execute_trial(context, id, &trial_dir, started).await;

        if record.passed() {
            METRICS.inc_trials_passed();
        }
        obs::emit_trial_finished(
            id,
            u64::try_from(record.duration().as_millis()).unwrap_or(u64::MAX),
            record.cost().tool_calls,
            record.passed(),
        );
        persist(&trial_dir, &record);
        record
    }
    .instrument(span)
    .await
}

async fn execute_trial(
    context: Arc<TrialContext>,
    id: usize,
    trial_dir: &Path,
    started: Instant,
) -> TrialRecord {
    let fault = |transcript: Transcript,
                 cost: ResourceCost,
                 digest: Option<String>,
                 error: EvalError| {
        let kind = error.fault_kind();
        obs::emit_trial_fault(id, &format!("{kind:?}").to_lowercase(), &error);
        TrialRecord::new(
            id,
            transcript,
            TrialOutcome::Faulted {
                kind,
                description: error.to_string(),
            },
            started.elapsed(),
            cost,
            digest,
        )
    };

    let mut sandbox = match open_sandbox(&context, trial_dir.join(WORKSPACE_DIR)).await {
        Ok(sandbox) => sandbox,
        Err(err) => return fault(Transcript::new(), ResourceCost::default(), None, err),
    };

    let driver = Driver::new(
        context.engine.as_ref(),
        &context.engine_config,
        &context.driver_config,
    );
    let run = match driver.run(id, &context.prompt, &mut sandbox).await {
        Ok(run) => run,
        Err(failure) => return fault(failure.transcript, failure.cost, None, failure.error),
    };

    let artifact = run.answer.as_deref().map(extract_artifact);
    let digest = artifact.as_deref().map(artifact_digest);
    if let Some(artifact) = &artifact {
        let dir = trial_dir.join(WORKSPACE_DIR);
        if let Err(err) = reporting::write_artifact_diff(&dir, artifact) {
            warn!(trial_id = id, error = %format!("{err:#}"), "Failed to write artifact diff");
        }
    }
    let grader = Grader::new(context.scenario_config.clone(), trial_dir.join(GRADER_DIR));

    match grader.grade_async(artifact).await {
        Ok(grade) => {
            obs::emit_grade_evaluated(id, grade.passed, grade.failures.len(), grade.invocations);
            TrialRecord::new(
                id,
                run.transcript,
                TrialOutcome::Graded(grade),
                started.elapsed(),
                run.cost,
                digest,
            )
        }
        Err(err) => fault(run.transcript, run.cost, digest, err),
    }
}

async fn open_sandbox(context: &Arc<TrialContext>, root: PathBuf) -> Result<Sandbox> {
    let context = Arc::clone(context);
    let sandbox = tokio::task::spawn_blocking(move || {
        Sandbox::open(
            &root,
            context.sandbox_config.clone(),
            &context.sample,
            context.sample_context,
        )
    })
    .await??;
    Ok(sandbox)
}
