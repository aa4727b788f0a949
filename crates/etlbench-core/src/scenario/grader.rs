//! Replay grader.
//!
//! Grading always starts from freshly created databases in its own
//! directory, so the verdict depends only on the artifact and the scenario
//! configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use etlbench_store::{
    DatasetStore, OrderRecord, TargetRow, SOURCE_ALIAS, SOURCE_SCHEMA, TARGET_SCHEMA,
};

use super::invariants::{check, Observation};
use super::schedule::build_schedule;
use super::{ScenarioConfig, ScenarioError};
use crate::domain::{FailureReason, GradeResult, Result};
use crate::metrics::METRICS;

pub const SOURCE_DB: &str = "source.db";
pub const WAREHOUSE_DB: &str = "warehouse.db";

/// Replays a scenario against one artifact.
#[derive(Debug, Clone)]
pub struct Grader {
    config: ScenarioConfig,
    work_dir: PathBuf,
}

impl Grader {
    pub fn new(config: ScenarioConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Grade on a blocking worker.
    pub async fn grade_async(self, artifact: Option<String>) -> Result<GradeResult> {
        let grade = tokio::task::spawn_blocking(move || self.grade(artifact.as_deref())).await??;
        Ok(grade)
    }

    /// Replay every day and collect failures. Blocking.
    #[instrument(skip_all, fields(work_dir = %self.work_dir.display()))]
    pub fn grade(&self, artifact: Option<&str>) -> std::result::Result<GradeResult, ScenarioError> {
        let Some(artifact) = artifact.filter(|a| !a.trim().is_empty()) else {
            info!("No artifact to grade");
            return Ok(GradeResult::no_artifact());
        };
        let schedule = build_schedule(&self.config)?;

        self.reset_work_dir()?;

        let source_path = self.work_dir.join(SOURCE_DB);
        let mut source = DatasetStore::open(&source_path)?;
        source.init_schema(SOURCE_SCHEMA)?;

        let mut warehouse = DatasetStore::open(&self.work_dir.join(WAREHOUSE_DB))?;
        warehouse.init_schema(TARGET_SCHEMA)?;
        warehouse.attach_read_only(&source_path, SOURCE_ALIAS)?;
        warehouse.lock_down();

        let timeout = Duration::from_millis(self.config.invocation_timeout_ms);
        let mut failures = Vec::new();
        let mut invocations = 0usize;
        let mut source_keys = BTreeSet::new();
        let mut before: Vec<TargetRow> = Vec::new();

        for day in &schedule {
            let records: Vec<OrderRecord> = day.records().cloned().collect();
            source.insert_orders(&records)?;
            source_keys.extend(records.iter().map(|r| r.order_id));
            debug!(day = day.index, date = %day.date, records = records.len(), "Day inserted");

            for invocation in 1..=day.invocations {
                invocations += 1;
                warehouse.set_run_context(&day.run_context(invocation))?;

                if let Err(err) = warehouse.run_script(artifact, timeout) {
                    // Statements before the failure may have committed; the
                    // invariants below still see their effect.
                    warn!(day = day.index, invocation, error = %err, "Artifact faulted");
                    failures.push(FailureReason::ArtifactFault {
                        day: day.index,
                        invocation,
                        detail: err.to_string(),
                    });
                }

                let after = match warehouse.read_target() {
                    Ok(rows) => rows,
                    Err(err) => {
                        failures.push(FailureReason::SnapshotFault {
                            day: day.index,
                            invocation,
                            detail: err.to_string(),
                        });
                        continue;
                    }
                };

                let observation = Observation {
                    day,
                    invocation,
                    before: &before,
                    after: &after,
                    source_keys: &source_keys,
                };
                for invariant in day.invariants_due(invocation) {
                    if let Err(detail) = check(invariant, &observation) {
                        debug!(day = day.index, invocation, %invariant, %detail, "Invariant failed");
                        failures.push(FailureReason::Invariant {
                            day: day.index,
                            invocation,
                            invariant,
                            detail,
                        });
                    }
                }
                before = after;
            }
        }

        let invariant_failures = failures
            .iter()
            .filter(|f| f.invariant().is_some())
            .count();
        METRICS.add_invariant_failures(invariant_failures as u64);

        let grade = GradeResult::from_failures(failures, schedule.len(), invocations);
        info!(
            passed = grade.passed,
            failures = grade.failures.len(),
            invocations,
            "Replay graded"
        );
        Ok(grade)
    }

    /// Remove the replay databases from a previous grading. Nothing else in
    /// the work dir is touched.
    fn reset_work_dir(&self) -> std::result::Result<(), ScenarioError> {
        std::fs::create_dir_all(&self.work_dir)?;
        for db in [SOURCE_DB, WAREHOUSE_DB] {
            for suffix in ["", "-journal", "-wal", "-shm"] {
                let path = self.work_dir.join(format!("{db}{suffix}"));
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "Removed stale replay file"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}
