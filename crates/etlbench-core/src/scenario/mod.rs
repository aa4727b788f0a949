//! Scenario simulator and grader for the ETL-repair task.
//!
//! A scenario is a deterministic multi-day timeline: each day appends a batch
//! of source orders, possibly with injected edge cases (late arrivals, a
//! record sitting exactly on the watermark), and runs the submitted job once
//! or twice. Invariants are checked after every invocation.
//!
//! # Modules
//!
//! - [`schedule`]   - `ScenarioDay`, `build_schedule`, `sample_orders`
//! - [`invariants`] - per-invocation checks
//! - [`grader`]     - `Grader` (replay on fresh databases)
//! - [`task`]       - prompt, broken job, artifact extraction

pub mod grader;
pub mod invariants;
pub mod schedule;
pub mod task;

pub use grader::Grader;
pub use schedule::{build_schedule, sample_orders, sample_run_context, ScenarioDay};
pub use task::{artifact_diff, artifact_digest, extract_artifact, task_prompt, BROKEN_ARTIFACT};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Errors raised while building or replaying a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("invalid scenario configuration: {0}")]
    InvalidConfig(String),

    #[error("grader store error: {0}")]
    Store(#[from] etlbench_store::StoreError),

    #[error("grader io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Timeline parameters. Defaults reproduce the canonical ten-day scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioConfig {
    pub start_date: NaiveDate,
    pub days: usize,
    pub records_per_day: usize,
    /// Day indices that receive late-arriving records.
    pub late_arrival_days: Vec<usize>,
    /// Share of `records_per_day` injected as late arrivals (at least one).
    pub late_fraction: f64,
    /// How far in the past late records are dated.
    pub late_lag_days: u64,
    /// Day indices on which the job runs twice against the same batch.
    pub duplicate_run_days: Vec<usize>,
    /// Day indices that receive a record dated exactly at the watermark.
    pub boundary_days: Vec<usize>,
    pub seed: u64,
    /// Wall-clock limit for one job invocation (milliseconds).
    pub invocation_timeout_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2023, 1, 25).unwrap_or_default(),
            days: 10,
            records_per_day: 100,
            late_arrival_days: vec![8],
            late_fraction: 0.01,
            late_lag_days: 7,
            duplicate_run_days: vec![5],
            boundary_days: vec![3],
            seed: 42,
            invocation_timeout_ms: 10_000,
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |msg: String| Err(ScenarioError::InvalidConfig(msg));
        if self.days == 0 {
            return invalid("days must be positive".to_string());
        }
        if self.records_per_day == 0 {
            return invalid("records_per_day must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.late_fraction) {
            return invalid(format!(
                "late_fraction must be within [0, 1], got {}",
                self.late_fraction
            ));
        }
        if self.late_lag_days == 0 {
            return invalid("late_lag_days must be positive".to_string());
        }
        if self.invocation_timeout_ms == 0 {
            return invalid("invocation_timeout_ms must be positive".to_string());
        }
        let days = self
            .late_arrival_days
            .iter()
            .chain(&self.duplicate_run_days)
            .chain(&self.boundary_days);
        for &day in days {
            if day >= self.days {
                return invalid(format!("day index {day} outside a {}-day scenario", self.days));
            }
        }
        if self.boundary_days.contains(&0) {
            return invalid("boundary day 0 has no watermark to sit on".to_string());
        }
        Ok(())
    }
}
