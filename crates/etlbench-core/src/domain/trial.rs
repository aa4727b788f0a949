//! Trial records and run summaries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::grade::GradeResult;
use super::message::{Transcript, Usage};

/// Resources one trial consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    pub engine_requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u64,
}

impl ResourceCost {
    pub fn record_response(&mut self, usage: &Usage) {
        self.engine_requests += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
    }

    pub fn record_tool_call(&mut self) {
        self.tool_calls += 1;
    }
}

/// Which layer faulted when a trial could not be graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Protocol,
    Engine,
    Sandbox,
    Grader,
    Panic,
    Infrastructure,
}

/// Graded verdict or infrastructure fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Graded(GradeResult),
    Faulted { kind: FaultKind, description: String },
}

/// Write-once record of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    id: usize,
    #[serde(skip)]
    transcript: Transcript,
    outcome: TrialOutcome,
    duration_ms: u64,
    cost: ResourceCost,
    artifact_digest: Option<String>,
}

impl TrialRecord {
    pub fn new(
        id: usize,
        transcript: Transcript,
        outcome: TrialOutcome,
        duration: Duration,
        cost: ResourceCost,
        artifact_digest: Option<String>,
    ) -> Self {
        Self {
            id,
            transcript,
            outcome,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            cost,
            artifact_digest,
        }
    }

    /// Record for a trial that never produced a grade.
    pub fn faulted(id: usize, kind: FaultKind, description: impl Into<String>) -> Self {
        Self::new(
            id,
            Transcript::new(),
            TrialOutcome::Faulted {
                kind,
                description: description.into(),
            },
            Duration::ZERO,
            ResourceCost::default(),
            None,
        )
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn outcome(&self) -> &TrialOutcome {
        &self.outcome
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn cost(&self) -> &ResourceCost {
        &self.cost
    }

    pub fn artifact_digest(&self) -> Option<&str> {
        self.artifact_digest.as_deref()
    }

    pub fn grade(&self) -> Option<&GradeResult> {
        match &self.outcome {
            TrialOutcome::Graded(grade) => Some(grade),
            TrialOutcome::Faulted { .. } => None,
        }
    }

    pub fn passed(&self) -> bool {
        self.grade().is_some_and(|g| g.passed)
    }

    /// Human-readable failure reasons, one per entry.
    pub fn failure_lines(&self) -> Vec<String> {
        match &self.outcome {
            TrialOutcome::Graded(grade) => grade.failures.iter().map(ToString::to_string).collect(),
            TrialOutcome::Faulted { kind, description } => {
                vec![format!("fault ({kind:?}): {description}")]
            }
        }
    }
}

/// Aggregate over all trials of a run, records in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub records: Vec<TrialRecord>,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub total_duration_ms: u64,
}

impl RunSummary {
    pub fn from_records(records: Vec<TrialRecord>, total_duration: Duration) -> Self {
        let passed = records.iter().filter(|r| r.passed()).count();
        let total = records.len();
        let pass_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };
        Self {
            passed,
            failed: total - passed,
            pass_rate,
            total_duration_ms: u64::try_from(total_duration.as_millis()).unwrap_or(u64::MAX),
            records,
        }
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graded(id: usize, passed: bool) -> TrialRecord {
        let failures = if passed {
            vec![]
        } else {
            vec![super::super::grade::FailureReason::NoArtifact]
        };
        TrialRecord::new(
            id,
            Transcript::new(),
            TrialOutcome::Graded(GradeResult::from_failures(failures, 10, 11)),
            Duration::from_millis(1500),
            ResourceCost::default(),
            None,
        )
    }

    #[test]
    fn test_summary_pass_rate() {
        let summary = RunSummary::from_records(
            vec![graded(1, true), graded(2, false), graded(3, true), graded(4, true)],
            Duration::from_secs(3),
        );
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 1);
        assert!((summary.pass_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_faulted_record_is_failed() {
        let r = TrialRecord::faulted(7, FaultKind::Panic, "boom");
        assert!(!r.passed());
        assert_eq!(r.failure_lines(), vec!["fault (Panic): boom".to_string()]);
    }

    #[test]
    fn test_cost_accumulates() {
        let mut cost = ResourceCost::default();
        cost.record_response(&Usage {
            input_tokens: 10,
            output_tokens: 4,
        });
        cost.record_response(&Usage {
            input_tokens: 5,
            output_tokens: 1,
        });
        cost.record_tool_call();
        assert_eq!(cost.engine_requests, 2);
        assert_eq!(cost.input_tokens, 15);
        assert_eq!(cost.tool_calls, 1);
    }

    #[test]
    fn test_record_serializes_without_transcript() {
        let json = serde_json::to_value(graded(1, true)).unwrap();
        assert!(json.get("transcript").is_none());
        assert_eq!(json["outcome"]["status"], "graded");
        assert_eq!(json["duration_ms"], 1500);
    }
}
