//! Grading verdict types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Correctness properties asserted during replay, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    UniqueKeys,
    ChronologicalLoadOrder,
    RerunIsNoop,
    WatermarkBoundaryInclusive,
    MonthBoundaryAdmitted,
    LateArrivalsAdmitted,
    CompleteLoad,
}

impl Invariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UniqueKeys => "unique_keys",
            Self::ChronologicalLoadOrder => "chronological_load_order",
            Self::RerunIsNoop => "rerun_is_noop",
            Self::WatermarkBoundaryInclusive => "watermark_boundary_inclusive",
            Self::MonthBoundaryAdmitted => "month_boundary_admitted",
            Self::LateArrivalsAdmitted => "late_arrivals_admitted",
            Self::CompleteLoad => "complete_load",
        }
    }

    /// Defect class a failure of this invariant points at.
    pub fn defect_class(&self) -> &'static str {
        match self {
            Self::UniqueKeys => "missing uniqueness guard",
            Self::ChronologicalLoadOrder => "missing explicit load ordering",
            Self::RerunIsNoop => "append without existence check",
            Self::WatermarkBoundaryInclusive => "off-by-one watermark",
            Self::MonthBoundaryAdmitted => "lexicographic date comparison",
            Self::LateArrivalsAdmitted => "watermark drops late records",
            Self::CompleteLoad => "final table differs from a full load",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a grade failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Nothing was submitted.
    NoArtifact,
    Invariant {
        day: usize,
        invocation: u8,
        invariant: Invariant,
        detail: String,
    },
    /// The artifact raised during an invocation.
    ArtifactFault {
        day: usize,
        invocation: u8,
        detail: String,
    },
    /// The target table could not be read back.
    SnapshotFault {
        day: usize,
        invocation: u8,
        detail: String,
    },
}

impl FailureReason {
    pub fn invariant(&self) -> Option<Invariant> {
        match self {
            Self::Invariant { invariant, .. } => Some(*invariant),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoArtifact => f.write_str("no artifact submitted"),
            Self::Invariant {
                day,
                invocation,
                invariant,
                detail,
            } => write!(
                f,
                "day {day} run {invocation}: {invariant} ({}): {detail}",
                invariant.defect_class()
            ),
            Self::ArtifactFault {
                day,
                invocation,
                detail,
            } => write!(f, "day {day} run {invocation}: artifact fault: {detail}"),
            Self::SnapshotFault {
                day,
                invocation,
                detail,
            } => write!(f, "day {day} run {invocation}: snapshot fault: {detail}"),
        }
    }
}

/// Outcome of replaying the scenario against one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    pub passed: bool,
    pub failures: Vec<FailureReason>,
    pub days_replayed: usize,
    pub invocations: usize,
}

impl GradeResult {
    pub fn no_artifact() -> Self {
        Self {
            passed: false,
            failures: vec![FailureReason::NoArtifact],
            days_replayed: 0,
            invocations: 0,
        }
    }

    pub fn from_failures(
        failures: Vec<FailureReason>,
        days_replayed: usize,
        invocations: usize,
    ) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
            days_replayed,
            invocations,
        }
    }

    /// Distinct invariants that failed at least once.
    pub fn failed_invariants(&self) -> BTreeSet<Invariant> {
        self.failures
            .iter()
            .filter_map(FailureReason::invariant)
            .collect()
    }

    pub fn has_failure(&self, invariant: Invariant) -> bool {
        self.failures
            .iter()
            .any(|f| f.invariant() == Some(invariant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_order_is_ord() {
        let mut shuffled = vec![
            Invariant::CompleteLoad,
            Invariant::UniqueKeys,
            Invariant::MonthBoundaryAdmitted,
        ];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![
                Invariant::UniqueKeys,
                Invariant::MonthBoundaryAdmitted,
                Invariant::CompleteLoad
            ]
        );
    }

    #[test]
    fn test_failure_display_names_day_and_invariant() {
        let f = FailureReason::Invariant {
            day: 3,
            invocation: 1,
            invariant: Invariant::WatermarkBoundaryInclusive,
            detail: "order_id 305 missing".to_string(),
        };
        let text = f.to_string();
        assert!(text.starts_with("day 3 run 1: watermark_boundary_inclusive"));
        assert!(text.ends_with("order_id 305 missing"));
    }

    #[test]
    fn test_grade_result_passed_iff_no_failures() {
        assert!(GradeResult::from_failures(vec![], 10, 11).passed);
        let g = GradeResult::no_artifact();
        assert!(!g.passed);
        assert!(g.failed_invariants().is_empty());
    }

    #[test]
    fn test_failure_reason_serde_tag() {
        let json = serde_json::to_value(FailureReason::NoArtifact).unwrap();
        assert_eq!(json, serde_json::json!({"reason": "no_artifact"}));
    }
}
