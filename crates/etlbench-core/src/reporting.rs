//! Persisted run artifacts and console rendering.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::domain::{RunSummary, TrialOutcome, TrialRecord};
use crate::scenario::artifact_diff;

pub const TRANSCRIPT_FILE: &str = "transcript.json";
pub const RESULT_FILE: &str = "result.json";
pub const RESULTS_TXT: &str = "results.txt";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";
pub const ARTIFACT_DIFF_FILE: &str = "artifact.diff";

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serialize artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write artifact.diff (the artifact against the broken job) into `dir`.
pub fn write_artifact_diff(dir: &Path, artifact: &str) -> Result<PathBuf> {
    let path = dir.join(ARTIFACT_DIFF_FILE);
    std::fs::write(&path, artifact_diff(artifact)).with_context(|| format!("write {:?}", path))?;
    Ok(path)
}

/// Directory name a finished trial is renamed to.
pub fn trial_dir_name(record: &TrialRecord) -> String {
    let verdict = if record.passed() { "passed" } else { "failed" };
    format!("trial_{:03}_{verdict}", record.id())
}

/// Write transcript.json, result.json and results.txt into `trial_dir`,
/// then rename it to carry the verdict. Returns the final directory.
pub fn persist_trial(trial_dir: &Path, record: &TrialRecord) -> Result<PathBuf> {
    std::fs::create_dir_all(trial_dir).with_context(|| format!("create {:?}", trial_dir))?;

    write_json(&trial_dir.join(TRANSCRIPT_FILE), record.transcript())?;
    write_json(&trial_dir.join(RESULT_FILE), record)?;

    let mut lines = record.failure_lines();
    if lines.is_empty() {
        lines.push("all invariants held".to_string());
    }
    let text = lines.join("\n") + "\n";
    std::fs::write(trial_dir.join(RESULTS_TXT), text)
        .with_context(|| format!("write results.txt in {:?}", trial_dir))?;

    let final_dir = trial_dir.with_file_name(trial_dir_name(record));
    if final_dir.exists() {
        std::fs::remove_dir_all(&final_dir)
            .with_context(|| format!("clear stale {:?}", final_dir))?;
    }
    std::fs::rename(trial_dir, &final_dir)
        .with_context(|| format!("rename {:?} -> {:?}", trial_dir, final_dir))?;
    Ok(final_dir)
}

/// Write run_summary.json at the run root.
pub fn write_run_summary(run_dir: &Path, summary: &RunSummary) -> Result<()> {
    write_json(&run_dir.join(RUN_SUMMARY_FILE), summary)
}

/// One-line verdict printed as each trial completes.
pub fn render_trial_line(record: &TrialRecord) -> String {
    let secs = record.duration().as_secs_f64();
    match record.outcome() {
        TrialOutcome::Graded(grade) if grade.passed => format!(
            "Trial {}: PASSED ({secs:.1}s, {} tool calls)",
            record.id(),
            record.cost().tool_calls
        ),
        TrialOutcome::Graded(grade) => {
            let first = grade
                .failures
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            format!(
                "Trial {}: FAILED ({secs:.1}s, {} failure(s)) {first}",
                record.id(),
                grade.failures.len()
            )
        }
        TrialOutcome::Faulted { kind, description } => format!(
            "Trial {}: FAULTED ({kind:?}) {description}",
            record.id()
        ),
    }
}

/// Summary block printed at the end of a run.
pub fn render_summary(summary: &RunSummary) -> String {
    let rule = "=".repeat(60);
    let total = summary.total();
    format!(
        "{rule}\nTest Results:\n  Passed: {}/{total}\n  Failed: {}/{total}\n  Pass Rate: {:.1}%\n{rule}\nTotal time: {:.2} seconds\n{rule}\n",
        summary.passed,
        summary.failed,
        summary.pass_rate,
        summary.total_duration().as_secs_f64(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FaultKind, GradeResult, ResourceCost, Transcript};
    use std::time::Duration;

    fn passed(id: usize) -> TrialRecord {
        TrialRecord::new(
            id,
            Transcript::new(),
            TrialOutcome::Graded(GradeResult::from_failures(vec![], 10, 11)),
            Duration::from_millis(2_000),
            ResourceCost::default(),
            Some("ab".repeat(32)),
        )
    }

    #[test]
    fn test_render_summary_block() {
        let summary = RunSummary::from_records(
            vec![passed(1), TrialRecord::faulted(2, FaultKind::Engine, "down")],
            Duration::from_millis(3_500),
        );
        let text = render_summary(&summary);
        assert!(text.contains("  Passed: 1/2\n"));
        assert!(text.contains("  Failed: 1/2\n"));
        assert!(text.contains("  Pass Rate: 50.0%\n"));
        assert!(text.contains("Total time: 3.50 seconds"));
    }

    #[test]
    fn test_persist_trial_renames_with_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let trial_dir = dir.path().join("trial_001");
        let final_dir = persist_trial(&trial_dir, &passed(1)).unwrap();

        assert_eq!(final_dir, dir.path().join("trial_001_passed"));
        assert!(!trial_dir.exists());
        assert!(final_dir.join(TRANSCRIPT_FILE).exists());
        let result: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(final_dir.join(RESULT_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(result["id"], 1);
        assert_eq!(
            std::fs::read_to_string(final_dir.join(RESULTS_TXT)).unwrap(),
            "all invariants held\n"
        );
    }

    #[test]
    fn test_artifact_diff_file() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = crate::scenario::BROKEN_ARTIFACT.replace("-- Bug 3: no ORDER BY\n", "");
        let path = write_artifact_diff(dir.path(), &fixed).unwrap();

        assert_eq!(path, dir.path().join(ARTIFACT_DIFF_FILE));
        let diff = std::fs::read_to_string(path).unwrap();
        assert!(diff.contains("\n--- Bug 3: no ORDER BY\n"), "{diff}");
    }

    #[test]
    fn test_trial_lines() {
        assert!(render_trial_line(&passed(4)).starts_with("Trial 4: PASSED (2.0s"));
        let faulted = TrialRecord::faulted(5, FaultKind::Protocol, "unknown stop reason");
        assert_eq!(
            render_trial_line(&faulted),
            "Trial 5: FAULTED (Protocol) unknown stop reason"
        );
    }
}
