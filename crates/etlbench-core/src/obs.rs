//! Structured observability hooks for the trial lifecycle.
//!
//! This module provides:
//! - Trial-scoped tracing spans (`trial_span` for async code, `TrialSpan` RAII guard
//!   for blocking sections)
//! - Emission functions for lifecycle events: trial start/finish, driver steps,
//!   tool dispatch, grading, faults
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::info;

/// Span tagged with the trial id. Attach to futures with `Instrument`.
pub fn trial_span(trial_id: usize) -> tracing::Span {
    tracing::info_span!("etlbench.trial", trial_id = trial_id)
}

/// RAII guard that enters a trial span for the rest of a blocking scope.
///
/// # Example
///
/// ```ignore
/// let _span = TrialSpan::enter(3);
/// // tracing calls here carry trial_id = 3
/// ```
pub struct TrialSpan {
    _span: tracing::span::EnteredSpan,
}

impl TrialSpan {
    pub fn enter(trial_id: usize) -> Self {
        Self {
            _span: trial_span(trial_id).entered(),
        }
    }
}

/// Emit event: trial started.
pub fn emit_trial_started(trial_id: usize, engine: &str) {
    info!(event = "trial.started", trial_id = trial_id, engine = %engine);
}

/// Emit event: trial finished with verdict and cost.
pub fn emit_trial_finished(trial_id: usize, duration_ms: u64, tool_calls: u64, passed: bool) {
    info!(
        event = "trial.finished",
        trial_id = trial_id,
        duration_ms = duration_ms,
        tool_calls = tool_calls,
        passed = passed,
    );
}

/// Emit event: one driver turn completed.
pub fn emit_driver_step(trial_id: usize, step: usize, stop_reason: &str, invocations: usize) {
    info!(
        event = "driver.step",
        trial_id = trial_id,
        step = step,
        stop_reason = %stop_reason,
        invocations = invocations,
    );
}

/// Emit event: a tool invocation was dispatched.
pub fn emit_tool_dispatched(trial_id: usize, tool: &str, is_error: bool) {
    info!(
        event = "tool.dispatched",
        trial_id = trial_id,
        tool = %tool,
        is_error = is_error,
    );
}

/// Emit event: grading completed.
pub fn emit_grade_evaluated(trial_id: usize, passed: bool, failures: usize, invocations: usize) {
    info!(
        event = "grade.evaluated",
        trial_id = trial_id,
        passed = passed,
        failures = failures,
        invocations = invocations,
    );
}

/// Emit event: trial faulted (warning level).
pub fn emit_trial_fault(trial_id: usize, kind: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "trial.fault", trial_id = trial_id, kind = %kind, error = %error);
}
