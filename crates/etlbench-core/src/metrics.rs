//! Global atomic counters for etlbench runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    trials_started: AtomicU64,
    trials_passed: AtomicU64,
    engine_requests: AtomicU64,
    tool_calls: AtomicU64,
    invariant_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            trials_started: AtomicU64::new(0),
            trials_passed: AtomicU64::new(0),
            engine_requests: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            invariant_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_trials_started(&self) {
        self.trials_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "trials_started", "counter incremented");
    }

    pub fn inc_trials_passed(&self) {
        self.trials_passed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "trials_passed", "counter incremented");
    }

    pub fn inc_engine_requests(&self) {
        self.engine_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_invariant_failures(&self, n: u64) {
        self.invariant_failures.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            trials_started = self.trials_started(),
            trials_passed = self.trials_passed(),
            engine_requests = self.engine_requests(),
            tool_calls = self.tool_calls(),
            invariant_failures = self.invariant_failures(),
        );
    }

    pub fn trials_started(&self) -> u64 {
        self.trials_started.load(Ordering::Relaxed)
    }

    pub fn trials_passed(&self) -> u64 {
        self.trials_passed.load(Ordering::Relaxed)
    }

    pub fn engine_requests(&self) -> u64 {
        self.engine_requests.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn invariant_failures(&self) -> u64 {
        self.invariant_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_trials_started();
        m.inc_trials_started();
        m.inc_trials_passed();
        m.inc_tool_calls();
        m.add_invariant_failures(5);
        assert_eq!(m.trials_started(), 2);
        assert_eq!(m.trials_passed(), 1);
        assert_eq!(m.tool_calls(), 1);
        assert_eq!(m.invariant_failures(), 5);
    }
}
