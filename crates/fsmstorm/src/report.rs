//! Structured per-worker and pool-level result payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result payload returned by one execution unit.
///
/// Spawn failures, handler errors, handler panics, and workload assertion
/// failures all surface here as `ok == false` with a human-readable error;
/// the harness does not distinguish between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    /// Worker id (0-based, unique across the pool).
    pub tid: usize,
    /// Name of the workload this worker ran.
    pub workload: String,
    /// Whether the worker completed its full iteration budget.
    pub ok: bool,
    /// Handler invocations actually performed.
    pub iterations_run: u64,
    /// Visit count per state name.
    pub state_visits: BTreeMap<String, u64>,
    /// Error description when `ok == false`.
    pub error: Option<String>,
    /// Wall-clock duration of the worker body.
    pub duration_ms: u64,
}

impl WorkerOutcome {
    /// A failure payload for a worker that never ran (spawn failure).
    #[must_use]
    pub fn spawn_failure(tid: usize, workload: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tid,
            workload: workload.into(),
            ok: false,
            iterations_run: 0,
            state_visits: BTreeMap::new(),
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

/// Aggregate view over a finished pool, used for the `join_all` summary log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total workers joined.
    pub workers: usize,
    /// Workers that completed their budget.
    pub succeeded: usize,
    /// Workers that reported a failure.
    pub failed: usize,
    /// Sum of handler invocations across the pool.
    pub total_iterations: u64,
}

impl RunSummary {
    /// Fold a set of worker outcomes into pool totals.
    #[must_use]
    pub fn from_outcomes(outcomes: &[WorkerOutcome]) -> Self {
        let failed = outcomes.iter().filter(|o| !o.ok).count();
        Self {
            workers: outcomes.len(),
            succeeded: outcomes.len() - failed,
            failed,
            total_iterations: outcomes.iter().map(|o| o.iterations_run).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RunSummary, WorkerOutcome};

    #[test]
    fn summary_counts_failures() {
        let mut ok = WorkerOutcome::spawn_failure(0, "crud", "unused");
        ok.ok = true;
        ok.error = None;
        ok.iterations_run = 12;
        let bad = WorkerOutcome::spawn_failure(1, "crud", "resource exhausted");

        let summary = RunSummary::from_outcomes(&[ok, bad]);
        assert_eq!(summary.workers, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_iterations, 12);
    }

    #[test]
    fn outcome_serializes() {
        let outcome = WorkerOutcome::spawn_failure(3, "reshard", "no threads left");
        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: WorkerOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
    }
}
