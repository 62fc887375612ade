//! Error taxonomy for the fsmstorm workload harness.
//!
//! One structured enum covers the whole engine: configuration faults caught
//! at validation time, pool lifecycle misuse, and pool-level policy
//! violations. Per-worker runtime faults are *not* raised through this type;
//! they are recovered at the execution-unit boundary and reported as non-ok
//! outcome payloads (see the `fsmstorm` crate).

use thiserror::Error;

/// Result type alias used throughout the harness.
pub type Result<T> = std::result::Result<T, StormError>;

/// Primary error type for harness operations.
#[derive(Error, Debug)]
pub enum StormError {
    // === Configuration Errors ===
    /// The global thread budget must be a positive integer.
    #[error("max_allowed_threads must be a positive integer")]
    InvalidMaxThreads,

    /// A selected workload name has no entry in the registry.
    #[error("unknown workload: {name}")]
    UnknownWorkload { name: String },

    /// A workload requested zero threads.
    #[error("workload '{workload}': thread_count must be positive")]
    InvalidThreadCount { workload: String },

    /// The configured start state is not a defined state.
    #[error("workload '{workload}': start state '{state}' is not defined")]
    MissingStartState { workload: String, state: String },

    /// A transition names a source or target state that does not exist.
    #[error("workload '{workload}': transitions reference undefined state '{state}'")]
    UnknownTransitionState { workload: String, state: String },

    /// A transition weight is negative, NaN, or infinite.
    #[error("workload '{workload}': transition {from} -> {target} has invalid weight {weight}")]
    InvalidWeight {
        workload: String,
        from: String,
        target: String,
        weight: f64,
    },

    /// A state has outgoing transitions but their weights sum to zero,
    /// leaving no legal move to sample.
    #[error("workload '{workload}': state '{state}' has zero total outgoing weight")]
    ZeroWeightState { workload: String, state: String },

    /// More workloads than the budget can cover at one thread each.
    #[error(
        "thread budget {max_allowed} cannot cover {workload_count} workloads at one thread each"
    )]
    ThreadBudgetTooSmall {
        workload_count: usize,
        max_allowed: usize,
    },

    // === Lifecycle Errors ===
    /// `init` was called twice without an intervening `join_all`.
    #[error("thread manager is already initialized; call join_all before re-initializing")]
    AlreadyInitialized,

    /// A pool operation was invoked before `init`.
    #[error("thread manager is not initialized: {operation} requires init first")]
    NotInitialized { operation: &'static str },

    // === Execution Errors ===
    /// The FSM walk reached a state with no outgoing transitions while
    /// iterations remained in the budget.
    #[error(
        "workload '{workload}': state '{state}' has no outgoing transitions \
         with {remaining} iterations remaining"
    )]
    NoOutgoingTransitions {
        workload: String,
        state: String,
        remaining: u64,
    },

    /// Too many workers failed to spawn relative to the allowed rate.
    #[error(
        "too many threads failed to spawn: {failed} of {total} \
         ({observed:.3} > allowed {allowed:.3})"
    )]
    FailureThresholdExceeded {
        failed: usize,
        total: usize,
        observed: f64,
        allowed: f64,
    },

    /// A state handler reported a failure.
    ///
    /// This is the variant workload bodies are expected to return; the
    /// harness treats any error from a handler identically.
    #[error("workload '{workload}': state '{state}' failed: {detail}")]
    Handler {
        workload: String,
        state: String,
        detail: String,
    },

    /// File I/O error (workload bodies touching the filesystem).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StormError {
    /// Convenience constructor for handler-level failures.
    pub fn handler(
        workload: impl Into<String>,
        state: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        StormError::Handler {
            workload: workload.into(),
            state: state.into(),
            detail: detail.into(),
        }
    }

    /// True for malformed-configuration errors that fail fast at
    /// init/validation time.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            StormError::InvalidMaxThreads
                | StormError::UnknownWorkload { .. }
                | StormError::InvalidThreadCount { .. }
                | StormError::MissingStartState { .. }
                | StormError::UnknownTransitionState { .. }
                | StormError::InvalidWeight { .. }
                | StormError::ZeroWeightState { .. }
                | StormError::ThreadBudgetTooSmall { .. }
                | StormError::NoOutgoingTransitions { .. }
        )
    }

    /// True for errors that abort the whole run rather than a single worker.
    ///
    /// Everything except `Handler` and `Io` is pool-fatal: configuration
    /// faults, lifecycle misuse, and the spawn-failure threshold.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StormError::Handler { .. } | StormError::Io(_))
    }
}
