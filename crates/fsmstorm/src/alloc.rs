//! Proportional thread-count allocation under a global concurrency budget.
//!
//! This module is deliberately **pure computation** (no logging, no shared
//! state) so the scaling policy can be exercised exhaustively in unit and
//! property tests.

use fsmstorm_error::{Result, StormError};

/// Outcome of scaling a set of per-workload thread requests to a budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAllocation {
    /// Adjusted per-workload counts, in the same order as the request list.
    pub counts: Vec<usize>,
    /// Sum of the adjusted counts.
    pub total: usize,
}

/// Scale per-workload thread requests down to `max_allowed_threads`.
///
/// When the requested sum fits the budget the counts pass through
/// unchanged. Otherwise each count is scaled by `max / requested` and
/// floored, but never below one thread per workload: a workload that was
/// selected must actually run.
///
/// # Errors
///
/// - `InvalidMaxThreads` when the budget is zero.
/// - `ThreadBudgetTooSmall` when the one-thread floor alone exceeds the
///   budget (more workloads than threads allowed). The overrun is rejected
///   explicitly rather than silently tolerated.
pub fn allocate_threads(desired: &[usize], max_allowed_threads: usize) -> Result<ThreadAllocation> {
    if max_allowed_threads == 0 {
        return Err(StormError::InvalidMaxThreads);
    }

    let requested: usize = desired.iter().sum();
    if requested <= max_allowed_threads {
        // No workloads selected (requested == 0) is a valid empty pool.
        return Ok(ThreadAllocation {
            counts: desired.to_vec(),
            total: requested,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let factor = max_allowed_threads as f64 / requested as f64;
    let counts: Vec<usize> = desired
        .iter()
        .map(|&d| {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = (factor * d as f64).floor() as usize;
            scaled.max(1)
        })
        .collect();

    let total: usize = counts.iter().sum();
    if total > max_allowed_threads {
        // Only reachable when the per-workload floor of 1 dominates, i.e.
        // more workloads than the budget can hold.
        return Err(StormError::ThreadBudgetTooSmall {
            workload_count: desired.len(),
            max_allowed: max_allowed_threads,
        });
    }

    Ok(ThreadAllocation { counts, total })
}
