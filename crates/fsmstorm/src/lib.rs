//! Concurrent FSM workload execution engine for database stress testing.
//!
//! This crate provides the infrastructure for:
//! - **Thread allocation**: scaling per-workload thread requests to a
//!   global concurrency budget
//! - **Workload definition**: named states, weighted transitions, and
//!   per-worker scratch state
//! - **FSM execution**: a bounded, seeded, weighted random walk per worker
//! - **Pool control**: latch-based liveness tracking, spawn-failure
//!   thresholds, and failure aggregation
//!
//! The system under test is opaque: workers receive a [`ClusterInfo`]
//! descriptor and a target namespace, and the engine never interprets what
//! a state handler does with them.
//!
//! # Usage
//!
//! ```no_run
//! use fsmstorm::{
//!     ClusterInfo, SpawnOptions, ThreadManager, WorkerContext, WorkloadConfig,
//!     WorkloadRegistry,
//! };
//!
//! fn insert(_ctx: &mut WorkerContext, _target: &str) -> fsmstorm::Result<()> {
//!     // issue an insert against the cluster's target namespace here
//!     Ok(())
//! }
//!
//! fn scan(_ctx: &mut WorkerContext, _target: &str) -> fsmstorm::Result<()> {
//!     Ok(())
//! }
//!
//! fn main() -> fsmstorm::Result<()> {
//!     let mut registry = WorkloadRegistry::new();
//!     registry.register(
//!         WorkloadConfig::new("crud")
//!             .with_threads(8)
//!             .with_iterations(100)
//!             .with_start_state("insert")
//!             .state("insert", insert)
//!             .state("scan", scan)
//!             .transition("insert", "scan", 1.0)
//!             .transition("scan", "insert", 3.0),
//!     );
//!
//!     let mut manager = ThreadManager::new();
//!     manager.init(&["crud"], &mut registry, 16)?;
//!     manager.spawn_all(
//!         &ClusterInfo::standalone("db0:27017"),
//!         &SpawnOptions::default(),
//!     )?;
//!     manager.check_failed(0.2)?;
//!     let failures = manager.join_all()?;
//!     assert!(failures.is_empty());
//!     Ok(())
//! }
//! ```

pub mod alloc;
pub mod context;
pub mod latch;
pub mod manager;
pub mod report;
pub mod runner;
pub mod workload;

pub use alloc::{allocate_threads, ThreadAllocation};
pub use context::{ClusterInfo, SpawnOptions, WorkerContext};
pub use fsmstorm_error::{Result, StormError};
pub use latch::CountDownLatch;
pub use manager::{ThreadManager, WorkerHandle};
pub use report::{RunSummary, WorkerOutcome};
pub use runner::{FsmRunner, FsmRunStats};
pub use workload::{SharedHandler, StateHandler, WorkloadConfig, WorkloadRegistry};

// ─── Deterministic Seed Constants ────────────────────────────────────────────
//
// Every worker derives its RNG stream from a master seed and its tid, so a
// whole run replays exactly from one number.

/// Canonical default master seed ("FSMSTORM" as ASCII bytes).
///
/// A memorable, project-specific default that is unlikely to collide with
/// common test seeds like 0, 1, or 42. Override per run via
/// [`SpawnOptions::master_seed`].
pub const STORM_SEED: u64 = 0x4653_4D53_544F_524D;

/// Derives a worker-specific seed from a master seed and worker tid.
///
/// Ensures each worker in a pool has a distinct but deterministic RNG
/// stream. The multiplier is the 64-bit golden-ratio constant, providing
/// good distribution across consecutive tids.
#[inline]
#[must_use]
pub const fn derive_worker_seed(master_seed: u64, tid: u64) -> u64 {
    master_seed ^ tid.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::derive_worker_seed;

    #[test]
    fn worker_seeds_are_distinct_per_tid() {
        let seeds: Vec<u64> = (0..64).map(|tid| derive_worker_seed(42, tid)).collect();
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn worker_seed_zero_is_the_master_seed() {
        assert_eq!(derive_worker_seed(1234, 0), 1234);
    }

    #[test]
    fn worker_seed_is_deterministic() {
        assert_eq!(derive_worker_seed(7, 3), derive_worker_seed(7, 3));
        assert_ne!(derive_worker_seed(7, 3), derive_worker_seed(8, 3));
    }
}
