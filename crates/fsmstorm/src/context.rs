//! Per-worker execution context and the opaque cluster descriptor.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::latch::CountDownLatch;

/// Opaque connection descriptor for the system under test.
///
/// The engine never interprets this beyond cloning it into each worker;
/// workload bodies use the accessors to reach the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    primary: String,
    secondaries: Vec<String>,
    replica_set: Option<String>,
}

impl ClusterInfo {
    /// Describe a single-node deployment.
    #[must_use]
    pub fn standalone(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondaries: Vec::new(),
            replica_set: None,
        }
    }

    /// Describe a replica set deployment.
    #[must_use]
    pub fn replica_set(
        name: impl Into<String>,
        primary: impl Into<String>,
        secondaries: Vec<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            secondaries,
            replica_set: Some(name.into()),
        }
    }

    /// Host serving writes.
    #[must_use]
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Read-only secondary hosts (empty for standalone deployments).
    #[must_use]
    pub fn secondaries(&self) -> &[String] {
        &self.secondaries
    }

    /// Replica-set name, if the deployment has one.
    #[must_use]
    pub fn replica_set_name(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    /// Serializable snapshot for reports and repro bundles.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "primary": self.primary,
            "secondaries": self.secondaries,
            "replica_set": self.replica_set,
        })
    }
}

/// Knobs applied when spawning the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnOptions {
    /// Master seed; every worker derives its own stream from this and its tid.
    pub master_seed: u64,
    /// Sleep between failure-accounting passes in `check_failed`.
    pub poll_interval_ms: u64,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            master_seed: crate::STORM_SEED,
            poll_interval_ms: 100,
        }
    }
}

/// Mutable state exclusively owned by one worker for its whole run.
///
/// `data` starts as a deep clone of the workload's initial `data` object, so
/// handlers can persist counters and cached ids across iterations without
/// any locking discipline. Nothing here is shared with sibling workers; the
/// latches are the pool's, held only so the hosting execution unit can
/// signal termination and in-band errors.
#[derive(Debug)]
pub struct WorkerContext {
    /// Globally unique worker id, 0-based across the whole pool.
    pub tid: usize,
    /// Seed this worker's RNG stream was created from.
    pub seed: u64,
    /// Worker-private RNG, seeded deterministically from the master seed.
    pub rng: StdRng,
    /// Worker-private scratch state, cloned from the workload config.
    pub data: Value,
    /// Connection descriptor for the system under test.
    pub cluster: ClusterInfo,
    pub(crate) latch: Arc<CountDownLatch>,
    pub(crate) error_latch: Arc<CountDownLatch>,
}

impl WorkerContext {
    pub(crate) fn new(
        tid: usize,
        seed: u64,
        data: Value,
        cluster: ClusterInfo,
        latch: Arc<CountDownLatch>,
        error_latch: Arc<CountDownLatch>,
    ) -> Self {
        Self {
            tid,
            seed,
            rng: StdRng::seed_from_u64(seed),
            data,
            cluster,
            latch,
            error_latch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClusterInfo;

    #[test]
    fn standalone_has_no_secondaries() {
        let cluster = ClusterInfo::standalone("db0:27017");
        assert_eq!(cluster.primary(), "db0:27017");
        assert!(cluster.secondaries().is_empty());
        assert!(cluster.replica_set_name().is_none());
    }

    #[test]
    fn snapshot_round_trips() {
        let cluster = ClusterInfo::replica_set(
            "rs0",
            "db0:27017",
            vec!["db1:27017".to_owned(), "db2:27017".to_owned()],
        );
        let snap = cluster.snapshot();
        assert_eq!(snap["primary"], "db0:27017");
        assert_eq!(snap["replica_set"], "rs0");

        let parsed: ClusterInfo = serde_json::from_value(snap).unwrap();
        assert_eq!(parsed, cluster);
    }
}
