//! Pool lifecycle: allocation under budget pressure, spawn/join round
//! trips, re-initialization, and seed-driven reproducibility.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fsmstorm::{
    ClusterInfo, Result, SpawnOptions, ThreadManager, WorkerContext, WorkloadConfig,
    WorkloadRegistry,
};
use parking_lot::Mutex;

const ITERATIONS: u64 = 25;

// -- Helpers ------------------------------------------------------------------

fn counting_workload(name: &str, threads: usize, ops: &Arc<AtomicU64>) -> WorkloadConfig {
    let insert_ops = Arc::clone(ops);
    let scan_ops = Arc::clone(ops);
    WorkloadConfig::new(name)
        .with_threads(threads)
        .with_iterations(ITERATIONS)
        .with_start_state("insert")
        .state(
            "insert",
            move |_ctx: &mut WorkerContext, _target: &str| -> Result<()> {
                insert_ops.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )
        .state(
            "scan",
            move |_ctx: &mut WorkerContext, _target: &str| -> Result<()> {
                scan_ops.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )
        .transition("insert", "scan", 1.0)
        .transition("scan", "insert", 2.0)
        .transition("scan", "scan", 1.0)
}

type Traces = Arc<Mutex<BTreeMap<usize, Vec<String>>>>;

fn tracing_workload(name: &str, threads: usize, traces: &Traces) -> WorkloadConfig {
    let mut config = WorkloadConfig::new(name)
        .with_threads(threads)
        .with_iterations(100)
        .with_start_state("a")
        .transition("a", "b", 2.0)
        .transition("a", "c", 1.0)
        .transition("b", "a", 1.0)
        .transition("b", "c", 3.0)
        .transition("c", "a", 1.0)
        .transition("c", "b", 1.0);
    for state in ["a", "b", "c"] {
        let sink = Arc::clone(traces);
        config = config.state(
            state,
            move |ctx: &mut WorkerContext, _target: &str| -> Result<()> {
                sink.lock().entry(ctx.tid).or_default().push(state.to_owned());
                Ok(())
            },
        );
    }
    config
}

fn run_traced_pool(master_seed: u64) -> BTreeMap<usize, Vec<String>> {
    let traces: Traces = Arc::new(Mutex::new(BTreeMap::new()));
    let mut registry = WorkloadRegistry::new();
    registry.register(tracing_workload("walk", 4, &traces));

    let mut manager = ThreadManager::new();
    manager.init(&["walk"], &mut registry, 8).unwrap();
    manager
        .spawn_all(
            &ClusterInfo::standalone("db0:27017"),
            &SpawnOptions {
                master_seed,
                ..SpawnOptions::default()
            },
        )
        .unwrap();
    manager.check_failed(0.0).unwrap();
    let failures = manager.join_all().unwrap();
    assert!(failures.is_empty());

    // The registry still holds handler clones of the Arc; copy the data out.
    let out = traces.lock().clone();
    out
}

// -- Tests --------------------------------------------------------------------

#[test]
fn over_budget_pool_scales_and_completes() {
    let ops = Arc::new(AtomicU64::new(0));
    let mut registry = WorkloadRegistry::new();
    registry.register(counting_workload("alpha", 6, &ops));
    registry.register(counting_workload("beta", 6, &ops));

    let mut manager = ThreadManager::new();
    manager.init(&["alpha", "beta"], &mut registry, 9).unwrap();

    // factor = 9/12; each 6 scales to floor(4.5) = 4.
    assert_eq!(registry.get("alpha").unwrap().thread_count, 4);
    assert_eq!(registry.get("beta").unwrap().thread_count, 4);
    assert_eq!(manager.num_threads(), 8);

    manager
        .spawn_all(
            &ClusterInfo::standalone("db0:27017"),
            &SpawnOptions::default(),
        )
        .unwrap();
    manager.check_failed(0.0).unwrap();
    assert!(!manager.check_for_errors().unwrap());

    let failures = manager.join_all().unwrap();
    assert!(failures.is_empty());
    assert_eq!(ops.load(Ordering::Relaxed), 8 * ITERATIONS);
}

#[test]
fn manager_can_be_reinitialized_after_join() {
    let ops = Arc::new(AtomicU64::new(0));
    let mut registry = WorkloadRegistry::new();
    registry.register(counting_workload("alpha", 2, &ops));

    let mut manager = ThreadManager::new();
    for _ in 0..3 {
        manager.init(&["alpha"], &mut registry, 4).unwrap();
        manager
            .spawn_all(&ClusterInfo::default(), &SpawnOptions::default())
            .unwrap();
        let failures = manager.join_all().unwrap();
        assert!(failures.is_empty());
    }
    assert_eq!(ops.load(Ordering::Relaxed), 3 * 2 * ITERATIONS);
}

#[test]
fn same_master_seed_replays_every_worker_walk() {
    let first = run_traced_pool(0x5EED);
    let second = run_traced_pool(0x5EED);
    assert_eq!(first, second);

    // Four workers, each with its own derived stream.
    assert_eq!(first.len(), 4);
    for trace in first.values() {
        assert_eq!(trace.len(), 100);
        assert_eq!(trace[0], "a");
    }
}

#[test]
fn different_master_seeds_diverge() {
    let first = run_traced_pool(1);
    let second = run_traced_pool(2);
    assert_ne!(first, second);
}

#[test]
fn workers_in_one_pool_walk_distinct_sequences() {
    let traces = run_traced_pool(0xABCD);
    let distinct: std::collections::BTreeSet<_> = traces.values().collect();
    assert_eq!(distinct.len(), 4, "worker streams should not collide");
}
