//! Pool lifecycle: thread allocation, spawn, failure accounting, join.
//!
//! The manager owns one pool at a time. `init` sizes it, `spawn_all`
//! launches one execution unit per allocated slot, `check_failed` drains
//! the liveness latch while accounting for units that never came up, and
//! `join_all` collects result payloads and resets the pool.
//!
//! Failure policy: per-worker faults are recovered at the execution-unit
//! boundary and reported as non-ok payloads; only pool-level policy
//! violations (spawn failures above the allowed rate) raise from here.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fsmstorm_error::{Result, StormError};
use tracing::{debug, error, info, warn};

use crate::alloc::allocate_threads;
use crate::context::{ClusterInfo, SpawnOptions, WorkerContext};
use crate::derive_worker_seed;
use crate::latch::CountDownLatch;
use crate::report::{RunSummary, WorkerOutcome};
use crate::runner::FsmRunner;
use crate::workload::{WorkloadConfig, WorkloadRegistry};

// ---------------------------------------------------------------------------
// WorkerHandle — one execution unit
// ---------------------------------------------------------------------------

type WorkerBody = Box<dyn FnOnce() -> WorkerOutcome + Send + 'static>;

/// Owned handle over one execution unit.
///
/// Construction captures the worker closure; `start` performs the actual
/// OS-thread spawn and records any spawn error on the handle instead of
/// raising, so the controller can aggregate spawn failures across the pool.
pub struct WorkerHandle {
    tid: usize,
    workload: String,
    body: Option<WorkerBody>,
    thread: Option<JoinHandle<WorkerOutcome>>,
    spawn_error: Option<String>,
    outcome: Option<WorkerOutcome>,
    accounted: AtomicBool,
}

impl WorkerHandle {
    fn new(tid: usize, workload: String, body: WorkerBody) -> Self {
        Self {
            tid,
            workload,
            body: Some(body),
            thread: None,
            spawn_error: None,
            outcome: None,
            accounted: AtomicBool::new(false),
        }
    }

    /// Launch the execution unit. Idempotent: a second call is a no-op.
    pub fn start(&mut self) {
        let Some(body) = self.body.take() else {
            return;
        };
        let name = format!("fsm-worker-{}", self.tid);
        match thread::Builder::new().name(name).spawn(body) {
            Ok(handle) => self.thread = Some(handle),
            Err(err) => {
                warn!(
                    tid = self.tid,
                    workload = %self.workload,
                    error = %err,
                    "failed to spawn worker thread"
                );
                self.spawn_error = Some(err.to_string());
            }
        }
    }

    /// Whether this unit failed before or during startup.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.spawn_error.is_some()
    }

    /// Block until the unit terminates and record its payload.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let outcome = handle.join().unwrap_or_else(|payload| {
                // The body catches panics itself; this covers a panic that
                // escaped the recovery boundary (e.g. in the payload drop).
                WorkerOutcome::spawn_failure(
                    self.tid,
                    self.workload.as_str(),
                    panic_message(&*payload),
                )
            });
            self.outcome = Some(outcome);
        }
    }

    /// Result payload for this unit.
    ///
    /// For a unit that never produced one (spawn failed, or was never
    /// started) a synthetic failure payload is returned.
    #[must_use]
    pub fn return_data(&self) -> WorkerOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let error = self
            .spawn_error
            .clone()
            .unwrap_or_else(|| "worker was never started".to_owned());
        WorkerOutcome::spawn_failure(self.tid, self.workload.as_str(), error)
    }

    /// First caller wins; used by `check_failed` to decrement the liveness
    /// latch exactly once per failed handle.
    fn mark_accounted(&self) -> bool {
        !self.accounted.swap(true, Ordering::AcqRel)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_owned()
    }
}

/// Thread body: run the FSM under a panic recovery boundary, convert the
/// result into a payload, signal the error latch on in-band faults, and
/// always decrement the liveness latch on the way out.
fn worker_body(workload: WorkloadConfig, mut ctx: WorkerContext) -> WorkerOutcome {
    let tid = ctx.tid;
    let latch = Arc::clone(&ctx.latch);
    let error_latch = Arc::clone(&ctx.error_latch);
    let start = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| FsmRunner::new(&workload).run(&mut ctx)));

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = start.elapsed().as_millis() as u64;
    let outcome = match result {
        Ok(Ok(stats)) => {
            debug!(
                workload = %workload.name,
                tid,
                iterations = stats.iterations_run,
                duration_ms,
                "worker completed"
            );
            WorkerOutcome {
                tid,
                workload: workload.name.clone(),
                ok: true,
                iterations_run: stats.iterations_run,
                state_visits: stats.state_visits,
                error: None,
                duration_ms,
            }
        }
        Ok(Err(err)) => {
            warn!(workload = %workload.name, tid, error = %err, "worker failed");
            error_latch.count_down();
            WorkerOutcome {
                tid,
                workload: workload.name.clone(),
                ok: false,
                iterations_run: 0,
                state_visits: Default::default(),
                error: Some(err.to_string()),
                duration_ms,
            }
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            warn!(workload = %workload.name, tid, panic = %message, "worker panicked");
            error_latch.count_down();
            WorkerOutcome {
                tid,
                workload: workload.name.clone(),
                ok: false,
                iterations_run: 0,
                state_visits: Default::default(),
                error: Some(format!("panic: {message}")),
                duration_ms,
            }
        }
    };

    latch.count_down();
    outcome
}

// ---------------------------------------------------------------------------
// ThreadManager
// ---------------------------------------------------------------------------

struct PoolState {
    num_threads: usize,
    latch: Arc<CountDownLatch>,
    error_latch: Arc<CountDownLatch>,
    workloads: Vec<WorkloadConfig>,
    handles: Vec<WorkerHandle>,
    poll_interval: Duration,
}

/// Controller for one pool of FSM workers.
#[derive(Default)]
pub struct ThreadManager {
    pool: Option<PoolState>,
}

impl ThreadManager {
    /// Create an uninitialized manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total threads allocated by the last `init` (0 when uninitialized).
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.num_threads)
    }

    /// Size the pool: validate the selected workloads, scale their thread
    /// counts to the budget, and create the pool latches.
    ///
    /// Adjusted thread counts are written back into `registry` so callers
    /// observe the real pool shape.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` when called again before `join_all`.
    /// - `InvalidMaxThreads` / `ThreadBudgetTooSmall` from allocation.
    /// - `UnknownWorkload` and any config validation error.
    pub fn init(
        &mut self,
        selected: &[&str],
        registry: &mut WorkloadRegistry,
        max_allowed_threads: usize,
    ) -> Result<()> {
        if self.pool.is_some() {
            return Err(StormError::AlreadyInitialized);
        }
        if max_allowed_threads == 0 {
            return Err(StormError::InvalidMaxThreads);
        }

        let mut configs = Vec::with_capacity(selected.len());
        for name in selected {
            let config = registry
                .get(name)
                .ok_or_else(|| StormError::UnknownWorkload {
                    name: (*name).to_owned(),
                })?;
            config.validate()?;
            configs.push(config.clone());
        }

        let desired: Vec<usize> = configs.iter().map(|c| c.thread_count).collect();
        let alloc = allocate_threads(&desired, max_allowed_threads)?;

        for (config, &count) in configs.iter_mut().zip(&alloc.counts) {
            if count != config.thread_count {
                debug!(
                    workload = %config.name,
                    requested = config.thread_count,
                    adjusted = count,
                    "scaled workload thread count to fit budget"
                );
            }
            config.thread_count = count;
            if let Some(entry) = registry.get_mut(&config.name) {
                entry.thread_count = count;
            }
        }

        info!(
            workloads = configs.len(),
            total_threads = alloc.total,
            max_allowed_threads,
            "initialized worker pool"
        );

        self.pool = Some(PoolState {
            num_threads: alloc.total,
            latch: Arc::new(CountDownLatch::new(alloc.total)),
            error_latch: Arc::new(CountDownLatch::new(alloc.total)),
            workloads: configs,
            handles: Vec::new(),
            poll_interval: Duration::from_millis(SpawnOptions::default().poll_interval_ms),
        });
        Ok(())
    }

    /// Launch one execution unit per allocated slot.
    ///
    /// Every worker gets a globally unique `tid`, a seed derived from the
    /// master seed and that `tid`, a deep clone of its workload's `data`,
    /// and a clone of the cluster descriptor. Spawn failures are recorded
    /// on the handles for `check_failed` to aggregate, not raised here.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before `init`; `AlreadyInitialized` when the pool
    /// was already spawned.
    pub fn spawn_all(&mut self, cluster: &ClusterInfo, options: &SpawnOptions) -> Result<()> {
        let pool = self.pool.as_mut().ok_or(StormError::NotInitialized {
            operation: "spawn_all",
        })?;
        if !pool.handles.is_empty() {
            return Err(StormError::AlreadyInitialized);
        }
        pool.poll_interval = Duration::from_millis(options.poll_interval_ms.max(1));

        let mut handles = Vec::with_capacity(pool.num_threads);
        let mut tid = 0_usize;
        for workload in &pool.workloads {
            for _slot in 0..workload.thread_count {
                let seed = derive_worker_seed(options.master_seed, tid as u64);
                let ctx = WorkerContext::new(
                    tid,
                    seed,
                    workload.data.clone(),
                    cluster.clone(),
                    Arc::clone(&pool.latch),
                    Arc::clone(&pool.error_latch),
                );
                let body_workload = workload.clone();
                let mut handle = WorkerHandle::new(
                    tid,
                    workload.name.clone(),
                    Box::new(move || worker_body(body_workload, ctx)),
                );
                handle.start();
                handles.push(handle);
                tid += 1;
            }
        }
        pool.handles = handles;

        info!(
            threads = tid,
            master_seed = options.master_seed,
            cluster = %cluster.primary(),
            "spawned all workers"
        );
        Ok(())
    }

    /// Drain the liveness latch, accounting for units that failed to come
    /// up, then enforce the allowed failure rate.
    ///
    /// `allowed_failure_percent` is a fraction in `[0, 1]`: with 10 threads
    /// and 2 spawn failures, `0.1` raises and `0.3` does not.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before `init`; `FailureThresholdExceeded` when the
    /// observed spawn-failure rate is above the allowed fraction.
    pub fn check_failed(&self, allowed_failure_percent: f64) -> Result<()> {
        let pool = self.pool.as_ref().ok_or(StormError::NotInitialized {
            operation: "check_failed",
        })?;
        if pool.num_threads == 0 || pool.handles.is_empty() {
            return Ok(());
        }

        loop {
            for handle in &pool.handles {
                if handle.has_failed() && handle.mark_accounted() {
                    warn!(
                        tid = handle.tid,
                        workload = %handle.workload,
                        "worker never started; accounting for it on the liveness latch"
                    );
                    pool.latch.count_down();
                }
            }
            if pool.latch.count() == 0 {
                break;
            }
            thread::sleep(pool.poll_interval);
        }

        let failed = pool.handles.iter().filter(|h| h.has_failed()).count();
        let total = pool.num_threads;
        #[allow(clippy::cast_precision_loss)]
        let observed = failed as f64 / total as f64;
        if observed > allowed_failure_percent {
            error!(
                failed,
                total,
                observed,
                allowed = allowed_failure_percent,
                "too many threads failed to spawn"
            );
            return Err(StormError::FailureThresholdExceeded {
                failed,
                total,
                observed,
                allowed: allowed_failure_percent,
            });
        }
        if failed > 0 {
            warn!(failed, total, "spawn failures stayed within the allowed rate");
        }
        Ok(())
    }

    /// Non-blocking: has any worker signaled an in-band error?
    ///
    /// # Errors
    ///
    /// `NotInitialized` before `init`.
    pub fn check_for_errors(&self) -> Result<bool> {
        let pool = self.pool.as_ref().ok_or(StormError::NotInitialized {
            operation: "check_for_errors",
        })?;
        Ok(pool.error_latch.count() < pool.num_threads)
    }

    /// Join every execution unit, collect payloads, and reset the pool to
    /// uninitialized. Returns the failure payloads (empty on full
    /// success).
    ///
    /// # Errors
    ///
    /// `NotInitialized` before `init`.
    pub fn join_all(&mut self) -> Result<Vec<WorkerOutcome>> {
        let mut pool = self.pool.take().ok_or(StormError::NotInitialized {
            operation: "join_all",
        })?;

        let mut outcomes = Vec::with_capacity(pool.handles.len());
        for handle in &mut pool.handles {
            handle.join();
            outcomes.push(handle.return_data());
        }

        let summary = RunSummary::from_outcomes(&outcomes);
        info!(
            workers = summary.workers,
            succeeded = summary.succeeded,
            failed = summary.failed,
            total_iterations = summary.total_iterations,
            "joined worker pool"
        );

        Ok(outcomes.into_iter().filter(|o| !o.ok).collect())
    }
}
