//! Workload definitions: named states, weighted transitions, and the
//! handler interface invoked by the FSM runner.
//!
//! A workload is a reusable bundle describing one kind of concurrent test
//! scenario. The engine never interprets what a handler does to the system
//! under test; it only invokes handlers and recovers their failures.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fsmstorm_error::{Result, StormError};
use serde_json::Value;

use crate::context::WorkerContext;

/// One state's behavior, invoked with the worker's exclusively-owned
/// context and the workload's target namespace.
///
/// The context is passed explicitly (no ambient binding): handlers read and
/// write persistent per-worker fields through `ctx.data` and draw
/// randomness from `ctx.rng`.
pub trait StateHandler: Send + Sync {
    /// Execute the state against the system under test.
    ///
    /// # Errors
    ///
    /// Any error (including a workload's own assertion failures) is
    /// recovered at the execution-unit boundary and reported as a non-ok
    /// worker outcome; it never aborts sibling workers.
    fn run(&self, ctx: &mut WorkerContext, target: &str) -> Result<()>;
}

impl<F> StateHandler for F
where
    F: Fn(&mut WorkerContext, &str) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &mut WorkerContext, target: &str) -> Result<()> {
        self(ctx, target)
    }
}

/// Shared handle to a state handler; cheap to clone into every worker.
pub type SharedHandler = Arc<dyn StateHandler>;

/// Configuration for one workload.
///
/// `transitions` maps a source state to `(next_state, weight)` pairs.
/// Weights are relative (they need not sum to 1) and are sampled in the
/// map's fixed enumeration order. A state with no transitions entry is
/// terminal-if-reached: legal at validation, an error at runtime if the
/// iteration budget has not been exhausted.
#[derive(Clone)]
pub struct WorkloadConfig {
    /// Workload name, unique within a registry.
    pub name: String,
    /// Namespace handed to every handler (defaults to the workload name).
    pub target: String,
    /// Desired worker count; may be scaled down at `init` time.
    pub thread_count: usize,
    /// Number of handler invocations per worker (0 = hooks only).
    pub iterations: u64,
    /// State executed on iteration 0.
    pub start_state: String,
    /// Named states and their handlers.
    pub states: BTreeMap<String, SharedHandler>,
    /// Weighted transition table.
    pub transitions: BTreeMap<String, BTreeMap<String, f64>>,
    /// Initial per-worker scratch state, deep-cloned into every worker.
    pub data: Value,
    /// Optional per-worker hook run before the first iteration.
    pub setup: Option<SharedHandler>,
    /// Optional per-worker hook run after the last iteration.
    pub teardown: Option<SharedHandler>,
}

impl WorkloadConfig {
    /// Start a workload definition with one thread, zero iterations, and
    /// the workload name as target namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            target: name.clone(),
            name,
            thread_count: 1,
            iterations: 0,
            start_state: String::new(),
            states: BTreeMap::new(),
            transitions: BTreeMap::new(),
            data: Value::Null,
            setup: None,
            teardown: None,
        }
    }

    /// Set the desired worker count.
    #[must_use]
    pub fn with_threads(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Set the per-worker iteration budget.
    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Override the target namespace handed to handlers.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the state executed on iteration 0.
    #[must_use]
    pub fn with_start_state(mut self, state: impl Into<String>) -> Self {
        self.start_state = state.into();
        self
    }

    /// Set the initial per-worker scratch state.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Set the per-worker setup hook.
    #[must_use]
    pub fn with_setup(mut self, hook: impl StateHandler + 'static) -> Self {
        self.setup = Some(Arc::new(hook));
        self
    }

    /// Set the per-worker teardown hook.
    #[must_use]
    pub fn with_teardown(mut self, hook: impl StateHandler + 'static) -> Self {
        self.teardown = Some(Arc::new(hook));
        self
    }

    /// Define a state.
    #[must_use]
    pub fn state(mut self, name: impl Into<String>, handler: impl StateHandler + 'static) -> Self {
        self.states.insert(name.into(), Arc::new(handler));
        self
    }

    /// Add one weighted transition edge.
    #[must_use]
    pub fn transition(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        weight: f64,
    ) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .insert(to.into(), weight);
        self
    }

    /// Check the static invariants of this configuration.
    ///
    /// Everything statically checkable is rejected here, never at
    /// execution time: unknown transition sources/targets, a missing start
    /// state, invalid weights, a zero thread count, and states whose
    /// outgoing weights sum to zero.
    ///
    /// # Errors
    ///
    /// Returns the first configuration fault found.
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(StormError::InvalidThreadCount {
                workload: self.name.clone(),
            });
        }
        if !self.states.contains_key(&self.start_state) {
            return Err(StormError::MissingStartState {
                workload: self.name.clone(),
                state: self.start_state.clone(),
            });
        }

        for (from, targets) in &self.transitions {
            if !self.states.contains_key(from) {
                return Err(StormError::UnknownTransitionState {
                    workload: self.name.clone(),
                    state: from.clone(),
                });
            }
            let mut total = 0.0_f64;
            for (target, &weight) in targets {
                if !self.states.contains_key(target) {
                    return Err(StormError::UnknownTransitionState {
                        workload: self.name.clone(),
                        state: target.clone(),
                    });
                }
                if !weight.is_finite() || weight < 0.0 {
                    return Err(StormError::InvalidWeight {
                        workload: self.name.clone(),
                        from: from.clone(),
                        target: target.clone(),
                        weight,
                    });
                }
                total += weight;
            }
            if !targets.is_empty() && total == 0.0 {
                return Err(StormError::ZeroWeightState {
                    workload: self.name.clone(),
                    state: from.clone(),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Debug for WorkloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadConfig")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("thread_count", &self.thread_count)
            .field("iterations", &self.iterations)
            .field("start_state", &self.start_state)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Explicit workload registry passed by reference into `init`.
///
/// Never mutated concurrently after spawn; `init` writes the adjusted
/// thread counts back into it so callers observe the real pool shape.
#[derive(Debug, Default)]
pub struct WorkloadRegistry {
    workloads: BTreeMap<String, WorkloadConfig>,
}

impl WorkloadRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a workload, keyed by its name. Replaces any previous entry
    /// with the same name.
    pub fn register(&mut self, config: WorkloadConfig) {
        self.workloads.insert(config.name.clone(), config);
    }

    /// Look up a workload by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WorkloadConfig> {
        self.workloads.get(name)
    }

    /// Look up a workload by name, mutably.
    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut WorkloadConfig> {
        self.workloads.get_mut(name)
    }

    /// Registered workload names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workloads.keys().map(String::as_str)
    }

    /// Number of registered workloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use fsmstorm_error::{Result, StormError};

    use super::{WorkloadConfig, WorkloadRegistry};
    use crate::context::WorkerContext;

    fn noop(_ctx: &mut WorkerContext, _target: &str) -> Result<()> {
        Ok(())
    }

    fn two_state_config() -> WorkloadConfig {
        WorkloadConfig::new("crud")
            .with_threads(4)
            .with_iterations(10)
            .with_start_state("insert")
            .state("insert", noop)
            .state("remove", noop)
            .transition("insert", "remove", 1.0)
            .transition("remove", "insert", 1.0)
    }

    #[test]
    fn valid_config_passes() {
        two_state_config().validate().unwrap();
    }

    #[test]
    fn target_defaults_to_name() {
        let config = WorkloadConfig::new("reshard");
        assert_eq!(config.target, "reshard");
    }

    #[test]
    fn missing_start_state_is_rejected() {
        let config = two_state_config().with_start_state("upsert");
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            StormError::MissingStartState { ref state, .. } if state == "upsert"
        ));
    }

    #[test]
    fn unknown_transition_target_is_rejected() {
        let config = two_state_config().transition("insert", "compact", 0.5);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            StormError::UnknownTransitionState { ref state, .. } if state == "compact"
        ));
    }

    #[test]
    fn unknown_transition_source_is_rejected() {
        let config = two_state_config().transition("compact", "insert", 0.5);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            StormError::UnknownTransitionState { ref state, .. } if state == "compact"
        ));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let config = two_state_config().transition("insert", "insert", -1.0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StormError::InvalidWeight { .. }));
    }

    #[test]
    fn non_finite_weight_is_rejected() {
        let config = two_state_config().transition("insert", "insert", f64::NAN);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StormError::InvalidWeight { .. }));
    }

    #[test]
    fn zero_total_weight_is_rejected() {
        let config = WorkloadConfig::new("stuck")
            .with_start_state("a")
            .state("a", noop)
            .state("b", noop)
            .transition("a", "b", 0.0);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            StormError::ZeroWeightState { ref state, .. } if state == "a"
        ));
    }

    #[test]
    fn terminal_state_without_transitions_is_legal_statically() {
        // Runtime is responsible for rejecting a dead state with budget
        // remaining; statically it may simply never be reached.
        let config = WorkloadConfig::new("oneshot")
            .with_start_state("only")
            .state("only", noop);
        config.validate().unwrap();
    }

    #[test]
    fn zero_thread_count_is_rejected() {
        let config = two_state_config().with_threads(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StormError::InvalidThreadCount { .. }));
    }

    #[test]
    fn registry_replaces_same_name() {
        let mut registry = WorkloadRegistry::new();
        registry.register(two_state_config());
        registry.register(two_state_config().with_threads(8));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("crud").unwrap().thread_count, 8);
    }
}
