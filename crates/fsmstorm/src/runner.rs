//! Per-worker FSM interpreter: a bounded, weighted random walk over the
//! workload's states.
//!
//! The walk is deterministic given the worker's seed: the only randomness
//! is the worker-private `StdRng` in the context, so identical seeds and
//! configs replay identical state sequences regardless of thread
//! interleaving.

use std::collections::BTreeMap;

use fsmstorm_error::{Result, StormError};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::context::WorkerContext;
use crate::workload::WorkloadConfig;

/// Tallies collected while a worker walks its state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsmRunStats {
    /// Handler invocations performed.
    pub iterations_run: u64,
    /// Visit count per state name.
    pub state_visits: BTreeMap<String, u64>,
}

impl FsmRunStats {
    fn record(&mut self, state: &str) {
        self.iterations_run += 1;
        *self.state_visits.entry(state.to_owned()).or_default() += 1;
    }
}

/// Interprets one workload's state machine for one worker.
pub struct FsmRunner<'a> {
    workload: &'a WorkloadConfig,
}

impl<'a> FsmRunner<'a> {
    /// Create a runner over a validated workload config.
    #[must_use]
    pub fn new(workload: &'a WorkloadConfig) -> Self {
        Self { workload }
    }

    /// Execute setup, the bounded walk, then teardown.
    ///
    /// Teardown runs even when the walk fails, so workloads can release
    /// whatever their setup acquired; the walk's error wins over a
    /// teardown error.
    ///
    /// # Errors
    ///
    /// Returns the first handler error, or `NoOutgoingTransitions` when
    /// the walk reaches a dead state with budget remaining.
    pub fn run(&self, ctx: &mut WorkerContext) -> Result<FsmRunStats> {
        let target = self.workload.target.clone();
        let mut stats = FsmRunStats::default();

        if let Some(setup) = &self.workload.setup {
            setup.run(ctx, &target)?;
        }

        let walk = self.walk(ctx, &mut stats);

        let teardown = match &self.workload.teardown {
            Some(hook) => hook.run(ctx, &target),
            None => Ok(()),
        };

        walk?;
        teardown?;
        Ok(stats)
    }

    /// The bounded walk itself. Iteration 0 executes the start state; each
    /// subsequent iteration samples the next state from the current
    /// state's weighted transitions.
    fn walk(&self, ctx: &mut WorkerContext, stats: &mut FsmRunStats) -> Result<()> {
        let w = self.workload;
        let mut current = w.start_state.as_str();

        for iteration in 0..w.iterations {
            if iteration > 0 {
                let outgoing = w
                    .transitions
                    .get(current)
                    .filter(|targets| !targets.is_empty())
                    .ok_or_else(|| StormError::NoOutgoingTransitions {
                        workload: w.name.clone(),
                        state: current.to_owned(),
                        remaining: w.iterations - iteration,
                    })?;
                current = choose_weighted(&mut ctx.rng, outgoing).ok_or_else(|| {
                    StormError::ZeroWeightState {
                        workload: w.name.clone(),
                        state: current.to_owned(),
                    }
                })?;
            }

            debug!(
                workload = %w.name,
                tid = ctx.tid,
                iteration,
                state = current,
                "executing state"
            );

            let handler =
                w.states
                    .get(current)
                    .ok_or_else(|| StormError::UnknownTransitionState {
                        workload: w.name.clone(),
                        state: current.to_owned(),
                    })?;
            handler.run(ctx, &w.target)?;
            stats.record(current);
        }

        Ok(())
    }
}

/// Sample a next state: draw uniformly in `[0, total_weight)` and walk the
/// `(state, weight)` pairs in the map's fixed order, accumulating weight
/// until the draw falls inside the accumulated range.
///
/// Returns `None` when no transition carries positive weight (validation
/// rejects such tables up front; this guards direct runner use).
fn choose_weighted<'t>(rng: &mut StdRng, outgoing: &'t BTreeMap<String, f64>) -> Option<&'t str> {
    let total: f64 = outgoing.values().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let draw = rng.gen_range(0.0..total);
    let mut accumulated = 0.0_f64;
    let mut last_positive = None;
    for (state, &weight) in outgoing {
        if weight <= 0.0 {
            continue;
        }
        accumulated += weight;
        last_positive = Some(state.as_str());
        if draw < accumulated {
            return last_positive;
        }
    }

    // Float round-off can leave the draw marginally above the final
    // accumulated sum; the last positive-weight state owns that sliver.
    last_positive
}
