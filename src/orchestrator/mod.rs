//! Simulation orchestration over the (run, case) grid.
//!
//! Runs are independent: the only state they share is the recommendation
//! choice fixed before the first run. Within a run every feasible case is
//! submitted to the worker pool, and the run's results are collected in case
//! order before the next run starts.

pub(crate) mod runtime;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::context::CaseContext;
use crate::error::{EvalResult, SimulatorError, ValidationError};
use crate::recommendation::RecommendationChoice;
use crate::simulator::{Continuation, ProcessSimulator, ResourceAvailability, SimulationRequest};
use crate::time::Timestamp;

use runtime::{TaskHandle, WorkerPool};

/// Upper bound on a single simulation's timeout (one week).
const MAX_SIMULATION_TIMEOUT_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// Why one (run, case) simulation produced no continuation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SimulationFailure {
    #[error("{0}")]
    Simulator(#[from] SimulatorError),

    #[error("simulation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("simulation was not started before the run deadline")]
    NotStarted,

    #[error("simulation worker disconnected")]
    Disconnected,
}

/// Outcome of one (run, case) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseSimulation {
    /// The simulator returned a continuation (possibly empty).
    Completed(Continuation),
    /// The case has no feasible recommendation; nothing was simulated.
    Skipped,
    /// The simulation was attempted and failed.
    Failed(SimulationFailure),
}

impl CaseSimulation {
    /// The continuation, if one was produced.
    #[must_use]
    pub const fn continuation(&self) -> Option<&Continuation> {
        match self {
            Self::Completed(c) => Some(c),
            Self::Skipped | Self::Failed(_) => None,
        }
    }

    /// Returns true if the simulation was attempted and failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// `n_sim × n_cases` simulation outcomes, indexed `[run][case]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationGrid {
    /// One row per run.
    pub runs: Vec<Vec<CaseSimulation>>,
}

impl SimulationGrid {
    /// Number of runs.
    #[must_use]
    pub fn n_runs(&self) -> usize {
        self.runs.len()
    }

    /// Cell at `[run][case]`.
    #[must_use]
    pub fn get(&self, run: usize, case: usize) -> Option<&CaseSimulation> {
        self.runs.get(run).and_then(|r| r.get(case))
    }

    /// Total number of failed cells.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.runs.iter().flatten().filter(|c| c.is_failed()).count()
    }
}

/// Read-only inputs shared by every run.
#[derive(Debug, Clone)]
pub struct SimulationPlan<'a> {
    /// Per-case contexts.
    pub contexts: &'a [CaseContext],
    /// Per-case choices, fixed for all runs.
    pub choices: &'a [RecommendationChoice],
    /// Shared availability table.
    pub availability: Arc<ResourceAvailability>,
    /// Split time, used as the simulation clock start.
    pub starting_time: Timestamp,
    /// Base seed; `None` leaves randomness to the simulator.
    pub seed: Option<u64>,
}

impl SimulationPlan<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.contexts.len() != self.choices.len() {
            return Err(ValidationError::LengthMismatch {
                what: "recommendation choices".to_string(),
                expected: self.contexts.len(),
                actual: self.choices.len(),
            });
        }
        Ok(())
    }

    fn seed_for(&self, run: usize, case: usize) -> Option<u64> {
        let offset = run
            .saturating_mul(self.contexts.len())
            .saturating_add(case);
        self.seed
            .map(|s| s.wrapping_add(u64::try_from(offset).unwrap_or(u64::MAX)))
    }
}

/// Drives repeated simulation runs on a worker pool.
pub struct SimulationOrchestrator {
    pool: Option<WorkerPool>,
    timeout: Duration,
    abandoned: usize,
}

impl SimulationOrchestrator {
    /// Starts the worker pool.
    #[must_use]
    pub fn new(simulator: Arc<dyn ProcessSimulator>, config: &RuntimeConfig) -> Self {
        Self {
            pool: Some(WorkerPool::start(config, simulator)),
            timeout: Duration::from_millis(
                config
                    .simulation_timeout_ms
                    .clamp(1, MAX_SIMULATION_TIMEOUT_MS),
            ),
            abandoned: 0,
        }
    }

    /// Runs `n_sim` independent passes.
    ///
    /// # Errors
    ///
    /// Fails on misaligned inputs or a dead worker pool; individual
    /// simulation failures are recorded in the grid instead.
    pub fn run_all(&mut self, plan: &SimulationPlan<'_>, n_sim: usize) -> EvalResult<SimulationGrid> {
        let mut runs = Vec::with_capacity(n_sim);
        for run in 0..n_sim {
            info!(run = run + 1, n_sim, "starting simulation run");
            let results = self.run_once(plan, run)?;
            let failed = results.iter().filter(|c| c.is_failed()).count();
            if failed > 0 {
                warn!(run = run + 1, failed, "simulations failed in run");
            }
            info!(run = run + 1, "simulation run complete");
            runs.push(results);
        }
        Ok(SimulationGrid { runs })
    }

    /// Runs one pass over every case; the returned vector is in case order.
    ///
    /// # Errors
    ///
    /// Fails on misaligned inputs or a dead worker pool.
    pub fn run_once(&mut self, plan: &SimulationPlan<'_>, run: usize) -> EvalResult<Vec<CaseSimulation>> {
        plan.validate()?;
        let Some(pool) = self.pool.as_ref() else {
            return Err(crate::error::ExecutionError::Disconnected.into());
        };

        let mut pending: Vec<Result<Option<TaskHandle>, SimulationFailure>> =
            Vec::with_capacity(plan.contexts.len());
        let mut submitted = 0_u32;

        for (case, (context, choice)) in plan.contexts.iter().zip(plan.choices).enumerate() {
            let RecommendationChoice::Chosen { recommendation, .. } = choice else {
                pending.push(Ok(None));
                continue;
            };
            let request = SimulationRequest {
                n_repetitions: 1,
                remove_head_tail: 0,
                starting_time: plan.starting_time,
                resource_availability: Arc::clone(&plan.availability),
                recommendation: context.payload(recommendation),
                run,
                seed: plan.seed_for(run, case),
            };
            match pool.submit(request, self.timeout)? {
                Ok(handle) => {
                    submitted = submitted.saturating_add(1);
                    pending.push(Ok(Some(handle)));
                }
                Err(failure) => pending.push(Err(failure)),
            }
        }

        // Every queued task gets one timeout per wave of workers to be picked up.
        let workers = u32::try_from(pool.size()).unwrap_or(u32::MAX).max(1);
        let waves = submitted.div_ceil(workers).max(1);
        let start_deadline = Instant::now() + self.timeout.saturating_mul(waves);

        let mut results = Vec::with_capacity(pending.len());
        for (case, slot) in pending.into_iter().enumerate() {
            let outcome = match slot {
                Ok(None) => CaseSimulation::Skipped,
                Ok(Some(handle)) => match handle.wait(start_deadline, self.timeout) {
                    Ok(continuation) => CaseSimulation::Completed(continuation),
                    Err(failure) => self.record_failure(run, case, plan, failure),
                },
                Err(failure) => self.record_failure(run, case, plan, failure),
            };
            results.push(outcome);
        }
        Ok(results)
    }

    fn record_failure(
        &mut self,
        run: usize,
        case: usize,
        plan: &SimulationPlan<'_>,
        failure: SimulationFailure,
    ) -> CaseSimulation {
        if matches!(failure, SimulationFailure::Timeout { .. } | SimulationFailure::NotStarted) {
            self.abandoned += 1;
        }
        warn!(
            run = run + 1,
            case_id = %plan.contexts[case].case_id,
            error = %failure,
            "simulation failed; case treated as infeasible for this run"
        );
        CaseSimulation::Failed(failure)
    }
}

impl Drop for SimulationOrchestrator {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let grace = (self.abandoned > 0).then_some(self.timeout);
            pool.shutdown(grace);
        }
    }
}
