//! End-to-end evaluation pipeline.
//!
//! calibrate → build contexts → select recommendations (once) → simulate
//! `n_sim` runs → reconcile → aggregate → assemble.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::EvaluationConfig;
use crate::context::ContextBuilder;
use crate::error::{EvalResult, ExecutionError};
use crate::log::{CaseId, EventLog};
use crate::orchestrator::{SimulationOrchestrator, SimulationPlan};
use crate::recommendation::{CandidateSet, Rank};
use crate::reconcile::OutcomeReconciler;
use crate::report::{assemble_results, assemble_simulation_log, EvaluationReport};
use crate::selector::RecommendationSelector;
use crate::simulator::{ProcessSimulator, ResourceAvailability, SimulatorFactory};
use crate::stats::aggregate;

/// Identifier attached to every log line of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(Uuid);

impl EvaluationId {
    /// Create a new random evaluation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Evaluates ranked recommendations by repeated simulation.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluationConfig,
}

impl Evaluator {
    /// Creates an evaluator.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(config: EvaluationConfig) -> EvalResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Calibrates a simulator from `log` and evaluates every candidate set.
    ///
    /// # Errors
    ///
    /// Fails on calibration errors, cases missing from the log, malformed
    /// timestamps or a lost worker pool.
    pub fn evaluate<F>(
        &self,
        factory: &F,
        log: &EventLog,
        candidates: &[CandidateSet],
        availability: ResourceAvailability,
    ) -> EvalResult<EvaluationReport>
    where
        F: SimulatorFactory + ?Sized,
    {
        let simulator = factory
            .discover_from_eventlog(log, &self.config.calibration_params())
            .map_err(ExecutionError::Calibration)?;
        self.evaluate_with(simulator, log, candidates, availability)
    }

    /// Evaluates with an already calibrated simulator.
    ///
    /// # Errors
    ///
    /// Same as `evaluate`, minus calibration.
    pub fn evaluate_with(
        &self,
        simulator: Arc<dyn ProcessSimulator>,
        log: &EventLog,
        candidates: &[CandidateSet],
        availability: ResourceAvailability,
    ) -> EvalResult<EvaluationReport> {
        let id = EvaluationId::new();
        let span = info_span!("evaluation", %id, cases = candidates.len(), n_sim = self.config.n_sim);
        let _guard = span.enter();

        let split_time = self.config.split_timestamp()?;
        let case_ids: Vec<CaseId> = candidates.iter().map(|c| c.case_id.clone()).collect();

        let contexts = ContextBuilder::new(log, split_time, &self.config.data_attributes)
            .build_all(candidates)?;

        let choices = RecommendationSelector::new(
            simulator.as_ref(),
            &availability,
            split_time,
            self.config.top_k,
        )
        .select_all(&contexts, candidates);
        let ranks: Vec<Option<Rank>> = choices.iter().map(|c| c.rank()).collect();

        let infeasible = ranks.iter().filter(|r| r.is_none()).count();
        if infeasible > 0 {
            warn!(infeasible, cases = candidates.len(), "cases without an executable recommendation");
        }

        let plan = SimulationPlan {
            contexts: &contexts,
            choices: &choices,
            availability: Arc::new(availability),
            starting_time: split_time,
            seed: self.config.seed,
        };
        let grid = {
            let mut orchestrator = SimulationOrchestrator::new(simulator, &self.config.runtime);
            orchestrator.run_all(&plan, self.config.n_sim)?
        };

        let reconciler = OutcomeReconciler::new(log, split_time);
        let real = reconciler.real_completions(&case_ids)?;
        let simulated = reconciler.simulated_completions(&grid, &case_ids);

        let statistics = aggregate(&real, &simulated, &ranks)?;
        let results = assemble_results(&case_ids, &choices, &real, &simulated)?;
        let simulation_logs = grid
            .runs
            .iter()
            .enumerate()
            .map(|(run, cells)| assemble_simulation_log(run, &case_ids, &choices, cells))
            .collect();

        info!(
            failed_simulations = statistics.failed_simulations,
            infeasible = statistics.infeasible_cases,
            "evaluation complete"
        );

        Ok(EvaluationReport {
            simulation_logs,
            results,
            statistics,
        })
    }
}
