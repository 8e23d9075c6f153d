//! Reduces real traces and simulated continuations to completion times.
//!
//! A completion time is the number of minutes from the split time to the
//! case's final event.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EvalResult;
use crate::log::{CaseId, EventLog};
use crate::orchestrator::{CaseSimulation, SimulationGrid};
use crate::time::{minutes_between, Timestamp};

/// Simulated completion time of one (run, case) cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SimulatedCompletion {
    /// Minutes from split to the last simulated event.
    Feasible(f64),
    /// No recommendation was executable; nothing was simulated.
    Infeasible,
    /// A simulation was attempted in this run and failed.
    Failed,
}

impl SimulatedCompletion {
    /// The simulated value, if there is one.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Feasible(v) => Some(v),
            Self::Infeasible | Self::Failed => None,
        }
    }

    /// Value reported in the result table.
    ///
    /// Cells without a simulated value report the real completion time, so
    /// their deviation in the table reads as zero.
    #[must_use]
    pub const fn table_value(self, real: f64) -> f64 {
        match self {
            Self::Feasible(v) => v,
            Self::Infeasible | Self::Failed => real,
        }
    }
}

/// Converts real and simulated outcomes into minutes from the split time.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeReconciler<'a> {
    log: &'a EventLog,
    split_time: Timestamp,
}

impl<'a> OutcomeReconciler<'a> {
    /// Creates a reconciler anchored at `split_time`.
    #[must_use]
    pub const fn new(log: &'a EventLog, split_time: Timestamp) -> Self {
        Self { log, split_time }
    }

    /// Real completion time of one case.
    ///
    /// # Errors
    ///
    /// Fails when the case is not exactly once in the log, its trace is
    /// empty, or its last timestamp is malformed.
    pub fn real_completion(&self, case_id: &CaseId) -> EvalResult<f64> {
        let last = self.log.find_trace(case_id)?.last_timestamp()?;
        let minutes = minutes_between(self.split_time, last);
        if minutes < 0.0 {
            warn!(%case_id, minutes, "case ended before the split time");
        }
        Ok(minutes)
    }

    /// Real completion times for all cases, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first case that fails.
    pub fn real_completions(&self, case_ids: &[CaseId]) -> EvalResult<Vec<f64>> {
        case_ids.iter().map(|id| self.real_completion(id)).collect()
    }

    /// Simulated completion time of one cell.
    #[must_use]
    pub fn simulated_completion(&self, case_id: &CaseId, cell: &CaseSimulation) -> SimulatedCompletion {
        match cell {
            CaseSimulation::Completed(continuation) => match continuation.last_timestamp() {
                Some(last) => SimulatedCompletion::Feasible(minutes_between(self.split_time, last)),
                None => {
                    warn!(%case_id, "simulator returned an empty continuation; counting it as completed at the split time");
                    SimulatedCompletion::Feasible(0.0)
                }
            },
            CaseSimulation::Skipped => SimulatedCompletion::Infeasible,
            CaseSimulation::Failed(_) => SimulatedCompletion::Failed,
        }
    }

    /// Simulated completion times for the whole grid, indexed `[run][case]`.
    #[must_use]
    pub fn simulated_completions(
        &self,
        grid: &SimulationGrid,
        case_ids: &[CaseId],
    ) -> Vec<Vec<SimulatedCompletion>> {
        grid.runs
            .iter()
            .map(|run| {
                run.iter()
                    .zip(case_ids)
                    .map(|(cell, id)| self.simulated_completion(id, cell))
                    .collect()
            })
            .collect()
    }
}
