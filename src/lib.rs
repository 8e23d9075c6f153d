//! # recsim-eval - Simulation-driven evaluation of next-step recommendations
//!
//! Given in-flight cases of a business process, a ranked list of
//! (next activity, next resource) recommendations per case, and the
//! historical log that tells how each case really ended, this crate measures
//! how much earlier or later the cases would have completed had the
//! recommendations been followed.
//!
//! ## Core Concepts
//!
//! - **Split time**: the global cutoff between observed prefix and simulated continuation
//! - **Selection**: the best-ranked candidate the simulator can execute, chosen once per case
//! - **Run**: one independent simulation pass over every feasible case
//! - **Completion time**: minutes from the split time to a case's last event
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recsim_eval::{EvaluationConfig, Evaluator, ResourceAvailability};
//!
//! let mut config = EvaluationConfig::new("2024-01-01 09:00:00");
//! config.n_sim = 10;
//! config.runtime.workers = 4;
//!
//! let evaluator = Evaluator::new(config)?;
//! let report = evaluator.evaluate(&factory, &log, &candidates, ResourceAvailability::default())?;
//! println!("{}", report.statistics);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Inputs and shared types
pub mod config;
pub mod error;
pub mod log;
pub mod recommendation;
pub mod simulator;
pub mod time;

// Evaluation pipeline
pub mod context;
pub mod evaluator;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod selector;
pub mod stats;

// Re-export primary types at crate root for convenience
pub use config::{EvaluationConfig, RuntimeConfig};
pub use context::{CaseContext, ContextBuilder};
pub use error::{EvalError, EvalResult, ExecutionError, SimulatorError, ValidationError};
pub use evaluator::{EvaluationId, Evaluator};
pub use log::{CaseId, Event, EventLog, Trace};
pub use orchestrator::{
    CaseSimulation, SimulationFailure, SimulationGrid, SimulationOrchestrator, SimulationPlan,
};
pub use recommendation::{CandidateSet, Rank, Recommendation, RecommendationChoice};
pub use reconcile::{OutcomeReconciler, SimulatedCompletion};
pub use report::{
    assemble_results, assemble_simulation_log, CaseResult, EvaluationReport, ResultTable,
    SimulationLog, SimulationLogRow,
};
pub use selector::RecommendationSelector;
pub use simulator::{
    CalibrationParams, Continuation, ExecutionTimeMode, HistoryWeights, Infeasibility,
    ProcessSimulator, RecommendationPayload, ResourceAvailability, SimulatedEvent,
    SimulationRequest, SimulatorFactory, TransitionWeightMode,
};
pub use stats::{aggregate, DeviationSummary, EvaluationStatistics, RunStatistics};
pub use time::{parse_split_time, parse_timestamp, Timestamp};
