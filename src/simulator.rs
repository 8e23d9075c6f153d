//! Interface to the external discrete-event process simulator.
//!
//! The evaluator never executes a process model itself. It calibrates a
//! simulator once through a `SimulatorFactory`, asks it which candidates are
//! executable, and requests single-case continuations from it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::CaseContext;
use crate::error::SimulatorError;
use crate::log::{Attributes, CaseId, Event, EventLog};
use crate::recommendation::Recommendation;
use crate::time::Timestamp;

/// Resource availability table, passed through to the simulator unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceAvailability(pub serde_json::Value);

impl ResourceAvailability {
    /// Wraps an availability table.
    #[must_use]
    pub const fn new(table: serde_json::Value) -> Self {
        Self(table)
    }

    /// Returns the raw table.
    #[must_use]
    pub const fn table(&self) -> &serde_json::Value {
        &self.0
    }
}

/// One simulated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedEvent {
    /// Activity label.
    pub activity: String,
    /// Executing resource, when the simulator assigns one.
    pub resource: Option<String>,
    /// Simulated completion instant.
    pub timestamp: Timestamp,
}

/// Simulated remainder of a case after the split point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    /// Events in simulated order.
    pub events: Vec<SimulatedEvent>,
}

impl Continuation {
    /// Creates a continuation.
    #[must_use]
    pub const fn new(events: Vec<SimulatedEvent>) -> Self {
        Self { events }
    }

    /// Returns true if nothing was simulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the last simulated event.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.events.last().map(|e| e.timestamp)
    }
}

/// Why a candidate recommendation cannot be simulated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Infeasibility {
    #[error("resource '{resource}' is not available")]
    ResourceUnavailable {
        resource: String,
    },

    #[error("no enabled transition for activity '{activity}'")]
    NoMatchingTransition {
        activity: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Single-case recommendation payload handed to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationPayload {
    /// Case being continued.
    pub case_id: CaseId,
    /// Activity to execute next.
    pub activity: String,
    /// Resource to execute it.
    pub resource: String,
    /// Observed prefix up to the split point.
    pub prefix: Vec<Event>,
    /// Case attributes used by data-aware transition weights.
    pub attributes: Attributes,
}

/// A request for one simulated continuation.
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    /// Number of repetitions (the evaluator always asks for one).
    pub n_repetitions: usize,
    /// Number of events trimmed from the head and tail of the output.
    pub remove_head_tail: usize,
    /// Simulation clock start (the split time).
    pub starting_time: Timestamp,
    /// Shared resource availability.
    pub resource_availability: Arc<ResourceAvailability>,
    /// The recommendation to follow.
    pub recommendation: RecommendationPayload,
    /// Zero-based run index.
    pub run: usize,
    /// Seed for the simulator's random source, when reproducibility is requested.
    pub seed: Option<u64>,
}

/// Discrete-event process simulator.
///
/// Implementations are shared across worker threads and must be read-only
/// during simulation.
pub trait ProcessSimulator: Send + Sync {
    /// Checks whether `candidate` can be executed for the case at `starting_time`.
    ///
    /// # Errors
    ///
    /// Returns the reason the candidate is not executable.
    fn check_executable(
        &self,
        context: &CaseContext,
        candidate: &Recommendation,
        availability: &ResourceAvailability,
        starting_time: Timestamp,
    ) -> Result<(), Infeasibility>;

    /// Simulates the continuation of one case.
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError` when the simulation cannot complete.
    fn simulate(&self, request: &SimulationRequest) -> Result<Continuation, SimulatorError>;
}

/// How activity execution times are modelled during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTimeMode {
    /// One distribution per activity.
    Activity,
    /// One distribution per (activity, resource).
    #[default]
    Resource,
}

/// How transition weights are modelled during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionWeightMode {
    /// Uniform choice among enabled transitions.
    Equal,
    /// Frequencies observed in the log.
    Frequency,
    /// Learned from case data attributes.
    #[default]
    DataAttributes,
}

/// How case history enters the transition-weight model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWeights {
    /// History ignored.
    None,
    /// Whether each activity occurred.
    #[default]
    Binary,
    /// How often each activity occurred.
    Count,
}

/// Parameters of the one-time simulator calibration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Execution time model.
    pub mode_ex_time: ExecutionTimeMode,
    /// Transition weight model.
    pub mode_trans_weights: TransitionWeightMode,
    /// Data attributes used by the weight model.
    pub data_attributes: Vec<String>,
    /// Subset of `data_attributes` that are categorical.
    pub categorical_attributes: Vec<String>,
    /// History encoding.
    pub history_weights: HistoryWeights,
}

/// Calibrates a simulator from a historical log.
pub trait SimulatorFactory {
    /// Discovers simulation parameters from `log` and returns a ready simulator.
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError` when calibration fails.
    fn discover_from_eventlog(
        &self,
        log: &EventLog,
        params: &CalibrationParams,
    ) -> Result<Arc<dyn ProcessSimulator>, SimulatorError>;
}

impl<F> SimulatorFactory for F
where
    F: Fn(&EventLog, &CalibrationParams) -> Result<Arc<dyn ProcessSimulator>, SimulatorError>,
{
    fn discover_from_eventlog(
        &self,
        log: &EventLog,
        params: &CalibrationParams,
    ) -> Result<Arc<dyn ProcessSimulator>, SimulatorError> {
        self(log, params)
    }
}
