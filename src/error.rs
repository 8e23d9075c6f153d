//! Error types for the evaluator.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! exact failure instead of parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log::CaseId;

/// Validation errors that occur while checking inputs and configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid timestamp '{value}': expected \"%Y-%m-%d %H:%M:%S\" with optional fractional seconds and UTC offset")]
    InvalidTimestamp {
        value: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Rank {rank} is out of range [1, {max}]")]
    RankOutOfRange {
        rank: usize,
        max: usize,
    },

    #[error("Input length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
}

/// Execution errors that occur while running an evaluation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Case {case_id} matched {matches} traces in the event log (expected exactly one)")]
    DataAlignment {
        case_id: CaseId,
        matches: usize,
    },

    #[error("Trace for case {case_id} has no events")]
    EmptyTrace {
        case_id: CaseId,
    },

    #[error("Worker pool disconnected")]
    Disconnected,

    #[error("Simulator calibration failed: {0}")]
    Calibration(#[source] SimulatorError),
}

/// Errors reported by the external process simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SimulatorError {
    #[error("Simulation failed: {message}")]
    Failed {
        message: String,
    },

    #[error("Simulator panicked: {message}")]
    Panicked {
        message: String,
    },
}

impl SimulatorError {
    /// Creates a generic simulation failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Top-level error type for the evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl EvalError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Data alignment problems never resolve on retry; a lost worker pool may.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(e, ExecutionError::Disconnected),
        }
    }
}

/// Result type alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
