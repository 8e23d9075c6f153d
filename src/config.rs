//! Evaluation configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EvalResult, ValidationError};
use crate::simulator::CalibrationParams;
use crate::time::{parse_split_time, Timestamp};

/// Worker pool settings for the simulation grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of simulation workers; 1 reproduces strictly sequential order.
    pub workers: usize,
    /// Maximum queued simulations.
    pub queue_capacity: usize,
    /// Wall-clock limit of a single simulation, counted from its start; capped at one week.
    pub simulation_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 1024,
            simulation_timeout_ms: 60_000,
        }
    }
}

impl RuntimeConfig {
    /// Validate runtime limits.
    ///
    /// # Errors
    ///
    /// Rejects zero workers, queue capacity or timeout.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(invalid("workers must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be > 0"));
        }
        if self.simulation_timeout_ms == 0 {
            return Err(invalid("simulation_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

/// Settings of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Global split time, `"%Y-%m-%d %H:%M:%S"`.
    pub split_time: String,
    /// Number of independent simulation runs.
    pub n_sim: usize,
    /// Ranked candidates considered per case.
    pub top_k: usize,
    /// Data attributes used for calibration and case context.
    pub data_attributes: Vec<String>,
    /// Categorical subset of `data_attributes`.
    pub categorical_attributes: Vec<String>,
    /// Base seed for reproducible runs.
    pub seed: Option<u64>,
    /// Worker pool settings.
    pub runtime: RuntimeConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            split_time: String::new(),
            n_sim: 10,
            top_k: 3,
            data_attributes: Vec::new(),
            categorical_attributes: Vec::new(),
            seed: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

fn invalid(reason: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.to_string(),
    }
}

impl EvaluationConfig {
    /// Creates a configuration with defaults for everything but the split time.
    #[must_use]
    pub fn new(split_time: impl Into<String>) -> Self {
        Self {
            split_time: split_time.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> EvalResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("failed to parse configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Rejects a malformed split time, `n_sim == 0`, `top_k` outside
    /// `1..=255`, categorical attributes that are not data attributes, and
    /// invalid runtime limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.split_time.is_empty() {
            return Err(ValidationError::MissingField {
                field: "split_time".to_string(),
            });
        }
        parse_split_time(&self.split_time)?;
        if self.n_sim == 0 {
            return Err(invalid("n_sim must be > 0"));
        }
        if self.top_k == 0 || self.top_k > usize::from(u8::MAX) {
            return Err(invalid("top_k must be in 1..=255"));
        }
        if let Some(attr) = self
            .categorical_attributes
            .iter()
            .find(|a| !self.data_attributes.contains(a))
        {
            return Err(ValidationError::InvalidConfig {
                reason: format!("categorical attribute '{attr}' is not a data attribute"),
            });
        }
        self.runtime.validate()
    }

    /// Parsed split time.
    ///
    /// # Errors
    ///
    /// Fails when the split time is malformed.
    pub fn split_timestamp(&self) -> Result<Timestamp, ValidationError> {
        parse_split_time(&self.split_time)
    }

    /// Calibration parameters for the simulator.
    #[must_use]
    pub fn calibration_params(&self) -> CalibrationParams {
        CalibrationParams {
            data_attributes: self.data_attributes.clone(),
            categorical_attributes: self.categorical_attributes.clone(),
            ..CalibrationParams::default()
        }
    }
}
