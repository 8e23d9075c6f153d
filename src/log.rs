//! Historical event log: cases, traces and their events.
//!
//! The log is consumed pre-built. Timestamps stay in their raw string form
//! until the evaluator needs them, so one shared parser decides how the
//! mixed representations are read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalResult, ExecutionError};
use crate::time::{parse_timestamp, Timestamp};

/// Conventional key of the case identifier column and trace attribute.
pub const CASE_ID_KEY: &str = "case:concept:name";

/// Identifier of one process case.
///
/// Integer identifiers are compared through their string form, matching how
/// traces name themselves in `concept:name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Creates a case identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for CaseId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute values attached to events and traces.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// One historical event (`concept:name`, `org:resource`, `time:timestamp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Activity label.
    pub activity: String,
    /// Executing resource, when recorded.
    pub resource: Option<String>,
    /// Raw `time:timestamp` value.
    pub timestamp: String,
    /// Remaining event attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Event {
    /// Creates an event without extra attributes.
    #[must_use]
    pub fn new(
        activity: impl Into<String>,
        resource: Option<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            activity: activity.into(),
            resource,
            timestamp: timestamp.into(),
            attributes: Attributes::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Parses this event's timestamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the timestamp is malformed.
    pub fn parsed_timestamp(&self) -> EvalResult<Timestamp> {
        Ok(parse_timestamp(&self.timestamp)?)
    }
}

/// Ordered event sequence of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// `concept:name` of the trace.
    pub case_id: CaseId,
    /// Trace-level attributes.
    #[serde(default)]
    pub attributes: Attributes,
    /// Events in execution order.
    pub events: Vec<Event>,
}

impl Trace {
    /// Creates a trace.
    #[must_use]
    pub fn new(case_id: impl Into<CaseId>, events: Vec<Event>) -> Self {
        Self {
            case_id: case_id.into(),
            attributes: Attributes::new(),
            events,
        }
    }

    /// Timestamp of the final event.
    ///
    /// # Errors
    ///
    /// Fails if the trace is empty or the timestamp is malformed.
    pub fn last_timestamp(&self) -> EvalResult<Timestamp> {
        let last = self
            .events
            .last()
            .ok_or_else(|| ExecutionError::EmptyTrace {
                case_id: self.case_id.clone(),
            })?;
        last.parsed_timestamp()
    }
}

/// Collection of historical traces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// All traces in log order.
    pub traces: Vec<Trace>,
}

impl EventLog {
    /// Creates a log from traces.
    #[must_use]
    pub fn new(traces: Vec<Trace>) -> Self {
        Self { traces }
    }

    /// Number of traces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Returns true when the log has no traces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Locates the unique trace for `case_id`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::DataAlignment` when zero or several traces match.
    pub fn find_trace(&self, case_id: &CaseId) -> EvalResult<&Trace> {
        let mut matches = self.traces.iter().filter(|t| &t.case_id == case_id);
        let first = matches.next();
        let extra = matches.count();
        match (first, extra) {
            (Some(trace), 0) => Ok(trace),
            (first, extra) => Err(ExecutionError::DataAlignment {
                case_id: case_id.clone(),
                matches: usize::from(first.is_some()) + extra,
            }
            .into()),
        }
    }
}
