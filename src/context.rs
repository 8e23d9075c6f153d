//! Per-case simulation inputs: observed prefix and case attributes.

use serde::{Deserialize, Serialize};

use crate::error::EvalResult;
use crate::log::{Attributes, CaseId, Event, EventLog};
use crate::recommendation::{CandidateSet, Recommendation};
use crate::simulator::RecommendationPayload;
use crate::time::Timestamp;

/// Everything the simulator needs to know about a case at the split point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseContext {
    /// Case identifier.
    pub case_id: CaseId,
    /// Events observed at or before the split time, in log order.
    pub prefix: Vec<Event>,
    /// Configured data attributes; empty when none are configured.
    pub attributes: Attributes,
}

impl CaseContext {
    /// Builds the simulator payload for a chosen recommendation.
    #[must_use]
    pub fn payload(&self, recommendation: &Recommendation) -> RecommendationPayload {
        RecommendationPayload {
            case_id: self.case_id.clone(),
            activity: recommendation.activity.clone(),
            resource: recommendation.resource.clone(),
            prefix: self.prefix.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Builds `CaseContext`s from the historical log.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder<'a> {
    log: &'a EventLog,
    split_time: Timestamp,
    data_attributes: &'a [String],
}

impl<'a> ContextBuilder<'a> {
    /// Creates a builder anchored at `split_time`.
    #[must_use]
    pub const fn new(log: &'a EventLog, split_time: Timestamp, data_attributes: &'a [String]) -> Self {
        Self {
            log,
            split_time,
            data_attributes,
        }
    }

    /// Builds the context of one case.
    ///
    /// # Errors
    ///
    /// A case that is not exactly once in the log is a data alignment error;
    /// a malformed event timestamp is a validation error.
    pub fn build(&self, case_id: &CaseId) -> EvalResult<CaseContext> {
        let trace = self.log.find_trace(case_id)?;

        let mut prefix = Vec::new();
        for event in &trace.events {
            if event.parsed_timestamp()? <= self.split_time {
                prefix.push(event.clone());
            }
        }

        let mut attributes = Attributes::new();
        for name in self.data_attributes {
            let latest = prefix
                .iter()
                .rev()
                .find_map(|e| e.attributes.get(name))
                .or_else(|| trace.attributes.get(name));
            if let Some(value) = latest {
                attributes.insert(name.clone(), value.clone());
            }
        }

        Ok(CaseContext {
            case_id: case_id.clone(),
            prefix,
            attributes,
        })
    }

    /// Builds contexts for every candidate set, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first case that cannot be built.
    pub fn build_all(&self, candidates: &[CandidateSet]) -> EvalResult<Vec<CaseContext>> {
        candidates.iter().map(|c| self.build(&c.case_id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::{EvalError, ExecutionError};
    use crate::log::Trace;
    use crate::time::parse_split_time;

    fn log() -> EventLog {
        let mut trace = Trace::new(
            "1",
            vec![
                Event::new("register", Some("ann".into()), "2024-01-01 08:00:00")
                    .with_attribute("amount", json!(100)),
                Event::new("check", Some("bob".into()), "2024-01-01 09:00:00.000+01:00")
                    .with_attribute("amount", json!(150)),
                Event::new("pay", Some("carl".into()), "2024-01-01 12:00:00")
                    .with_attribute("amount", json!(999)),
            ],
        );
        trace.attributes.insert("channel".into(), json!("web"));
        trace.attributes.insert("amount".into(), json!(1));
        EventLog::new(vec![trace])
    }

    #[test]
    fn prefix_stops_at_split_time() {
        let log = log();
        let split = parse_split_time("2024-01-01 09:00:00").unwrap();
        let ctx = ContextBuilder::new(&log, split, &[]).build(&CaseId::from("1")).unwrap();
        let acts: Vec<&str> = ctx.prefix.iter().map(|e| e.activity.as_str()).collect();
        assert_eq!(acts, vec!["register", "check"]);
    }

    #[test]
    fn attributes_default_to_empty_placeholder() {
        let log = log();
        let split = parse_split_time("2024-01-01 09:00:00").unwrap();
        let ctx = ContextBuilder::new(&log, split, &[]).build(&CaseId::from("1")).unwrap();
        assert!(ctx.attributes.is_empty());
    }

    #[test]
    fn attributes_prefer_latest_prefix_event_then_trace() {
        let log = log();
        let split = parse_split_time("2024-01-01 09:00:00").unwrap();
        let names = vec!["amount".to_string(), "channel".to_string(), "missing".to_string()];
        let ctx = ContextBuilder::new(&log, split, &names).build(&CaseId::from("1")).unwrap();
        assert_eq!(ctx.attributes["amount"], json!(150));
        assert_eq!(ctx.attributes["channel"], json!("web"));
        assert!(!ctx.attributes.contains_key("missing"));
    }

    #[test]
    fn missing_case_is_fatal() {
        let log = log();
        let split = parse_split_time("2024-01-01 09:00:00").unwrap();
        let candidates = vec![CandidateSet::new("1", vec![]), CandidateSet::new("2", vec![])];
        let err = ContextBuilder::new(&log, split, &[]).build_all(&candidates).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Execution(ExecutionError::DataAlignment { .. })
        ));
    }

    #[test]
    fn payload_carries_prefix_and_choice() {
        let log = log();
        let split = parse_split_time("2024-01-01 08:30:00").unwrap();
        let ctx = ContextBuilder::new(&log, split, &[]).build(&CaseId::from("1")).unwrap();
        let payload = ctx.payload(&Recommendation::new("approve", "dana"));
        assert_eq!(payload.activity, "approve");
        assert_eq!(payload.resource, "dana");
        assert_eq!(payload.prefix.len(), 1);
    }
}
