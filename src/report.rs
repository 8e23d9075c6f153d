//! Result assembly: the per-case result table and per-run simulation logs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{EvalResult, ValidationError};
use crate::log::{CaseId, CASE_ID_KEY};
use crate::orchestrator::CaseSimulation;
use crate::recommendation::{Rank, RecommendationChoice};
use crate::reconcile::SimulatedCompletion;
use crate::stats::EvaluationStatistics;
use crate::time::Timestamp;

/// One row of the result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Case identifier.
    pub case_id: CaseId,
    /// Chosen activity; `None` when infeasible.
    pub act_rec: Option<String>,
    /// Chosen resource; `None` when infeasible.
    pub res_rec: Option<String>,
    /// Rank used; `None` (not 0) when infeasible.
    pub top_k: Option<Rank>,
    /// Real completion time in minutes.
    pub cycle_real: f64,
    /// Simulated completion time per run, in minutes.
    pub cycle_sim: Vec<f64>,
}

/// Per-case evaluation results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Number of runs (one `cycle_sim_j` column each).
    pub n_sim: usize,
    /// One row per case, in input order.
    pub rows: Vec<CaseResult>,
}

impl ResultTable {
    /// Column names in output order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = [CASE_ID_KEY, "act_rec", "res_rec", "top_k", "cycle_real"]
            .iter()
            .map(ToString::to_string)
            .collect();
        columns.extend((1..=self.n_sim).map(|j| format!("cycle_sim_{j}")));
        columns
    }

    /// Rows as JSON objects keyed by column name; absent values are `null`.
    #[must_use]
    pub fn to_records(&self) -> Vec<JsonValue> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                record.insert(CASE_ID_KEY.to_string(), json!(row.case_id));
                record.insert("act_rec".to_string(), json!(row.act_rec));
                record.insert("res_rec".to_string(), json!(row.res_rec));
                record.insert("top_k".to_string(), json!(row.top_k.map(Rank::get)));
                record.insert("cycle_real".to_string(), json!(row.cycle_real));
                for (j, value) in row.cycle_sim.iter().enumerate() {
                    record.insert(format!("cycle_sim_{}", j + 1), json!(value));
                }
                JsonValue::Object(record)
            })
            .collect()
    }
}

/// One simulated event, tagged with its case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationLogRow {
    /// Contiguous 0-based row index after sorting.
    pub index: usize,
    /// Case the event belongs to.
    pub case_id: CaseId,
    /// Activity label.
    pub activity: String,
    /// Resource, when assigned.
    pub resource: Option<String>,
    /// Simulated timestamp.
    pub timestamp: Timestamp,
}

/// All simulated events of one run, sorted by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationLog {
    /// Zero-based run index.
    pub run: usize,
    /// Rows sorted by timestamp.
    pub rows: Vec<SimulationLogRow>,
}

/// Output of a full evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// One simulation log per run.
    pub simulation_logs: Vec<SimulationLog>,
    /// Per-case results.
    pub results: ResultTable,
    /// Aggregated statistics.
    pub statistics: EvaluationStatistics,
}

fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), ValidationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ValidationError::LengthMismatch {
            what: what.to_string(),
            expected,
            actual,
        })
    }
}

/// Builds the per-case result table.
///
/// # Errors
///
/// Returns `ValidationError::LengthMismatch` when inputs are not aligned by case.
pub fn assemble_results(
    case_ids: &[CaseId],
    choices: &[RecommendationChoice],
    real: &[f64],
    simulated: &[Vec<SimulatedCompletion>],
) -> EvalResult<ResultTable> {
    let n = case_ids.len();
    check_len("recommendation choices", n, choices.len())?;
    check_len("real completions", n, real.len())?;
    for row in simulated {
        check_len("simulated completions", n, row.len())?;
    }

    let rows = case_ids
        .iter()
        .zip(choices)
        .zip(real)
        .enumerate()
        .map(|(i, ((case_id, choice), &cycle_real))| CaseResult {
            case_id: case_id.clone(),
            act_rec: choice.recommendation().map(|r| r.activity.clone()),
            res_rec: choice.recommendation().map(|r| r.resource.clone()),
            top_k: choice.rank(),
            cycle_real,
            cycle_sim: simulated.iter().map(|run| run[i].table_value(cycle_real)).collect(),
        })
        .collect();

    Ok(ResultTable {
        n_sim: simulated.len(),
        rows,
    })
}

/// Builds one run's simulation log from its grid row.
///
/// Only cases with a chosen recommendation and a completed simulation
/// contribute rows. Events with equal timestamps keep case order.
#[must_use]
pub fn assemble_simulation_log(
    run: usize,
    case_ids: &[CaseId],
    choices: &[RecommendationChoice],
    cells: &[CaseSimulation],
) -> SimulationLog {
    let mut rows: Vec<SimulationLogRow> = case_ids
        .iter()
        .zip(choices)
        .zip(cells)
        .filter(|((_, choice), _)| choice.is_feasible())
        .filter_map(|((case_id, _), cell)| cell.continuation().map(|c| (case_id, c)))
        .flat_map(|(case_id, continuation)| {
            continuation.events.iter().map(move |event| SimulationLogRow {
                index: 0,
                case_id: case_id.clone(),
                activity: event.activity.clone(),
                resource: event.resource.clone(),
                timestamp: event.timestamp,
            })
        })
        .collect();

    rows.sort_by_key(|row| row.timestamp);
    for (index, row) in rows.iter_mut().enumerate() {
        row.index = index;
    }

    SimulationLog { run, rows }
}
