//! Deviation statistics between simulated and real completion times.
//!
//! Every statistic is computed per run over the cases that had a feasible
//! recommendation and a simulated value in that run, then summarised across
//! runs by mean and population standard deviation. Infeasible cases are
//! excluded from numerators and denominators alike; they only feed the
//! infeasibility rate.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EvalResult, ValidationError};
use crate::recommendation::Rank;
use crate::reconcile::SimulatedCompletion;

/// Cross-run mean and standard deviation of one run-level statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationSummary {
    /// Mean over runs.
    pub mean: f64,
    /// Population standard deviation over runs.
    pub std: f64,
}

impl DeviationSummary {
    /// Summarises the defined values; `None` when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: impl IntoIterator<Item = Option<f64>>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().flatten().collect();
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: variance.sqrt(),
        })
    }
}

/// Statistics of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Zero-based run index.
    pub run: usize,
    /// Cases that contributed to this run's statistics.
    pub cases: usize,
    /// Mean of `S − R`.
    pub mean_deviation: Option<f64>,
    /// Median of `(S − R) / R` over cases with `R ≠ 0`.
    pub median_relative_deviation: Option<f64>,
    /// Sum of `S − R`.
    pub sum_deviation: Option<f64>,
    /// `Σ(S − R) / ΣR`.
    pub sum_relative_deviation: Option<f64>,
    /// Feasible cases whose simulation failed in this run.
    pub failed: usize,
    /// Cases left out of the median because `R = 0`.
    pub zero_real_excluded: usize,
}

/// Cross-run evaluation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStatistics {
    /// Number of cases evaluated.
    pub n_cases: usize,
    /// Per-run statistics.
    pub runs: Vec<RunStatistics>,
    /// Mean deviation (minutes).
    pub mean_deviation: Option<DeviationSummary>,
    /// Median relative deviation.
    pub median_relative_deviation: Option<DeviationSummary>,
    /// Sum deviation (minutes).
    pub sum_deviation: Option<DeviationSummary>,
    /// Sum relative deviation.
    pub sum_relative_deviation: Option<DeviationSummary>,
    /// Cases with no executable recommendation.
    pub infeasible_cases: usize,
    /// Percentage of infeasible cases; present only when at least one exists.
    pub infeasible_rate: Option<f64>,
    /// Simulations that failed across all runs.
    pub failed_simulations: usize,
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Statistics of one run.
///
/// `real`, `simulated` and `ranks` are aligned by case.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn run_statistics(
    run: usize,
    real: &[f64],
    simulated: &[SimulatedCompletion],
    ranks: &[Option<Rank>],
) -> RunStatistics {
    let mut deviations = Vec::new();
    let mut relative = Vec::new();
    let mut real_sum = 0.0_f64;
    let mut failed = 0;
    let mut zero_real_excluded = 0;

    for ((r, s), rank) in real.iter().zip(simulated).zip(ranks) {
        if rank.is_none() {
            continue;
        }
        let s = match s {
            SimulatedCompletion::Feasible(v) => *v,
            SimulatedCompletion::Failed => {
                failed += 1;
                continue;
            }
            SimulatedCompletion::Infeasible => continue,
        };
        let deviation = s - r;
        deviations.push(deviation);
        real_sum += r;
        if *r == 0.0 {
            zero_real_excluded += 1;
        } else {
            relative.push(deviation / r);
        }
    }

    let cases = deviations.len();
    let sum = (cases > 0).then(|| deviations.iter().sum::<f64>());
    let mean = sum.map(|s| s / cases as f64);
    let sum_relative = sum.and_then(|s| (real_sum != 0.0).then(|| s / real_sum));

    RunStatistics {
        run,
        cases,
        mean_deviation: mean,
        median_relative_deviation: median(&mut relative),
        sum_deviation: sum,
        sum_relative_deviation: sum_relative,
        failed,
        zero_real_excluded,
    }
}

/// Aggregates all runs.
///
/// `simulated` is indexed `[run][case]`; every row, `real` and `ranks` must
/// have one entry per case.
///
/// # Errors
///
/// Returns `ValidationError::LengthMismatch` for misaligned inputs.
#[allow(clippy::cast_precision_loss)]
pub fn aggregate(
    real: &[f64],
    simulated: &[Vec<SimulatedCompletion>],
    ranks: &[Option<Rank>],
) -> EvalResult<EvaluationStatistics> {
    let n_cases = real.len();
    if ranks.len() != n_cases {
        return Err(ValidationError::LengthMismatch {
            what: "ranks".to_string(),
            expected: n_cases,
            actual: ranks.len(),
        }
        .into());
    }
    if let Some(row) = simulated.iter().find(|row| row.len() != n_cases) {
        return Err(ValidationError::LengthMismatch {
            what: "simulated completions".to_string(),
            expected: n_cases,
            actual: row.len(),
        }
        .into());
    }

    let runs: Vec<RunStatistics> = simulated
        .iter()
        .enumerate()
        .map(|(j, row)| run_statistics(j, real, row, ranks))
        .collect();

    let zero_real: usize = runs.iter().map(|r| r.zero_real_excluded).sum();
    if zero_real > 0 {
        warn!(
            occurrences = zero_real,
            "feasible cases with zero real completion time excluded from median relative deviation"
        );
    }
    let guarded_runs = runs
        .iter()
        .filter(|r| r.sum_deviation.is_some() && r.sum_relative_deviation.is_none())
        .count();
    if guarded_runs > 0 {
        warn!(runs = guarded_runs, "sum relative deviation undefined: real completion times sum to zero");
    }

    let infeasible_cases = ranks.iter().filter(|r| r.is_none()).count();
    let infeasible_rate =
        (infeasible_cases > 0).then(|| infeasible_cases as f64 / n_cases as f64 * 100.0);

    Ok(EvaluationStatistics {
        n_cases,
        mean_deviation: DeviationSummary::from_values(runs.iter().map(|r| r.mean_deviation)),
        median_relative_deviation: DeviationSummary::from_values(
            runs.iter().map(|r| r.median_relative_deviation),
        ),
        sum_deviation: DeviationSummary::from_values(runs.iter().map(|r| r.sum_deviation)),
        sum_relative_deviation: DeviationSummary::from_values(
            runs.iter().map(|r| r.sum_relative_deviation),
        ),
        infeasible_cases,
        infeasible_rate,
        failed_simulations: runs.iter().map(|r| r.failed).sum(),
        runs,
    })
}

struct Num(Option<f64>);

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for EvaluationStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("RESULTS AVG per trace", "AVG", "STD.", self.mean_deviation),
            (
                "RESULTS MEDIAN REL. per trace",
                "MEDIAN REL.",
                "STD. REL.",
                self.median_relative_deviation,
            ),
            ("RESULTS SUM", "AVG SUM", "STD SUM", self.sum_deviation),
            ("RESULTS SUM REL", "AVG SUM REL.", "STD SUM REL.", self.sum_relative_deviation),
        ];
        for (title, mean_label, std_label, summary) in sections {
            writeln!(f, "{title}")?;
            writeln!(f, "{mean_label} {}", Num(summary.map(|s| s.mean)))?;
            writeln!(f, "{std_label} {}", Num(summary.map(|s| s.std)))?;
            writeln!(f)?;
        }
        if let Some(rate) = self.infeasible_rate {
            writeln!(f, "{rate:.2}% not possible recommendations.")?;
        }
        if self.failed_simulations > 0 {
            writeln!(f, "{} simulations failed.", self.failed_simulations)?;
        }
        Ok(())
    }
}
