//! Recommendation selection: the best-ranked candidate the simulator can run.

use tracing::debug;

use crate::context::CaseContext;
use crate::recommendation::{CandidateSet, RecommendationChoice};
use crate::simulator::{ProcessSimulator, ResourceAvailability};
use crate::time::Timestamp;

/// Picks one executable candidate per case, falling back through ranks.
pub struct RecommendationSelector<'a> {
    simulator: &'a dyn ProcessSimulator,
    availability: &'a ResourceAvailability,
    starting_time: Timestamp,
    top_k: usize,
}

impl<'a> RecommendationSelector<'a> {
    /// Creates a selector that considers at most `top_k` ranks.
    #[must_use]
    pub fn new(
        simulator: &'a dyn ProcessSimulator,
        availability: &'a ResourceAvailability,
        starting_time: Timestamp,
        top_k: usize,
    ) -> Self {
        Self {
            simulator,
            availability,
            starting_time,
            top_k,
        }
    }

    /// Selects the recommendation for one case.
    ///
    /// Rejection reasons stay here; callers only see the resulting rank.
    #[must_use]
    pub fn select(&self, context: &CaseContext, candidates: &CandidateSet) -> RecommendationChoice {
        for (rank, candidate) in candidates.ranked(self.top_k) {
            match self.simulator.check_executable(
                context,
                candidate,
                self.availability,
                self.starting_time,
            ) {
                Ok(()) => {
                    return RecommendationChoice::Chosen {
                        rank,
                        recommendation: candidate.clone(),
                    };
                }
                Err(reason) => {
                    debug!(case_id = %context.case_id, %rank, %candidate, %reason, "candidate not executable");
                }
            }
        }
        RecommendationChoice::Infeasible
    }

    /// Selects recommendations for all cases; `contexts` and `candidates` are aligned.
    #[must_use]
    pub fn select_all(
        &self,
        contexts: &[CaseContext],
        candidates: &[CandidateSet],
    ) -> Vec<RecommendationChoice> {
        contexts
            .iter()
            .zip(candidates)
            .map(|(ctx, set)| self.select(ctx, set))
            .collect()
    }
}
