//! Ranked next-step recommendations and the per-case choice among them.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU8;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::log::{CaseId, CASE_ID_KEY};

/// 1-based position of a candidate in its ranked list.
///
/// Rank 0 ("no candidate was executable") is not a `Rank`; it is
/// `RecommendationChoice::Infeasible`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(NonZeroU8);

impl Rank {
    /// The top-ranked candidate.
    pub const TOP: Self = Self(NonZeroU8::MIN);

    /// Creates a rank from a 1-based position.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::RankOutOfRange` for 0 or positions above 255.
    pub fn new(rank: usize) -> Result<Self, ValidationError> {
        u8::try_from(rank)
            .ok()
            .and_then(NonZeroU8::new)
            .map(Self)
            .ok_or(ValidationError::RankOutOfRange {
                rank,
                max: usize::from(u8::MAX),
            })
    }

    /// Returns the 1-based position.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get() as usize
    }

    /// Zero-based index into a candidate list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.get() - 1
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (next activity, next resource) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended next activity.
    pub activity: String,
    /// Recommended resource to execute it.
    pub resource: String,
}

impl Recommendation {
    /// Creates a recommendation.
    #[must_use]
    pub fn new(activity: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.activity, self.resource)
    }
}

/// Ranked candidates for one case, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// Case the candidates were produced for.
    pub case_id: CaseId,
    /// Candidates ordered by prior confidence (index 0 is rank 1).
    pub candidates: Vec<Recommendation>,
}

impl CandidateSet {
    /// Creates a candidate set.
    #[must_use]
    pub fn new(case_id: impl Into<CaseId>, candidates: Vec<Recommendation>) -> Self {
        Self {
            case_id: case_id.into(),
            candidates,
        }
    }

    /// Reads a candidate row that follows the `act_k` / `res_k` column convention.
    ///
    /// Ranks are read contiguously from 1 up to `top_k`; reading stops at the
    /// first rank whose activity or resource column is absent or empty.
    ///
    /// # Errors
    ///
    /// Fails if the `case:concept:name` column is missing.
    pub fn from_columns(
        row: &BTreeMap<String, String>,
        top_k: usize,
    ) -> Result<Self, ValidationError> {
        let case_id = row
            .get(CASE_ID_KEY)
            .ok_or_else(|| ValidationError::MissingField {
                field: CASE_ID_KEY.to_string(),
            })?;

        let mut candidates = Vec::with_capacity(top_k);
        for k in 1..=top_k {
            let activity = row.get(&format!("act_{k}")).filter(|s| !s.is_empty());
            let resource = row.get(&format!("res_{k}")).filter(|s| !s.is_empty());
            match (activity, resource) {
                (Some(a), Some(r)) => candidates.push(Recommendation::new(a.clone(), r.clone())),
                _ => break,
            }
        }

        Ok(Self::new(case_id.clone(), candidates))
    }

    /// Candidates considered when at most `top_k` ranks are allowed.
    pub fn ranked(&self, top_k: usize) -> impl Iterator<Item = (Rank, &Recommendation)> {
        self.candidates
            .iter()
            .take(top_k.min(usize::from(u8::MAX)))
            .enumerate()
            .filter_map(|(idx, rec)| Rank::new(idx + 1).ok().map(|rank| (rank, rec)))
    }

    /// Candidate at `rank`, if present.
    #[must_use]
    pub fn get(&self, rank: Rank) -> Option<&Recommendation> {
        self.candidates.get(rank.index())
    }
}

/// Outcome of recommendation selection for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationChoice {
    /// A candidate was executable.
    Chosen {
        /// Rank of the chosen candidate.
        rank: Rank,
        /// The chosen pair.
        recommendation: Recommendation,
    },
    /// No candidate was executable.
    Infeasible,
}

impl RecommendationChoice {
    /// Rank used, or `None` when infeasible.
    #[must_use]
    pub const fn rank(&self) -> Option<Rank> {
        match self {
            Self::Chosen { rank, .. } => Some(*rank),
            Self::Infeasible => None,
        }
    }

    /// Numeric rank in the `top_k` convention (0 = infeasible).
    #[must_use]
    pub const fn top_k(&self) -> usize {
        match self {
            Self::Chosen { rank, .. } => rank.get(),
            Self::Infeasible => 0,
        }
    }

    /// The chosen pair, if any.
    #[must_use]
    pub const fn recommendation(&self) -> Option<&Recommendation> {
        match self {
            Self::Chosen { recommendation, .. } => Some(recommendation),
            Self::Infeasible => None,
        }
    }

    /// Returns true if a candidate was chosen.
    #[must_use]
    pub const fn is_feasible(&self) -> bool {
        matches!(self, Self::Chosen { .. })
    }
}
