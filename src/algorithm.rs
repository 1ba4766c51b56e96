//! Similarity scoring for candidate tracks.
//!
//! Each candidate in a filtered view is scored against one encoded seed:
//!
//! ```text
//! base  = cosine(query, candidate) * w_audio
//!       + (genre_match * [genre equal] + subgenre_match * [subgenre equal]) * w_genre
//!       + diversity * [candidate cluster != reference cluster]
//! score = similarity_blend * base + popularity_blend * popularity / 100
//! ```
//!
//! Candidates are ordered by descending score with a stable sort, so ties
//! keep their corpus order.

use rayon::prelude::*;
use std::cmp::Ordering;

use crate::config::{DiversityReference, EngineConfig, FeatureWeights, ScoreBonuses};
use crate::corpus::{PreparedCorpus, Query};
use crate::error::RecommendError;
use crate::features::cosine_similarity;
use crate::filter::CandidateView;
use crate::track::{RecommendationCandidate, Track};

/// Immutable scoring parameters shared by every seed of a request.
///
/// The weights are the same for every seed, whichever of its optional
/// fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoringContext {
    pub weights: FeatureWeights,
    pub bonuses: ScoreBonuses,
}

impl From<&EngineConfig> for ScoringContext {
    fn from(config: &EngineConfig) -> Self {
        Self {
            weights: config.weights,
            bonuses: config.bonuses,
        }
    }
}

/// The cluster the diversity bonus is measured against, once resolved
/// for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceCluster {
    FirstCandidate,
    NearestToQuery,
    Fixed(usize),
}

impl ReferenceCluster {
    /// Resolve a configured reference against the corpus.
    ///
    /// # Errors
    ///
    /// [`RecommendError::UnknownReferenceTrack`] when a pinned track id is not
    /// in the corpus.
    pub fn resolve(
        reference: &DiversityReference,
        corpus: &PreparedCorpus,
    ) -> Result<Self, RecommendError> {
        match reference {
            DiversityReference::FirstCandidate => Ok(Self::FirstCandidate),
            DiversityReference::NearestToQuery => Ok(Self::NearestToQuery),
            DiversityReference::Track(id) => corpus
                .get(id)
                .map(|track| Self::Fixed(track.cluster))
                .ok_or_else(|| RecommendError::UnknownReferenceTrack(id.clone())),
        }
    }

    fn cluster_in(self, view: &[&Track], similarities: &[f64]) -> Option<usize> {
        match self {
            Self::Fixed(cluster) => Some(cluster),
            Self::FirstCandidate => view.first().map(|t| t.cluster),
            Self::NearestToQuery => {
                // First maximum wins
                let mut best: Option<(usize, f64)> = None;
                for (i, &sim) in similarities.iter().enumerate() {
                    if best.map_or(true, |(_, b)| sim > b) {
                        best = Some((i, sim));
                    }
                }
                best.map(|(i, _)| view[i].cluster)
            }
        }
    }
}

/// Score one candidate given its cosine similarity to the query.
#[must_use]
pub fn calculate_score(
    similarity: f64,
    candidate: &Track,
    query: &Query,
    reference_cluster: Option<usize>,
    context: &ScoringContext,
) -> f64 {
    let bonuses = &context.bonuses;
    // A seed without a genre compares as the empty genre
    let genre_bonus = indicator(query.genre.as_deref().unwrap_or_default() == candidate.genre)
        * bonuses.genre_match
        + indicator(query.subgenre.as_deref().unwrap_or_default() == candidate.subgenre) * bonuses.subgenre_match;
    let diversity = indicator(reference_cluster.is_some_and(|c| c != candidate.cluster)) * bonuses.diversity;

    let base = similarity * context.weights.audio + genre_bonus * context.weights.genre + diversity;
    bonuses.similarity_blend * base + bonuses.popularity_blend * f64::from(candidate.popularity) / 100.0
}

#[inline]
fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Score every candidate in `view` and keep the best `limit`.
///
/// An empty view yields an empty ranking.
#[must_use]
pub fn rank_candidates<'a>(
    view: &CandidateView<'a>,
    query: &Query,
    reference: ReferenceCluster,
    context: &ScoringContext,
    limit: usize,
) -> Vec<RecommendationCandidate<'a>> {
    let tracks = view.tracks();
    if tracks.is_empty() || limit == 0 {
        return Vec::new();
    }

    let similarities: Vec<f64> = tracks
        .par_iter()
        .map(|track| cosine_similarity(&query.vector, &track.embedding))
        .collect();
    let reference_cluster = reference.cluster_in(tracks, &similarities);

    let mut ranked: Vec<RecommendationCandidate<'a>> = tracks
        .par_iter()
        .zip(similarities.par_iter())
        .map(|(&track, &similarity)| RecommendationCandidate {
            track,
            score: calculate_score(similarity, track, query, reference_cluster, context),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked.truncate(limit);
    ranked
}

/// Score distribution summaries, used for logging and evaluation reports.
pub mod statistics {
    use super::RecommendationCandidate;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct ScoreStatistics {
        pub mean: f64,
        pub std_deviation: f64,
        pub min: f64,
        pub max: f64,
        pub count: usize,
    }

    /// `None` for an empty ranking.
    #[must_use]
    pub fn analyze_score_distribution(ranked: &[RecommendationCandidate<'_>]) -> Option<ScoreStatistics> {
        if ranked.is_empty() {
            return None;
        }
        let scores = ranked.iter().map(|c| c.score);

        #[allow(clippy::cast_precision_loss)]
        let count = ranked.len() as f64;
        let mean = scores.clone().sum::<f64>() / count;
        let variance = scores.clone().map(|s| (s - mean).powi(2)).sum::<f64>() / count;

        Some(ScoreStatistics {
            mean,
            std_deviation: variance.sqrt(),
            min: scores.clone().fold(f64::INFINITY, f64::min),
            max: scores.fold(f64::NEG_INFINITY, f64::max),
            count: ranked.len(),
        })
    }
}
