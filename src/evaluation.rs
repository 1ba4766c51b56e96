//! Offline quality checks for a prepared recommender.
//!
//! [`evaluate`] feeds sampled corpus tracks back in as seeds and measures
//! how well each one finds itself. [`feature_importance`] reports how the
//! main audio attributes shift across similarity bands.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::corpus::PreparedCorpus;
use crate::error::RecommendError;
use crate::features::cosine_similarity;
use crate::recommender::Recommender;
use crate::track::{RecommendationRequest, SeedTrack, AUDIO_FEATURE_NAMES};

/// Half-open similarity bands `[low, high)`, highest first
const SIMILARITY_BANDS: [(f64, f64); 5] = [(0.8, 1.0), (0.6, 0.8), (0.4, 0.6), (0.2, 0.4), (0.0, 0.2)];

/// Attributes reported by [`feature_importance`]
const IMPORTANCE_FEATURES: [&str; 4] = ["danceability", "energy", "valence", "acousticness"];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EvaluationMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub ndcg_at_k: f64,
    pub samples: usize,
}

fn sample_indices(len: usize, amount: usize, seed: u64) -> Vec<usize> {
    let amount = amount.min(len);
    if amount == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, len, amount).into_vec()
}

/// Self-retrieval metrics over `samples` randomly chosen tracks.
///
/// # Errors
///
/// Fails when the recommender is not prepared.
pub fn evaluate(
    recommender: &Recommender,
    samples: usize,
    k: usize,
    seed: u64,
) -> Result<EvaluationMetrics, RecommendError> {
    let corpus = recommender.corpus().ok_or(RecommendError::NotPrepared)?;
    let picked = sample_indices(corpus.len(), samples, seed);
    if picked.is_empty() || k == 0 {
        return Ok(EvaluationMetrics::default());
    }

    let mut totals = EvaluationMetrics::default();
    for &index in &picked {
        let track = &corpus.tracks()[index];
        let mut request = RecommendationRequest::new(vec![SeedTrack::from_track(track)]);
        request.n_recommendations = k;

        let results = recommender.recommend(&request)?;
        match results.iter().position(|r| r.track_id == track.id) {
            Some(rank) => {
                #[allow(clippy::cast_precision_loss)]
                let (k_f, rank_f) = (k as f64, rank as f64);
                totals.precision_at_k += 1.0 / k_f;
                totals.recall_at_k += 1.0;
                totals.ndcg_at_k += 1.0 / (rank_f + 2.0).log2();
                debug!("Track {} found itself at rank {rank}", track.id);
            }
            None => debug!("Track {} missing from its own top {k}", track.id),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let n = picked.len() as f64;
    let metrics = EvaluationMetrics {
        precision_at_k: totals.precision_at_k / n,
        recall_at_k: totals.recall_at_k / n,
        ndcg_at_k: totals.ndcg_at_k / n,
        samples: picked.len(),
    };
    info!(
        "Evaluated {} samples: precision@{k}={:.3} recall@{k}={:.3} ndcg@{k}={:.3}",
        metrics.samples, metrics.precision_at_k, metrics.recall_at_k, metrics.ndcg_at_k
    );
    Ok(metrics)
}

/// Mean normalized attribute value per similarity band, averaged over
/// bands and sampled tracks.
#[must_use]
pub fn feature_importance(corpus: &PreparedCorpus, samples: usize, seed: u64) -> BTreeMap<String, f64> {
    let columns: Vec<(&str, usize)> = IMPORTANCE_FEATURES
        .iter()
        .filter_map(|name| {
            AUDIO_FEATURE_NAMES
                .iter()
                .position(|n| n == name)
                .map(|column| (*name, column))
        })
        .collect();

    let mut band_means: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for index in sample_indices(corpus.len(), samples, seed) {
        let anchor = &corpus.tracks()[index];
        let similarities: Vec<(usize, f64)> = corpus
            .tracks()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(i, t)| (i, cosine_similarity(&anchor.embedding, &t.embedding)))
            .collect();

        for (low, high) in SIMILARITY_BANDS {
            let members: Vec<usize> = similarities
                .iter()
                .filter(|(_, sim)| *sim >= low && *sim < high)
                .map(|(i, _)| *i)
                .collect();
            if members.is_empty() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let count = members.len() as f64;
            for &(name, column) in &columns {
                let mean = members
                    .iter()
                    .map(|&i| corpus.tracks()[i].audio[column])
                    .sum::<f64>()
                    / count;
                band_means.entry(name).or_default().push(mean);
            }
        }
    }

    band_means
        .into_iter()
        .map(|(name, values)| {
            #[allow(clippy::cast_precision_loss)]
            let average = values.iter().sum::<f64>() / values.len() as f64;
            (name.to_string(), average)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::corpus::tests::row;

    fn recommender() -> Recommender {
        let recommender = Recommender::new(EngineConfig::default());
        recommender
            .prepare(vec![
                row("a", "pop", 50, 0.05, "2000"),
                row("b", "rock", 50, 0.35, "2000"),
                row("c", "edm", 50, 0.65, "2000"),
                row("d", "rap", 50, 0.95, "2000"),
            ])
            .unwrap();
        recommender
    }

    #[test]
    fn test_sampling_is_seeded_and_capped() {
        assert_eq!(sample_indices(10, 3, 7), sample_indices(10, 3, 7));
        assert_eq!(sample_indices(4, 20, 1).len(), 4);
        assert!(sample_indices(0, 5, 1).is_empty());
    }

    #[test]
    fn test_self_retrieval_metrics_are_bounded() {
        let recommender = recommender();
        let metrics = evaluate(&recommender, 4, 2, 42).unwrap();
        assert_eq!(metrics.samples, 4);
        for value in [metrics.precision_at_k, metrics.recall_at_k, metrics.ndcg_at_k] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(metrics.precision_at_k <= 0.5 + 1e-12);
        assert!(metrics.ndcg_at_k <= metrics.recall_at_k + 1e-12);
    }

    #[test]
    fn test_evaluate_requires_preparation() {
        let recommender = Recommender::new(EngineConfig::default());
        assert!(matches!(evaluate(&recommender, 3, 5, 1), Err(RecommendError::NotPrepared)));
    }

    #[test]
    fn test_feature_importance_reports_four_attributes() {
        let recommender = recommender();
        let corpus = recommender.corpus().unwrap();
        let importance = feature_importance(&corpus, 4, 42);
        let names: Vec<&str> = importance.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["acousticness", "danceability", "energy", "valence"]);
        for value in importance.values() {
            assert!((0.0..=1.0).contains(value));
        }
    }
}
