//! Cross-seed merging of per-seed rankings.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::track::{RecommendationCandidate, RecommendationResult, Track};

/// One distinct track proposed by at least one seed
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecommendation<'a> {
    pub track: &'a Track,
    /// Every score this track received, in seed order
    pub scores: Vec<f64>,
    /// Number of seeds that proposed it; ranking-only
    pub recommendation_count: usize,
}

impl MergedRecommendation<'_> {
    #[must_use]
    pub fn mean_score(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = self.scores.len() as f64;
        self.scores.iter().sum::<f64>() / n
    }

    fn into_result(self) -> RecommendationResult {
        let similarity_score = self.mean_score();
        let track = self.track;
        RecommendationResult {
            track_id: track.id.clone(),
            track_name: track.name.clone(),
            track_artist: track.artist.clone(),
            similarity_score,
            track_popularity: track.popularity,
            playlist_genre: track.genre.clone(),
            playlist_subgenre: track.subgenre.clone(),
        }
    }
}

/// Merge seed rankings by track id and order by
/// (recommendation count, mean score, popularity), all descending.
///
/// The sort is stable over first-seen order.
#[must_use]
pub fn merge<'a>(per_seed: Vec<Vec<RecommendationCandidate<'a>>>) -> Vec<MergedRecommendation<'a>> {
    let mut merged: Vec<MergedRecommendation<'a>> = Vec::new();
    let mut position: HashMap<&'a str, usize> = HashMap::new();

    for ranking in per_seed {
        for candidate in ranking {
            let id = candidate.track.id.as_str();
            if let Some(&i) = position.get(id) {
                let entry = &mut merged[i];
                entry.scores.push(candidate.score);
                entry.recommendation_count += 1;
            } else {
                position.insert(id, merged.len());
                merged.push(MergedRecommendation {
                    track: candidate.track,
                    scores: vec![candidate.score],
                    recommendation_count: 1,
                });
            }
        }
    }

    let mut keyed: Vec<(f64, MergedRecommendation<'a>)> =
        merged.into_iter().map(|m| (m.mean_score(), m)).collect();
    keyed.sort_by(|(mean_a, a), (mean_b, b)| {
        b.recommendation_count
            .cmp(&a.recommendation_count)
            .then_with(|| mean_b.partial_cmp(mean_a).unwrap_or(Ordering::Equal))
            .then_with(|| b.track.popularity.cmp(&a.track.popularity))
    });
    keyed.into_iter().map(|(_, m)| m).collect()
}

/// Final top-`n` response built from every seed's ranking.
#[must_use]
pub fn aggregate(per_seed: Vec<Vec<RecommendationCandidate<'_>>>, n: usize) -> Vec<RecommendationResult> {
    merge(per_seed)
        .into_iter()
        .take(n)
        .map(MergedRecommendation::into_result)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn track(id: &str, popularity: u8) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artist: "Artist".to_string(),
            audio: [0.0; 9],
            raw_audio: [0.0; 9],
            release_date: None,
            genre: "pop".to_string(),
            subgenre: "dance pop".to_string(),
            popularity,
            lyrics: None,
            embedding: vec![1.0],
            cluster: 0,
        }
    }

    fn candidate(track: &Track, score: f64) -> RecommendationCandidate<'_> {
        RecommendationCandidate { track, score }
    }

    #[test]
    fn test_shared_track_gets_mean_and_count() {
        let x = track("x", 10);
        let y = track("y", 90);
        let merged = merge(vec![
            vec![candidate(&x, 0.9), candidate(&y, 0.95)],
            vec![candidate(&x, 0.5)],
        ]);

        assert_eq!(merged[0].track.id, "x");
        assert_eq!(merged[0].recommendation_count, 2);
        assert_relative_eq!(merged[0].mean_score(), 0.7, epsilon = 1e-12);
        assert_eq!(merged[1].track.id, "y");
        assert_eq!(merged[1].recommendation_count, 1);
    }

    #[test]
    fn test_count_beats_mean_then_popularity_breaks_ties() {
        let a = track("a", 10);
        let b = track("b", 50);
        let c = track("c", 90);
        let d = track("d", 10);

        let results = aggregate(
            vec![
                vec![candidate(&a, 0.4), candidate(&b, 0.8), candidate(&c, 0.8)],
                vec![candidate(&a, 0.4), candidate(&d, 0.99)],
            ],
            10,
        );
        let ids: Vec<&str> = results.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn test_full_ties_keep_first_seen_order_and_truncate() {
        let a = track("a", 30);
        let b = track("b", 30);
        let c = track("c", 30);
        let results = aggregate(
            vec![vec![candidate(&b, 0.5)], vec![candidate(&a, 0.5), candidate(&c, 0.5)]],
            2,
        );
        let ids: Vec<&str> = results.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_result_carries_track_fields() {
        let x = track("x", 42);
        let results = aggregate(vec![vec![candidate(&x, 0.25)]], 5);
        assert_eq!(
            results,
            vec![RecommendationResult {
                track_id: "x".into(),
                track_name: "Song x".into(),
                track_artist: "Artist".into(),
                similarity_score: 0.25,
                track_popularity: 42,
                playlist_genre: "pop".into(),
                playlist_subgenre: "dance pop".into(),
            }]
        );
    }

    #[test]
    fn test_no_seeds_or_empty_rankings() {
        assert!(aggregate(Vec::new(), 5).is_empty());
        assert!(aggregate(vec![Vec::new(), Vec::new()], 5).is_empty());
    }
}
