//! The recommendation service.
//!
//! A [`Recommender`] owns the engine configuration, the text/cluster
//! collaborators, the prepared corpus and the per-user history. Preparation
//! builds a new corpus off to the side and publishes it in one swap; requests
//! clone the `Arc` and never see a half-built corpus.

use log::{debug, info};
use rayon::prelude::*;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::aggregate::aggregate;
use crate::algorithm::{rank_candidates, statistics, ReferenceCluster, ScoringContext};
use crate::config::EngineConfig;
use crate::corpus::{Collaborators, PreparedCorpus, Query, Snapshot};
use crate::error::{PrepareError, RecommendError};
use crate::filter::CandidateFilter;
use crate::history::HistoryStore;
use crate::track::{CorpusRow, RecommendationCandidate, RecommendationRequest, RecommendationResult};

#[derive(Debug)]
pub struct Recommender {
    config: EngineConfig,
    context: ScoringContext,
    collaborators: Collaborators,
    corpus: RwLock<Option<Arc<PreparedCorpus>>>,
    history: HistoryStore,
}

impl Recommender {
    /// Unprepared recommender with the default collaborators.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let collaborators = Collaborators::from_config(&config);
        Self::with_collaborators(config, collaborators)
    }

    #[must_use]
    pub fn with_collaborators(config: EngineConfig, collaborators: Collaborators) -> Self {
        Self {
            context: ScoringContext::from(&config),
            config,
            collaborators,
            corpus: RwLock::new(None),
            history: HistoryStore::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Build a corpus from `rows` and make it the active one.
    ///
    /// On failure the previously active corpus (if any) stays in place.
    pub fn prepare(&self, rows: Vec<CorpusRow>) -> Result<Arc<PreparedCorpus>, PrepareError> {
        let corpus = PreparedCorpus::prepare(rows, &self.collaborators, &self.config)?;
        Ok(self.install(corpus))
    }

    /// Activate a corpus restored from a snapshot file.
    pub fn load_snapshot(&self, path: &Path) -> Result<Arc<PreparedCorpus>, PrepareError> {
        let corpus = PreparedCorpus::from_snapshot(Snapshot::load(path)?)?;
        info!("Loaded snapshot of {} tracks from {}", corpus.len(), path.display());
        Ok(self.install(corpus))
    }

    /// Publish `corpus` as the active corpus.
    pub fn install(&self, corpus: PreparedCorpus) -> Arc<PreparedCorpus> {
        let corpus = Arc::new(corpus);
        let mut slot = self.corpus.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::clone(&corpus));
        corpus
    }

    /// The active corpus, if preparation has completed.
    #[must_use]
    pub fn corpus(&self) -> Option<Arc<PreparedCorpus>> {
        self.corpus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    /// Score every seed of `request` and merge the results.
    ///
    /// Every seed is encoded before any history is touched, so a malformed
    /// seed fails the request without side effects.
    ///
    /// # Errors
    ///
    /// See [`RecommendError`]. An empty result is not an error.
    pub fn recommend(&self, request: &RecommendationRequest) -> Result<Vec<RecommendationResult>, RecommendError> {
        let corpus = self.corpus().ok_or(RecommendError::NotPrepared)?;
        if request.songs.is_empty() {
            return Err(RecommendError::NoSeeds);
        }

        let reference = ReferenceCluster::resolve(&self.config.diversity_reference, &corpus)?;
        let queries = request
            .songs
            .iter()
            .enumerate()
            .map(|(i, seed)| corpus.encode_seed(i, seed, self.collaborators.normalizer.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let limit = request.n_recommendations.saturating_mul(self.config.candidate_multiplier);
        let exclude = request.exclude_songs.as_deref();
        // A blank id is an anonymous request
        let user_id = request.user_id.as_deref().filter(|id| !id.trim().is_empty());
        info!(
            "Recommending {} tracks from {} seeds (user: {})",
            request.n_recommendations,
            queries.len(),
            user_id.unwrap_or("-")
        );

        let per_seed: Vec<Vec<RecommendationCandidate<'_>>> = match user_id {
            // Later seeds must see the history earlier seeds recorded
            Some(user_id) => queries
                .iter()
                .enumerate()
                .map(|(i, query)| {
                    let history = Some(self.history.lookup(user_id));
                    let ranked = self.score_seed(&corpus, i, query, exclude, history, reference, limit);
                    self.history
                        .record(user_id, ranked.iter().map(|c| c.track.id.as_str()));
                    ranked
                })
                .collect(),
            None => queries
                .par_iter()
                .enumerate()
                .map(|(i, query)| self.score_seed(&corpus, i, query, exclude, None, reference, limit))
                .collect(),
        };

        let results = aggregate(per_seed, request.n_recommendations);
        debug!("Returning {} merged recommendations", results.len());
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn score_seed<'c>(
        &self,
        corpus: &'c PreparedCorpus,
        seed_index: usize,
        query: &Query,
        exclude: Option<&[String]>,
        history: Option<Vec<String>>,
        reference: ReferenceCluster,
        limit: usize,
    ) -> Vec<RecommendationCandidate<'c>> {
        let filter = CandidateFilter {
            exclude,
            history,
            release_date: query.release_date,
            year_window: self.config.year_window,
        };
        let view = filter.apply(corpus);
        let ranked = rank_candidates(&view, query, reference, &self.context, limit);

        if let Some(stats) = statistics::analyze_score_distribution(&ranked) {
            debug!(
                "Seed {seed_index}: {} of {} candidates kept, scores {:.3}..{:.3} (mean {:.3})",
                stats.count,
                view.len(),
                stats.min,
                stats.max,
                stats.mean
            );
        } else {
            debug!("Seed {seed_index}: no candidates");
        }
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiversityReference;
    use crate::corpus::tests::row;
    use crate::track::SeedTrack;

    fn rows() -> Vec<CorpusRow> {
        vec![
            row("a", "pop", 80, 0.10, "1999-01-01"),
            row("b", "pop", 20, 0.30, "2001-03-01"),
            row("c", "rock", 50, 0.50, "2003-06-01"),
            row("d", "rock", 60, 0.70, "2010-09-01"),
            row("e", "edm", 40, 0.90, "2020-12-01"),
        ]
    }

    fn prepared() -> Recommender {
        let recommender = Recommender::new(EngineConfig::default());
        recommender.prepare(rows()).unwrap();
        recommender
    }

    fn seed_of(recommender: &Recommender, id: &str) -> SeedTrack {
        let corpus = recommender.corpus().unwrap();
        SeedTrack::from_track(corpus.get(id).unwrap())
    }

    fn ids(results: &[RecommendationResult]) -> Vec<String> {
        results.iter().map(|r| r.track_id.clone()).collect()
    }

    #[test]
    fn test_not_prepared_and_no_seeds() {
        let recommender = Recommender::new(EngineConfig::default());
        let err = recommender.recommend(&RecommendationRequest::new(vec![SeedTrack::default()]));
        assert!(matches!(err, Err(RecommendError::NotPrepared)));

        let recommender = prepared();
        let err = recommender.recommend(&RecommendationRequest::new(Vec::new()));
        assert!(matches!(err, Err(RecommendError::NoSeeds)));
    }

    #[test]
    fn test_results_are_capped_and_unique() {
        let recommender = prepared();
        let mut request = RecommendationRequest::new(vec![seed_of(&recommender, "c")]);
        request.n_recommendations = 3;

        let results = recommender.recommend(&request).unwrap();
        assert_eq!(results.len(), 3);
        let mut unique = ids(&results);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_exclusion_removes_track() {
        let recommender = prepared();
        let mut request = RecommendationRequest::new(vec![seed_of(&recommender, "b")]);
        request.n_recommendations = 5;
        assert!(ids(&recommender.recommend(&request).unwrap()).contains(&"b".to_string()));

        request.exclude_songs = Some(vec!["b".to_string()]);
        assert!(!ids(&recommender.recommend(&request).unwrap()).contains(&"b".to_string()));
    }

    #[test]
    fn test_history_filters_later_requests() {
        let recommender = prepared();
        let mut request = RecommendationRequest::new(vec![seed_of(&recommender, "a")]);
        request.n_recommendations = 1;
        request.user_id = Some("listener".into());

        // k = 2 candidates per seed are recorded, even though only one is returned
        let first = recommender.recommend(&request).unwrap();
        let recorded = recommender.history().lookup("listener");
        assert_eq!(recorded.len(), 2);
        assert!(recorded.contains(&first[0].track_id));

        // Only one track of the year window is left for the second request
        let second = recommender.recommend(&request).unwrap();
        assert!(!recorded.contains(&second[0].track_id));
        assert_eq!(recommender.history().lookup("listener").len(), 3);
    }

    #[test]
    fn test_sequential_seeds_see_earlier_history() {
        let recommender = prepared();
        let seed = seed_of(&recommender, "c");
        let mut request = RecommendationRequest::new(vec![seed.clone(), seed]);
        request.n_recommendations = 1;
        request.user_id = Some("u".into());

        recommender.recommend(&request).unwrap();
        let history = recommender.history().lookup("u");
        // a, b and c share the year window; the second pass gets what the first left
        assert_eq!(history.len(), 3);
        let mut unique = history.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_invalid_seed_date_has_no_side_effects() {
        let recommender = prepared();
        let mut bad = seed_of(&recommender, "a");
        bad.release_date = Some("sometime".into());
        let mut request = RecommendationRequest::new(vec![seed_of(&recommender, "b"), bad]);
        request.user_id = Some("u".into());

        let err = recommender.recommend(&request).unwrap_err();
        assert_eq!(err.kind(), "invalid_release_date");
        assert!(recommender.history().lookup("u").is_empty());
    }

    #[test]
    fn test_blank_user_id_is_anonymous() {
        let recommender = prepared();
        let mut request = RecommendationRequest::new(vec![seed_of(&recommender, "a")]);
        request.n_recommendations = 1;
        request.user_id = Some(String::new());

        let first = recommender.recommend(&request).unwrap();
        let second = recommender.recommend(&request).unwrap();
        assert_eq!(first, second);
        assert_eq!(recommender.history().user_count(), 0);

        request.user_id = Some("  ".into());
        recommender.recommend(&request).unwrap();
        assert_eq!(recommender.history().user_count(), 0);
    }

    #[test]
    fn test_unknown_reference_track() {
        let config = EngineConfig {
            diversity_reference: DiversityReference::Track("nope".into()),
            ..EngineConfig::default()
        };
        let recommender = Recommender::new(config);
        recommender.prepare(rows()).unwrap();
        let request = RecommendationRequest::new(vec![seed_of(&recommender, "a")]);
        assert!(matches!(
            recommender.recommend(&request),
            Err(RecommendError::UnknownReferenceTrack(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_failed_prepare_keeps_previous_corpus() {
        let recommender = prepared();
        assert!(recommender.prepare(Vec::new()).is_err());
        assert_eq!(recommender.corpus().unwrap().len(), 5);
    }

    #[test]
    fn test_parallel_and_sequential_agree_without_history() {
        let recommender = prepared();
        let seeds = vec![seed_of(&recommender, "a"), seed_of(&recommender, "e")];
        let request = RecommendationRequest::new(seeds);
        let first = recommender.recommend(&request).unwrap();
        let second = recommender.recommend(&request).unwrap();
        assert_eq!(first, second);
    }
}
