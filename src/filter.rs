//! Candidate filtering ahead of scoring.
//!
//! Rules run in order, each on the view left by the previous one:
//! exclusion list, user history, then the release-year window.

use chrono::{Datelike, NaiveDate};
use log::debug;
use std::collections::HashSet;

use crate::corpus::PreparedCorpus;
use crate::track::Track;

/// A reduced, order-preserving view of the corpus.
///
/// Each entry carries its embedding, cluster label and row data together,
/// so the three can never drift out of alignment.
#[derive(Debug, Clone, Default)]
pub struct CandidateView<'a> {
    tracks: Vec<&'a Track>,
    /// Set when the year window would have emptied the view and was skipped
    pub year_fallback: bool,
}

impl<'a> CandidateView<'a> {
    #[must_use]
    pub fn new(tracks: Vec<&'a Track>) -> Self {
        Self {
            tracks,
            year_fallback: false,
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[&'a Track] {
        &self.tracks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn retain_ids_not_in(&mut self, ids: &HashSet<&str>) {
        self.tracks.retain(|t| !ids.contains(t.id.as_str()));
    }
}

/// Per-seed filter parameters.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter<'r> {
    pub exclude: Option<&'r [String]>,
    /// The user's history at the time this seed is processed
    pub history: Option<Vec<String>>,
    pub release_date: Option<NaiveDate>,
    pub year_window: i32,
}

impl CandidateFilter<'_> {
    /// Narrow `corpus` to the tracks eligible for scoring.
    #[must_use]
    pub fn apply<'c>(&self, corpus: &'c PreparedCorpus) -> CandidateView<'c> {
        let mut view = CandidateView::new(corpus.tracks().iter().collect());

        if let Some(exclude) = self.exclude.filter(|ids| !ids.is_empty()) {
            let ids: HashSet<&str> = exclude.iter().map(String::as_str).collect();
            view.retain_ids_not_in(&ids);
            debug!("Exclusion list left {} candidates", view.len());
        }

        if let Some(history) = &self.history {
            let ids: HashSet<&str> = history.iter().map(String::as_str).collect();
            view.retain_ids_not_in(&ids);
            debug!("User history left {} candidates", view.len());
        }

        if let Some(date) = self.release_date {
            if corpus.has_release_dates() {
                self.apply_year_window(&mut view, date.year());
            }
        }

        view
    }

    fn apply_year_window(&self, view: &mut CandidateView<'_>, year: i32) {
        let low = year - self.year_window;
        let high = year + self.year_window;
        let windowed: Vec<&Track> = view
            .tracks
            .iter()
            .copied()
            .filter(|t| {
                t.release_date
                    .is_some_and(|d| (low..=high).contains(&d.year()))
            })
            .collect();

        if windowed.is_empty() {
            debug!("No candidates released {low}..={high}; keeping the wider set of {}", view.len());
            view.year_fallback = true;
        } else {
            debug!("Year window {low}..={high} left {} candidates", windowed.len());
            view.tracks = windowed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::corpus::tests::row;
    use crate::corpus::Collaborators;

    fn corpus() -> PreparedCorpus {
        let config = EngineConfig::default();
        PreparedCorpus::prepare(
            vec![
                row("a", "pop", 10, 0.1, "1990-05-01"),
                row("b", "pop", 20, 0.3, "2000-05-01"),
                row("c", "rock", 30, 0.6, "2004-05-01"),
                row("d", "rock", 40, 0.9, "2012-05-01"),
            ],
            &Collaborators::from_config(&config),
            &config,
        )
        .unwrap()
    }

    fn ids(view: &CandidateView<'_>) -> Vec<String> {
        view.tracks().iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_no_rules_yields_full_corpus() {
        let corpus = corpus();
        let view = CandidateFilter::default().apply(&corpus);
        assert_eq!(ids(&view), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_exclusion_and_history() {
        let corpus = corpus();
        let exclude = vec!["b".to_string()];
        let filter = CandidateFilter {
            exclude: Some(&exclude),
            history: Some(vec!["d".to_string()]),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&corpus)), vec!["a", "c"]);
    }

    #[test]
    fn test_year_window_operates_on_reduced_view() {
        let corpus = corpus();
        let exclude = vec!["b".to_string()];
        let filter = CandidateFilter {
            exclude: Some(&exclude),
            release_date: NaiveDate::from_ymd_opt(2001, 1, 1),
            year_window: 5,
            ..Default::default()
        };
        let view = filter.apply(&corpus);
        assert_eq!(ids(&view), vec!["c"]);
        assert!(!view.year_fallback);
    }

    #[test]
    fn test_year_window_falls_back_when_it_would_empty() {
        let corpus = corpus();
        let filter = CandidateFilter {
            release_date: NaiveDate::from_ymd_opt(1960, 1, 1),
            year_window: 5,
            ..Default::default()
        };
        let view = filter.apply(&corpus);
        assert_eq!(ids(&view), vec!["a", "b", "c", "d"]);
        assert!(view.year_fallback);
    }

    #[test]
    fn test_excluding_everything_is_empty_not_error() {
        let corpus = corpus();
        let exclude: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let filter = CandidateFilter {
            exclude: Some(&exclude),
            release_date: NaiveDate::from_ymd_opt(2000, 1, 1),
            year_window: 5,
            ..Default::default()
        };
        let view = filter.apply(&corpus);
        assert!(view.is_empty());
    }
}
