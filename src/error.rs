//! Typed error kinds for corpus preparation and per-request scoring.
//!
//! Preparation failures make the service unready; request failures are
//! reported per call and never poison the prepared corpus.

use thiserror::Error;

/// Errors raised while building or loading the prepared corpus.
#[derive(Error, Debug)]
pub enum PrepareError {
    /// A corpus row lacks a column the feature pipeline needs
    #[error("row {row}: missing required field `{field}`")]
    MissingField { row: usize, field: &'static str },

    /// A corpus row carries a release date that cannot be parsed
    #[error("row {row}: unparsable release date `{value}`")]
    InvalidReleaseDate { row: usize, value: String },

    /// A corpus row has a popularity outside 0..=100
    #[error("row {row}: popularity {value} outside 0..=100")]
    InvalidPopularity { row: usize, value: i64 },

    /// Two corpus rows share one track id
    #[error("duplicate track id `{0}`")]
    DuplicateTrack(String),

    /// Nothing to prepare
    #[error("corpus is empty")]
    EmptyCorpus,

    /// Catalog database failure
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Snapshot artifact is unreadable or inconsistent
    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a single `recommend` call.
#[derive(Error, Debug)]
pub enum RecommendError {
    /// Scoring was invoked before a corpus was prepared
    #[error("recommender is not prepared")]
    NotPrepared,

    /// The request carried no seed tracks
    #[error("request has no seed tracks")]
    NoSeeds,

    /// A seed track carries a release date that cannot be parsed
    #[error("seed {seed}: unparsable release date `{value}`")]
    InvalidReleaseDate { seed: usize, value: String },

    /// The diversity reference names a track absent from the corpus
    #[error("unknown reference track `{0}`")]
    UnknownReferenceTrack(String),
}

impl RecommendError {
    /// Short stable identifier used on the service boundary.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotPrepared => "not_prepared",
            Self::NoSeeds => "no_seeds",
            Self::InvalidReleaseDate { .. } => "invalid_release_date",
            Self::UnknownReferenceTrack(_) => "unknown_reference_track",
        }
    }
}
