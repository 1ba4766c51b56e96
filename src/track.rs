//! Track, seed and result types shared across the engine.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PrepareError;

/// Number of audio attributes in every feature vector.
pub const AUDIO_DIM: usize = 9;

/// Audio attribute names, in feature-vector order.
pub const AUDIO_FEATURE_NAMES: [&str; AUDIO_DIM] = [
    "danceability",
    "energy",
    "loudness",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
];

/// Column of loudness within the audio block (dB, usually negative).
pub const LOUDNESS: usize = 2;
/// Column of tempo within the audio block (BPM).
pub const TEMPO: usize = 8;

/// One raw row as delivered by the catalog or an import file.
///
/// Every field is optional so malformed rows deserialize cleanly and are
/// rejected with a precise error at preparation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusRow {
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub track_artist: Option<String>,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub loudness: Option<f64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub track_album_release_date: Option<String>,
    pub track_popularity: Option<i64>,
    pub playlist_genre: Option<String>,
    pub playlist_subgenre: Option<String>,
    pub lyrics: Option<String>,
}

impl CorpusRow {
    /// Raw audio attributes in feature-vector order.
    pub fn audio_values(&self, row: usize) -> Result<[f64; AUDIO_DIM], PrepareError> {
        let fields = [
            self.danceability,
            self.energy,
            self.loudness,
            self.speechiness,
            self.acousticness,
            self.instrumentalness,
            self.liveness,
            self.valence,
            self.tempo,
        ];

        let mut values = [0.0; AUDIO_DIM];
        for (i, field) in fields.into_iter().enumerate() {
            values[i] = field.ok_or(PrepareError::MissingField {
                row,
                field: AUDIO_FEATURE_NAMES[i],
            })?;
        }
        Ok(values)
    }

    /// Release date, `None` when the column is empty.
    pub fn release_date(&self, row: usize) -> Result<Option<NaiveDate>, PrepareError> {
        match self.track_album_release_date.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_release_date(raw)
                .map(Some)
                .ok_or_else(|| PrepareError::InvalidReleaseDate {
                    row,
                    value: raw.to_string(),
                }),
        }
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM`, `YYYY` or an RFC 3339 timestamp.
///
/// Partial dates fall on the first month/day, which is how year-only
/// album dates show up in streaming catalogs.
#[must_use]
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d").ok();
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}

/// A prepared corpus track. Immutable once the corpus is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artist: String,
    /// Audio attributes scaled into [0, 1] with corpus bounds
    pub audio: [f64; AUDIO_DIM],
    /// Audio attributes as imported
    pub raw_audio: [f64; AUDIO_DIM],
    pub release_date: Option<NaiveDate>,
    pub genre: String,
    pub subgenre: String,
    pub popularity: u8,
    pub lyrics: Option<String>,
    /// Unit-length (or all-zero) feature vector
    pub embedding: Vec<f64>,
    /// Diversity cluster label
    pub cluster: usize,
}

/// One seed track of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedTrack {
    pub spotify_id: Option<String>,
    /// Raw audio attributes keyed by name; missing ones take the neutral value
    pub audio_features: HashMap<String, f64>,
    pub lyrics: Option<String>,
    pub release_date: Option<String>,
    pub track_popularity: Option<u8>,
    pub playlist_genre: Option<String>,
    pub playlist_subgenre: Option<String>,
}

impl SeedTrack {
    /// Release date string, treating blank values as absent.
    #[must_use]
    pub fn release_date_str(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
    }

    /// Build a seed that mirrors a corpus track.
    #[must_use]
    pub fn from_track(track: &Track) -> Self {
        let audio_features = AUDIO_FEATURE_NAMES
            .iter()
            .zip(track.raw_audio)
            .map(|(name, value)| ((*name).to_string(), value))
            .collect();

        Self {
            spotify_id: Some(track.id.clone()),
            audio_features,
            lyrics: track.lyrics.clone(),
            release_date: track.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
            track_popularity: Some(track.popularity),
            playlist_genre: Some(track.genre.clone()),
            playlist_subgenre: Some(track.subgenre.clone()),
        }
    }
}

/// One scored candidate from a single seed pass.
#[derive(Debug, Clone, Copy)]
pub struct RecommendationCandidate<'a> {
    pub track: &'a Track,
    pub score: f64,
}

/// Final ranked entry returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub track_id: String,
    pub track_name: String,
    pub track_artist: String,
    /// Mean score across the seeds that proposed this track
    pub similarity_score: f64,
    pub track_popularity: u8,
    pub playlist_genre: String,
    pub playlist_subgenre: String,
}

const fn default_count() -> usize {
    5
}

/// The single service operation's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub songs: Vec<SeedTrack>,
    #[serde(default = "default_count")]
    pub n_recommendations: usize,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub exclude_songs: Option<Vec<String>>,
}

impl RecommendationRequest {
    #[must_use]
    pub fn new(songs: Vec<SeedTrack>) -> Self {
        Self {
            songs,
            n_recommendations: default_count(),
            user_id: None,
            exclude_songs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationResult>,
}
