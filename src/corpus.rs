//! Corpus preparation and the immutable prepared snapshot.
//!
//! Preparation validates raw rows, fits the feature encoder (audio bounds,
//! year span, lyric vocabulary), embeds every track and clusters the
//! embeddings. The result is read-only; re-preparing is a full rebuild.

use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::cluster::{Clusterer, KMeans};
use crate::config::EngineConfig;
use crate::error::{PrepareError, RecommendError};
use crate::features::{AudioScaler, FeatureEncoder, MinMax};
use crate::text::{EnglishNormalizer, TextNormalizer, TextVectorizer, TfidfVectorizer};
use crate::track::{parse_release_date, CorpusRow, SeedTrack, Track, AUDIO_DIM};

/// Bumped whenever the snapshot layout changes.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Pluggable collaborators used during preparation and query encoding.
pub struct Collaborators {
    pub normalizer: Box<dyn TextNormalizer>,
    pub vectorizer: Box<dyn TextVectorizer>,
    pub clusterer: Box<dyn Clusterer>,
}

impl Collaborators {
    /// Default English normalizer, TF-IDF vectorizer and seeded k-means.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            normalizer: Box::new(EnglishNormalizer),
            vectorizer: Box::new(TfidfVectorizer::with_max_features(config.max_features)),
            clusterer: Box::new(KMeans::new(config.n_clusters, config.cluster_seed)),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// One seed encoded against the prepared corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub vector: Vec<f64>,
    pub release_date: Option<NaiveDate>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
}

/// A validated row awaiting embedding.
struct ValidatedRow {
    id: String,
    name: String,
    artist: String,
    raw_audio: [f64; AUDIO_DIM],
    release_date: Option<NaiveDate>,
    popularity: u8,
    genre: String,
    subgenre: String,
    lyrics: Option<String>,
}

fn required(value: Option<String>, row: usize, field: &'static str) -> Result<String, PrepareError> {
    value.ok_or(PrepareError::MissingField { row, field })
}

fn validate(index: usize, row: CorpusRow) -> Result<ValidatedRow, PrepareError> {
    let raw_audio = row.audio_values(index)?;
    let release_date = row.release_date(index)?;
    let popularity = row.track_popularity.ok_or(PrepareError::MissingField {
        row: index,
        field: "track_popularity",
    })?;
    let popularity = u8::try_from(popularity)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(PrepareError::InvalidPopularity {
            row: index,
            value: popularity,
        })?;

    Ok(ValidatedRow {
        id: required(row.track_id, index, "track_id")?,
        name: required(row.track_name, index, "track_name")?,
        artist: required(row.track_artist, index, "track_artist")?,
        raw_audio,
        release_date,
        popularity,
        genre: required(row.playlist_genre, index, "playlist_genre")?,
        subgenre: required(row.playlist_subgenre, index, "playlist_subgenre")?,
        lyrics: row.lyrics,
    })
}

/// The read-only corpus every request scores against.
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    tracks: Vec<Track>,
    encoder: FeatureEncoder,
    index: HashMap<String, usize>,
}

impl PreparedCorpus {
    /// Validate, embed and cluster `rows`.
    ///
    /// # Errors
    ///
    /// Any malformed row, a duplicate id or an empty corpus aborts preparation.
    pub fn prepare(
        rows: Vec<CorpusRow>,
        collaborators: &Collaborators,
        config: &EngineConfig,
    ) -> Result<Self, PrepareError> {
        if rows.is_empty() {
            return Err(PrepareError::EmptyCorpus);
        }
        info!("Preparing corpus of {} rows", rows.len());

        let validated = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| validate(i, row))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::with_capacity(validated.len());
        for row in &validated {
            if !seen.insert(row.id.as_str()) {
                return Err(PrepareError::DuplicateTrack(row.id.clone()));
            }
        }

        let raw: Vec<[f64; AUDIO_DIM]> = validated.iter().map(|r| r.raw_audio).collect();
        let scaler = AudioScaler::fit(&raw).ok_or(PrepareError::EmptyCorpus)?;
        let years = MinMax::fit(
            validated
                .iter()
                .filter_map(|r| r.release_date)
                .map(|d| f64::from(d.year())),
        );
        if years.is_none() {
            warn!("No corpus track carries a release date; the year filter is disabled");
        }

        let has_lyrics = validated.iter().any(|r| r.lyrics.is_some());
        let normalized: Vec<String> = validated
            .par_iter()
            .map(|r| {
                r.lyrics
                    .as_deref()
                    .map(|text| collaborators.normalizer.normalize(text))
                    .unwrap_or_default()
            })
            .collect();

        let vocabulary = has_lyrics.then(|| {
            let docs: Vec<&str> = normalized.iter().map(String::as_str).collect();
            collaborators.vectorizer.fit(&docs)
        });
        if let Some(vocab) = &vocabulary {
            debug!("Fitted lyric vocabulary of {} terms", vocab.dimension());
        }

        let encoder = FeatureEncoder {
            scaler,
            years,
            year_emphasis: config.year_emphasis,
            vocabulary,
        };

        let embeddings: Vec<Vec<f64>> = validated
            .par_iter()
            .zip(normalized.par_iter())
            .map(|(row, lyrics)| {
                let audio = encoder.scaler.transform(&row.raw_audio);
                encoder.assemble(&audio, row.release_date, Some(lyrics.as_str()))
            })
            .collect();

        let labels = collaborators.clusterer.fit_predict(&embeddings);
        debug!(
            "Clustered corpus into {} distinct labels",
            labels.iter().collect::<HashSet<_>>().len()
        );

        let tracks: Vec<Track> = validated
            .into_iter()
            .zip(embeddings)
            .zip(labels)
            .map(|((row, embedding), cluster)| Track {
                audio: encoder.scaler.transform(&row.raw_audio),
                id: row.id,
                name: row.name,
                artist: row.artist,
                raw_audio: row.raw_audio,
                release_date: row.release_date,
                genre: row.genre,
                subgenre: row.subgenre,
                popularity: row.popularity,
                lyrics: row.lyrics,
                embedding,
                cluster,
            })
            .collect();

        let corpus = Self::from_parts(tracks, encoder);
        info!(
            "Corpus ready: {} tracks, {} dimensions",
            corpus.len(),
            corpus.dimension()
        );
        Ok(corpus)
    }

    fn from_parts(tracks: Vec<Track>, encoder: FeatureEncoder) -> Self {
        let index = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self {
            tracks,
            encoder,
            index,
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Track> {
        self.index.get(id).map(|&i| &self.tracks[i])
    }

    /// Whether any track carries a parsed release date.
    #[must_use]
    pub fn has_release_dates(&self) -> bool {
        self.encoder.years.is_some()
    }

    /// Earliest and latest release year.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn year_range(&self) -> Option<(i32, i32)> {
        self.encoder
            .years
            .map(|bounds| (bounds.min as i32, bounds.max as i32))
    }

    /// Number of distinct cluster labels.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.cluster)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Encode one seed with the corpus encoder.
    ///
    /// # Errors
    ///
    /// Returns [`RecommendError::InvalidReleaseDate`] for an unparsable date.
    pub fn encode_seed(
        &self,
        seed_index: usize,
        seed: &SeedTrack,
        normalizer: &dyn TextNormalizer,
    ) -> Result<Query, RecommendError> {
        let release_date = seed
            .release_date_str()
            .map(|raw| {
                parse_release_date(raw).ok_or_else(|| RecommendError::InvalidReleaseDate {
                    seed: seed_index,
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        let audio = self.encoder.query_audio(&seed.audio_features);
        let lyrics = seed
            .lyrics
            .as_deref()
            .filter(|text| !text.trim().is_empty() && self.encoder.vocabulary.is_some())
            .map(|text| normalizer.normalize(text));
        let vector = self.encoder.assemble(&audio, release_date, lyrics.as_deref());

        Ok(Query {
            vector,
            release_date,
            genre: seed.playlist_genre.clone(),
            subgenre: seed.playlist_subgenre.clone(),
        })
    }

    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension: self.dimension(),
            encoder: self.encoder.clone(),
            tracks: self.tracks.clone(),
        }
    }

    /// Rebuild from a snapshot, validating its shape.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, PrepareError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PrepareError::Snapshot(format!(
                "unsupported format version {} (expected {SNAPSHOT_FORMAT_VERSION})",
                snapshot.format_version
            )));
        }
        if snapshot.tracks.is_empty() {
            return Err(PrepareError::EmptyCorpus);
        }
        let dimension = snapshot.encoder.dimension();
        if snapshot.dimension != dimension {
            return Err(PrepareError::Snapshot(format!(
                "declared dimension {} does not match encoder dimension {dimension}",
                snapshot.dimension
            )));
        }
        if let Some(track) = snapshot.tracks.iter().find(|t| t.embedding.len() != dimension) {
            return Err(PrepareError::Snapshot(format!(
                "track `{}` has embedding of length {}, expected {dimension}",
                track.id,
                track.embedding.len()
            )));
        }

        let mut seen = HashSet::with_capacity(snapshot.tracks.len());
        for track in &snapshot.tracks {
            if !seen.insert(track.id.as_str()) {
                return Err(PrepareError::DuplicateTrack(track.id.clone()));
            }
        }

        Ok(Self::from_parts(snapshot.tracks, snapshot.encoder))
    }
}

/// Versioned, serializable prepared corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub dimension: usize,
    pub encoder: FeatureEncoder,
    pub tracks: Vec<Track>,
}

impl Snapshot {
    pub fn save(&self, path: &Path) -> Result<(), PrepareError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        info!("Wrote snapshot of {} tracks to {}", self.tracks.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PrepareError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::norm;
    use crate::track::{LOUDNESS, TEMPO};
    use approx::assert_relative_eq;

    pub(crate) fn row(id: &str, genre: &str, popularity: i64, level: f64, date: &str) -> CorpusRow {
        CorpusRow {
            track_id: Some(id.to_string()),
            track_name: Some(format!("Song {id}")),
            track_artist: Some(format!("Artist {id}")),
            danceability: Some(level),
            energy: Some(1.0 - level),
            loudness: Some(-30.0 + 25.0 * level),
            speechiness: Some(0.1),
            acousticness: Some(level * level),
            instrumentalness: Some(0.0),
            liveness: Some(0.2),
            valence: Some(level),
            tempo: Some(80.0 + 80.0 * level),
            track_album_release_date: Some(date.to_string()),
            track_popularity: Some(popularity),
            playlist_genre: Some(genre.to_string()),
            playlist_subgenre: Some(format!("{genre} sub")),
            lyrics: None,
        }
    }

    fn prepare(rows: Vec<CorpusRow>) -> Result<PreparedCorpus, PrepareError> {
        let config = EngineConfig::default();
        PreparedCorpus::prepare(rows, &Collaborators::from_config(&config), &config)
    }

    #[test]
    fn test_embeddings_are_unit_length_and_uniform() {
        let corpus = prepare(vec![
            row("a", "pop", 80, 0.1, "2001-01-01"),
            row("b", "rock", 20, 0.5, "2010-06-15"),
            row("c", "pop", 50, 0.9, "2020"),
        ])
        .unwrap();

        for track in corpus.tracks() {
            assert_eq!(track.embedding.len(), corpus.dimension());
            assert_relative_eq!(norm(&track.embedding), 1.0, epsilon = 1e-9);
        }
        assert_eq!(corpus.year_range(), Some((2001, 2020)));
        assert!(corpus.has_release_dates());
    }

    #[test]
    fn test_scaled_audio_in_unit_range() {
        let corpus = prepare(vec![
            row("a", "pop", 80, 0.1, "2001"),
            row("b", "rock", 20, 0.7, "2002"),
        ])
        .unwrap();
        for track in corpus.tracks() {
            for value in track.audio {
                assert!((0.0..=1.0).contains(&value));
            }
        }
        let a = corpus.get("a").unwrap();
        assert_eq!(a.audio[LOUDNESS], 0.0);
        assert_eq!(a.audio[TEMPO], 0.0);
        assert_eq!(a.raw_audio[LOUDNESS], -27.5);
    }

    #[test]
    fn test_all_zero_raw_vector_stays_zero() {
        // One track collapses every audio range; no dates, no lyrics, no year emphasis
        let mut only = row("z", "pop", 10, 0.5, "");
        only.track_album_release_date = None;
        let config = EngineConfig {
            year_emphasis: 0.0,
            ..EngineConfig::default()
        };
        let corpus =
            PreparedCorpus::prepare(vec![only], &Collaborators::from_config(&config), &config).unwrap();

        // Only the neutral month survives, so the embedding is a basis vector
        let track = corpus.get("z").unwrap();
        assert_relative_eq!(norm(&track.embedding), 1.0, epsilon = 1e-12);
        assert_eq!(track.embedding[AUDIO_DIM], 0.0);
        assert_eq!(track.embedding[AUDIO_DIM + 1], 1.0);

        let january = NaiveDate::from_ymd_opt(2000, 1, 1);
        let zero = corpus.encoder().assemble(&[0.0; AUDIO_DIM], january, None);
        assert!(zero.iter().all(|v| *v == 0.0 && !v.is_nan()));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut bad = row("a", "pop", 10, 0.5, "2000");
        bad.playlist_genre = None;
        let err = prepare(vec![row("ok", "pop", 1, 0.2, "2000"), bad]).unwrap_err();
        assert!(matches!(
            err,
            PrepareError::MissingField { row: 1, field: "playlist_genre" }
        ));
    }

    #[test]
    fn test_invalid_popularity_and_duplicates() {
        let err = prepare(vec![row("a", "pop", 101, 0.5, "2000")]).unwrap_err();
        assert!(matches!(err, PrepareError::InvalidPopularity { value: 101, .. }));

        let err = prepare(vec![row("a", "pop", 1, 0.5, "2000"), row("a", "pop", 2, 0.1, "2001")]).unwrap_err();
        assert!(matches!(err, PrepareError::DuplicateTrack(id) if id == "a"));

        assert!(matches!(prepare(Vec::new()), Err(PrepareError::EmptyCorpus)));
    }

    #[test]
    fn test_lyrics_block_width_matches_vocabulary() {
        let mut a = row("a", "pop", 10, 0.2, "2000");
        a.lyrics = Some("Dancing in the moonlight, dancing all night".into());
        let b = row("b", "rock", 10, 0.8, "2001");
        let corpus = prepare(vec![a, b]).unwrap();

        let vocab_dim = corpus.encoder().lyrics_dimension();
        assert!(vocab_dim > 0);
        assert_eq!(corpus.dimension(), AUDIO_DIM + 2 + vocab_dim);

        // A track without lyrics gets an all-zero lyric block
        let b = corpus.get("b").unwrap();
        assert!(b.embedding[AUDIO_DIM + 2..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_seed_encoding_matches_dimension_and_rejects_bad_dates() {
        let mut a = row("a", "pop", 10, 0.2, "2000");
        a.lyrics = Some("moonlight".into());
        let corpus = prepare(vec![a, row("b", "rock", 10, 0.8, "2001")]).unwrap();

        let seed = SeedTrack::default();
        let query = corpus.encode_seed(0, &seed, &EnglishNormalizer).unwrap();
        assert_eq!(query.vector.len(), corpus.dimension());
        assert_relative_eq!(norm(&query.vector), 1.0, epsilon = 1e-12);

        let bad = SeedTrack {
            release_date: Some("not a date".into()),
            ..SeedTrack::default()
        };
        let err = corpus.encode_seed(3, &bad, &EnglishNormalizer).unwrap_err();
        assert!(matches!(err, RecommendError::InvalidReleaseDate { seed: 3, .. }));
    }

    #[test]
    fn test_seed_of_corpus_track_reproduces_embedding() {
        let corpus = prepare(vec![
            row("a", "pop", 10, 0.2, "2000-03-01"),
            row("b", "rock", 10, 0.8, "2010-09-01"),
        ])
        .unwrap();
        let track = corpus.get("b").unwrap();
        let query = corpus
            .encode_seed(0, &SeedTrack::from_track(track), &EnglishNormalizer)
            .unwrap();
        for (q, e) in query.vector.iter().zip(&track.embedding) {
            assert_relative_eq!(*q, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_snapshot_roundtrip_and_validation() {
        let corpus = prepare(vec![
            row("a", "pop", 10, 0.2, "2000"),
            row("b", "rock", 10, 0.8, "2001"),
        ])
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        corpus.to_snapshot().save(&path).unwrap();
        let restored = PreparedCorpus::from_snapshot(Snapshot::load(&path).unwrap()).unwrap();
        assert_eq!(restored.tracks(), corpus.tracks());
        assert_eq!(restored.get("b").unwrap().id, "b");

        let mut stale = corpus.to_snapshot();
        stale.format_version = 0;
        assert!(matches!(PreparedCorpus::from_snapshot(stale), Err(PrepareError::Snapshot(_))));

        let mut broken = corpus.to_snapshot();
        broken.tracks[1].embedding.pop();
        assert!(matches!(PreparedCorpus::from_snapshot(broken), Err(PrepareError::Snapshot(_))));
    }
}
