//! Feature pipeline: raw track attributes to unit-length vectors.
//!
//! Layout of every vector, corpus and query alike:
//!
//! ```text
//! [ audio(9) | year * emphasis, month | lyrics(D) ]
//! ```
//!
//! The whole vector is L2-normalized; a zero vector stays zero.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::text::Vocabulary;
use crate::track::{AUDIO_DIM, AUDIO_FEATURE_NAMES, LOUDNESS, TEMPO};

/// Value used for an audio attribute or date part the caller left out.
pub const NEUTRAL_VALUE: f64 = 0.5;

/// Observed bounds of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    /// Bounds of `values`, `None` when empty.
    pub fn fit(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self { min: v, max: v }),
            Some(b) => Some(Self {
                min: b.min.min(v),
                max: b.max.max(v),
            }),
        })
    }

    /// Map `value` linearly so `min -> 0` and `max -> 1`.
    ///
    /// A zero-width range degenerates to 0. Values outside the fitted
    /// range are not clipped.
    #[must_use]
    pub fn scale(&self, value: f64) -> f64 {
        let width = self.max - self.min;
        if width == 0.0 || !width.is_finite() {
            return 0.0;
        }
        (value - self.min) / width
    }
}

/// Two-pass min-max scaler for the audio block.
///
/// Loudness and tempo are rescaled on their own first, then the whole
/// block is rescaled together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioScaler {
    loudness: MinMax,
    tempo: MinMax,
    block: [MinMax; AUDIO_DIM],
}

impl AudioScaler {
    /// Fit on raw corpus rows. Returns `None` for an empty corpus.
    #[must_use]
    pub fn fit(rows: &[[f64; AUDIO_DIM]]) -> Option<Self> {
        let loudness = MinMax::fit(rows.iter().map(|r| r[LOUDNESS]))?;
        let tempo = MinMax::fit(rows.iter().map(|r| r[TEMPO]))?;

        let pre_scaled: Vec<[f64; AUDIO_DIM]> = rows
            .iter()
            .map(|r| Self::pre_scale_with(&loudness, &tempo, *r))
            .collect();

        let mut block = [MinMax { min: 0.0, max: 0.0 }; AUDIO_DIM];
        for (column, bounds) in block.iter_mut().enumerate() {
            *bounds = MinMax::fit(pre_scaled.iter().map(|r| r[column]))?;
        }

        Some(Self { loudness, tempo, block })
    }

    fn pre_scale_with(loudness: &MinMax, tempo: &MinMax, mut row: [f64; AUDIO_DIM]) -> [f64; AUDIO_DIM] {
        row[LOUDNESS] = loudness.scale(row[LOUDNESS]);
        row[TEMPO] = tempo.scale(row[TEMPO]);
        row
    }

    /// Scale a single raw value of `column` through both passes.
    #[must_use]
    pub fn scale_column(&self, column: usize, value: f64) -> f64 {
        let value = match column {
            LOUDNESS => self.loudness.scale(value),
            TEMPO => self.tempo.scale(value),
            _ => value,
        };
        self.block[column].scale(value)
    }

    /// Scale a full raw row.
    #[must_use]
    pub fn transform(&self, row: &[f64; AUDIO_DIM]) -> [f64; AUDIO_DIM] {
        let mut scaled = [0.0; AUDIO_DIM];
        for (column, value) in scaled.iter_mut().enumerate() {
            *value = self.scale_column(column, row[column]);
        }
        scaled
    }
}

/// Everything needed to encode a track or a query identically.
///
/// Fitted once during corpus preparation and never refitted by a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    pub scaler: AudioScaler,
    /// Year bounds of the corpus; `None` when no track carries a date
    pub years: Option<MinMax>,
    pub year_emphasis: f64,
    /// Fitted lyric vocabulary; `None` when the corpus has no lyrics
    pub vocabulary: Option<Vocabulary>,
}

impl FeatureEncoder {
    /// Total vector width.
    #[must_use]
    pub fn dimension(&self) -> usize {
        AUDIO_DIM + 2 + self.lyrics_dimension()
    }

    #[must_use]
    pub fn lyrics_dimension(&self) -> usize {
        self.vocabulary.as_ref().map_or(0, Vocabulary::dimension)
    }

    /// Scaled audio block for a query, neutral where attributes are missing.
    #[must_use]
    pub fn query_audio(&self, features: &HashMap<String, f64>) -> [f64; AUDIO_DIM] {
        let mut audio = [NEUTRAL_VALUE; AUDIO_DIM];
        for (column, name) in AUDIO_FEATURE_NAMES.iter().enumerate() {
            if let Some(&raw) = features.get(*name) {
                audio[column] = self.scaler.scale_column(column, raw);
            }
        }
        audio
    }

    /// `[year * emphasis, month]`; both neutral when the date is absent.
    #[must_use]
    pub fn date_block(&self, date: Option<NaiveDate>) -> [f64; 2] {
        match date {
            None => [NEUTRAL_VALUE * self.year_emphasis, NEUTRAL_VALUE],
            Some(date) => {
                let year = self
                    .years
                    .map_or(0.0, |bounds| bounds.scale(f64::from(date.year())));
                let month = f64::from(date.month() - 1) / 11.0;
                [year * self.year_emphasis, month]
            }
        }
    }

    /// Lyric block for already-normalized text; zeros when absent.
    #[must_use]
    pub fn lyrics_block(&self, normalized: Option<&str>) -> Vec<f64> {
        match (&self.vocabulary, normalized) {
            (Some(vocab), Some(text)) => vocab.transform(text),
            _ => vec![0.0; self.lyrics_dimension()],
        }
    }

    /// Concatenate and normalize the three blocks.
    #[must_use]
    pub fn assemble(
        &self,
        audio: &[f64; AUDIO_DIM],
        date: Option<NaiveDate>,
        normalized_lyrics: Option<&str>,
    ) -> Vec<f64> {
        let mut vector = Vec::with_capacity(self.dimension());
        vector.extend_from_slice(audio);
        vector.extend_from_slice(&self.date_block(date));
        vector.extend(self.lyrics_block(normalized_lyrics));

        nan_to_zero(&mut vector);
        l2_normalize(&mut vector);
        nan_to_zero(&mut vector);
        vector
    }
}

/// Replace every NaN with 0.
pub fn nan_to_zero(values: &mut [f64]) {
    for value in values.iter_mut().filter(|v| v.is_nan()) {
        *value = 0.0;
    }
}

#[must_use]
pub fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Normalize in place; returns whether the norm was non-zero.
pub fn l2_normalize(values: &mut [f64]) -> bool {
    let n = norm(values);
    if n == 0.0 || !n.is_finite() {
        return false;
    }
    for value in values.iter_mut() {
        *value /= n;
    }
    true
}

/// Cosine similarity in [-1, 1]; 0 when either side is a zero vector.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let denominator = norm(a) * norm(b);
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot / denominator).clamp(-1.0, 1.0)
}
