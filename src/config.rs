//! # Configuration Module
//!
//! Engine tuning parameters and data directory management for Tunematch.
//!
//! ## Data Storage
//!
//! The catalog and the prepared snapshot live in the platform data directory:
//! - Linux: `~/.local/share/tunematch/`
//! - macOS: `~/Library/Application Support/tunematch/`
//! - Windows: `%APPDATA%\tunematch\`
//!
//! ## Engine Parameters
//!
//! [`EngineConfig`] is read from an optional JSON file. Every field has a
//! default, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the platform-appropriate data directory for Tunematch,
/// creating it if needed.
///
/// # Errors
///
/// Fails when the system data directory cannot be determined or the
/// `tunematch` subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join("tunematch");
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create Tunematch data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Default location of the SQLite track catalog.
pub fn get_catalog_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("catalog.db"))
}

/// Default location of the prepared-corpus snapshot.
pub fn get_snapshot_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("snapshot.json"))
}

/// Blend weights of the similarity formula.
///
/// These are constants: they do not react to which optional seed fields
/// were supplied. `lyrics` and `year` are carried for completeness; the
/// score only reads `audio` and `genre`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub audio: f64,
    pub lyrics: f64,
    pub year: f64,
    pub genre: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            audio: 0.6,
            lyrics: 0.2,
            year: 0.1,
            genre: 0.1,
        }
    }
}

/// Additive bonuses and the final popularity blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBonuses {
    pub genre_match: f64,
    pub subgenre_match: f64,
    pub diversity: f64,
    pub similarity_blend: f64,
    pub popularity_blend: f64,
}

impl Default for ScoreBonuses {
    fn default() -> Self {
        Self {
            genre_match: 0.1,
            subgenre_match: 0.05,
            diversity: 0.1,
            similarity_blend: 0.7,
            popularity_blend: 0.3,
        }
    }
}

/// Which cluster the diversity bonus is measured against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "track_id")]
pub enum DiversityReference {
    /// First track of the filtered candidate view
    #[default]
    FirstCandidate,
    /// Cluster of the candidate most similar to the query
    NearestToQuery,
    /// Cluster of a specific corpus track
    Track(String),
}

/// Engine-wide tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: FeatureWeights,
    pub bonuses: ScoreBonuses,
    /// Multiplier on the normalized release year
    pub year_emphasis: f64,
    /// Half-width of the release-year filter window
    pub year_window: i32,
    /// Each seed keeps `count * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
    pub n_clusters: usize,
    pub cluster_seed: u64,
    pub max_features: usize,
    pub diversity_reference: DiversityReference,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            bonuses: ScoreBonuses::default(),
            year_emphasis: 3.0,
            year_window: 5,
            candidate_multiplier: 2,
            n_clusters: 50,
            cluster_seed: 42,
            max_features: 5000,
            diversity_reference: DiversityReference::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file is unreadable or not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid engine config in {}", path.display()))
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

/// Paths resolved for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub catalog_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl RuntimeConfig {
    /// Resolve paths, falling back to the data directory.
    pub fn resolve(catalog: Option<PathBuf>, snapshot: Option<PathBuf>) -> Result<Self> {
        let catalog_path = match catalog {
            Some(path) => path,
            None => get_catalog_path()?,
        };
        let snapshot_path = match snapshot {
            Some(path) => path,
            None => get_snapshot_path()?,
        };
        Ok(Self {
            catalog_path,
            snapshot_path,
        })
    }
}
