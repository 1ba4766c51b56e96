//! Content-based track recommendations.
//!
//! Core modules:
//! - [`corpus`] - Corpus preparation and snapshots
//! - [`features`] - Feature vectors (audio, release date, lyrics)
//! - [`filter`] - Candidate filtering (exclusions, history, year window)
//! - [`algorithm`] - Similarity scoring
//! - [`aggregate`] - Cross-seed merging
//! - [`recommender`] - The service tying it together
//!
//! ### Supporting Modules
//!
//! - [`text`] - Lyrics normalization and TF-IDF vectorization
//! - [`cluster`] - Seeded k-means
//! - [`history`] - Per-user recommendation history
//! - [`db`] - SQLite track catalog
//! - [`config`] - Engine parameters and data directory management
//! - [`evaluation`] - Offline quality metrics
//! - [`service`] - JSON-lines request loop
//! - [`cli`] / [`completion`] - Command-line interface
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use tunematch::config::EngineConfig;
//! use tunematch::db;
//! use tunematch::recommender::Recommender;
//! use tunematch::track::{RecommendationRequest, SeedTrack};
//!
//! let conn = db::open(&tunematch::config::get_catalog_path()?)?;
//! let recommender = Recommender::new(EngineConfig::default());
//! recommender.prepare(db::load_rows(&conn)?)?;
//!
//! let mut seed = SeedTrack::default();
//! seed.audio_features.insert("energy".into(), 0.8);
//! seed.playlist_genre = Some("pop".into());
//!
//! let mut request = RecommendationRequest::new(vec![seed]);
//! request.user_id = Some("listener-1".into());
//! for result in recommender.recommend(&request)? {
//!     println!("{:.3} {} - {}", result.similarity_score, result.track_artist, result.track_name);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Scoring
//!
//! Every track is embedded once at preparation time as the concatenation of
//! its min-max scaled audio attributes, a normalized release year and month,
//! and a TF-IDF lyric vector, scaled to unit length. A seed is embedded the
//! same way with the corpus bounds. Candidates are scored by cosine
//! similarity plus genre and diversity bonuses, then blended with popularity.
//! Multi-seed requests favour tracks proposed by more seeds.
//!
//! ## Error Handling
//!
//! Library functions return typed errors from [`error`]: [`error::PrepareError`]
//! while building a corpus and [`error::RecommendError`] per request. The
//! binary wraps them in `anyhow` with context.
//!
//! ## Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```

pub mod aggregate;
pub mod algorithm;
pub mod cli;
pub mod cluster;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod filter;
pub mod history;
pub mod recommender;
pub mod service;
pub mod text;
pub mod track;
