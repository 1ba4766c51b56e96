//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `tunematch` binary.
//!
//! ## Commands
//!
//! - `import`: Load corpus rows from a JSON file into the catalog
//! - `prepare`: Build the prepared corpus and write a snapshot
//! - `recommend`: Answer one JSON request
//! - `serve`: Answer JSON requests line by line on stdin
//! - `evaluate`: Self-retrieval metrics and feature importance
//! - `info`: Prepared corpus statistics
//! - `completion`: Shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! tunematch import spotify_songs.json --replace
//! tunematch prepare
//! tunematch recommend request.json
//! RUST_LOG=debug tunematch serve < requests.jsonl
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Top-level arguments.
#[derive(Parser, Debug)]
#[command(name = "tunematch")]
#[command(about = "Tunematch: content-based track recommendations from audio, lyrics and release year")]
#[command(version)]
pub struct Args {
    /// Path to the SQLite track catalog
    ///
    /// Defaults to `catalog.db` in the platform data directory.
    #[arg(long, global = true, env = "TUNEMATCH_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// JSON file with engine parameters
    ///
    /// Any field left out keeps its default.
    #[arg(long, global = true, env = "TUNEMATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import corpus rows into the catalog
    ///
    /// Reads a JSON array of rows carrying `track_id`, `track_name`,
    /// `track_artist`, the nine audio attributes, `track_album_release_date`,
    /// `track_popularity`, `playlist_genre`, `playlist_subgenre` and optional
    /// `lyrics`. Rows are only validated at `prepare` time.
    Import {
        /// JSON file with the rows
        path: PathBuf,

        /// Empty the catalog before importing
        #[arg(long)]
        replace: bool,
    },

    /// Build the prepared corpus from the catalog
    ///
    /// Fits the audio scaler, year range and lyric vocabulary, embeds and
    /// clusters every track, then writes a versioned snapshot.
    Prepare {
        /// Where to write the snapshot
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Recommend tracks for one JSON request
    Recommend {
        /// Request file (`songs`, `n_recommendations`, `user_id`, `exclude_songs`)
        request: PathBuf,

        /// Snapshot to score against
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Answer one JSON request per stdin line
    ///
    /// User history persists for the lifetime of the process. Failed
    /// requests produce `{"error": <kind>, "message": <text>}`.
    Serve {
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Measure self-retrieval quality on sampled tracks
    Evaluate {
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Number of tracks to sample
        #[arg(long, default_value_t = 20)]
        samples: usize,

        /// Recommendations requested per sample
        #[arg(long, short, default_value_t = 5)]
        k: usize,

        /// Sampling seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Show prepared corpus statistics
    Info {
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Generate shell completions
    ///
    /// Usage: tunematch completion bash > ~/.local/share/bash-completion/completions/tunematch
    Completion {
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Args::try_parse_from([
            "tunematch",
            "evaluate",
            "--samples",
            "3",
            "--catalog",
            "/tmp/c.db",
        ])
        .unwrap();
        assert_eq!(args.catalog, Some(PathBuf::from("/tmp/c.db")));
        match args.command {
            Command::Evaluate { samples, k, seed, .. } => assert_eq!((samples, k, seed), (3, 5, 42)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_import_replace_flag() {
        let args = Args::try_parse_from(["tunematch", "import", "rows.json", "--replace"]).unwrap();
        assert!(matches!(args.command, Command::Import { replace: true, .. }));
    }
}
