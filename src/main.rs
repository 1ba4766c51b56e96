//! # Tunematch
//!
//! Command-line front end for the recommendation engine.
//!
//! ## Usage
//!
//! ```bash
//! # Load rows into the catalog, then prepare a snapshot
//! tunematch import spotify_songs.json
//! tunematch prepare
//!
//! # One-off request
//! tunematch recommend request.json
//!
//! # Long-running JSON-lines service
//! tunematch serve < requests.jsonl
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{info, warn};
use std::fs;
use std::io::{self, BufWriter};
use std::path::Path;

use tunematch::cli::{self, Command};
use tunematch::config::{self, EngineConfig, RuntimeConfig};
use tunematch::recommender::Recommender;
use tunematch::track::{RecommendationRequest, RecommendationResponse};
use tunematch::{completion, db, evaluation, service};

/// Active recommender, from the snapshot if one exists, else prepared from
/// the catalog on the spot.
fn load_recommender(runtime: &RuntimeConfig, engine: EngineConfig) -> Result<Recommender> {
    let recommender = Recommender::new(engine);
    let snapshot_path = &runtime.snapshot_path;

    if snapshot_path.exists() {
        recommender
            .load_snapshot(snapshot_path)
            .with_context(|| format!("Failed to load snapshot {}", snapshot_path.display()))?;
    } else {
        warn!(
            "No snapshot at {}; preparing from catalog {}",
            snapshot_path.display(),
            runtime.catalog_path.display()
        );
        prepare_from_catalog(&recommender, &runtime.catalog_path)?;
    }
    Ok(recommender)
}

fn prepare_from_catalog(recommender: &Recommender, catalog: &Path) -> Result<()> {
    let conn = db::open(catalog).with_context(|| format!("Failed to open catalog {}", catalog.display()))?;
    let rows = db::load_rows(&conn)?;
    recommender
        .prepare(rows)
        .context("Corpus preparation failed. Run `tunematch import` with a valid rows file first.")?;
    Ok(())
}

/// Main entry point.
///
/// Logging is controlled by `RUST_LOG`:
/// - `RUST_LOG=info tunematch prepare` - Preparation progress
/// - `RUST_LOG=tunematch::filter=debug tunematch serve` - Filter decisions
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let engine = EngineConfig::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Import { path, replace } => {
            let catalog = args.catalog.map_or_else(config::get_catalog_path, Ok)?;
            let rows = db::read_rows_json(&path)
                .with_context(|| format!("Failed to read corpus rows from {}", path.display()))?;
            let mut conn = db::open(&catalog)?;
            let written = db::import_rows(&mut conn, &rows, replace)?;
            println!(
                "Imported {written} rows ({} in catalog)",
                db::count_tracks(&conn)?
            );
        }
        Command::Prepare { output } => {
            let runtime = RuntimeConfig::resolve(args.catalog, output)?;
            let recommender = Recommender::new(engine);
            prepare_from_catalog(&recommender, &runtime.catalog_path)?;
            if let Some(corpus) = recommender.corpus() {
                corpus.to_snapshot().save(&runtime.snapshot_path)?;
                println!(
                    "Prepared {} tracks ({} dimensions) -> {}",
                    corpus.len(),
                    corpus.dimension(),
                    runtime.snapshot_path.display()
                );
            }
        }
        Command::Recommend { request, snapshot } => {
            let runtime = RuntimeConfig::resolve(args.catalog, snapshot)?;
            let recommender = load_recommender(&runtime, engine)?;

            let content = fs::read_to_string(&request)
                .with_context(|| format!("Failed to read request {}", request.display()))?;
            let request: RecommendationRequest =
                serde_json::from_str(&content).context("Request is not a valid recommendation request")?;

            let recommendations = recommender.recommend(&request)?;
            let response = RecommendationResponse { recommendations };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Serve { snapshot } => {
            let runtime = RuntimeConfig::resolve(args.catalog, snapshot)?;
            let recommender = load_recommender(&runtime, engine)?;
            info!("Serving requests on stdin");

            let stdin = io::stdin();
            let answered = service::serve(&recommender, stdin.lock(), BufWriter::new(io::stdout()))?;
            info!("Input closed after {answered} requests");
        }
        Command::Evaluate {
            snapshot,
            samples,
            k,
            seed,
        } => {
            let runtime = RuntimeConfig::resolve(args.catalog, snapshot)?;
            let recommender = load_recommender(&runtime, engine)?;

            let metrics = evaluation::evaluate(&recommender, samples, k, seed)?;
            println!("Samples:      {}", metrics.samples);
            println!("Precision@{k}: {:.4}", metrics.precision_at_k);
            println!("Recall@{k}:    {:.4}", metrics.recall_at_k);
            println!("NDCG@{k}:      {:.4}", metrics.ndcg_at_k);

            if let Some(corpus) = recommender.corpus() {
                println!("\nFeature importance:");
                for (feature, value) in evaluation::feature_importance(&corpus, samples, seed) {
                    println!("  {feature:<14} {value:.4}");
                }
            }
        }
        Command::Info { snapshot } => {
            let runtime = RuntimeConfig::resolve(args.catalog, snapshot)?;
            let recommender = load_recommender(&runtime, engine)?;
            let corpus = recommender
                .corpus()
                .context("No prepared corpus available")?;

            println!("Tracks:       {}", corpus.len());
            println!("Dimension:    {}", corpus.dimension());
            println!("Lyric terms:  {}", corpus.encoder().lyrics_dimension());
            println!("Clusters:     {}", corpus.cluster_count());
            match corpus.year_range() {
                Some((first, last)) => println!("Years:        {first}-{last}"),
                None => println!("Years:        (no release dates)"),
            }
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
    }

    Ok(())
}
