//! # Listengraph
//!
//! Command-line driver for the listening-graph recommender: loads listening
//! history, computes user similarity, recommends unheard songs and scores the
//! recommendations offline.
//!
//! ## Usage
//!
//! ```bash
//! # Load a Last.fm style export
//! listengraph ingest listens.csv
//!
//! # Similarity + evaluation over the first 1000 users
//! listengraph run -k 10 --cutoff 0.1 --limit 1000
//!
//! # Recommendations for a single user
//! listengraph recommend alice -k 5
//! ```
//!
//! ## Exit Codes
//!
//! - `0` success
//! - `1` any other failure
//! - `2` the interaction store could not be opened or has an unknown schema
//!
//! Logging is controlled through `RUST_LOG`, e.g. `RUST_LOG=listengraph=debug`.

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use listengraph::cli::{self, ScoringArgs};
use listengraph::completion;
use listengraph::config::{PipelineConfig, Settings};
use listengraph::evaluate::{CorpusReport, EvaluateAllOptions, Evaluator, MeanMetrics};
use listengraph::holdout::{split_holdout, HoldoutConfig};
use listengraph::ingest::ingest_csv;
use listengraph::model::UserId;
use listengraph::pipeline::{run_pipeline, CancelToken, SimilarityGraph};
use listengraph::recommend::{store_recommendations, Recommender};
use listengraph::similarity::JaccardEngine;
use listengraph::store::{InteractionStore, OpenMode, SqliteStore};
use listengraph::RecommendError;
use log::{debug, info, warn};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_CONNECTIVITY: u8 = 2;

fn main() -> ExitCode {
    env_logger::init();
    let args = cli::Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_code_for(&e)
        }
    }
}

/// A store that cannot be opened or read, anywhere in the cause chain, maps to
/// a dedicated code.
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    let connectivity = error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<RecommendError>(),
            Some(RecommendError::Connectivity { .. } | RecommendError::Schema(_))
        )
    });
    if connectivity {
        ExitCode::from(EXIT_CONNECTIVITY)
    } else {
        ExitCode::FAILURE
    }
}

/// Settings file plus global flags, resolved once per invocation.
struct Invocation {
    db: Option<PathBuf>,
    settings: Settings,
}

impl Invocation {
    fn load(args: &cli::Args) -> Result<Self> {
        let settings = match &args.config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };
        Ok(Self {
            db: args.db.clone(),
            settings,
        })
    }

    fn db_path(&self) -> Result<PathBuf> {
        match &self.db {
            Some(path) => Ok(path.clone()),
            None => Ok(self.settings.resolve_db_path()?),
        }
    }

    fn open(&self, mode: OpenMode) -> Result<SqliteStore> {
        let path = self.db_path()?;
        let store = SqliteStore::open(&path, mode).with_context(|| match mode {
            OpenMode::Existing => format!(
                "failed to open {} (load data with `listengraph ingest` first)",
                path.display()
            ),
            OpenMode::CreateIfMissing => format!("failed to open {}", path.display()),
        })?;
        Ok(store)
    }

    fn pipeline(&self, scoring: &ScoringArgs) -> PipelineConfig {
        let mut pipeline = self.settings.pipeline.clone();
        if let Some(mode) = scoring.scoring {
            pipeline.scoring_mode = mode;
        }
        if let Some(ground_truth) = scoring.ground_truth {
            pipeline.ground_truth = ground_truth;
        }
        pipeline
    }
}

fn run(args: cli::Args) -> Result<()> {
    let ctx = Invocation::load(&args)?;

    match args.command {
        cli::Command::Ingest { csv } => {
            let mut store = ctx.open(OpenMode::CreateIfMissing)?;
            let report = ingest_csv(&mut store, &csv)
                .with_context(|| format!("failed to ingest {}", csv.display()))?;
            println!("Rows read: {}", report.rows_read);
            println!("Ingested: {}", report.ingested);
            println!("Dropped (incomplete): {}", report.dropped_incomplete);
            println!("Failed: {}", report.failed.len());
            for failure in &report.failed {
                println!("  row {}: {}", failure.row, failure.reason);
            }
        }
        cli::Command::Holdout { ratio, seed } => {
            let mut store = ctx.open(OpenMode::Existing)?;
            let report = split_holdout(&mut store, &HoldoutConfig { ratio, seed })?;
            println!(
                "Held out {} listens from {} of {} users ({} already split)",
                report.held_out, report.users_split, report.users, report.already_split
            );
            if report.held_out > 0 {
                println!("SIMILAR edges cleared; run `listengraph similarity` before recommending");
            }
        }
        cli::Command::Similarity { cutoff, top_k, graph_name } => {
            let mut pipeline = ctx.settings.pipeline.clone();
            if let Some(cutoff) = cutoff {
                pipeline.similarity_cutoff = cutoff;
            }
            if top_k.is_some() {
                pipeline.similarity_top_k = top_k;
            }
            if let Some(name) = graph_name {
                pipeline.graph_name = name;
            }
            pipeline.validate()?;

            let mut store = ctx.open(OpenMode::Existing)?;
            let graph = SimilarityGraph::build(&mut store, &JaccardEngine, &pipeline)?;
            println!(
                "Wrote {} SIMILAR relationships on `{}` (cutoff {})",
                graph.run().relationships_written,
                graph.run().graph_name,
                graph.run().cutoff
            );
        }
        cli::Command::Recommend { user, k, store: persist, scoring } => {
            let mut pipeline = ctx.pipeline(&scoring);
            pipeline.k = k.unwrap_or(pipeline.k);
            pipeline.validate()?;

            let mut store = ctx.open(OpenMode::Existing)?;
            let user = UserId::new(&user)?;
            let graph = SimilarityGraph::existing(&store)?;
            let recommender = Recommender::new(&graph, pipeline.scoring_mode);
            let recommendations = recommender.recommend(&store, &user, pipeline.k)?;

            if recommendations.is_empty() {
                println!("No recommendations for {user}");
            }
            for (rank, rec) in recommendations.iter().enumerate() {
                println!("{:>3}. {} ({:.4})", rank + 1, rec.song, rec.score);
            }
            if persist {
                store_recommendations(&mut store, &user, &recommendations)?;
                info!("Stored recommendations for {user}");
            }
        }
        cli::Command::Evaluate { user, random, k, scoring } => {
            let mut pipeline = ctx.pipeline(&scoring);
            pipeline.k = k.unwrap_or(pipeline.k);
            pipeline.validate()?;

            let store = ctx.open(OpenMode::Existing)?;
            let user = match user {
                Some(raw) if !random => UserId::new(&raw)?,
                _ => store
                    .random_user()?
                    .ok_or_else(|| anyhow!("the graph holds no users"))?,
            };
            println!("Selected user: {user}");

            let graph = SimilarityGraph::existing(&store)?;
            let recommender = Recommender::new(&graph, pipeline.scoring_mode);
            let evaluator = Evaluator::new(&recommender, pipeline.ground_truth);
            match evaluator.evaluate(&store, &user, pipeline.k)? {
                Some(result) => {
                    let songs: Vec<&str> = result.recommended.iter().map(|r| r.song.as_str()).collect();
                    println!("Recommended: {}", songs.join(", "));
                    println!("Ground truth size: {}", result.ground_truth_size);
                    print_metrics(pipeline.k, result.precision, result.recall, result.map);
                }
                None => println!("no users evaluated: {user} has an empty ground truth"),
            }
        }
        cli::Command::EvaluateAll { k, limit, no_store, parallel, json, scoring } => {
            let mut pipeline = ctx.pipeline(&scoring);
            pipeline.k = k.unwrap_or(pipeline.k);
            pipeline.eval_user_limit = limit.unwrap_or(pipeline.eval_user_limit);
            pipeline.validate()?;
            let options = EvaluateAllOptions {
                store_recommendations: !no_store,
            };

            let mut store = ctx.open(OpenMode::Existing)?;
            let graph = SimilarityGraph::existing(&store)?;
            let recommender = Recommender::new(&graph, pipeline.scoring_mode);
            let evaluator = Evaluator::new(&recommender, pipeline.ground_truth);
            let cancel = install_cancel_handler();

            let report = if parallel {
                let path = store.path().to_path_buf();
                drop(store);
                evaluator.evaluate_all_parallel(
                    || SqliteStore::open(&path, OpenMode::Existing),
                    pipeline.eval_user_limit,
                    pipeline.k,
                    options,
                    &cancel,
                )?
            } else {
                evaluator.evaluate_all(&mut store, pipeline.eval_user_limit, pipeline.k, options, &cancel)?
            };
            print_corpus(&report, json)?;
        }
        cli::Command::Run { k, cutoff, limit, json, scoring } => {
            let mut pipeline = ctx.pipeline(&scoring);
            pipeline.k = k.unwrap_or(pipeline.k);
            pipeline.similarity_cutoff = cutoff.unwrap_or(pipeline.similarity_cutoff);
            pipeline.eval_user_limit = limit.unwrap_or(pipeline.eval_user_limit);
            pipeline.validate()?;

            let mut store = ctx.open(OpenMode::Existing)?;
            let cancel = install_cancel_handler();
            let report = run_pipeline(&mut store, &JaccardEngine, &pipeline, &cancel)?;
            if !json {
                println!(
                    "Wrote {} SIMILAR relationships (cutoff {})",
                    report.similarity.relationships_written, report.similarity.cutoff
                );
            }
            print_corpus(&report.corpus, json)?;
        }
        cli::Command::Similar { user, limit } => {
            let store = ctx.open(OpenMode::Existing)?;
            SimilarityGraph::existing(&store)?;
            let user = UserId::new(&user)?;
            if !store.user_exists(&user)? {
                return Err(RecommendError::UnknownUser(user).into());
            }
            let neighbours = store.similar_users(&user, Some(limit))?;
            if neighbours.is_empty() {
                println!("No similar users for {user}");
            }
            for neighbour in neighbours {
                println!("{} ({:.4})", neighbour.user, neighbour.similarity);
            }
        }
        cli::Command::Stats => {
            let store = ctx.open(OpenMode::Existing)?;
            let stats = store.stats()?;
            println!("Users: {}", stats.users);
            println!("Songs: {}", stats.songs);
            println!("Artists: {}", stats.artists);
            println!("LISTENED: {}", stats.listened);
            println!("HELD_OUT: {}", stats.held_out);
            println!("SIMILAR: {}", stats.similar);
            println!("RECOMMENDED: {}", stats.recommended);
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
        cli::Command::CompleteUsers { prefix } => {
            let completions = completion::user_completions(&ctx.db_path()?, &prefix);
            completion::print_completions(&mut io::stdout().lock(), &completions)?;
        }
    }

    Ok(())
}

/// Ctrl-C stops corpus evaluation between users.
fn install_cancel_handler() -> CancelToken {
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.cancel()) {
        warn!("Could not install Ctrl-C handler: {e}");
    } else {
        debug!("Ctrl-C handler installed");
    }
    cancel
}

fn print_metrics(k: usize, precision: f64, recall: f64, map: f64) {
    println!("Precision@{k}: {precision:.4}");
    println!("Recall@{k}: {recall:.4}");
    println!("MAP@{k}: {map:.4}");
}

#[derive(Serialize)]
struct CorpusSummary<'a> {
    #[serde(flatten)]
    report: &'a CorpusReport,
    averages: Option<MeanMetrics>,
}

fn print_corpus(report: &CorpusReport, json: bool) -> Result<()> {
    if json {
        let summary = CorpusSummary {
            report,
            averages: report.averages(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Selected users ({}): {}", report.selected.len(), join_users(&report.selected));
    let evaluated: Vec<UserId> = report.results.iter().map(|r| r.user.clone()).collect();
    println!("Evaluated users ({}): {}", evaluated.len(), join_users(&evaluated));
    if !report.skipped_empty.is_empty() {
        println!("Skipped (empty ground truth): {}", report.skipped_empty.len());
    }
    for failure in &report.failed {
        println!("Failed {}: {}", failure.user, failure.reason);
    }
    if report.cancelled {
        println!("Cancelled before all users were evaluated");
    }

    match report.averages() {
        Some(MeanMetrics { precision, recall, map, .. }) => print_metrics(report.k, precision, recall, map),
        None => println!("no users evaluated"),
    }
    Ok(())
}

fn join_users(users: &[UserId]) -> String {
    users.iter().map(UserId::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_connectivity_maps_to_exit_two() {
        let err = SqliteStore::open(Path::new("/nonexistent/dir/graph.db"), OpenMode::Existing).unwrap_err();
        let wrapped = anyhow::Error::new(err).context("failed to open store");
        assert_eq!(exit_code_for(&wrapped), ExitCode::from(EXIT_CONNECTIVITY));
    }

    #[test]
    fn test_other_errors_map_to_failure() {
        let err = anyhow::Error::new(RecommendError::SimilarityNotComputed);
        assert_eq!(exit_code_for(&err), ExitCode::FAILURE);
        assert_eq!(exit_code_for(&anyhow!("boom")), ExitCode::FAILURE);
    }

    #[test]
    fn test_flags_override_settings() {
        let args = cli::Args::try_parse_from([
            "listengraph",
            "--db",
            "/tmp/explicit.db",
            "evaluate-all",
            "--scoring",
            "weighted-average",
        ])
        .unwrap();
        let mut ctx = Invocation::load(&args).unwrap();
        ctx.settings.db_path = Some(PathBuf::from("/tmp/from-file.db"));
        assert_eq!(ctx.db_path().unwrap(), PathBuf::from("/tmp/explicit.db"));

        let scoring = ScoringArgs {
            scoring: Some(listengraph::config::ScoringMode::WeightedAverage),
            ground_truth: None,
        };
        let pipeline = ctx.pipeline(&scoring);
        assert_eq!(pipeline.scoring_mode, listengraph::config::ScoringMode::WeightedAverage);
        assert_eq!(pipeline.k, 10);
    }
}
