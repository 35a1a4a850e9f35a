//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `listengraph` binary.
//!
//! ## Commands
//!
//! - `ingest`: Load a `Username, Artist, Track` CSV into the graph
//! - `holdout`: Move a seeded fraction of listens aside as ground truth
//! - `similarity`: Project the listening graph and write SIMILAR edges
//! - `recommend`: Rank unheard songs for one user
//! - `evaluate` / `evaluate-all`: Precision, Recall and MAP at k
//! - `run`: similarity followed by a bounded corpus evaluation
//! - `similar`: Show a user's nearest neighbours
//! - `stats`: Node and edge counts
//!
//! ## Examples
//!
//! ```bash
//! listengraph ingest listens.csv
//! listengraph run -k 10 --cutoff 0.1 --limit 1000
//! listengraph recommend alice -k 5 --store
//! ```

use crate::config::{GroundTruth, ScoringMode};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Store location and config file are global so they can follow any
/// subcommand.
#[derive(Parser, Debug)]
#[command(name = "listengraph")]
#[command(about = "Collaborative-filtering song recommendations over a listening graph")]
#[command(version)]
pub struct Args {
    /// Path to the interaction store
    ///
    /// Defaults to `listengraph/graph.db` under the platform data directory.
    #[arg(long, global = true, env = "LISTENGRAPH_DB", value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// TOML file with pipeline settings; command-line flags take precedence
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Scoring and ground-truth overrides shared by the recommending commands.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct ScoringArgs {
    /// How candidate songs are scored
    #[arg(long, value_enum)]
    pub scoring: Option<ScoringMode>,

    /// Which relation evaluation compares against
    #[arg(long, value_enum)]
    pub ground_truth: Option<GroundTruth>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load listening history from a CSV file
    ///
    /// Expects the columns `Username`, `Artist` and `Track`, in any order.
    /// Values are trimmed and lowercased; incomplete rows are dropped and
    /// counted. Creates the store if it does not exist yet.
    Ingest {
        /// CSV file to load
        #[arg(value_hint = clap::ValueHint::FilePath)]
        csv: PathBuf,
    },

    /// Hold out a fraction of each user's listens for evaluation
    ///
    /// Moves the picked LISTENED edges to HELD_OUT. Evaluate against them with
    /// `--ground-truth held-out`. Users that were already split are skipped.
    Holdout {
        /// Fraction of each user's listens to hold out
        #[arg(long, default_value = "0.2")]
        ratio: f64,

        /// Seed for the shuffle; the same seed reproduces the same split
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Compute user similarity and write SIMILAR edges
    ///
    /// Replaces every SIMILAR edge from a previous run.
    Similarity {
        /// Minimum Jaccard score for an edge
        #[arg(long)]
        cutoff: Option<f64>,

        /// Keep at most this many neighbours per user
        #[arg(long)]
        top_k: Option<usize>,

        /// Name of the graph projection
        #[arg(long)]
        graph_name: Option<String>,
    },

    /// Recommend songs for a user
    Recommend {
        /// User id (case-insensitive)
        #[arg(value_hint = clap::ValueHint::Other)]
        user: String,

        /// Number of recommendations
        #[arg(short)]
        k: Option<usize>,

        /// Persist the result as RECOMMENDED edges
        #[arg(long)]
        store: bool,

        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Evaluate recommendations for a single user
    Evaluate {
        /// User id; omit together with `--random` to pick one
        #[arg(required_unless_present = "random", conflicts_with = "random")]
        user: Option<String>,

        /// Evaluate a randomly chosen user
        #[arg(long)]
        random: bool,

        /// Cut-off rank
        #[arg(short)]
        k: Option<usize>,

        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Evaluate the first `--limit` users and report mean metrics
    EvaluateAll {
        /// Cut-off rank
        #[arg(short)]
        k: Option<usize>,

        /// Maximum number of users to evaluate
        #[arg(long)]
        limit: Option<usize>,

        /// Do not persist RECOMMENDED edges
        #[arg(long)]
        no_store: bool,

        /// Evaluate users on all cores
        #[arg(long)]
        parallel: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Projection, similarity and corpus evaluation in one go
    Run {
        /// Cut-off rank
        #[arg(short)]
        k: Option<usize>,

        /// Minimum Jaccard score for an edge
        #[arg(long)]
        cutoff: Option<f64>,

        /// Maximum number of users to evaluate
        #[arg(long)]
        limit: Option<usize>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Show the most similar users to a user
    Similar {
        /// User id (case-insensitive)
        #[arg(value_hint = clap::ValueHint::Other)]
        user: String,

        /// Number of neighbours to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Print node and edge counts
    Stats,

    /// Generate shell completions
    ///
    /// Usage: listengraph completion bash > ~/.local/share/bash-completion/completions/listengraph
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List user ids for completion (hidden command)
    #[command(hide = true)]
    CompleteUsers {
        /// Only ids starting with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },
}
