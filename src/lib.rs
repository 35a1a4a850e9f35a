//! Collaborative-filtering song recommendations over a listening graph.
//!
//! Users, songs and artists form a bipartite graph of `User -LISTENED-> Song`
//! edges. A similarity run derives weighted `User -SIMILAR-> User` edges from
//! shared listening; songs heard by similar users are then ranked for each user
//! and scored offline with Precision@K, Recall@K and MAP@K.
//!
//! Core modules:
//! - [`recommend`] - Candidate ranking and RECOMMENDED edge storage
//! - [`evaluate`] - Per-user and corpus-level metrics
//! - [`similarity`] - Similarity engine seam and the bundled Jaccard engine
//! - [`store`] - Interaction store trait and its SQLite backend
//! - [`pipeline`] - Similarity -> recommend -> evaluate sequencing
//!
//! ### Supporting Modules
//!
//! - [`ingest`] - CSV bulk loading
//! - [`holdout`] - Seeded ground-truth split
//! - [`config`] - Data directory, pipeline parameters and settings file
//! - [`model`] - Identities and value types
//! - [`error`] - Error taxonomy
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use listengraph::config::PipelineConfig;
//! use listengraph::evaluate::Evaluator;
//! use listengraph::ingest::ingest_csv;
//! use listengraph::model::UserId;
//! use listengraph::pipeline::SimilarityGraph;
//! use listengraph::recommend::Recommender;
//! use listengraph::similarity::JaccardEngine;
//! use listengraph::store::{OpenMode, SqliteStore};
//! use std::path::Path;
//!
//! let mut store = SqliteStore::open("graph.db", OpenMode::CreateIfMissing)?;
//! ingest_csv(&mut store, Path::new("listens.csv"))?;
//!
//! let config = PipelineConfig::default();
//! let graph = SimilarityGraph::build(&mut store, &JaccardEngine, &config)?;
//! let recommender = Recommender::new(&graph, config.scoring_mode);
//!
//! let alice = UserId::new("Alice")?;
//! for rec in recommender.recommend(&store, &alice, 10)? {
//!     println!("{} {:.3}", rec.song, rec.score);
//! }
//!
//! let evaluator = Evaluator::new(&recommender, config.ground_truth);
//! if let Some(result) = evaluator.evaluate(&store, &alice, 10)? {
//!     println!("P@10 {:.3} R@10 {:.3} MAP@10 {:.3}", result.precision, result.recall, result.map);
//! }
//! # Ok::<(), listengraph::RecommendError>(())
//! ```
//!
//! ## Scoring
//!
//! - `count`: number of distinct similar users who listened to the song
//! - `weighted_average`: mean SIMILAR weight over those users
//!
//! Ties break by song id, so output is deterministic for a fixed graph.

pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod holdout;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod recommend;
pub mod similarity;
pub mod store;

pub use error::{RecommendError, Result};
pub use model::{ArtistId, Listen, ScoredSong, SongId, UserId};
