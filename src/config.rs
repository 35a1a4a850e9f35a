//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for
//! Listengraph. It provides the platform-appropriate database location, the
//! pipeline parameters shared by every stage, and an optional TOML settings file.
//!
//! ## Data Storage
//!
//! Listengraph stores its graph database in the platform-standard data directory:
//! - Linux: `~/.local/share/listengraph/`
//! - macOS: `~/Library/Application Support/listengraph/`
//! - Windows: `%APPDATA%\listengraph\`
//!
//! ## Settings File
//!
//! ```toml
//! db_path = "/srv/lastfm/graph.db"
//!
//! [pipeline]
//! k = 10
//! similarity_cutoff = 0.1
//! scoring_mode = "weighted_average"
//! ground_truth = "held_out"
//! eval_user_limit = 1000
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use crate::error::{RecommendError, Result};
use crate::model::Relation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the virtual projection used when none is configured.
pub const DEFAULT_GRAPH_NAME: &str = "user_track_graph";

/// Returns the platform-appropriate database file path.
///
/// Locates the standard data directory for the current platform and creates
/// the `listengraph` subdirectory if it doesn't exist.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The listengraph subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use listengraph::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), listengraph::RecommendError>(())
/// ```
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("graph.db"))
}

/// Returns the platform-appropriate data directory for Listengraph, creating it
/// when missing.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        RecommendError::Config(
            "Could not determine system data directory. Pass --db explicitly.".to_string(),
        )
    })?;

    let app_dir = data_dir.join("listengraph");
    fs::create_dir_all(&app_dir)?;

    Ok(app_dir)
}

/// How candidate songs are scored from the similar users who listened to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Number of distinct similar users who listened to the song.
    #[default]
    Count,
    /// Mean SIMILAR weight across the similar users who listened to the song.
    WeightedAverage,
}

/// Which relationship supplies the ground truth during evaluation.
///
/// Both target `Song` nodes; there is no separate `Track` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruth {
    /// The user's full listening history.
    #[default]
    Listened,
    /// Listens withheld by the `holdout` step.
    HeldOut,
}

impl GroundTruth {
    #[must_use]
    pub const fn relation(self) -> Relation {
        match self {
            Self::Listened => Relation::Listened,
            Self::HeldOut => Relation::HeldOut,
        }
    }
}

/// Parameters for one pipeline run. One structure drives every variant of the
/// similarity -> recommend -> evaluate flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub graph_name: String,
    pub ground_truth: GroundTruth,
    pub similarity_cutoff: f64,
    /// Per-user bound on written SIMILAR edges. `None` keeps every pair above the cutoff.
    pub similarity_top_k: Option<usize>,
    pub scoring_mode: ScoringMode,
    pub k: usize,
    pub eval_user_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            graph_name: DEFAULT_GRAPH_NAME.to_string(),
            ground_truth: GroundTruth::Listened,
            similarity_cutoff: 0.1,
            similarity_top_k: Some(10),
            scoring_mode: ScoringMode::Count,
            k: 10,
            eval_user_limit: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(RecommendError::invalid("k must be a positive integer"));
        }
        if !(0.0..=1.0).contains(&self.similarity_cutoff) {
            return Err(RecommendError::invalid(format!(
                "similarity cutoff {} outside [0, 1]",
                self.similarity_cutoff
            )));
        }
        if self.similarity_top_k == Some(0) {
            return Err(RecommendError::invalid("similarity top-k must be positive"));
        }
        if self.eval_user_limit == 0 {
            return Err(RecommendError::invalid("evaluation user limit must be positive"));
        }
        if self.graph_name.trim().is_empty() {
            return Err(RecommendError::invalid("graph name is blank"));
        }
        Ok(())
    }
}

/// Contents of an optional settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
            .map_err(|e| RecommendError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(raw).map_err(|e| RecommendError::Config(e.to_string()))?;
        settings.pipeline.validate()?;
        Ok(settings)
    }

    /// Database path from the file, falling back to the platform default.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => get_db_path(),
        }
    }
}
