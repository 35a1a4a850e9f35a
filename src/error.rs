//! # Error Taxonomy
//!
//! Every fallible library operation returns [`Result<T>`], an alias over
//! [`RecommendError`]. The variants map onto how callers are expected to react:
//!
//! - [`RecommendError::Connectivity`] - the store cannot be reached; fatal to a run
//! - [`RecommendError::UnknownUser`] / [`RecommendError::UnknownSong`] - reported per
//!   operation, batch callers record them and move on
//! - [`RecommendError::InvalidArgument`] - caller bug (`k = 0`, cutoff out of range, ...)
//!
//! Malformed ingestion rows are not errors at this level; they are collected as
//! [`crate::ingest::IngestionRowError`] values inside the ingestion report. An
//! empty ground-truth set is not an error either: `evaluate` returns `Ok(None)`.

use crate::model::{SongId, UserId};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommendError>;

#[derive(Debug, Error)]
pub enum RecommendError {
    /// The interaction store could not be opened or its schema could not be read.
    #[error("cannot reach interaction store at {}: {source}", path.display())]
    Connectivity {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("unknown user `{0}`")]
    UnknownUser(UserId),
    #[error("unknown song `{0}`")]
    UnknownSong(SongId),
    #[error("unknown graph projection `{0}`")]
    UnknownProjection(String),
    /// Recommendations were requested before any similarity run completed.
    #[error("similarity graph has not been computed; run the similarity step first")]
    SimilarityNotComputed,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("schema mismatch: {0}")]
    Schema(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl RecommendError {
    /// True for errors that only concern a single user or song, which batch
    /// operations record and skip instead of aborting.
    #[must_use]
    pub fn is_per_item(&self) -> bool {
        matches!(self, Self::UnknownUser(_) | Self::UnknownSong(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Rejects `k = 0`, for which precision is undefined.
pub(crate) fn ensure_positive_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RecommendError::invalid("k must be a positive integer"));
    }
    Ok(())
}
