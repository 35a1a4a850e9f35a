//! # Holdout Split
//!
//! Moves a seeded random fraction of each user's LISTENED edges to HELD_OUT so
//! evaluation can score recommendations against songs the recommender never saw.
//! Same seed, same graph, same split.

use crate::error::{RecommendError, Result};
use crate::model::{Relation, SongId};
use crate::store::InteractionStore;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldoutConfig {
    /// Fraction of each user's listens to hold out, strictly between 0 and 1.
    pub ratio: f64,
    pub seed: u64,
}

impl Default for HoldoutConfig {
    fn default() -> Self {
        Self { ratio: 0.2, seed: 42 }
    }
}

impl HoldoutConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.ratio > 0.0 && self.ratio < 1.0) {
            return Err(RecommendError::invalid(format!(
                "holdout ratio {} must be between 0 and 1 (exclusive)",
                self.ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HoldoutReport {
    pub users: usize,
    pub users_split: usize,
    /// Users that already had HELD_OUT edges and were left alone.
    pub already_split: usize,
    pub held_out: usize,
}

/// Number of songs to hold out of `listened`; always leaves at least one.
fn holdout_size(listened: usize, ratio: f64) -> usize {
    if listened < 2 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let wanted = (listened as f64 * ratio).round() as usize;
    wanted.clamp(1, listened - 1)
}

/// Splits every user not split before. Moving any listen also drops the
/// current similarity run, so SIMILAR has to be recomputed afterwards.
pub fn split_holdout<S: InteractionStore + ?Sized>(store: &mut S, config: &HoldoutConfig) -> Result<HoldoutReport> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut report = HoldoutReport::default();

    for user in store.list_users(usize::MAX)? {
        report.users += 1;
        if !store.songs_for(&user, Relation::HeldOut)?.is_empty() {
            debug!("{user} already has held-out songs");
            report.already_split += 1;
            continue;
        }

        let mut songs: Vec<SongId> = store.songs_for(&user, Relation::Listened)?.into_iter().collect();
        let take = holdout_size(songs.len(), config.ratio);
        if take == 0 {
            continue;
        }
        let (picked, _) = songs.partial_shuffle(&mut rng, take);
        let moved = store.hold_out(&user, picked)?;
        report.users_split += 1;
        report.held_out += moved;
    }

    info!(
        "Held out {} listens across {} users (seed {})",
        report.held_out, report.users_split, config.seed
    );
    Ok(report)
}
