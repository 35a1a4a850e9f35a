//! # Offline Evaluation
//!
//! Precision@K, Recall@K and MAP@K of generated recommendations against each
//! user's ground truth (LISTENED songs, or HELD_OUT songs after a holdout split).
//!
//! ```text
//! hits[i]      = recommended[i] ∈ truth
//! Precision@k  = Σ hits / k                        (unfilled slots are misses)
//! Recall@k     = Σ hits / |truth|
//! MAP@k        = Σ_{i: hits[i]} (hits so far / i) / min(|truth|, k)
//! ```
//!
//! Precision divides by the requested `k`, not by the number of
//! recommendations returned, so users with sparse neighbourhoods are penalised.

use crate::config::GroundTruth;
use crate::error::{ensure_positive_k, RecommendError, Result};
use crate::model::{ScoredSong, SongId, UserId};
use crate::pipeline::CancelToken;
use crate::recommend::Recommender;
use crate::store::InteractionStore;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;

/// Metrics for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub user: UserId,
    pub k: usize,
    pub recommended: Vec<ScoredSong>,
    pub hits: Vec<bool>,
    pub ground_truth_size: usize,
    pub precision: f64,
    pub recall: f64,
    pub map: f64,
}

/// Corpus-wide arithmetic means over the evaluated users.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanMetrics {
    pub users: usize,
    pub precision: f64,
    pub recall: f64,
    pub map: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUser {
    pub user: UserId,
    pub reason: String,
}

/// Outcome of a bounded corpus evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    pub k: usize,
    /// Users picked for evaluation, in evaluation order.
    pub selected: Vec<UserId>,
    pub results: Vec<EvaluationResult>,
    /// Users with an empty ground-truth set.
    pub skipped_empty: Vec<UserId>,
    pub failed: Vec<FailedUser>,
    /// Set when the run was stopped before every selected user was visited.
    pub cancelled: bool,
}

impl CorpusReport {
    fn new(k: usize, selected: Vec<UserId>) -> Self {
        Self {
            k,
            selected,
            results: Vec::new(),
            skipped_empty: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        }
    }

    /// Number of users that produced metrics.
    #[must_use]
    pub fn evaluated(&self) -> usize {
        self.results.len()
    }

    /// `None` when no user was evaluated; a mean over zero users is undefined.
    #[must_use]
    pub fn averages(&self) -> Option<MeanMetrics> {
        if self.results.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.results.len() as f64;
        let sum = |metric: fn(&EvaluationResult) -> f64| self.results.iter().map(metric).sum::<f64>();
        Some(MeanMetrics {
            users: self.results.len(),
            precision: sum(|r| r.precision) / n,
            recall: sum(|r| r.recall) / n,
            map: sum(|r| r.map) / n,
        })
    }

    /// Folds one user's outcome in. Per-item errors are recorded; anything else
    /// aborts the batch.
    fn record(&mut self, user: &UserId, outcome: Result<Option<EvaluationResult>>) -> Result<()> {
        match outcome {
            Ok(Some(result)) => self.results.push(result),
            Ok(None) => {
                debug!("Skipping {user}: empty ground truth");
                self.skipped_empty.push(user.clone());
            }
            Err(e) if e.is_per_item() => {
                warn!("Evaluation failed for {user}: {e}");
                self.failed.push(FailedUser {
                    user: user.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluateAllOptions {
    /// Persist each evaluated user's recommendations as RECOMMENDED edges.
    pub store_recommendations: bool,
}

impl Default for EvaluateAllOptions {
    fn default() -> Self {
        Self {
            store_recommendations: true,
        }
    }
}

/// `hits[i]` is true when the i-th recommendation is in `truth`.
#[must_use]
pub fn hit_vector(recommended: &[SongId], truth: &BTreeSet<SongId>) -> Vec<bool> {
    recommended.iter().map(|song| truth.contains(song)).collect()
}

#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn precision_at_k(hits: &[bool], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    count_hits(hits) as f64 / k as f64
}

#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn recall_at_k(hits: &[bool], truth_size: usize) -> f64 {
    if truth_size == 0 {
        return 0.0;
    }
    count_hits(hits) as f64 / truth_size as f64
}

#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn average_precision_at_k(hits: &[bool], truth_size: usize, k: usize) -> f64 {
    let denominator = truth_size.min(k);
    if denominator == 0 {
        return 0.0;
    }
    let (sum, _) = hits
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, hit)| **hit)
        .fold((0.0, 0usize), |(sum, seen), (i, _)| {
            let seen = seen + 1;
            (sum + seen as f64 / (i + 1) as f64, seen)
        });
    sum / denominator as f64
}

fn count_hits(hits: &[bool]) -> usize {
    hits.iter().filter(|hit| **hit).count()
}

/// Scores a [`Recommender`] against a ground-truth relation.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    recommender: &'a Recommender,
    ground_truth: GroundTruth,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(recommender: &'a Recommender, ground_truth: GroundTruth) -> Self {
        Self {
            recommender,
            ground_truth,
        }
    }

    /// Metrics for `user` at `k`; `Ok(None)` iff the ground truth is empty.
    pub fn evaluate<S: InteractionStore + ?Sized>(
        &self,
        store: &S,
        user: &UserId,
        k: usize,
    ) -> Result<Option<EvaluationResult>> {
        ensure_positive_k(k)?;
        if !store.user_exists(user)? {
            return Err(RecommendError::UnknownUser(user.clone()));
        }

        let truth = store.songs_for(user, self.ground_truth.relation())?;
        if truth.is_empty() {
            return Ok(None);
        }

        let recommended = self.recommender.recommend(store, user, k)?;
        let songs: Vec<SongId> = recommended.iter().map(|r| r.song.clone()).collect();
        let hits = hit_vector(&songs, &truth);

        Ok(Some(EvaluationResult {
            user: user.clone(),
            k,
            precision: precision_at_k(&hits, k),
            recall: recall_at_k(&hits, truth.len()),
            map: average_precision_at_k(&hits, truth.len(), k),
            ground_truth_size: truth.len(),
            hits,
            recommended,
        }))
    }

    fn evaluate_and_store<S: InteractionStore + ?Sized>(
        &self,
        store: &mut S,
        user: &UserId,
        k: usize,
        options: EvaluateAllOptions,
    ) -> Result<Option<EvaluationResult>> {
        let result = self.evaluate(&*store, user, k)?;
        if let (Some(result), true) = (&result, options.store_recommendations) {
            store.replace_recommendations(user, &result.recommended)?;
        }
        Ok(result)
    }

    /// Evaluates the first `limit` users (by id), one after another.
    ///
    /// Stops between users once `cancel` trips; everything stored up to that
    /// point stays valid.
    pub fn evaluate_all<S: InteractionStore + ?Sized>(
        &self,
        store: &mut S,
        limit: usize,
        k: usize,
        options: EvaluateAllOptions,
        cancel: &CancelToken,
    ) -> Result<CorpusReport> {
        ensure_positive_k(k)?;
        ensure_positive_limit(limit)?;

        let selected = store.list_users(limit)?;
        info!("Evaluating {} users at k={k}", selected.len());
        let mut report = CorpusReport::new(k, selected.clone());

        for user in &selected {
            if cancel.is_cancelled() {
                warn!("Evaluation cancelled after {} users", report.evaluated());
                report.cancelled = true;
                break;
            }
            let outcome = self.evaluate_and_store(store, user, k, options);
            report.record(user, outcome)?;
        }

        Ok(report)
    }

    /// Same as [`Evaluator::evaluate_all`], spread over the rayon pool.
    ///
    /// Stores come from `open_store`, one per rayon split job and reused for
    /// every user in that job. rayon may split more often than it has threads,
    /// so the number of connections is bounded by the number of users, not by
    /// the pool size. Results are folded in user order, so the report matches
    /// the sequential one.
    pub fn evaluate_all_parallel<S, F>(
        &self,
        open_store: F,
        limit: usize,
        k: usize,
        options: EvaluateAllOptions,
        cancel: &CancelToken,
    ) -> Result<CorpusReport>
    where
        S: InteractionStore,
        F: Fn() -> Result<S> + Sync,
    {
        ensure_positive_k(k)?;
        ensure_positive_limit(limit)?;

        let selected = open_store()?.list_users(limit)?;
        info!(
            "Evaluating {} users at k={k} on {} threads",
            selected.len(),
            rayon::current_num_threads()
        );

        let outcomes: Vec<Option<Result<Option<EvaluationResult>>>> = selected
            .par_iter()
            .map_init(
                || None::<S>,
                |slot, user| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let mut store = match slot.take() {
                        Some(store) => store,
                        None => match open_store() {
                            Ok(store) => store,
                            Err(e) => return Some(Err(e)),
                        },
                    };
                    let outcome = self.evaluate_and_store(&mut store, user, k, options);
                    *slot = Some(store);
                    Some(outcome)
                },
            )
            .collect();

        let mut report = CorpusReport::new(k, selected.clone());
        for (user, outcome) in selected.iter().zip(outcomes) {
            match outcome {
                Some(outcome) => report.record(user, outcome)?,
                None => report.cancelled = true,
            }
        }
        if report.cancelled {
            warn!("Evaluation cancelled after {} users", report.evaluated());
        }
        Ok(report)
    }
}

fn ensure_positive_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(RecommendError::invalid("user limit must be positive"));
    }
    Ok(())
}
