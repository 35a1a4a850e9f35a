//! # Pipeline Orchestration
//!
//! Sequencing of the similarity -> recommend -> evaluate flow.
//!
//! [`SimilarityGraph`] is the read-after-write barrier between writing SIMILAR
//! edges and generating recommendations: a [`Recommender`] can only be built
//! from one, and one can only be obtained from a similarity run whose edges and
//! completion record have been committed.

use crate::config::PipelineConfig;
use crate::error::{RecommendError, Result};
use crate::evaluate::{CorpusReport, EvaluateAllOptions, Evaluator};
use crate::recommend::Recommender;
use crate::similarity::{write_similarity, SimilarityConfig, SimilarityEngine};
use crate::store::{InteractionStore, ProjectionSpec, SimilarityRun};
use log::{debug, info};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Proof that SIMILAR edges have been written and committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityGraph {
    run: SimilarityRun,
}

impl SimilarityGraph {
    /// Ensures the listening projection exists, then computes and writes
    /// SIMILAR edges with `engine`.
    pub fn build<S, E>(store: &mut S, engine: &E, config: &PipelineConfig) -> Result<Self>
    where
        S: InteractionStore + ?Sized,
        E: SimilarityEngine + ?Sized,
    {
        let spec = ProjectionSpec::listening(&config.graph_name);
        if store.ensure_projection(&spec)? {
            info!("Created graph projection `{}`", spec.name);
        } else {
            debug!("Graph projection `{}` already exists", spec.name);
        }

        let run = write_similarity(store, engine, &config.graph_name, &SimilarityConfig::from_pipeline(config))?;
        Ok(Self { run })
    }

    /// Resumes from the last committed similarity run.
    pub fn existing<S: InteractionStore + ?Sized>(store: &S) -> Result<Self> {
        store
            .last_similarity_run()?
            .map(|run| Self { run })
            .ok_or(RecommendError::SimilarityNotComputed)
    }

    #[must_use]
    pub fn run(&self) -> &SimilarityRun {
        &self.run
    }
}

/// Cooperative stop signal for long corpus evaluations. Checked between users.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub similarity: SimilarityRun,
    pub corpus: CorpusReport,
}

/// Projection, similarity, then corpus evaluation with recommendation storage.
pub fn run_pipeline<S, E>(
    store: &mut S,
    engine: &E,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<PipelineReport>
where
    S: InteractionStore + ?Sized,
    E: SimilarityEngine + ?Sized,
{
    config.validate()?;
    let graph = SimilarityGraph::build(store, engine, config)?;
    let recommender = Recommender::new(&graph, config.scoring_mode);
    let evaluator = Evaluator::new(&recommender, config.ground_truth);
    let corpus = evaluator.evaluate_all(
        store,
        config.eval_user_limit,
        config.k,
        EvaluateAllOptions::default(),
        cancel,
    )?;

    Ok(PipelineReport {
        similarity: graph.run,
        corpus,
    })
}
