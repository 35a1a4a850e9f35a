//! # Similarity Engine
//!
//! Derives weighted `User -SIMILAR-> User` edges from shared listening.
//!
//! The engine itself is pluggable through [`SimilarityEngine`]: it only turns
//! per-user song sets into candidate edges. [`write_similarity`] owns the
//! contract around it (projection lookup, config validation, clearing stale
//! edges and committing the run record together with the new edges).
//!
//! [`JaccardEngine`] is the bundled engine: neighbour-set overlap
//! `|A ∩ B| / |A ∪ B|`, a score cutoff, and a per-user top-K bound.

use crate::config::PipelineConfig;
use crate::error::{RecommendError, Result};
use crate::model::{NodeLabel, Relation, SimilarEdge, SongId, UserId};
use crate::store::{InteractionStore, SimilarityRun};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Relationship type the pipeline reads similarity from.
pub const WRITE_RELATIONSHIP_TYPE: &str = "SIMILAR";
/// Edge property holding the score.
pub const WRITE_PROPERTY: &str = "similarity";

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityConfig {
    pub similarity_cutoff: f64,
    pub top_k: Option<usize>,
    pub write_relationship_type: String,
    pub write_property: String,
}

impl SimilarityConfig {
    #[must_use]
    pub fn new(similarity_cutoff: f64, top_k: Option<usize>) -> Self {
        Self {
            similarity_cutoff,
            top_k,
            write_relationship_type: WRITE_RELATIONSHIP_TYPE.to_string(),
            write_property: WRITE_PROPERTY.to_string(),
        }
    }

    #[must_use]
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self::new(config.similarity_cutoff, config.similarity_top_k)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_cutoff) {
            return Err(RecommendError::invalid(format!(
                "similarity cutoff {} outside [0, 1]",
                self.similarity_cutoff
            )));
        }
        if self.top_k == Some(0) {
            return Err(RecommendError::invalid("similarity top-k must be positive"));
        }
        // Recommendation reads SIMILAR.similarity only.
        if self.write_relationship_type != WRITE_RELATIONSHIP_TYPE {
            return Err(RecommendError::invalid(format!(
                "unsupported write relationship type `{}`",
                self.write_relationship_type
            )));
        }
        if self.write_property != WRITE_PROPERTY {
            return Err(RecommendError::invalid(format!(
                "unsupported write property `{}`",
                self.write_property
            )));
        }
        Ok(())
    }
}

/// Computes SIMILAR edges from each user's set of listened songs.
pub trait SimilarityEngine: Sync {
    /// Edges must satisfy the cutoff and `top_k` of `config` and never be
    /// self-referential.
    fn compute(
        &self,
        listening: &[(UserId, BTreeSet<SongId>)],
        config: &SimilarityConfig,
    ) -> Result<Vec<SimilarEdge>>;
}

/// Jaccard overlap of listened-song sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardEngine;

impl SimilarityEngine for JaccardEngine {
    fn compute(
        &self,
        listening: &[(UserId, BTreeSet<SongId>)],
        config: &SimilarityConfig,
    ) -> Result<Vec<SimilarEdge>> {
        let mut listeners: HashMap<&SongId, Vec<usize>> = HashMap::new();
        for (index, (_, songs)) in listening.iter().enumerate() {
            for song in songs {
                listeners.entry(song).or_default().push(index);
            }
        }

        let per_user = listening
            .par_iter()
            .enumerate()
            .map(|(index, (user, songs))| {
                let mut shared: HashMap<usize, usize> = HashMap::new();
                for song in songs {
                    for &other in listeners.get(song).map_or(&[][..], Vec::as_slice) {
                        if other != index {
                            *shared.entry(other).or_default() += 1;
                        }
                    }
                }

                #[allow(clippy::cast_precision_loss)]
                let mut scored: Vec<(usize, f64)> = shared
                    .into_iter()
                    .map(|(other, overlap)| {
                        let union = songs.len() + listening[other].1.len() - overlap;
                        (other, overlap as f64 / union as f64)
                    })
                    .filter(|&(_, score)| score > 0.0 && score >= config.similarity_cutoff)
                    .collect();
                scored.sort_by(|a, b| {
                    b.1.total_cmp(&a.1)
                        .then_with(|| listening[a.0].0.cmp(&listening[b.0].0))
                });
                if let Some(k) = config.top_k {
                    scored.truncate(k);
                }

                scored
                    .into_iter()
                    .map(|(other, score)| SimilarEdge::new(user.clone(), listening[other].0.clone(), score))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(per_user.into_iter().flatten().collect())
    }
}

/// Runs `engine` over the projection `graph_name` and replaces every SIMILAR
/// edge with its output. Safe to call repeatedly: each call clears the previous
/// run's edges in the same transaction that writes the new ones.
pub fn write_similarity<S, E>(
    store: &mut S,
    engine: &E,
    graph_name: &str,
    config: &SimilarityConfig,
) -> Result<SimilarityRun>
where
    S: InteractionStore + ?Sized,
    E: SimilarityEngine + ?Sized,
{
    config.validate()?;
    let projection = store
        .projection(graph_name)?
        .ok_or_else(|| RecommendError::UnknownProjection(graph_name.to_string()))?;
    let covers_listening = projection.node_labels.contains(&NodeLabel::User)
        && projection.node_labels.contains(&NodeLabel::Song)
        && projection.relationship == Relation::Listened;
    if !covers_listening {
        return Err(RecommendError::invalid(format!(
            "projection `{graph_name}` does not cover User-LISTENED-Song"
        )));
    }

    let listening = store.listening_sets()?;
    debug!("Computing similarity over {} users", listening.len());
    let edges = engine.compute(&listening, config)?;

    let mut run = SimilarityRun {
        graph_name: graph_name.to_string(),
        cutoff: config.similarity_cutoff,
        top_k: config.top_k,
        relationships_written: edges.len(),
    };
    run.relationships_written = store.replace_similarity(&edges, &run)?;
    info!(
        "Wrote {} {} relationships (cutoff {})",
        run.relationships_written, config.write_relationship_type, config.similarity_cutoff
    );
    Ok(run)
}
