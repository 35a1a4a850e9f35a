//! # Recommendation Generator & Store
//!
//! Ranks songs heard by a user's SIMILAR neighbours and persists the result as
//! RECOMMENDED edges.
//!
//! Scoring of a candidate song over the distinct neighbours who listened to it:
//!
//! ```text
//! Count:           score = |neighbours|
//! WeightedAverage: score = mean(similarity(me, neighbour))
//! ```
//!
//! Ranking is score descending, then song id ascending, so the order is total
//! and repeatable.

use crate::config::ScoringMode;
use crate::error::{ensure_positive_k, RecommendError, Result};
use crate::model::{NeighborListen, ScoredSong, SongId, UserId};
use crate::pipeline::SimilarityGraph;
use crate::store::InteractionStore;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct Recommender {
    mode: ScoringMode,
}

impl Recommender {
    /// Requires a committed similarity run.
    #[must_use]
    pub fn new(_graph: &SimilarityGraph, mode: ScoringMode) -> Self {
        Self { mode }
    }

    /// Top `k` unheard songs for `user`. Empty when the user has no SIMILAR
    /// neighbours or they heard nothing new.
    ///
    /// # Errors
    ///
    /// - [`RecommendError::InvalidArgument`] when `k == 0`
    /// - [`RecommendError::UnknownUser`] when `user` is not in the graph
    pub fn recommend<S: InteractionStore + ?Sized>(
        &self,
        store: &S,
        user: &UserId,
        k: usize,
    ) -> Result<Vec<ScoredSong>> {
        ensure_positive_k(k)?;
        if !store.user_exists(user)? {
            return Err(RecommendError::UnknownUser(user.clone()));
        }

        let hops = store.neighbor_listens(user)?;
        if hops.is_empty() {
            debug!("No candidate songs for {user}");
            return Ok(Vec::new());
        }

        let mut ranked = rank_candidates(&hops, self.mode);
        trace!("{} candidate songs for {user}", ranked.len());
        ranked.truncate(k);
        Ok(ranked)
    }
}

#[derive(Default)]
struct Tally<'a> {
    neighbors: BTreeSet<&'a UserId>,
    weight: f64,
}

/// Aggregates traversal hops into a full ranking (not truncated).
#[must_use]
pub fn rank_candidates(hops: &[NeighborListen], mode: ScoringMode) -> Vec<ScoredSong> {
    let mut tallies: BTreeMap<&SongId, Tally<'_>> = BTreeMap::new();
    for hop in hops {
        let tally = tallies.entry(&hop.song).or_default();
        if tally.neighbors.insert(&hop.neighbor) {
            tally.weight += hop.similarity;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let mut ranked: Vec<ScoredSong> = tallies
        .into_iter()
        .map(|(song, tally)| {
            let listeners = tally.neighbors.len() as f64;
            let score = match mode {
                ScoringMode::Count => listeners,
                ScoringMode::WeightedAverage => tally.weight / listeners,
            };
            ScoredSong { song: song.clone(), score }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.song.cmp(&b.song)));
    ranked
}

/// Persists `recommendations` as the RECOMMENDED edges of `user`, replacing
/// any from a previous cycle. Idempotent for identical input.
///
/// # Errors
///
/// [`RecommendError::UnknownUser`] or [`RecommendError::UnknownSong`] when a
/// referenced node is absent; nothing is written in that case.
pub fn store_recommendations<S: InteractionStore + ?Sized>(
    store: &mut S,
    user: &UserId,
    recommendations: &[ScoredSong],
) -> Result<()> {
    store.replace_recommendations(user, recommendations)?;
    debug!("Stored {} recommendations for {user}", recommendations.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(song: &str, neighbor: &str, similarity: f64) -> NeighborListen {
        NeighborListen {
            song: SongId::new(song).unwrap(),
            neighbor: UserId::new(neighbor).unwrap(),
            similarity,
        }
    }

    fn titles(ranked: &[ScoredSong]) -> Vec<&str> {
        ranked.iter().map(|r| r.song.as_str()).collect()
    }

    #[test]
    fn test_count_mode_ranks_by_distinct_neighbours() {
        let hops = [hop("c", "u2", 0.8), hop("d", "u2", 0.8), hop("c", "u3", 0.4)];
        let ranked = rank_candidates(&hops, ScoringMode::Count);
        assert_eq!(titles(&ranked), vec!["c", "d"]);
        assert_eq!(ranked[0].score, 2.0);
        assert_eq!(ranked[1].score, 1.0);
    }

    #[test]
    fn test_weighted_mode_uses_mean_similarity() {
        let hops = [hop("c", "u2", 0.8), hop("d", "u2", 0.8), hop("c", "u3", 0.4)];
        let ranked = rank_candidates(&hops, ScoringMode::WeightedAverage);
        assert_eq!(titles(&ranked), vec!["d", "c"]);
        assert!((ranked[0].score - 0.8).abs() < 1e-12);
        assert!((ranked[1].score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_ties_break_by_song_id() {
        let hops = [hop("zeta", "u2", 0.5), hop("alpha", "u2", 0.5), hop("mid", "u2", 0.5)];
        for mode in [ScoringMode::Count, ScoringMode::WeightedAverage] {
            assert_eq!(titles(&rank_candidates(&hops, mode)), vec!["alpha", "mid", "zeta"]);
        }
    }

    #[test]
    fn test_repeated_hop_counts_once() {
        let hops = [hop("c", "u2", 0.8), hop("c", "u2", 0.8)];
        let ranked = rank_candidates(&hops, ScoringMode::Count);
        assert_eq!(ranked[0].score, 1.0);
        let ranked = rank_candidates(&hops, ScoringMode::WeightedAverage);
        assert!((ranked[0].score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_no_hops_no_candidates() {
        assert!(rank_candidates(&[], ScoringMode::Count).is_empty());
    }

    mod with_store {
        use super::*;
        use crate::config::PipelineConfig;
        use crate::model::{ArtistId, Listen};
        use crate::similarity::JaccardEngine;
        use crate::store::SqliteStore;

        fn listen(user: &str, song: &str) -> Listen {
            Listen {
                user: UserId::new(user).unwrap(),
                artist: ArtistId::new("artist").unwrap(),
                song: SongId::new(song).unwrap(),
            }
        }

        /// u1 {a, b}, u2 {a, b, c, d}, u3 {a, c}.
        fn similar_store() -> (SqliteStore, SimilarityGraph) {
            let mut store = SqliteStore::open_in_memory().unwrap();
            let listens = [
                listen("u1", "a"),
                listen("u1", "b"),
                listen("u2", "a"),
                listen("u2", "b"),
                listen("u2", "c"),
                listen("u2", "d"),
                listen("u3", "a"),
                listen("u3", "c"),
            ];
            store.record_listens(&listens).unwrap();
            let config = PipelineConfig { similarity_cutoff: 0.0, ..PipelineConfig::default() };
            let graph = SimilarityGraph::build(&mut store, &JaccardEngine, &config).unwrap();
            (store, graph)
        }

        #[test]
        fn test_fixed_similarity_scenario() {
            use crate::model::SimilarEdge;
            use crate::store::{ProjectionSpec, SimilarityRun};

            let mut store = SqliteStore::open_in_memory().unwrap();
            let listens = [
                listen("u1", "a"),
                listen("u1", "b"),
                listen("u2", "a"),
                listen("u2", "c"),
                listen("u2", "d"),
                listen("u3", "c"),
            ];
            store.record_listens(&listens).unwrap();
            store.ensure_projection(&ProjectionSpec::listening("g")).unwrap();
            let u = |id: &str| UserId::new(id).unwrap();
            let edges = [
                SimilarEdge::new(u("u1"), u("u2"), 0.8).unwrap(),
                SimilarEdge::new(u("u1"), u("u3"), 0.4).unwrap(),
            ];
            let run = SimilarityRun {
                graph_name: "g".into(),
                cutoff: 0.1,
                top_k: None,
                relationships_written: edges.len(),
            };
            store.replace_similarity(&edges, &run).unwrap();

            let graph = SimilarityGraph::existing(&store).unwrap();
            let recs = Recommender::new(&graph, ScoringMode::Count)
                .recommend(&store, &u("u1"), 2)
                .unwrap();
            assert_eq!(titles(&recs), vec!["c", "d"]);
            assert_eq!(recs[0].score, 2.0);
            assert_eq!(recs[1].score, 1.0);
        }

        #[test]
        fn test_recommends_unheard_neighbour_songs() {
            let (store, graph) = similar_store();
            let recommender = Recommender::new(&graph, ScoringMode::Count);
            let u1 = UserId::new("u1").unwrap();

            // c is heard by u2 and u3, d only by u2; a and b are already known
            let recs = recommender.recommend(&store, &u1, 2).unwrap();
            assert_eq!(titles(&recs), vec!["c", "d"]);
            assert_eq!(recs[0].score, 2.0);

            let top = recommender.recommend(&store, &u1, 1).unwrap();
            assert_eq!(titles(&top), vec!["c"]);
        }

        #[test]
        fn test_never_recommends_known_songs() {
            let (store, graph) = similar_store();
            let recommender = Recommender::new(&graph, ScoringMode::WeightedAverage);
            for id in ["u1", "u2", "u3"] {
                let user = UserId::new(id).unwrap();
                let heard = store.songs_for(&user, crate::model::Relation::Listened).unwrap();
                let recs = recommender.recommend(&store, &user, 10).unwrap();
                assert!(recs.iter().all(|r| !heard.contains(&r.song)), "{id} got a known song");
            }
        }

        #[test]
        fn test_unknown_user_and_zero_k() {
            let (store, graph) = similar_store();
            let recommender = Recommender::new(&graph, ScoringMode::Count);
            let ghost = UserId::new("ghost").unwrap();
            assert!(matches!(
                recommender.recommend(&store, &ghost, 5),
                Err(RecommendError::UnknownUser(_))
            ));
            let u1 = UserId::new("u1").unwrap();
            assert!(matches!(
                recommender.recommend(&store, &u1, 0),
                Err(RecommendError::InvalidArgument(_))
            ));
        }

        #[test]
        fn test_store_recommendations_replaces_previous() {
            let (mut store, graph) = similar_store();
            let recommender = Recommender::new(&graph, ScoringMode::Count);
            let u1 = UserId::new("u1").unwrap();

            let recs = recommender.recommend(&store, &u1, 2).unwrap();
            store_recommendations(&mut store, &u1, &recs).unwrap();
            store_recommendations(&mut store, &u1, &recs).unwrap();
            assert_eq!(store.recommendations(&u1).unwrap(), recs);

            store_recommendations(&mut store, &u1, &recs[..1]).unwrap();
            assert_eq!(titles(&store.recommendations(&u1).unwrap()), vec!["c"]);
        }
    }

    mod properties {
        use super::*;
        use crate::model::{ArtistId, Listen, Relation, SimilarEdge};
        use crate::store::{ProjectionSpec, SimilarityRun, SqliteStore};
        use proptest::prelude::*;

        const USERS: usize = 6;
        const SONGS: usize = 10;

        fn user(i: usize) -> UserId {
            UserId::new(&format!("u{i}")).unwrap()
        }

        /// Every user gets song `i % SONGS` so each one exists in the graph;
        /// `edges` are written as SIMILAR directly, independent of overlap.
        fn graph_store(
            listens: &[(usize, usize)],
            edges: &[(usize, usize, f64)],
        ) -> (SqliteStore, SimilarityGraph) {
            let mut store = SqliteStore::open_in_memory().unwrap();
            let rows: Vec<Listen> = (0..USERS)
                .map(|i| (i, i % SONGS))
                .chain(listens.iter().copied())
                .map(|(u, s)| Listen {
                    user: user(u),
                    artist: ArtistId::new("artist").unwrap(),
                    song: SongId::new(&format!("s{s}")).unwrap(),
                })
                .collect();
            store.record_listens(&rows).unwrap();

            let mut similar: BTreeMap<(usize, usize), f64> = BTreeMap::new();
            for &(source, target, weight) in edges {
                if source != target {
                    similar.insert((source, target), weight);
                }
            }
            let edges: Vec<SimilarEdge> = similar
                .into_iter()
                .map(|((source, target), weight)| SimilarEdge::new(user(source), user(target), weight).unwrap())
                .collect();

            store.ensure_projection(&ProjectionSpec::listening("g")).unwrap();
            let run = SimilarityRun {
                graph_name: "g".into(),
                cutoff: 0.0,
                top_k: None,
                relationships_written: edges.len(),
            };
            store.replace_similarity(&edges, &run).unwrap();
            let graph = SimilarityGraph::existing(&store).unwrap();
            (store, graph)
        }

        fn scoring_mode() -> impl Strategy<Value = ScoringMode> {
            prop_oneof![Just(ScoringMode::Count), Just(ScoringMode::WeightedAverage)]
        }

        proptest! {
            #[test]
            fn recommendations_are_unheard_bounded_and_repeatable(
                listens in proptest::collection::vec((0..USERS, 0..SONGS), 0..40),
                edges in proptest::collection::vec((0..USERS, 0..USERS, 0.01f64..=1.0), 0..20),
                target in 0..USERS,
                k in 1usize..12,
                mode in scoring_mode(),
            ) {
                let (store, graph) = graph_store(&listens, &edges);
                let recommender = Recommender::new(&graph, mode);
                let me = user(target);

                let heard = store.songs_for(&me, Relation::Listened).unwrap();
                let first = recommender.recommend(&store, &me, k).unwrap();
                let second = recommender.recommend(&store, &me, k).unwrap();

                prop_assert!(first.len() <= k);
                prop_assert!(first.iter().all(|r| !heard.contains(&r.song)));
                prop_assert_eq!(&first, &second);
                let distinct: BTreeSet<&SongId> = first.iter().map(|r| &r.song).collect();
                prop_assert_eq!(distinct.len(), first.len());
            }
        }
    }
}
