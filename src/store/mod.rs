//! # Interaction Store
//!
//! Durable bipartite graph of `User -LISTENED-> Song` (plus `Song -BY-> Artist`)
//! together with the derived SIMILAR and RECOMMENDED edges.
//!
//! [`InteractionStore`] is the seam between the pipeline and whatever holds the
//! graph. All identifiers reach the backend as bound parameters; no
//! implementation may splice them into query text. [`SqliteStore`] is the
//! embedded backend used by the binary and the tests.

mod schema;
mod sqlite;

pub use sqlite::{GraphStats, OpenMode, SqliteStore};

use crate::error::Result;
use crate::model::{Listen, NeighborListen, NodeLabel, Relation, ScoredSong, SimilarEdge, SimilarUser, SongId, UserId};
use serde::Serialize;
use std::collections::BTreeSet;

/// Edge orientation of a projected relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Undirected,
}

impl Orientation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undirected => "UNDIRECTED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "UNDIRECTED" => Ok(Self::Undirected),
            other => Err(crate::RecommendError::invalid(format!(
                "unknown orientation `{other}`"
            ))),
        }
    }
}

/// A named virtual view over part of the interaction graph, handed to the
/// similarity engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionSpec {
    pub name: String,
    pub node_labels: Vec<NodeLabel>,
    pub relationship: Relation,
    pub orientation: Orientation,
}

impl ProjectionSpec {
    /// The `User`/`Song` projection over undirected LISTENED edges.
    #[must_use]
    pub fn listening(name: &str) -> Self {
        Self {
            name: name.to_string(),
            node_labels: vec![NodeLabel::User, NodeLabel::Song],
            relationship: Relation::Listened,
            orientation: Orientation::Undirected,
        }
    }
}

/// Completion record of one similarity run, committed together with its edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityRun {
    pub graph_name: String,
    pub cutoff: f64,
    pub top_k: Option<usize>,
    pub relationships_written: usize,
}

/// Result of one row inside a batched write.
pub type RowOutcome = std::result::Result<(), crate::RecommendError>;

pub trait InteractionStore {
    /// Upserts the User, Artist and Song nodes plus the BY and LISTENED edges of
    /// every listen. Rows are applied independently: the returned vector holds
    /// one outcome per input row, in order. The outer `Err` is reserved for
    /// failures that affect the whole batch.
    fn record_listens(&mut self, listens: &[Listen]) -> Result<Vec<RowOutcome>>;

    fn user_exists(&self, user: &UserId) -> Result<bool>;

    /// First `limit` users ordered by id.
    fn list_users(&self, limit: usize) -> Result<Vec<UserId>>;

    /// First `limit` users whose id sorts at or after `start`, ordered by id.
    fn users_from(&self, start: &str, limit: usize) -> Result<Vec<UserId>>;

    /// A uniformly random user, `None` when the graph holds no users.
    fn random_user(&self) -> Result<Option<UserId>>;

    /// Distinct songs on `relation` out of `user`. Only song-targeting
    /// relations are valid here.
    fn songs_for(&self, user: &UserId, relation: Relation) -> Result<BTreeSet<SongId>>;

    /// All songs per user on LISTENED, used by similarity engines.
    fn listening_sets(&self) -> Result<Vec<(UserId, BTreeSet<SongId>)>>;

    /// SIMILAR neighbours of `user`, by similarity descending then id.
    fn similar_users(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<SimilarUser>>;

    /// `user -SIMILAR-> other -LISTENED-> song` where `user` has not LISTENED to `song`.
    fn neighbor_listens(&self, user: &UserId) -> Result<Vec<NeighborListen>>;

    /// Registers the projection. Returns `false` when a projection of that name
    /// already existed; re-registration is never an error.
    fn ensure_projection(&mut self, spec: &ProjectionSpec) -> Result<bool>;

    fn projection(&self, name: &str) -> Result<Option<ProjectionSpec>>;

    /// Deletes every SIMILAR edge, writes `edges` and records `run` as one
    /// atomic step. Returns the number of edges written.
    fn replace_similarity(&mut self, edges: &[SimilarEdge], run: &SimilarityRun) -> Result<usize>;

    /// The most recent completed similarity run, if any.
    fn last_similarity_run(&self) -> Result<Option<SimilarityRun>>;

    /// Replaces the RECOMMENDED edges of `user` with `recommendations`, ranked
    /// by position. Fails without writing if the user or any song is unknown.
    fn replace_recommendations(&mut self, user: &UserId, recommendations: &[ScoredSong]) -> Result<()>;

    /// RECOMMENDED edges of `user` ordered by rank.
    fn recommendations(&self, user: &UserId) -> Result<Vec<ScoredSong>>;

    /// Moves `songs` of `user` from LISTENED to HELD_OUT. Returns how many moved.
    ///
    /// Any move changes the listening sets SIMILAR was derived from, so the
    /// SIMILAR edges and run records are dropped in the same transaction.
    /// [`crate::pipeline::SimilarityGraph::existing`] then fails until
    /// similarity is recomputed.
    fn hold_out(&mut self, user: &UserId, songs: &[SongId]) -> Result<usize>;
}
