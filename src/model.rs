//! # Graph Data Model
//!
//! Node identities, relationship kinds and the small value types that flow
//! between the store, the recommender and the evaluator.
//!
//! Identities are always normalised (trimmed, lowercased) at construction, so
//! two differently-cased spellings of the same user, song or artist can never
//! become two nodes.

use crate::error::{RecommendError, Result};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! identity {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Normalises `raw` (trim + lowercase). Blank input is rejected.
            pub fn new(raw: &str) -> Result<Self> {
                let normalized = normalize(raw);
                if normalized.is_empty() {
                    return Err(RecommendError::invalid(concat!($what, " identity is blank")));
                }
                Ok(Self(normalized))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = RecommendError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        // Values coming back out of the store were normalised on the way in.
        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                String::column_result(value).map(Self)
            }
        }
    };
}

identity!(
    /// A listener, keyed by normalised username.
    UserId,
    "user"
);
identity!(
    /// A track, keyed by normalised title (artist-independent).
    SongId,
    "song"
);
identity!(
    /// A performer, keyed by normalised name.
    ArtistId,
    "artist"
);

/// Trim and lowercase. Applied to every identity before it touches the graph.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Node labels of the interaction graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    User,
    Song,
}

impl NodeLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Song => "Song",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "User" => Ok(Self::User),
            "Song" => Ok(Self::Song),
            other => Err(RecommendError::invalid(format!("unknown node label `{other}`"))),
        }
    }
}

/// Relationship types of the interaction graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    /// `User -LISTENED-> Song`, created at ingestion.
    Listened,
    /// `Song -BY-> Artist`.
    By,
    /// `User -SIMILAR-> User`, written by the similarity engine.
    Similar,
    /// `User -RECOMMENDED-> Song`, written by the recommendation store.
    Recommended,
    /// `User -HELD_OUT-> Song`, listens withheld from training for evaluation.
    HeldOut,
}

impl Relation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listened => "LISTENED",
            Self::By => "BY",
            Self::Similar => "SIMILAR",
            Self::Recommended => "RECOMMENDED",
            Self::HeldOut => "HELD_OUT",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "LISTENED" => Ok(Self::Listened),
            "BY" => Ok(Self::By),
            "SIMILAR" => Ok(Self::Similar),
            "RECOMMENDED" => Ok(Self::Recommended),
            "HELD_OUT" => Ok(Self::HeldOut),
            other => Err(RecommendError::invalid(format!("unknown relationship type `{other}`"))),
        }
    }

    /// Whether this relation connects a User to a Song.
    #[must_use]
    pub const fn targets_song(self) -> bool {
        matches!(self, Self::Listened | Self::Recommended | Self::HeldOut)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalised ingestion record: `user` listened to `song` by `artist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listen {
    pub user: UserId,
    pub artist: ArtistId,
    pub song: SongId,
}

/// A ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSong {
    pub song: SongId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarUser {
    pub user: UserId,
    pub similarity: f64,
}

/// Directed, weighted `User -SIMILAR-> User` edge.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEdge {
    pub source: UserId,
    pub target: UserId,
    pub similarity: f64,
}

impl SimilarEdge {
    /// Rejects self-loops and weights outside `[0, 1]`.
    pub fn new(source: UserId, target: UserId, similarity: f64) -> Result<Self> {
        if source == target {
            return Err(RecommendError::invalid(format!(
                "similarity edge from `{source}` to itself"
            )));
        }
        if !(0.0..=1.0).contains(&similarity) {
            return Err(RecommendError::invalid(format!(
                "similarity {similarity} outside [0, 1]"
            )));
        }
        Ok(Self { source, target, similarity })
    }
}

/// One hop of the `me -SIMILAR-> other -LISTENED-> song` traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborListen {
    pub song: SongId,
    pub neighbor: UserId,
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_case_and_space_normalized() {
        let a = UserId::new("  Alice ").unwrap();
        let b = UserId::new("ALICE").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice");
    }

    #[test]
    fn test_blank_identity_rejected() {
        assert!(SongId::new("   ").is_err());
        assert!(ArtistId::new("").is_err());
    }

    #[test]
    fn test_relation_names_round_trip() {
        for relation in [
            Relation::Listened,
            Relation::By,
            Relation::Similar,
            Relation::Recommended,
            Relation::HeldOut,
        ] {
            assert_eq!(Relation::parse(relation.as_str()).unwrap(), relation);
        }
        assert!(Relation::parse("Track").is_err());
    }

    #[test]
    fn test_similar_edge_rejects_self_loop() {
        let u = UserId::new("u1").unwrap();
        assert!(SimilarEdge::new(u.clone(), u, 0.5).is_err());
    }

    #[test]
    fn test_similar_edge_rejects_out_of_range_weight() {
        let a = UserId::new("a").unwrap();
        let b = UserId::new("b").unwrap();
        assert!(SimilarEdge::new(a.clone(), b.clone(), 1.5).is_err());
        assert!(SimilarEdge::new(a, b, 1.0).is_ok());
    }
}
