use super::schema::{self, VersionedSchema};
use super::{InteractionStore, Orientation, ProjectionSpec, RowOutcome, SimilarityRun};
use crate::error::{RecommendError, Result};
use crate::model::{Listen, NeighborListen, NodeLabel, Relation, ScoredSong, SimilarEdge, SimilarUser, SongId, UserId};
use log::{debug, info, trace};
use rand::Rng;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const IN_MEMORY: &str = ":memory:";

/// Whether opening may create a fresh database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    CreateIfMissing,
    /// The file must already exist; anything else is a connectivity failure.
    Existing,
}

/// Node and edge counts, for `stats` output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub users: usize,
    pub songs: usize,
    pub artists: usize,
    pub listened: usize,
    pub held_out: usize,
    pub similar: usize,
    pub recommended: usize,
}

/// SQLite-backed [`InteractionStore`]. Owns its connection; dropping the store
/// closes it.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P, mode: OpenMode) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if mode == OpenMode::CreateIfMissing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        debug!("Opening interaction store at {} ({mode:?})", path.display());
        let conn = Connection::open_with_flags(&path, flags)
            .map_err(|source| RecommendError::Connectivity { path: path.clone(), source })?;
        Self::prepare(conn, path)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| RecommendError::Connectivity {
            path: PathBuf::from(IN_MEMORY),
            source,
        })?;
        Self::prepare(conn, PathBuf::from(IN_MEMORY))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn prepare(mut conn: Connection, path: PathBuf) -> Result<Self> {
        let connectivity = |source| RecommendError::Connectivity { path: path.clone(), source };

        conn.busy_timeout(BUSY_TIMEOUT).map_err(connectivity)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(connectivity)?;
        if path.as_os_str() != IN_MEMORY {
            let mode: String = conn
                .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
                .map_err(connectivity)?;
            trace!("journal_mode = {mode}");
        }

        // First real read of the file: a non-database file fails here.
        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(connectivity)?;
        let table_count: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .map_err(connectivity)?;

        let current = schema::current();
        match version {
            0 if table_count == 0 => Self::create_schema(&mut conn, current)?,
            v if v == current.version => Self::validate_schema(&conn, current)?,
            v => {
                return Err(RecommendError::Schema(format!(
                    "unknown database version {v} in {}",
                    path.display()
                )))
            }
        }

        Ok(Self { conn, path })
    }

    fn create_schema(conn: &mut Connection, schema: &VersionedSchema) -> Result<()> {
        info!("Creating interaction store schema v{}", schema.version);
        let tx = conn.transaction()?;
        for table in schema.tables {
            tx.execute_batch(table.schema)?;
            for index in table.indices {
                tx.execute_batch(index)?;
            }
        }
        tx.pragma_update(None, "user_version", schema.version)?;
        tx.commit()?;
        Ok(())
    }

    fn validate_schema(conn: &Connection, schema: &VersionedSchema) -> Result<()> {
        let mut stmt =
            conn.prepare("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)")?;
        for table in schema.tables {
            let present: bool = stmt.query_row(params![table.name], |row| row.get(0))?;
            if !present {
                return Err(RecommendError::Schema(format!(
                    "table `{}` missing from schema v{}",
                    table.name, schema.version
                )));
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<GraphStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        };
        Ok(GraphStats {
            users: count("users")?,
            songs: count("songs")?,
            artists: count("artists")?,
            listened: count("listened")?,
            held_out: count("held_out")?,
            similar: count("similar")?,
            recommended: count("recommended")?,
        })
    }
}

fn sql_limit(limit: Option<usize>) -> i64 {
    // SQLite treats a negative LIMIT as unbounded.
    limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

fn song_table(relation: Relation) -> Result<&'static str> {
    match relation {
        Relation::Listened => Ok("listened"),
        Relation::HeldOut => Ok("held_out"),
        Relation::Recommended => Ok("recommended"),
        other => Err(RecommendError::invalid(format!(
            "{other} does not connect users to songs"
        ))),
    }
}

fn exists(conn: &Connection, sql: &str, key: &dyn rusqlite::ToSql) -> Result<bool> {
    Ok(conn.query_row(sql, [key], |row| row.get(0))?)
}

fn insert_listen(tx: &mut Transaction<'_>, listen: &Listen) -> RowOutcome {
    let sp = tx.savepoint()?;
    sp.prepare_cached("INSERT INTO users (id) VALUES (?1) ON CONFLICT DO NOTHING")?
        .execute(params![listen.user])?;
    sp.prepare_cached("INSERT INTO artists (name) VALUES (?1) ON CONFLICT DO NOTHING")?
        .execute(params![listen.artist])?;
    sp.prepare_cached("INSERT INTO songs (title) VALUES (?1) ON CONFLICT DO NOTHING")?
        .execute(params![listen.song])?;
    sp.prepare_cached("INSERT INTO song_artists (song, artist) VALUES (?1, ?2) ON CONFLICT DO NOTHING")?
        .execute(params![listen.song, listen.artist])?;
    sp.prepare_cached("INSERT INTO listened (user, song) VALUES (?1, ?2) ON CONFLICT DO NOTHING")?
        .execute(params![listen.user, listen.song])?;
    sp.commit()?;
    Ok(())
}

impl InteractionStore for SqliteStore {
    fn record_listens(&mut self, listens: &[Listen]) -> Result<Vec<RowOutcome>> {
        let mut tx = self.conn.transaction()?;
        let outcomes: Vec<RowOutcome> = listens
            .iter()
            .map(|listen| insert_listen(&mut tx, listen))
            .collect();
        tx.commit()?;
        trace!("Recorded batch of {} listens", listens.len());
        Ok(outcomes)
    }

    fn user_exists(&self, user: &UserId) -> Result<bool> {
        exists(&self.conn, "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", user)
    }

    fn list_users(&self, limit: usize) -> Result<Vec<UserId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM users ORDER BY id LIMIT ?1")?;
        let users = stmt
            .query_map(params![sql_limit(Some(limit))], |row| row.get::<_, UserId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn users_from(&self, start: &str, limit: usize) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM users WHERE id >= ?1 ORDER BY id LIMIT ?2")?;
        let users = stmt
            .query_map(params![start, sql_limit(Some(limit))], |row| row.get::<_, UserId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn random_user(&self) -> Result<Option<UserId>> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if count == 0 {
            return Ok(None);
        }
        let offset = rand::thread_rng().gen_range(0..count);
        let user = self
            .conn
            .query_row(
                "SELECT id FROM users ORDER BY id LIMIT 1 OFFSET ?1",
                params![offset],
                |row| row.get::<_, UserId>(0),
            )
            .optional()?;
        Ok(user)
    }

    fn songs_for(&self, user: &UserId, relation: Relation) -> Result<BTreeSet<SongId>> {
        let table = song_table(relation)?;
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT song FROM {table} WHERE user = ?1"))?;
        let songs = stmt
            .query_map(params![user], |row| row.get::<_, SongId>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(songs)
    }

    fn listening_sets(&self) -> Result<Vec<(UserId, BTreeSet<SongId>)>> {
        let mut stmt = self.conn.prepare("SELECT user, song FROM listened ORDER BY user, song")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, UserId>(0)?, row.get::<_, SongId>(1)?)))?;

        let mut sets: Vec<(UserId, BTreeSet<SongId>)> = Vec::new();
        for row in rows {
            let (user, song) = row?;
            match sets.last_mut() {
                Some((last, songs)) if *last == user => {
                    songs.insert(song);
                }
                _ => sets.push((user, BTreeSet::from([song]))),
            }
        }
        Ok(sets)
    }

    fn similar_users(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<SimilarUser>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT target, similarity FROM similar
             WHERE source = ?1
             ORDER BY similarity DESC, target ASC
             LIMIT ?2",
        )?;
        let similar = stmt
            .query_map(params![user, sql_limit(limit)], |row| {
                Ok(SimilarUser {
                    user: row.get(0)?,
                    similarity: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(similar)
    }

    fn neighbor_listens(&self, user: &UserId) -> Result<Vec<NeighborListen>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT l.song, s.target, s.similarity
             FROM similar s
             JOIN listened l ON l.user = s.target
             WHERE s.source = ?1
               AND NOT EXISTS (
                   SELECT 1 FROM listened mine WHERE mine.user = ?1 AND mine.song = l.song
               )
             ORDER BY l.song, s.target",
        )?;
        let rows = stmt
            .query_map(params![user], |row| {
                Ok(NeighborListen {
                    song: row.get(0)?,
                    neighbor: row.get(1)?,
                    similarity: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn ensure_projection(&mut self, spec: &ProjectionSpec) -> Result<bool> {
        let labels = spec
            .node_labels
            .iter()
            .map(|label| label.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let created = self.conn.execute(
            "INSERT INTO graph_projections (name, node_labels, relationship, orientation)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (name) DO NOTHING",
            params![spec.name, labels, spec.relationship.as_str(), spec.orientation.as_str()],
        )?;
        Ok(created == 1)
    }

    fn projection(&self, name: &str) -> Result<Option<ProjectionSpec>> {
        let row = self
            .conn
            .query_row(
                "SELECT node_labels, relationship, orientation FROM graph_projections WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        let Some((labels, relationship, orientation)) = row else {
            return Ok(None);
        };
        let node_labels = labels
            .split(',')
            .filter(|label| !label.is_empty())
            .map(NodeLabel::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(ProjectionSpec {
            name: name.to_string(),
            node_labels,
            relationship: Relation::parse(&relationship)?,
            orientation: Orientation::parse(&orientation)?,
        }))
    }

    fn replace_similarity(&mut self, edges: &[SimilarEdge], run: &SimilarityRun) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let cleared = tx.execute("DELETE FROM similar", [])?;
        debug!("Cleared {cleared} stale SIMILAR edges");
        {
            let mut stmt =
                tx.prepare("INSERT INTO similar (source, target, similarity) VALUES (?1, ?2, ?3)")?;
            for edge in edges {
                stmt.execute(params![edge.source, edge.target, edge.similarity])?;
            }
        }
        tx.execute(
            "INSERT INTO similarity_runs (graph_name, cutoff, top_k, relationships_written)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run.graph_name,
                run.cutoff,
                run.top_k.map(|k| sql_limit(Some(k))),
                sql_limit(Some(edges.len()))
            ],
        )?;
        tx.commit()?;
        Ok(edges.len())
    }

    fn last_similarity_run(&self) -> Result<Option<SimilarityRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT graph_name, cutoff, top_k, relationships_written
                 FROM similarity_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let top_k: Option<i64> = row.get(2)?;
                    let written: i64 = row.get(3)?;
                    Ok(SimilarityRun {
                        graph_name: row.get(0)?,
                        cutoff: row.get(1)?,
                        top_k: top_k.and_then(|k| usize::try_from(k).ok()),
                        relationships_written: usize::try_from(written).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    fn replace_recommendations(&mut self, user: &UserId, recommendations: &[ScoredSong]) -> Result<()> {
        let tx = self.conn.transaction()?;
        if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", user)? {
            return Err(RecommendError::UnknownUser(user.clone()));
        }
        for rec in recommendations {
            if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM songs WHERE title = ?1)", &rec.song)? {
                return Err(RecommendError::UnknownSong(rec.song.clone()));
            }
        }

        tx.execute("DELETE FROM recommended WHERE user = ?1", params![user])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recommended (user, song, rank, score) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user, song) DO NOTHING",
            )?;
            let mut rank: i64 = 0;
            for rec in recommendations {
                if stmt.execute(params![user, rec.song, rank + 1, rec.score])? == 1 {
                    rank += 1;
                }
            }
            trace!("Stored {rank} RECOMMENDED edges for {user}");
        }
        tx.commit()?;
        Ok(())
    }

    fn recommendations(&self, user: &UserId) -> Result<Vec<ScoredSong>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT song, score FROM recommended WHERE user = ?1 ORDER BY rank")?;
        let recs = stmt
            .query_map(params![user], |row| {
                Ok(ScoredSong {
                    song: row.get(0)?,
                    score: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(recs)
    }

    fn hold_out(&mut self, user: &UserId, songs: &[SongId]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut moved = 0;
        {
            let mut delete = tx.prepare("DELETE FROM listened WHERE user = ?1 AND song = ?2")?;
            let mut insert = tx.prepare(
                "INSERT INTO held_out (user, song) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            )?;
            for song in songs {
                if delete.execute(params![user, song])? == 1 {
                    insert.execute(params![user, song])?;
                    moved += 1;
                }
            }
        }
        if moved > 0 {
            let cleared = tx.execute("DELETE FROM similar", [])?;
            let runs = tx.execute("DELETE FROM similarity_runs", [])?;
            if runs > 0 {
                info!("Listening sets changed; dropped {cleared} SIMILAR edges from {runs} similarity runs");
            }
        }
        tx.commit()?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtistId;

    fn listen(user: &str, artist: &str, song: &str) -> Listen {
        Listen {
            user: UserId::new(user).unwrap(),
            artist: ArtistId::new(artist).unwrap(),
            song: SongId::new(song).unwrap(),
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn song(title: &str) -> SongId {
        SongId::new(title).unwrap()
    }

    #[test]
    fn test_record_listens_merges_repeats() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let outcomes = store
            .record_listens(&[
                listen("u1", "a1", "s1"),
                listen("U1 ", "A1", "S1"),
                listen("u1", "a2", "s2"),
            ])
            .unwrap();
        assert!(outcomes.iter().all(Result::is_ok));

        let stats = store.stats().unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.songs, 2);
        assert_eq!(stats.artists, 2);
        assert_eq!(stats.listened, 2);
    }

    #[test]
    fn test_song_by_multiple_artists_is_one_node() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .record_listens(&[listen("u1", "a1", "intro"), listen("u2", "a2", "intro")])
            .unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.songs, 1);
        assert_eq!(stats.artists, 2);
    }

    #[test]
    fn test_list_users_is_ordered_and_bounded() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .record_listens(&[listen("c", "x", "s"), listen("a", "x", "s"), listen("b", "x", "s")])
            .unwrap();
        assert_eq!(store.list_users(2).unwrap(), vec![user("a"), user("b")]);
        assert_eq!(store.list_users(10).unwrap().len(), 3);
    }

    #[test]
    fn test_users_from_seeks_past_earlier_ids() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .record_listens(&[listen("zoe", "x", "s"), listen("adam", "x", "s"), listen("zack", "x", "s")])
            .unwrap();
        assert_eq!(store.users_from("z", 10).unwrap(), vec![user("zack"), user("zoe")]);
        assert_eq!(store.users_from("z", 1).unwrap(), vec![user("zack")]);
        assert!(store.users_from("zz", 10).unwrap().is_empty());
    }

    #[test]
    fn test_random_user_on_empty_graph() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.random_user().unwrap(), None);
    }

    #[test]
    fn test_songs_for_rejects_non_song_relation() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.songs_for(&user("u1"), Relation::Similar).is_err());
    }

    #[test]
    fn test_self_similarity_rejected_by_schema() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.record_listens(&[listen("u1", "a", "s")]).unwrap();
        store.ensure_projection(&ProjectionSpec::listening("g")).unwrap();
        // bypass the SimilarEdge constructor to exercise the CHECK constraint
        let edge = SimilarEdge {
            source: user("u1"),
            target: user("u1"),
            similarity: 1.0,
        };
        let run = SimilarityRun {
            graph_name: "g".into(),
            cutoff: 0.0,
            top_k: None,
            relationships_written: 1,
        };
        assert!(store.replace_similarity(&[edge], &run).is_err());
        assert_eq!(store.last_similarity_run().unwrap(), None);
    }

    #[test]
    fn test_projection_round_trip_and_idempotence() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let spec = ProjectionSpec::listening("user_track_graph");
        assert!(store.ensure_projection(&spec).unwrap());
        assert!(!store.ensure_projection(&spec).unwrap());
        assert_eq!(store.projection("user_track_graph").unwrap(), Some(spec));
        assert_eq!(store.projection("missing").unwrap(), None);
    }

    #[test]
    fn test_replace_recommendations_collapses_duplicates() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .record_listens(&[listen("u1", "a", "s1"), listen("u2", "a", "s2"), listen("u2", "a", "s3")])
            .unwrap();
        let recs = vec![
            ScoredSong { song: song("s2"), score: 2.0 },
            ScoredSong { song: song("s2"), score: 2.0 },
            ScoredSong { song: song("s3"), score: 1.0 },
        ];
        store.replace_recommendations(&user("u1"), &recs).unwrap();
        let stored = store.recommendations(&user("u1")).unwrap();
        assert_eq!(
            stored.iter().map(|r| r.song.as_str()).collect::<Vec<_>>(),
            vec!["s2", "s3"]
        );
    }

    #[test]
    fn test_replace_recommendations_unknown_song_writes_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.record_listens(&[listen("u1", "a", "s1"), listen("u2", "a", "s2")]).unwrap();
        store
            .replace_recommendations(&user("u1"), &[ScoredSong { song: song("s2"), score: 1.0 }])
            .unwrap();

        let err = store
            .replace_recommendations(
                &user("u1"),
                &[ScoredSong { song: song("ghost"), score: 1.0 }],
            )
            .unwrap_err();
        assert!(matches!(err, RecommendError::UnknownSong(_)));
        // previous recommendations survive the failed call
        assert_eq!(store.recommendations(&user("u1")).unwrap().len(), 1);
    }

    #[test]
    fn test_hold_out_moves_edges() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.record_listens(&[listen("u1", "a", "s1"), listen("u1", "a", "s2")]).unwrap();
        let moved = store.hold_out(&user("u1"), &[song("s1"), song("nope")]).unwrap();
        assert_eq!(moved, 1);
        assert_eq!(
            store.songs_for(&user("u1"), Relation::Listened).unwrap(),
            BTreeSet::from([song("s2")])
        );
        assert_eq!(
            store.songs_for(&user("u1"), Relation::HeldOut).unwrap(),
            BTreeSet::from([song("s1")])
        );
    }

    #[test]
    fn test_hold_out_drops_stale_similarity() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .record_listens(&[listen("u1", "a", "s1"), listen("u1", "a", "s2"), listen("u2", "a", "s1")])
            .unwrap();
        store.ensure_projection(&ProjectionSpec::listening("g")).unwrap();
        let edges = [
            SimilarEdge::new(user("u1"), user("u2"), 0.5).unwrap(),
            SimilarEdge::new(user("u2"), user("u1"), 0.5).unwrap(),
        ];
        let run = SimilarityRun {
            graph_name: "g".into(),
            cutoff: 0.1,
            top_k: None,
            relationships_written: edges.len(),
        };
        store.replace_similarity(&edges, &run).unwrap();

        // nothing moved, nothing invalidated
        assert_eq!(store.hold_out(&user("u1"), &[song("nope")]).unwrap(), 0);
        assert_eq!(store.last_similarity_run().unwrap(), Some(run));

        assert_eq!(store.hold_out(&user("u1"), &[song("s2")]).unwrap(), 1);
        assert_eq!(store.last_similarity_run().unwrap(), None);
        assert_eq!(store.stats().unwrap().similar, 0);
        assert!(store.similar_users(&user("u1"), None).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let mut store = SqliteStore::open(&path, OpenMode::CreateIfMissing).unwrap();
            store.record_listens(&[listen("u1", "a", "s1")]).unwrap();
        }
        let store = SqliteStore::open(&path, OpenMode::Existing).unwrap();
        assert!(store.user_exists(&user("u1")).unwrap());
    }

    #[test]
    fn test_missing_file_is_connectivity_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteStore::open(dir.path().join("absent.db"), OpenMode::Existing).unwrap_err();
        assert!(matches!(err, RecommendError::Connectivity { .. }));
    }

    #[test]
    fn test_garbage_file_is_connectivity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
        let err = SqliteStore::open(&path, OpenMode::Existing).unwrap_err();
        assert!(matches!(err, RecommendError::Connectivity { .. }));
    }
}
