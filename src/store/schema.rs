pub struct Table {
    pub name: &'static str,
    pub schema: &'static str,
    pub indices: &'static [&'static str],
}

const USERS_V_1: Table = Table {
    name: "users",
    schema: "CREATE TABLE users (id TEXT NOT NULL PRIMARY KEY)",
    indices: &[],
};
const ARTISTS_V_1: Table = Table {
    name: "artists",
    schema: "CREATE TABLE artists (name TEXT NOT NULL PRIMARY KEY)",
    indices: &[],
};
const SONGS_V_1: Table = Table {
    name: "songs",
    schema: "CREATE TABLE songs (title TEXT NOT NULL PRIMARY KEY)",
    indices: &[],
};
const SONG_ARTISTS_V_1: Table = Table {
    name: "song_artists",
    schema: "CREATE TABLE song_artists (song TEXT NOT NULL REFERENCES songs (title), artist TEXT NOT NULL REFERENCES artists (name), PRIMARY KEY (song, artist))",
    indices: &[],
};
const LISTENED_V_1: Table = Table {
    name: "listened",
    schema: "CREATE TABLE listened (user TEXT NOT NULL REFERENCES users (id), song TEXT NOT NULL REFERENCES songs (title), PRIMARY KEY (user, song))",
    indices: &["CREATE INDEX listened_song_index ON listened (song)"],
};
const HELD_OUT_V_1: Table = Table {
    name: "held_out",
    schema: "CREATE TABLE held_out (user TEXT NOT NULL REFERENCES users (id), song TEXT NOT NULL REFERENCES songs (title), PRIMARY KEY (user, song))",
    indices: &[],
};
const SIMILAR_V_1: Table = Table {
    name: "similar",
    schema: "CREATE TABLE similar (source TEXT NOT NULL REFERENCES users (id), target TEXT NOT NULL REFERENCES users (id), similarity REAL NOT NULL CHECK (similarity BETWEEN 0.0 AND 1.0), PRIMARY KEY (source, target), CHECK (source <> target))",
    indices: &[],
};
const RECOMMENDED_V_1: Table = Table {
    name: "recommended",
    schema: "CREATE TABLE recommended (user TEXT NOT NULL REFERENCES users (id), song TEXT NOT NULL REFERENCES songs (title), rank INTEGER NOT NULL, score REAL NOT NULL, created INTEGER DEFAULT (cast(strftime('%s','now') as int)), PRIMARY KEY (user, song))",
    indices: &[],
};
const GRAPH_PROJECTIONS_V_1: Table = Table {
    name: "graph_projections",
    schema: "CREATE TABLE graph_projections (name TEXT NOT NULL PRIMARY KEY, node_labels TEXT NOT NULL, relationship TEXT NOT NULL, orientation TEXT NOT NULL, created INTEGER DEFAULT (cast(strftime('%s','now') as int)))",
    indices: &[],
};
const SIMILARITY_RUNS_V_1: Table = Table {
    name: "similarity_runs",
    schema: "CREATE TABLE similarity_runs (id INTEGER PRIMARY KEY, graph_name TEXT NOT NULL REFERENCES graph_projections (name), cutoff REAL NOT NULL, top_k INTEGER, relationships_written INTEGER NOT NULL, completed INTEGER DEFAULT (cast(strftime('%s','now') as int)))",
    indices: &[],
};

pub struct VersionedSchema {
    pub version: u32,
    pub tables: &'static [Table],
}

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        USERS_V_1,
        ARTISTS_V_1,
        SONGS_V_1,
        SONG_ARTISTS_V_1,
        LISTENED_V_1,
        HELD_OUT_V_1,
        SIMILAR_V_1,
        RECOMMENDED_V_1,
        GRAPH_PROJECTIONS_V_1,
        SIMILARITY_RUNS_V_1,
    ],
}];

pub fn current() -> &'static VersionedSchema {
    &VERSIONED_SCHEMAS[VERSIONED_SCHEMAS.len() - 1]
}
