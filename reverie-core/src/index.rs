//! SQLite-backed vector index for long-term memory entries.
//!
//! Each named collection is one SQLite table with the entry's structured
//! tags flattened into fixed top-level columns and the embedding stored as
//! a little-endian f32 BLOB:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "memories_<collection>" (
//!     id                 TEXT PRIMARY KEY,
//!     role               TEXT NOT NULL,
//!     content            TEXT NOT NULL,
//!     timestamp          TEXT NOT NULL,
//!     turn               INTEGER NOT NULL,
//!     category           TEXT NOT NULL,
//!     important_fact     INTEGER NOT NULL DEFAULT 0,
//!     fact_summary       TEXT,
//!     npc                TEXT,
//!     location           TEXT,
//!     present_characters TEXT NOT NULL,
//!     embedding          BLOB NOT NULL
//! );
//! ```
//!
//! The schema is deferred until the first append, because the embedding
//! dimensionality D is only known once an entry arrives.  D is then pinned
//! in the `collections` meta table and every later append must conform.
//! The table is append-only: no update or delete statement exists here.
//!
//! Search pushes the filter predicate down as a parameterised `WHERE`
//! clause (values are always bound, never interpolated), then ranks the
//! surviving rows by ascending cosine distance in Rust.  At narrative-game
//! scale the filtered linear scan is well inside budget.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};
use crate::types::{
    Embedding, MemoryCategory, MemoryEntry, MemoryId, MemoryMetadata, MemoryRole,
};

// ---------------------------------------------------------------------------
// Policies & outcomes
// ---------------------------------------------------------------------------

/// What to do with an entry whose embedding length does not match the
/// collection's fixed dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionPolicy {
    /// Discard the entry with a logged warning (best-effort memory).
    /// Callers can still detect the loss through [`AppendOutcome`].
    #[default]
    Discard,
    /// Fail the append with [`MemoryError::DimensionMismatch`].
    Strict,
}

/// The signaled outcome of an [`VectorIndex::append`] call.
///
/// Under [`DimensionPolicy::Discard`] a mismatched entry is dropped
/// without an error, so callers must check this outcome rather than
/// assume the append persisted anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was persisted.
    Stored,
    /// The entry was discarded for a dimension mismatch.
    Discarded {
        /// Dimensionality the collection requires.
        expected: usize,
        /// Dimensionality the entry carried.
        got: usize,
    },
}

impl AppendOutcome {
    /// Whether the entry was actually persisted.
    #[must_use]
    pub fn is_stored(self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// A search hit: the entry plus its cosine distance to the query vector.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    /// The retrieved memory.
    pub entry: MemoryEntry,
    /// Cosine distance (0.0 = identical direction).
    pub distance: f32,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Structured filter predicate for [`VectorIndex::search`].
///
/// All set fields are AND-combined.  `turn_min` / `turn_max` form an
/// inclusive range over the `turn` column; every other field is an
/// exact match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Exact match on the authoring role.
    pub role: Option<MemoryRole>,
    /// Exact match on the narrative category.
    pub category: Option<MemoryCategory>,
    /// Exact match on the principal NPC name.
    pub npc: Option<String>,
    /// Exact match on the location name.
    pub location: Option<String>,
    /// Exact match on the important-fact flag.
    pub important_fact: Option<bool>,
    /// Inclusive lower bound on the game turn.
    pub turn_min: Option<u64>,
    /// Inclusive upper bound on the game turn.
    pub turn_max: Option<u64>,
}

impl SearchFilters {
    /// Empty filter set (no pushdown, pure similarity ranking).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Filter by narrative category.
    #[must_use]
    pub fn with_category(mut self, category: MemoryCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Filter by principal NPC name.
    #[must_use]
    pub fn with_npc(mut self, npc: impl Into<String>) -> Self {
        self.npc = Some(npc.into());
        self
    }

    /// Filter by location name.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Filter by the important-fact flag.
    #[must_use]
    pub fn with_important_fact(mut self, important: bool) -> Self {
        self.important_fact = Some(important);
        self
    }

    /// Inclusive turn range; either bound may be left open.
    #[must_use]
    pub fn with_turn_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.turn_min = min;
        self.turn_max = max;
        self
    }

    /// Compile the filter set into a `WHERE` clause and its bound values.
    ///
    /// Column names come from a fixed whitelist and values are returned
    /// for parameter binding — nothing here is string-interpolated.
    fn to_sql(&self) -> (String, Vec<rusqlite::types::Value>) {
        use rusqlite::types::Value;

        let mut clauses: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(role) = self.role {
            clauses.push("role = ?");
            values.push(Value::Text(role.as_str().to_owned()));
        }
        if let Some(category) = self.category {
            clauses.push("category = ?");
            values.push(Value::Text(category.as_str().to_owned()));
        }
        if let Some(ref npc) = self.npc {
            clauses.push("npc = ?");
            values.push(Value::Text(npc.clone()));
        }
        if let Some(ref location) = self.location {
            clauses.push("location = ?");
            values.push(Value::Text(location.clone()));
        }
        if let Some(important) = self.important_fact {
            clauses.push("important_fact = ?");
            values.push(Value::Integer(i64::from(important)));
        }
        if let Some(min) = self.turn_min {
            clauses.push("turn >= ?");
            values.push(Value::Integer(i64::try_from(min).unwrap_or(i64::MAX)));
        }
        if let Some(max) = self.turn_max {
            clauses.push("turn <= ?");
            values.push(Value::Integer(i64::try_from(max).unwrap_or(i64::MAX)));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

// ---------------------------------------------------------------------------
// Collection state
// ---------------------------------------------------------------------------

/// Schema lifecycle of a named collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    /// No entry has ever been appended; the entries table does not exist.
    NotCreated,
    /// The entries table exists with a pinned dimensionality.
    Created {
        /// Fixed embedding length D for this collection.
        dimensions: usize,
    },
}

struct IndexInner {
    conn: Connection,
    state: CollectionState,
}

// ---------------------------------------------------------------------------
// VectorIndex
// ---------------------------------------------------------------------------

/// Handle to one named, append-only memory collection.
///
/// A single `VectorIndex` is shared by all sessions using the same
/// collection; the interior mutex serialises appends and searches, which
/// also makes the first-write schema bootstrap race-free.
pub struct VectorIndex {
    inner: Mutex<IndexInner>,
    collection: String,
    table: String,
    db_path: PathBuf,
    dimension_policy: DimensionPolicy,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection", &self.collection)
            .field("db_path", &self.db_path)
            .field("dimension_policy", &self.dimension_policy)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Open (or create) the database at `path` and bind to `collection`.
    ///
    /// If the collection already exists its pinned dimensionality is
    /// loaded; otherwise the collection is marked not-yet-created and the
    /// entries table is deferred to the first append.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Config`] for an invalid collection name and
    /// [`MemoryError::Connection`] if the backing store cannot be opened.
    pub fn open<P: AsRef<Path>>(
        path: P,
        collection: &str,
        dimension_policy: DimensionPolicy,
    ) -> Result<Self> {
        let table = table_name(collection)?;
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)
            .map_err(|e| MemoryError::Connection(e.to_string()))?;
        Self::bootstrap(conn, collection, table, db_path, dimension_policy)
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`VectorIndex::open`].
    pub fn open_in_memory(
        collection: &str,
        dimension_policy: DimensionPolicy,
    ) -> Result<Self> {
        let table = table_name(collection)?;
        let conn = Connection::open_in_memory()
            .map_err(|e| MemoryError::Connection(e.to_string()))?;
        Self::bootstrap(
            conn,
            collection,
            table,
            PathBuf::from(":memory:"),
            dimension_policy,
        )
    }

    fn bootstrap(
        conn: Connection,
        collection: &str,
        table: String,
        db_path: PathBuf,
        dimension_policy: DimensionPolicy,
    ) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS collections (
                 name       TEXT PRIMARY KEY,
                 dimensions INTEGER NOT NULL,
                 created_at TEXT NOT NULL
             );",
        )
        .map_err(|e| MemoryError::Connection(e.to_string()))?;

        let state = lookup_collection(&conn, collection)
            .map_err(|e| MemoryError::Connection(e.to_string()))?;

        match state {
            CollectionState::Created { dimensions } => info!(
                collection,
                dimensions,
                path = %db_path.display(),
                "Loaded existing memory collection"
            ),
            CollectionState::NotCreated => info!(
                collection,
                path = %db_path.display(),
                "Collection not found; it will be created on the first append"
            ),
        }

        Ok(Self {
            inner: Mutex::new(IndexInner { conn, state }),
            collection: collection.to_owned(),
            table,
            db_path,
            dimension_policy,
        })
    }

    /// The collection name this index is bound to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The pinned dimensionality, if the collection has been created.
    #[must_use]
    pub fn dimensions(&self) -> Option<usize> {
        match self.inner.lock().state {
            CollectionState::Created { dimensions } => Some(dimensions),
            CollectionState::NotCreated => None,
        }
    }

    /// Append one entry to the collection.
    ///
    /// The very first well-formed entry creates the entries table and
    /// pins D to its embedding length; the create happens inside one
    /// transaction with `INSERT OR IGNORE` + re-read, so two concurrent
    /// first writes converge on a single schema.  Every optional field is
    /// written (as NULL when absent) so the schema never depends on which
    /// fields the first entry happened to populate.
    ///
    /// A dimension mismatch discards the entry under the default
    /// [`DimensionPolicy::Discard`] — check the returned
    /// [`AppendOutcome`]; nothing is partially written.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::DimensionMismatch`] under
    /// [`DimensionPolicy::Strict`], [`MemoryError::Embedding`] for a
    /// zero-length embedding when no dimensionality has been pinned yet
    /// (under either policy), and [`MemoryError::Database`] on SQLite
    /// failures.
    pub fn append(&self, entry: &MemoryEntry) -> Result<AppendOutcome> {
        let mut inner = self.inner.lock();

        let got = entry.embedding.dimensions();
        let dimensions = match inner.state {
            CollectionState::Created { dimensions } => dimensions,
            CollectionState::NotCreated => {
                if got == 0 {
                    // No D exists yet to compare against, so this is not
                    // a mismatch; the collection stays uncreated.
                    return Err(MemoryError::Embedding(
                        "zero-length embedding cannot establish collection dimensionality"
                            .to_string(),
                    ));
                }
                let dimensions = self.create_collection(&mut inner, got)?;
                inner.state = CollectionState::Created { dimensions };
                dimensions
            }
        };

        if got != dimensions {
            return self.discarded(dimensions, got);
        }

        let sql = format!(
            "INSERT INTO \"{}\" (id, role, content, timestamp, turn, category, \
             important_fact, fact_summary, npc, location, present_characters, embedding) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            self.table
        );
        let present = serde_json::to_string(&entry.metadata.present_characters)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        inner.conn.execute(
            &sql,
            params![
                entry.id.to_string(),
                entry.role.as_str(),
                entry.content,
                entry.timestamp.to_rfc3339(),
                i64::try_from(entry.turn).unwrap_or(i64::MAX),
                entry.metadata.category.as_str(),
                entry.metadata.important_fact,
                entry.metadata.fact_summary,
                entry.metadata.npc,
                entry.metadata.location,
                present,
                embedding_to_blob(&entry.embedding),
            ],
        )?;

        debug!(
            collection = %self.collection,
            id = %entry.id,
            turn = entry.turn,
            category = %entry.metadata.category,
            "Appended memory entry"
        );
        Ok(AppendOutcome::Stored)
    }

    /// Filtered nearest-neighbor search.
    ///
    /// Filters are AND-combined and pushed down as a parameterised SQL
    /// `WHERE` clause before similarity ranking; the result holds the
    /// `limit` entries with smallest cosine distance among those passing
    /// all filters, nearest-first.  A collection that has never seen an
    /// append yields `Ok(vec![])` — "no memories yet" is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Search`] on backing-store failure.
    pub fn search(
        &self,
        query: &Embedding,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredEntry>> {
        let mut inner = self.inner.lock();

        // Another handle on the same database may have bootstrapped the
        // collection since open; re-check the meta table before giving up.
        if inner.state == CollectionState::NotCreated {
            inner.state = lookup_collection(&inner.conn, &self.collection)
                .map_err(|e| MemoryError::Search(e.to_string()))?;
            if inner.state == CollectionState::NotCreated {
                debug!(
                    collection = %self.collection,
                    "Search on empty collection; no memories stored yet"
                );
                return Ok(Vec::new());
            }
        }

        let (where_clause, values) = filters.to_sql();
        let sql = format!(
            "SELECT id, role, content, timestamp, turn, category, important_fact, \
             fact_summary, npc, location, present_characters, embedding \
             FROM \"{}\"{where_clause}",
            self.table
        );

        let mut scored = Self::run_search(&inner.conn, &sql, values, query)
            .map_err(|e| MemoryError::Search(e.to_string()))?;

        scored.sort_by_key(|s| OrderedFloat(s.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Number of persisted entries in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn len(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.state == CollectionState::NotCreated {
            inner.state = lookup_collection(&inner.conn, &self.collection)?;
            if inner.state == CollectionState::NotCreated {
                return Ok(0);
            }
        }
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        let count: i64 = inner.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the collection holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn discarded(&self, expected: usize, got: usize) -> Result<AppendOutcome> {
        match self.dimension_policy {
            DimensionPolicy::Discard => {
                warn!(
                    collection = %self.collection,
                    expected,
                    got,
                    "Discarding entry with mismatched embedding dimension"
                );
                Ok(AppendOutcome::Discarded { expected, got })
            }
            DimensionPolicy::Strict => Err(MemoryError::DimensionMismatch { expected, got }),
        }
    }

    fn create_collection(&self, inner: &mut IndexInner, dimensions: usize) -> Result<usize> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                 id                 TEXT PRIMARY KEY,
                 role               TEXT NOT NULL,
                 content            TEXT NOT NULL,
                 timestamp          TEXT NOT NULL,
                 turn               INTEGER NOT NULL,
                 category           TEXT NOT NULL,
                 important_fact     INTEGER NOT NULL DEFAULT 0,
                 fact_summary       TEXT,
                 npc                TEXT,
                 location           TEXT,
                 present_characters TEXT NOT NULL,
                 embedding          BLOB NOT NULL
             );",
            self.table
        );

        let tx = inner.conn.transaction()?;
        tx.execute_batch(&create)?;
        tx.execute(
            "INSERT OR IGNORE INTO collections (name, dimensions, created_at) VALUES (?1, ?2, ?3)",
            params![
                self.collection,
                i64::try_from(dimensions).unwrap_or(i64::MAX),
                Utc::now().to_rfc3339(),
            ],
        )?;
        // Another writer may have won the insert; the pinned value is
        // whatever the meta row now holds.
        let pinned: i64 = tx.query_row(
            "SELECT dimensions FROM collections WHERE name = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        tx.commit()?;

        let pinned = usize::try_from(pinned).unwrap_or(0);
        info!(
            collection = %self.collection,
            dimensions = pinned,
            "Created memory collection"
        );
        Ok(pinned)
    }

    fn run_search(
        conn: &Connection,
        sql: &str,
        values: Vec<rusqlite::types::Value>,
        query: &Embedding,
    ) -> Result<Vec<ScoredEntry>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_raw)?;

        let mut scored = Vec::new();
        for row in rows {
            let entry = raw_to_entry(row?)?;
            let distance = query.cosine_distance(&entry.embedding);
            scored.push(ScoredEntry { entry, distance });
        }
        Ok(scored)
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

type RawRow = (
    String,         // id
    String,         // role
    String,         // content
    String,         // timestamp
    i64,            // turn
    String,         // category
    bool,           // important_fact
    Option<String>, // fact_summary
    Option<String>, // npc
    Option<String>, // location
    String,         // present_characters (JSON)
    Vec<u8>,        // embedding
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn raw_to_entry(raw: RawRow) -> Result<MemoryEntry> {
    let (
        id,
        role,
        content,
        timestamp,
        turn,
        category,
        important_fact,
        fact_summary,
        npc,
        location,
        present,
        blob,
    ) = raw;

    let id = uuid::Uuid::parse_str(&id)
        .map_err(|e| MemoryError::Serialization(format!("bad entry id '{id}': {e}")))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| MemoryError::Serialization(format!("bad timestamp: {e}")))?
        .with_timezone(&Utc);
    let present_characters: Vec<String> = serde_json::from_str(&present)
        .map_err(|e| MemoryError::Serialization(format!("bad present_characters: {e}")))?;

    Ok(MemoryEntry {
        id: MemoryId(id),
        role: MemoryRole::parse(&role)?,
        content,
        timestamp,
        turn: u64::try_from(turn).unwrap_or(0),
        metadata: MemoryMetadata {
            category: MemoryCategory::parse(&category)?,
            important_fact,
            fact_summary,
            npc,
            location,
            present_characters,
        },
        embedding: blob_to_embedding(&blob)?,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Validate the collection name and derive the quoted entries-table name.
///
/// Collection names are restricted to `[A-Za-z0-9_-]` so the identifier
/// can never smuggle SQL — filter *values* are bound as parameters, but
/// table names cannot be, so the whitelist is the guard here.
fn table_name(collection: &str) -> Result<String> {
    if collection.is_empty() {
        return Err(MemoryError::Config("collection name is empty".into()));
    }
    if !collection
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MemoryError::Config(format!(
            "invalid collection name '{collection}': only [A-Za-z0-9_-] allowed"
        )));
    }
    Ok(format!("memories_{collection}"))
}

fn lookup_collection(conn: &Connection, collection: &str) -> rusqlite::Result<CollectionState> {
    let mut stmt = conn.prepare_cached("SELECT dimensions FROM collections WHERE name = ?1")?;
    match stmt.query_row(params![collection], |row| row.get::<_, i64>(0)) {
        Ok(dims) => Ok(CollectionState::Created {
            dimensions: usize::try_from(dims).unwrap_or(0),
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(CollectionState::NotCreated),
        Err(e) => Err(e),
    }
}

/// Serialise an embedding as little-endian f32 bytes.
fn embedding_to_blob(embedding: &Embedding) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.0.len() * 4);
    for value in &embedding.0 {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Parse a little-endian f32 BLOB back into an embedding.
fn blob_to_embedding(blob: &[u8]) -> Result<Embedding> {
    if blob.len() % 4 != 0 {
        return Err(MemoryError::Serialization(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    let values = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(Embedding(values))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
