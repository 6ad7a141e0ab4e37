//! On-device store.
//!
//! Every collection is a SQLite table holding the record as JSON in `data`,
//! keyed by the collection's declared key, with extra columns backing its
//! secondary indexes. The store never depends on connectivity; the only
//! expected runtime failure is running out of disk (`QuotaExceeded`).

pub mod migrations;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    AudioCacheEntry, DailyStat, PronunciationAttempt, ResultRecord, UserGoals, VocabularyRecord,
};

pub use migrations::{run_migrations, CURRENT_SCHEMA_VERSION};

// ============================================================
// Errors
// ============================================================

/// Local store errors
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// Any SQLite failure other than running out of space
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// The database file cannot grow (disk full or page cap reached)
    #[error("local storage quota exceeded")]
    QuotaExceeded,

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index {index:?} is not declared on collection {collection:?}")]
    UnknownIndex { collection: Collection, index: Index },

    #[error("lock poisoned: {0}")]
    LockError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for LocalStoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::DiskFull => {
                LocalStoreError::QuotaExceeded
            }
            _ => LocalStoreError::Database(err),
        }
    }
}

pub type LocalStoreResult<T> = Result<T, LocalStoreError>;

// ============================================================
// Collections and indexes
// ============================================================

/// Named local collection, one SQLite table each.
///
/// Every table stores the serialized record in `data` under a text `key`,
/// plus one column per declared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Quiz and exam results, keyed `{timestamp}_{suffix}`
    Results,
    /// Per-word review state, keyed by the character
    Vocabulary,
    /// Pronunciation attempts, keyed `{word}_{timestamp}`
    PronunciationHistory,
    /// Per-day study totals, keyed `YYYY-MM-DD`
    DailyStats,
    /// Singleton goals record under [`USER_GOALS_KEY`]
    UserGoals,
    /// Generated speech, keyed by normalized text
    AudioCache,
}

impl Collection {
    pub const fn table(self) -> &'static str {
        match self {
            Collection::Results => "results",
            Collection::Vocabulary => "vocabulary",
            Collection::PronunciationHistory => "pronunciation_history",
            Collection::DailyStats => "daily_stats",
            Collection::UserGoals => "user_goals",
            Collection::AudioCache => "audio_cache",
        }
    }

    /// Secondary indexes [`LocalStore::query_by_index`] accepts for this collection.
    pub const fn indexes(self) -> &'static [Index] {
        match self {
            Collection::Results => &[Index::ByTimestamp],
            Collection::Vocabulary => &[Index::ByLastReviewed, Index::ByLevel],
            Collection::PronunciationHistory => &[Index::ByWord, Index::ByTimestamp],
            Collection::DailyStats => &[Index::ByDate],
            Collection::UserGoals => &[],
            Collection::AudioCache => &[Index::ByTimestamp],
        }
    }

    /// Secondary ordering applied after the queried index column.
    const fn order_column(self) -> &'static str {
        match self {
            Collection::Results | Collection::PronunciationHistory | Collection::AudioCache => {
                "timestamp"
            }
            Collection::Vocabulary => "last_reviewed",
            Collection::DailyStats => "date",
            Collection::UserGoals => "key",
        }
    }

    fn has_index(self, index: Index) -> bool {
        self.indexes().contains(&index)
    }
}

/// Secondary index over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// Epoch milliseconds the record was created
    ByTimestamp,
    /// Epoch milliseconds of the last rating (0 if never rated)
    ByLastReviewed,
    /// HSK level label, e.g. `HSK3`
    ByLevel,
    /// Target word of a pronunciation attempt
    ByWord,
    /// Local calendar date
    ByDate,
}

impl Index {
    pub const fn column(self) -> &'static str {
        match self {
            Index::ByTimestamp => "timestamp",
            Index::ByLastReviewed => "last_reviewed",
            Index::ByLevel => "level",
            Index::ByWord => "word",
            Index::ByDate => "date",
        }
    }
}

/// Value stored in, or compared against, an index column.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Text(String),
    Int(i64),
}

impl ToSql for IndexValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            IndexValue::Text(value) => value.to_sql(),
            IndexValue::Int(value) => value.to_sql(),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Text(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Text(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

/// Filter applied to the queried index column.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexRange {
    All,
    Eq(IndexValue),
    /// Inclusive lower bound
    AtLeast(IndexValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    const fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A record type stored in one local collection.
///
/// The whole record round-trips through `data` as JSON; the key and index
/// values are copied into their own columns on every [`LocalStore::put`].
pub trait LocalRecord: Serialize + DeserializeOwned {
    /// Collection the record lives in
    const COLLECTION: Collection;

    /// Primary key; writing a record with an existing key replaces it.
    fn key(&self) -> String;

    /// Values for every index declared on [`Self::COLLECTION`].
    fn index_values(&self) -> Vec<(Index, IndexValue)>;
}

impl LocalRecord for ResultRecord {
    const COLLECTION: Collection = Collection::Results;

    // Results carry no natural key; timestamp plus a random suffix keeps
    // records appended in the same millisecond apart.
    fn key(&self) -> String {
        format!("{}_{}", self.timestamp, uuid::Uuid::new_v4().simple())
    }

    fn index_values(&self) -> Vec<(Index, IndexValue)> {
        vec![(Index::ByTimestamp, self.timestamp.into())]
    }
}

impl LocalRecord for VocabularyRecord {
    const COLLECTION: Collection = Collection::Vocabulary;

    fn key(&self) -> String {
        self.character.clone()
    }

    fn index_values(&self) -> Vec<(Index, IndexValue)> {
        vec![
            (Index::ByLastReviewed, self.last_reviewed.into()),
            (Index::ByLevel, self.level.as_str().into()),
        ]
    }
}

impl LocalRecord for PronunciationAttempt {
    const COLLECTION: Collection = Collection::PronunciationHistory;

    fn key(&self) -> String {
        PronunciationAttempt::key(self)
    }

    fn index_values(&self) -> Vec<(Index, IndexValue)> {
        vec![
            (Index::ByWord, self.word.as_str().into()),
            (Index::ByTimestamp, self.timestamp.into()),
        ]
    }
}

impl LocalRecord for DailyStat {
    const COLLECTION: Collection = Collection::DailyStats;

    fn key(&self) -> String {
        self.date.clone()
    }

    fn index_values(&self) -> Vec<(Index, IndexValue)> {
        vec![(Index::ByDate, self.date.as_str().into())]
    }
}

pub const USER_GOALS_KEY: &str = "goals";

impl LocalRecord for UserGoals {
    const COLLECTION: Collection = Collection::UserGoals;

    fn key(&self) -> String {
        USER_GOALS_KEY.to_string()
    }

    fn index_values(&self) -> Vec<(Index, IndexValue)> {
        Vec::new()
    }
}

impl LocalRecord for AudioCacheEntry {
    const COLLECTION: Collection = Collection::AudioCache;

    fn key(&self) -> String {
        self.text.clone()
    }

    fn index_values(&self) -> Vec<(Index, IndexValue)> {
        vec![(Index::ByTimestamp, self.timestamp.into())]
    }
}

// ============================================================
// LocalStore
// ============================================================

/// On-device store handle.
///
/// Cheap to clone; all clones share one connection behind a mutex.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Opens (creating if needed) the database file and migrates it.
    pub fn open<P: AsRef<Path>>(path: P) -> LocalStoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        Self::from_connection(conn)
    }

    pub fn in_memory() -> LocalStoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> LocalStoreResult<Self> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_conn(&self) -> LocalStoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LocalStoreError::LockError(e.to_string()))
    }

    /// Caps the database at `pages` pages. Growth past the cap fails with
    /// [`LocalStoreError::QuotaExceeded`]. SQLite never shrinks the cap below
    /// the current file size; the effective cap is returned.
    pub fn limit_pages(&self, pages: u32) -> LocalStoreResult<u32> {
        let conn = self.get_conn()?;
        let effective: u32 = conn.query_row(&format!("PRAGMA max_page_count = {pages}"), [], |row| row.get(0))?;
        tracing::debug!(requested = pages, effective, "local page cap set");
        Ok(effective)
    }

    /// Re-runs the migration routine; a no-op on an up-to-date store.
    pub fn migrate(&self) -> LocalStoreResult<usize> {
        let mut conn = self.get_conn()?;
        run_migrations(&mut conn)
    }

    pub fn schema_version(&self) -> LocalStoreResult<i32> {
        let conn = self.get_conn()?;
        migrations::current_version(&conn)
    }

    /// Upserts by the collection's declared key.
    pub fn put<T: LocalRecord>(&self, record: &T) -> LocalStoreResult<()> {
        let collection = T::COLLECTION;
        let data = serde_json::to_string(record)?;
        let indexes = record.index_values();

        let mut columns = vec!["key", "data"];
        let mut values: Vec<IndexValue> = vec![IndexValue::Text(record.key()), IndexValue::Text(data)];
        for (index, value) in indexes {
            if !collection.has_index(index) {
                return Err(LocalStoreError::UnknownIndex { collection, index });
            }
            columns.push(index.column());
            values.push(value);
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            collection.table(),
            columns.join(", "),
            placeholders
        );

        let conn = self.get_conn()?;
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    pub fn get<T: LocalRecord>(&self, key: &str) -> LocalStoreResult<Option<T>> {
        let sql = format!("SELECT data FROM {} WHERE key = ?1", T::COLLECTION.table());
        let conn = self.get_conn()?;
        let data: Option<String> = conn
            .query_row(&sql, [key], |row| row.get(0))
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// All records of the collection in no particular order.
    pub fn get_all<T: LocalRecord>(&self) -> LocalStoreResult<Vec<T>> {
        let sql = format!("SELECT data FROM {}", T::COLLECTION.table());
        self.fetch(&sql, &[])
    }

    pub fn count<T: LocalRecord>(&self) -> LocalStoreResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", T::COLLECTION.table());
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Ordered, optionally bounded read through a secondary index.
    pub fn query_by_index<T: LocalRecord>(
        &self,
        index: Index,
        range: IndexRange,
        order: Order,
        limit: Option<usize>,
    ) -> LocalStoreResult<Vec<T>> {
        let collection = T::COLLECTION;
        if !collection.has_index(index) {
            return Err(LocalStoreError::UnknownIndex { collection, index });
        }

        let column = index.column();
        let (filter, args) = match range {
            IndexRange::All => (String::new(), Vec::new()),
            IndexRange::Eq(value) => (format!(" WHERE {column} = ?1"), vec![value]),
            IndexRange::AtLeast(value) => (format!(" WHERE {column} >= ?1"), vec![value]),
        };

        let mut sql = format!(
            "SELECT data FROM {}{} ORDER BY {} {dir}, {} {dir}",
            collection.table(),
            filter,
            column,
            collection.order_column(),
            dir = order.as_sql(),
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.fetch(&sql, &args)
    }

    fn fetch<T: DeserializeOwned>(&self, sql: &str, args: &[IndexValue]) -> LocalStoreResult<Vec<T>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(LocalStoreError::from))
            .collect()
    }
}
