//! Database access
//!
//! The pipeline talks to storage through three traits so that the merge,
//! fan-out and ledger logic never depends on SQLite directly.
//! [`SqliteStore`] implements all three over one connection pool.

pub mod init;
pub mod retry;
pub mod runs;
pub mod users;
pub mod variants;

pub use init::{create_tables, init_database, init_memory_database};
pub use retry::retry_on_lock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::models::{IngestionRun, NotificationPreferences, UserDocument, VariantDocument, VariantKey};
use crate::Result;

/// Timestamp format stored in TEXT columns; sorts lexicographically
pub(crate) fn db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::InvalidInput(format!("Failed to parse {}: {}", column, e)))
}

/// One operation of an unordered bulk write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create a document that does not exist yet
    Insert(VariantDocument),
    /// Replace the annotation of an existing document.
    ///
    /// Only coordinates and classification are written; subscribers and tags
    /// in the store are left exactly as they are.
    Replace(VariantKey, VariantDocument),
}

impl WriteOp {
    pub fn key(&self) -> &VariantKey {
        match self {
            WriteOp::Insert(doc) => &doc.key,
            WriteOp::Replace(key, _) => key,
        }
    }

    pub fn kind(&self) -> WriteKind {
        match self {
            WriteOp::Insert(_) => WriteKind::Insert,
            WriteOp::Replace(..) => WriteKind::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Replace,
}

/// A bulk write operation that did not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Position of the operation in the submitted batch
    pub index: usize,
    pub key: VariantKey,
    pub kind: WriteKind,
    pub message: String,
}

/// Aggregate outcome of a bulk write. Counts include successes only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub modified_count: u64,
    pub failures: Vec<WriteFailure>,
}

impl BulkWriteResult {
    pub fn failed_keys(&self) -> HashSet<VariantKey> {
        self.failures.iter().map(|f| f.key.clone()).collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Durable variant documents
#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn get_variant(&self, key: &VariantKey) -> Result<Option<VariantDocument>>;

    async fn find_variant_by_variation_id(&self, variation_id: &str)
        -> Result<Option<VariantDocument>>;

    /// Insert one document; fails if the key already exists
    async fn insert_variant(&self, doc: &VariantDocument) -> Result<()>;

    /// Apply operations as one unordered batch.
    ///
    /// Individual failures are reported in the result and never stop the
    /// remaining operations.
    async fn bulk_write(&self, ops: Vec<WriteOp>) -> BulkWriteResult;

    /// Returns true if the user was not subscribed before
    async fn add_subscriber(&self, key: &VariantKey, user_id: &str) -> Result<bool>;

    /// Removes the subscription and the user's tag
    async fn remove_subscriber(&self, key: &VariantKey, user_id: &str) -> Result<bool>;

    async fn set_tag(&self, key: &VariantKey, user_id: &str, tag: &str) -> Result<bool>;

    /// Returns true if the user had a tag
    async fn remove_tag(&self, key: &VariantKey, user_id: &str) -> Result<bool>;

    /// Number of variants with at least one subscriber
    async fn count_subscribed_variants(&self) -> Result<u64>;
}

/// User accounts (read-only for the pipeline)
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<UserDocument>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDocument>>;

    /// Resolve a login token issued by the account feature
    async fn find_user_by_token(&self, token: &str) -> Result<Option<UserDocument>>;

    async fn insert_user(&self, user: &UserDocument) -> Result<()>;

    async fn update_preferences(
        &self,
        id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<bool>;

    async fn set_slack_webhook(&self, id: &str, url: Option<&str>) -> Result<bool>;
}

/// Append-only record of ingestion runs
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn record_run(&self, run: &IngestionRun) -> Result<()>;

    /// Most recently finished run
    async fn latest_run(&self) -> Result<Option<IngestionRun>>;

    /// When data last changed, as shown to visitors
    async fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.latest_run().await?.map(|run| run.finished_at))
    }
}

/// SQLite-backed implementation of every store trait
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
    write_concurrency: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: 5000,
            write_concurrency: 4,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn with_write_concurrency(mut self, write_concurrency: usize) -> Self {
        self.write_concurrency = write_concurrency.max(1);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
