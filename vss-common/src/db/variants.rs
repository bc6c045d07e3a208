//! Variant persistence
//!
//! Classification fields and subscription fields live in the same row but
//! have different owners: ingestion writes coordinates and classification,
//! the subscription feature writes `subscribers` and `tags`. Replace
//! operations therefore never touch the subscription columns.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::{
    db_timestamp, retry_on_lock, BulkWriteResult, SqliteStore, VariantStore, WriteFailure,
    WriteKind, WriteOp,
};
use crate::models::{
    Classification, ClassificationRecord, Coordinates, VariantDocument, VariantKey,
};
use crate::{Error, Result};

const VARIANT_COLUMNS: &str = r#"
    key, build, chrom, pos, ref, alt, variation_id,
    current_classification, history, subscribers, tags
"#;

fn variant_from_row(row: &SqliteRow) -> Result<VariantDocument> {
    let pos: i64 = row.get("pos");
    let current: Option<String> = row.get("current_classification");
    let history: String = row.get("history");
    let subscribers: String = row.get("subscribers");
    let tags: String = row.get("tags");

    let current = match current {
        Some(json) => Some(serde_json::from_str::<ClassificationRecord>(&json)?),
        None => None,
    };

    Ok(VariantDocument {
        key: VariantKey::from_raw(row.get::<String, _>("key")),
        coordinates: Coordinates {
            build: row.get("build"),
            chrom: row.get("chrom"),
            pos: u64::try_from(pos)
                .map_err(|_| Error::InvalidInput(format!("Negative position: {}", pos)))?,
            reference: row.get("ref"),
            alternate: row.get("alt"),
        },
        classification: Classification {
            variation_id: row.get("variation_id"),
            current,
            history: serde_json::from_str(&history)?,
        },
        subscribers: serde_json::from_str::<BTreeSet<String>>(&subscribers)?,
        tags: serde_json::from_str::<BTreeMap<String, String>>(&tags)?,
    })
}

/// JSON path addressing one user's entry in the `tags` object
fn tag_path(user_id: &str) -> String {
    format!("$.\"{}\"", user_id)
}

fn position_param(doc: &VariantDocument) -> Result<i64> {
    i64::try_from(doc.coordinates.pos).map_err(|_| {
        Error::InvalidInput(format!("Position out of range: {}", doc.coordinates.pos))
    })
}

fn current_param(doc: &VariantDocument) -> Result<Option<String>> {
    doc.classification
        .current
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Error::from)
}

impl SqliteStore {
    async fn insert_row(&self, doc: &VariantDocument) -> Result<()> {
        let now = db_timestamp(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO variants (
                key, build, chrom, pos, ref, alt, variation_id,
                current_classification, history, subscribers, tags,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.key.as_str())
        .bind(&doc.coordinates.build)
        .bind(&doc.coordinates.chrom)
        .bind(position_param(doc)?)
        .bind(&doc.coordinates.reference)
        .bind(&doc.coordinates.alternate)
        .bind(&doc.classification.variation_id)
        .bind(current_param(doc)?)
        .bind(serde_json::to_string(&doc.classification.history)?)
        .bind(serde_json::to_string(&doc.subscribers)?)
        .bind(serde_json::to_string(&doc.tags)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrite coordinates and classification of an existing row
    async fn replace_row(&self, key: &VariantKey, doc: &VariantDocument) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE variants SET
                build = ?,
                chrom = ?,
                pos = ?,
                ref = ?,
                alt = ?,
                variation_id = ?,
                current_classification = ?,
                history = ?,
                updated_at = ?
            WHERE key = ?
            "#,
        )
        .bind(&doc.coordinates.build)
        .bind(&doc.coordinates.chrom)
        .bind(position_param(doc)?)
        .bind(&doc.coordinates.reference)
        .bind(&doc.coordinates.alternate)
        .bind(&doc.classification.variation_id)
        .bind(current_param(doc)?)
        .bind(serde_json::to_string(&doc.classification.history)?)
        .bind(db_timestamp(&Utc::now()))
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Variant {} does not exist", key)));
        }
        Ok(())
    }

    async fn apply_write(&self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::Insert(doc) => self.insert_row(doc).await,
            WriteOp::Replace(key, doc) => self.replace_row(key, doc).await,
        }
    }
}

#[async_trait]
impl VariantStore for SqliteStore {
    async fn get_variant(&self, key: &VariantKey) -> Result<Option<VariantDocument>> {
        let sql = format!("SELECT {} FROM variants WHERE key = ?", VARIANT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(variant_from_row).transpose()
    }

    async fn find_variant_by_variation_id(
        &self,
        variation_id: &str,
    ) -> Result<Option<VariantDocument>> {
        let sql = format!(
            "SELECT {} FROM variants WHERE variation_id = ? ORDER BY key LIMIT 1",
            VARIANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(variation_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(variant_from_row).transpose()
    }

    async fn insert_variant(&self, doc: &VariantDocument) -> Result<()> {
        retry_on_lock("insert_variant", self.max_lock_wait_ms, || self.insert_row(doc)).await
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> BulkWriteResult {
        let total = ops.len();

        let outcomes: Vec<(usize, VariantKey, WriteKind, Result<()>)> =
            stream::iter(ops.into_iter().enumerate())
                .map(|(index, op)| async move {
                    let outcome =
                        retry_on_lock("bulk_write", self.max_lock_wait_ms, || self.apply_write(&op))
                            .await;
                    (index, op.key().clone(), op.kind(), outcome)
                })
                .buffer_unordered(self.write_concurrency)
                .collect()
                .await;

        let mut result = BulkWriteResult::default();
        for (index, key, kind, outcome) in outcomes {
            match (outcome, kind) {
                (Ok(()), WriteKind::Insert) => result.inserted_count += 1,
                (Ok(()), WriteKind::Replace) => result.modified_count += 1,
                (Err(e), kind) => {
                    warn!(
                        index,
                        key = %key,
                        kind = ?kind,
                        error = %e,
                        "Bulk write operation failed"
                    );
                    result.failures.push(WriteFailure {
                        index,
                        key,
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        result.failures.sort_by_key(|f| f.index);

        debug!(
            total,
            inserted = result.inserted_count,
            modified = result.modified_count,
            failed = result.failures.len(),
            "Bulk write complete"
        );
        result
    }

    async fn add_subscriber(&self, key: &VariantKey, user_id: &str) -> Result<bool> {
        let now = db_timestamp(&Utc::now());
        let result = retry_on_lock("add_subscriber", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                UPDATE variants SET
                    subscribers = json_insert(subscribers, '$[#]', ?),
                    updated_at = ?
                WHERE key = ?
                  AND NOT EXISTS (
                      SELECT 1 FROM json_each(variants.subscribers) WHERE value = ?
                  )
                "#,
            )
            .bind(user_id)
            .bind(&now)
            .bind(key.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_subscriber(&self, key: &VariantKey, user_id: &str) -> Result<bool> {
        let now = db_timestamp(&Utc::now());
        let path = tag_path(user_id);
        let result = retry_on_lock("remove_subscriber", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                UPDATE variants SET
                    subscribers = (
                        SELECT json_group_array(value)
                        FROM json_each(variants.subscribers)
                        WHERE value != ?
                    ),
                    tags = json_remove(tags, ?),
                    updated_at = ?
                WHERE key = ?
                  AND EXISTS (
                      SELECT 1 FROM json_each(variants.subscribers) WHERE value = ?
                  )
                "#,
            )
            .bind(user_id)
            .bind(&path)
            .bind(&now)
            .bind(key.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Only subscribers can tag a variant
    async fn set_tag(&self, key: &VariantKey, user_id: &str, tag: &str) -> Result<bool> {
        let now = db_timestamp(&Utc::now());
        let path = tag_path(user_id);
        let result = retry_on_lock("set_tag", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                UPDATE variants SET
                    tags = json_set(tags, ?, ?),
                    updated_at = ?
                WHERE key = ?
                  AND EXISTS (
                      SELECT 1 FROM json_each(variants.subscribers) WHERE value = ?
                  )
                "#,
            )
            .bind(&path)
            .bind(tag)
            .bind(&now)
            .bind(key.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_tag(&self, key: &VariantKey, user_id: &str) -> Result<bool> {
        let now = db_timestamp(&Utc::now());
        let path = tag_path(user_id);
        let result = retry_on_lock("remove_tag", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                UPDATE variants SET
                    tags = json_remove(tags, ?),
                    updated_at = ?
                WHERE key = ?
                  AND json_extract(tags, ?) IS NOT NULL
                "#,
            )
            .bind(&path)
            .bind(&now)
            .bind(key.as_str())
            .bind(&path)
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_subscribed_variants(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM variants WHERE json_array_length(subscribers) > 0",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}
