//! Ingestion run ledger

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{db_timestamp, parse_db_timestamp, retry_on_lock, RunLedger, SqliteStore, VariantStore};
use crate::models::{IngestionRun, SiteStats};
use crate::{Error, Result};

fn count_from_row(row: &SqliteRow, column: &str) -> u64 {
    row.get::<i64, _>(column).max(0) as u64
}

fn run_from_row(row: &SqliteRow) -> Result<IngestionRun> {
    let run_id: String = row.get("run_id");
    let started_at: String = row.get("started_at");
    let finished_at: String = row.get("finished_at");

    Ok(IngestionRun {
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| Error::InvalidInput(format!("Invalid run_id {}: {}", run_id, e)))?,
        started_at: parse_db_timestamp("started_at", &started_at)?,
        finished_at: parse_db_timestamp("finished_at", &finished_at)?,
        inserted_count: count_from_row(row, "inserted_count"),
        modified_count: count_from_row(row, "modified_count"),
        notified_count: count_from_row(row, "notified_count"),
        skipped_count: count_from_row(row, "skipped_count"),
        failed_count: count_from_row(row, "failed_count"),
    })
}

#[async_trait]
impl RunLedger for SqliteStore {
    async fn record_run(&self, run: &IngestionRun) -> Result<()> {
        let started_at = db_timestamp(&run.started_at);
        let finished_at = db_timestamp(&run.finished_at);

        retry_on_lock("record_run", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO ingestion_runs (
                    run_id, started_at, finished_at,
                    inserted_count, modified_count, notified_count,
                    skipped_count, failed_count
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run.run_id.to_string())
            .bind(&started_at)
            .bind(&finished_at)
            .bind(run.inserted_count as i64)
            .bind(run.modified_count as i64)
            .bind(run.notified_count as i64)
            .bind(run.skipped_count as i64)
            .bind(run.failed_count as i64)
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(())
    }

    async fn latest_run(&self) -> Result<Option<IngestionRun>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, started_at, finished_at,
                   inserted_count, modified_count, notified_count,
                   skipped_count, failed_count
            FROM ingestion_runs
            ORDER BY finished_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(run_from_row).transpose()
    }
}

impl SqliteStore {
    /// Figures for the public landing page
    pub async fn site_stats(&self) -> Result<SiteStats> {
        Ok(SiteStats {
            subscribed_variants: self.count_subscribed_variants().await?,
            last_updated: self.last_updated().await?,
        })
    }

    /// Most recent runs, newest first
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<IngestionRun>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, started_at, finished_at,
                   inserted_count, modified_count, notified_count,
                   skipped_count, failed_count
            FROM ingestion_runs
            ORDER BY finished_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }
}
