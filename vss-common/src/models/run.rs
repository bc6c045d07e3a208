//! Ingestion run ledger entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one pipeline execution over one feed snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Documents created by the batch
    pub inserted_count: u64,
    /// Documents replaced by the batch
    pub modified_count: u64,
    /// Variants whose subscribers were evaluated for notification
    pub notified_count: u64,
    /// Feed rows rejected before merging
    #[serde(default)]
    pub skipped_count: u64,
    /// Batch operations that failed
    #[serde(default)]
    pub failed_count: u64,
}

impl IngestionRun {
    /// Start a run record; counts are filled in as the run progresses
    pub fn begin(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            inserted_count: 0,
            modified_count: 0,
            notified_count: 0,
            skipped_count: 0,
            failed_count: 0,
        }
    }

    pub fn finish(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = finished_at;
        self
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// What the public landing page shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    /// Variants with at least one subscriber
    pub subscribed_variants: u64,
    /// Completion time of the most recent ingestion run
    pub last_updated: Option<DateTime<Utc>>,
}
