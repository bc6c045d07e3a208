//! Ingestion pipeline orchestration
//!
//! One run over one feed snapshot:
//! 1. Build documents from feed rows and look up stored versions
//!    (bounded concurrency, single aggregator)
//! 2. Merge, detect transitions, stage writes
//! 3. Persist the staged batch as one unordered bulk write
//! 4. Fan out persisted transitions to subscriber queues
//! 5. Deliver queues over email and Slack
//! 6. Append the run to the ledger
//!
//! A run that aborts leaves every persisted document valid and writes no
//! ledger entry.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use vss_common::db::{RunLedger, SqliteStore, UserStore, VariantStore};
use vss_common::models::IngestionRun;

use crate::builder::RecordBuilder;
use crate::config::IngestConfig;
use crate::error::{FeedError, IngestError};
use crate::feed::FeedRecord;
use crate::merge;
use crate::notify::{Delivery, UpdateNotifier, UserCache};
use crate::persistence::{execute_batch, StagedBatch, StagedWrite};

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub genome_build: String,
    /// Concurrent store lookups while merging
    pub lookup_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            genome_build: "b37".to_string(),
            lookup_concurrency: 8,
        }
    }
}

impl From<&IngestConfig> for PipelineSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            genome_build: config.genome_build.clone(),
            lookup_concurrency: config.lookup_concurrency,
        }
    }
}

/// Counters from the read/merge phase
#[derive(Debug)]
struct StageStats {
    rows: u64,
    skipped: u64,
    unchanged: u64,
}

pub struct IngestionPipeline {
    variants: Arc<dyn VariantStore>,
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn RunLedger>,
    delivery: Delivery,
    builder: RecordBuilder,
    lookup_concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(
        variants: Arc<dyn VariantStore>,
        users: Arc<dyn UserStore>,
        ledger: Arc<dyn RunLedger>,
        delivery: Delivery,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            variants,
            users,
            ledger,
            delivery,
            builder: RecordBuilder::new(settings.genome_build),
            lookup_concurrency: settings.lookup_concurrency.max(1),
        }
    }

    /// Pipeline where one SQLite store backs variants, users and the ledger
    pub fn with_sqlite(store: SqliteStore, delivery: Delivery, settings: PipelineSettings) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store.clone(), store, delivery, settings)
    }

    /// Process one feed snapshot and record the run.
    ///
    /// Row-level problems are logged and counted; they never fail the run.
    pub async fn run<I>(&self, feed: I) -> Result<IngestionRun, IngestError>
    where
        I: IntoIterator<Item = Result<FeedRecord, FeedError>>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.execute(run_id, feed).instrument(span).await
    }

    async fn execute<I>(&self, run_id: Uuid, feed: I) -> Result<IngestionRun, IngestError>
    where
        I: IntoIterator<Item = Result<FeedRecord, FeedError>>,
    {
        let mut run = IngestionRun::begin(run_id, Utc::now());
        info!(genome_build = %self.builder.genome_build(), "Ingestion run started");

        let (batch, stats) = self.stage_feed(feed).await?;
        run.skipped_count = stats.skipped;
        info!(
            rows = stats.rows,
            staged = batch.len(),
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            "Feed merged"
        );

        let outcome = execute_batch(self.variants.as_ref(), batch).await;
        run.inserted_count = outcome.inserted_count;
        run.modified_count = outcome.modified_count;
        run.failed_count = outcome.failures.len() as u64;

        let mut notifier = UpdateNotifier::new(UserCache::new(self.users.as_ref()));
        for write in outcome.persisted.iter().filter(|w| w.should_notify()) {
            if let Some(old) = &write.old {
                notifier.notify_of_change(old, &write.new).await;
            }
        }
        run.notified_count = notifier.variants_notified();

        let queues = notifier.into_queues().await;
        let report = self.delivery.deliver_all(queues).await;

        let run = run.finish(Utc::now());
        self.ledger.record_run(&run).await?;

        info!(
            inserted = run.inserted_count,
            modified = run.modified_count,
            notified = run.notified_count,
            skipped = run.skipped_count,
            failed = run.failed_count,
            emails_sent = report.emails_sent,
            emails_failed = report.emails_failed,
            chats_sent = report.chats_sent,
            chats_failed = report.chats_failed,
            duration_ms = run.duration().num_milliseconds(),
            "Ingestion run finished"
        );
        Ok(run)
    }

    /// Read the feed, look up stored documents and stage merged writes
    async fn stage_feed<I>(&self, feed: I) -> Result<(StagedBatch, StageStats), IngestError>
    where
        I: IntoIterator<Item = Result<FeedRecord, FeedError>>,
    {
        let mut rows = 0u64;
        let mut rejected = 0u64;
        let mut feed_error: Option<FeedError> = None;
        let mut unchanged = 0u64;
        let mut lookup_failures = 0u64;

        // `docs` borrows the row counters; the loop below only touches its own
        let batch = {
            let docs = feed
                .into_iter()
                .enumerate()
                .map_while(|(seq, row)| match row {
                    Ok(record) => {
                        rows += 1;
                        Some(Some((seq, self.builder.build(&record))))
                    }
                    Err(FeedError::Io(e)) => {
                        feed_error = Some(FeedError::Io(e));
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "Skipping feed row");
                        rows += 1;
                        rejected += 1;
                        Some(None)
                    }
                })
                .flatten();

            let lookups = stream::iter(docs)
                .map(|(seq, incoming)| async move {
                    let existing = self.variants.get_variant(&incoming.key).await;
                    (seq, incoming, existing)
                })
                .buffer_unordered(self.lookup_concurrency);
            futures::pin_mut!(lookups);

            let mut batch = StagedBatch::new();
            while let Some((seq, incoming, existing)) = lookups.next().await {
                let existing = match existing {
                    Ok(existing) => existing,
                    Err(e) => {
                        error!(key = %incoming.key, error = %e, "Variant lookup failed, skipping record");
                        lookup_failures += 1;
                        continue;
                    }
                };

                if !merge::needs_write(existing.as_ref(), &incoming) {
                    debug!(key = %incoming.key, "Variant unchanged");
                    unchanged += 1;
                    batch.stage_unchanged(seq, incoming.key);
                    continue;
                }

                let merged = merge::merge(existing.as_ref(), incoming);
                let changed = merge::changed(existing.as_ref(), &merged);
                batch.stage(seq, StagedWrite::new(existing, merged, changed));
            }
            batch
        };

        if let Some(e) = feed_error {
            error!(error = %e, "Feed unreadable, aborting run");
            return Err(e.into());
        }

        let stats = StageStats {
            rows,
            skipped: rejected + lookup_failures,
            unchanged,
        };
        Ok((batch, stats))
    }
}
