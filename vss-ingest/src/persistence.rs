//! Staging and bulk execution of variant writes
//!
//! Merge results accumulate in a [`StagedBatch`] owned by a single
//! aggregator. The batch is then written in one unordered bulk operation;
//! only entries whose write succeeded come back for notification.

use std::collections::BTreeMap;
use tracing::{info, warn};

use vss_common::db::{VariantStore, WriteFailure, WriteOp};
use vss_common::models::{VariantDocument, VariantKey};

/// A merge result waiting to be written
#[derive(Debug, Clone, PartialEq)]
pub struct StagedWrite {
    /// Stored document before the merge
    pub old: Option<VariantDocument>,
    /// Merged document to persist
    pub new: VariantDocument,
    /// Category transition detected between `old` and `new`
    pub changed: bool,
}

impl StagedWrite {
    pub fn new(old: Option<VariantDocument>, new: VariantDocument, changed: bool) -> Self {
        Self { old, new, changed }
    }

    pub fn key(&self) -> &VariantKey {
        &self.new.key
    }

    pub fn op(&self) -> WriteOp {
        match &self.old {
            None => WriteOp::Insert(self.new.clone()),
            Some(old) => WriteOp::Replace(old.key.clone(), self.new.clone()),
        }
    }

    /// Persisted, transitioned, and someone is listening
    pub fn should_notify(&self) -> bool {
        self.changed && self.old.as_ref().is_some_and(VariantDocument::has_subscribers)
    }
}

/// Staged writes keyed by variant, one entry per key.
///
/// An entry of `None` records that the latest row for a key matched the
/// stored document; it still supersedes earlier rows for that key.
#[derive(Debug, Default)]
pub struct StagedBatch {
    entries: BTreeMap<VariantKey, (usize, Option<StagedWrite>)>,
}

impl StagedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write produced from feed row `seq`.
    ///
    /// A key staged twice keeps the entry from the later row.
    pub fn stage(&mut self, seq: usize, write: StagedWrite) {
        let key = write.key().clone();
        self.place(seq, key, Some(write));
    }

    /// Record that row `seq` left `key` as stored
    pub fn stage_unchanged(&mut self, seq: usize, key: VariantKey) {
        self.place(seq, key, None);
    }

    fn place(&mut self, seq: usize, key: VariantKey, entry: Option<StagedWrite>) {
        let staged_seq = self.entries.get(&key).map(|(staged_seq, _)| *staged_seq);
        match staged_seq {
            Some(staged_seq) if staged_seq > seq => {
                warn!(key = %key, row = seq, kept_row = staged_seq, "Duplicate variant in feed, keeping later row");
            }
            Some(staged_seq) => {
                warn!(key = %key, row = staged_seq, kept_row = seq, "Duplicate variant in feed, keeping later row");
                self.entries.insert(key, (seq, entry));
            }
            None => {
                self.entries.insert(key, (seq, entry));
            }
        }
    }

    /// Number of pending writes
    pub fn len(&self) -> usize {
        self.entries.values().filter(|(_, write)| write.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_writes(self) -> Vec<StagedWrite> {
        self.entries.into_values().filter_map(|(_, write)| write).collect()
    }
}

/// Result of executing a staged batch
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub inserted_count: u64,
    pub modified_count: u64,
    pub failures: Vec<WriteFailure>,
    /// Staged entries whose write succeeded
    pub persisted: Vec<StagedWrite>,
}

/// Write every staged entry as one unordered batch.
///
/// Never fails as a whole: failed operations are logged and left out of
/// `persisted`.
pub async fn execute_batch(store: &dyn VariantStore, batch: StagedBatch) -> PersistOutcome {
    let writes = batch.into_writes();
    if writes.is_empty() {
        info!("Nothing to persist");
        return PersistOutcome::default();
    }

    let ops: Vec<WriteOp> = writes.iter().map(StagedWrite::op).collect();
    let result = store.bulk_write(ops).await;
    let failed_keys = result.failed_keys();

    for failure in &result.failures {
        warn!(
            key = %failure.key,
            error = %failure.message,
            "Variant not persisted; subscribers will not be notified"
        );
    }

    let persisted: Vec<StagedWrite> = writes
        .into_iter()
        .filter(|w| !failed_keys.contains(w.key()))
        .collect();

    info!(
        inserted = result.inserted_count,
        modified = result.modified_count,
        failed = result.failures.len(),
        "Bulk write finished"
    );

    PersistOutcome {
        inserted_count: result.inserted_count,
        modified_count: result.modified_count,
        failures: result.failures,
        persisted,
    }
}
