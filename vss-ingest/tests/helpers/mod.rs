//! Shared fixtures for vss-ingest integration tests

#![allow(dead_code)]

pub mod log_capture;

pub use log_capture::{capture_logs, LogCapture};

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use vss_common::db::{
    init_memory_database, BulkWriteResult, SqliteStore, UserStore, VariantStore, WriteFailure,
    WriteOp,
};
use vss_common::models::{UserDocument, VariantDocument, VariantKey};
use vss_common::Result;
use vss_ingest::error::DeliveryError;
use vss_ingest::notify::{ChatWebhook, MailTransport, SlackPayload};
use vss_ingest::{Delivery, FeedRecord, IngestionPipeline, PipelineSettings, RecordBuilder};

pub async fn test_store() -> SqliteStore {
    let pool = init_memory_database().await.unwrap();
    SqliteStore::new(pool).with_max_lock_wait_ms(200)
}

pub fn builder() -> RecordBuilder {
    RecordBuilder::new("b37")
}

pub fn record(pos: u64, significance: &str) -> FeedRecord {
    FeedRecord::new("1", pos, "G", "A")
        .with_classification(significance, Some(2))
        .with_variation_id(&format!("{}", 5000 + pos))
}

pub fn key_of(record: &FeedRecord) -> VariantKey {
    builder().build(record).key
}

/// Store a classified variant with the given subscribers
pub async fn seed_variant(
    store: &SqliteStore,
    record: &FeedRecord,
    subscribers: &[&UserDocument],
) -> VariantDocument {
    let mut doc = builder().build(record);
    for user in subscribers {
        doc.subscribers.insert(user.id.clone());
    }
    store.insert_variant(&doc).await.unwrap();
    doc
}

pub async fn seed_user(store: &SqliteStore, email: &str) -> UserDocument {
    let user = UserDocument::new(email);
    store.insert_user(&user).await.unwrap();
    user
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport that records every message
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    /// Recipients answered with 500
    rejecting: HashSet<String>,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Self::rejecting(&[])
    }

    pub fn rejecting(recipients: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            rejecting: recipients.iter().map(|r| r.to_string()).collect(),
        })
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> std::result::Result<u16, DeliveryError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        if self.rejecting.contains(to) {
            Ok(500)
        } else {
            Ok(202)
        }
    }
}

/// Chat webhook that records every post
#[derive(Default)]
pub struct RecordingWebhook {
    posts: Mutex<Vec<(String, SlackPayload)>>,
}

impl RecordingWebhook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn posts(&self) -> Vec<(String, SlackPayload)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatWebhook for RecordingWebhook {
    async fn post(&self, url: &str, payload: &SlackPayload) -> std::result::Result<u16, DeliveryError> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(200)
    }
}

pub fn delivery(mailer: &Arc<RecordingMailer>, webhook: &Arc<RecordingWebhook>) -> Delivery {
    Delivery::new(Some(mailer.clone()), webhook.clone()).with_base_url("https://vss.test")
}

pub fn pipeline(
    store: &SqliteStore,
    mailer: &Arc<RecordingMailer>,
    webhook: &Arc<RecordingWebhook>,
) -> IngestionPipeline {
    IngestionPipeline::with_sqlite(store.clone(), delivery(mailer, webhook), PipelineSettings::default())
}

/// Variant store whose bulk writes fail for chosen keys
pub struct FailingWrites {
    pub inner: SqliteStore,
    pub failing: HashSet<VariantKey>,
}

#[async_trait]
impl VariantStore for FailingWrites {
    async fn get_variant(&self, key: &VariantKey) -> Result<Option<VariantDocument>> {
        self.inner.get_variant(key).await
    }

    async fn find_variant_by_variation_id(&self, variation_id: &str) -> Result<Option<VariantDocument>> {
        self.inner.find_variant_by_variation_id(variation_id).await
    }

    async fn insert_variant(&self, doc: &VariantDocument) -> Result<()> {
        self.inner.insert_variant(doc).await
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> BulkWriteResult {
        let mut failures = Vec::new();
        let mut passing = Vec::new();
        for (index, op) in ops.into_iter().enumerate() {
            if self.failing.contains(op.key()) {
                failures.push(WriteFailure {
                    index,
                    key: op.key().clone(),
                    kind: op.kind(),
                    message: "simulated write failure".to_string(),
                });
            } else {
                passing.push(op);
            }
        }

        let mut result = self.inner.bulk_write(passing).await;
        result.failures.extend(failures);
        result
    }

    async fn add_subscriber(&self, key: &VariantKey, user_id: &str) -> Result<bool> {
        self.inner.add_subscriber(key, user_id).await
    }

    async fn remove_subscriber(&self, key: &VariantKey, user_id: &str) -> Result<bool> {
        self.inner.remove_subscriber(key, user_id).await
    }

    async fn set_tag(&self, key: &VariantKey, user_id: &str, tag: &str) -> Result<bool> {
        self.inner.set_tag(key, user_id, tag).await
    }

    async fn remove_tag(&self, key: &VariantKey, user_id: &str) -> Result<bool> {
        self.inner.remove_tag(key, user_id).await
    }

    async fn count_subscribed_variants(&self) -> Result<u64> {
        self.inner.count_subscribed_variants().await
    }
}
