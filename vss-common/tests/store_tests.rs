//! SQLite store behavior: variants, users and the run ledger
//!
//! Every test runs against a fresh in-memory database.

use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;
use vss_common::db::{
    init_memory_database, BulkWriteResult, RunLedger, SqliteStore, UserStore, VariantStore,
    WriteKind, WriteOp,
};
use vss_common::models::{
    Category, ClassificationRecord, Coordinates, IngestionRun, NotificationPreferences,
    UserDocument, VariantDocument, VariantKey,
};

async fn test_store() -> SqliteStore {
    let pool = init_memory_database().await.unwrap();
    SqliteStore::new(pool).with_max_lock_wait_ms(200)
}

fn coords(pos: u64) -> Coordinates {
    Coordinates {
        build: "b37".to_string(),
        chrom: "1".to_string(),
        pos,
        reference: "G".to_string(),
        alternate: "A".to_string(),
    }
}

fn classified(pos: u64, significance: &str) -> VariantDocument {
    let mut doc = VariantDocument::new(coords(pos));
    doc.classification.variation_id = Some(format!("{}", 1000 + pos));
    doc.classification.current = Some(ClassificationRecord::new(
        significance,
        Some(2),
        Some("criteria provided, multiple submitters, no conflicts".to_string()),
        Some("2016-03-01".to_string()),
    ));
    doc
}

#[tokio::test]
async fn test_insert_and_get_variant() {
    // Given: A classified document with subscription state
    let store = test_store().await;
    let mut doc = classified(100, "Pathogenic");
    doc.subscribers.insert("user-1".to_string());
    doc.tags.insert("user-1".to_string(), "proband".to_string());

    // When: It is inserted and read back
    store.insert_variant(&doc).await.unwrap();
    let loaded = store.get_variant(&doc.key).await.unwrap();

    // Then: The stored document is identical
    assert_eq!(loaded, Some(doc));
}

#[tokio::test]
async fn test_get_missing_variant_is_none() {
    let store = test_store().await;
    let loaded = store
        .get_variant(&VariantKey::from_raw("b37-1-1-A-C"))
        .await
        .unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_find_by_variation_id() {
    let store = test_store().await;
    let doc = classified(200, "Benign");
    store.insert_variant(&doc).await.unwrap();

    let found = store.find_variant_by_variation_id("1200").await.unwrap();
    assert_eq!(found.map(|d| d.key), Some(doc.key));
    assert!(store.find_variant_by_variation_id("9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_duplicate_key_fails() {
    let store = test_store().await;
    let doc = classified(100, "Benign");
    store.insert_variant(&doc).await.unwrap();

    assert!(store.insert_variant(&doc).await.is_err());
}

#[tokio::test]
async fn test_bulk_write_isolates_failing_operation() {
    // Given: One variant already stored
    let store = test_store().await;
    let existing = classified(5, "Benign");
    store.insert_variant(&existing).await.unwrap();

    // When: A batch of ten inserts contains that key once
    let ops: Vec<WriteOp> = (1..=10)
        .map(|pos| WriteOp::Insert(classified(pos, "Pathogenic")))
        .collect();
    let result = store.bulk_write(ops).await;

    // Then: Nine succeed, the duplicate is reported
    assert_eq!(result.inserted_count, 9);
    assert_eq!(result.modified_count, 0);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].index, 4);
    assert_eq!(result.failures[0].key, existing.key);
    assert_eq!(result.failures[0].kind, WriteKind::Insert);
    assert!(result.failed_keys().contains(&existing.key));

    for pos in (1..=10).filter(|p| *p != 5) {
        let stored = store.get_variant(&coords(pos).key()).await.unwrap().unwrap();
        assert_eq!(stored.category(), Category::Pathogenic);
    }
    // The pre-existing document is untouched
    let stored = store.get_variant(&existing.key).await.unwrap().unwrap();
    assert_eq!(stored.category(), Category::Benign);
}

#[tokio::test]
async fn test_bulk_write_mixed_inserts_and_replaces() {
    let store = test_store().await;
    let old = classified(1, "Benign");
    store.insert_variant(&old).await.unwrap();

    let mut updated = classified(1, "Pathogenic");
    updated.classification.history = vec![old.classification.current.clone().unwrap()];

    let result = store
        .bulk_write(vec![
            WriteOp::Replace(old.key.clone(), updated.clone()),
            WriteOp::Insert(classified(2, "Uncertain significance")),
        ])
        .await;

    assert_eq!(result.inserted_count, 1);
    assert_eq!(result.modified_count, 1);
    assert!(!result.has_failures());

    let stored = store.get_variant(&old.key).await.unwrap().unwrap();
    assert_eq!(stored.category(), Category::Pathogenic);
    assert_eq!(stored.classification.history.len(), 1);
}

#[tokio::test]
async fn test_replace_keeps_subscription_state() {
    // Given: A stored variant with a subscriber and tag
    let store = test_store().await;
    let doc = classified(7, "Benign");
    store.insert_variant(&doc).await.unwrap();
    assert!(store.add_subscriber(&doc.key, "user-1").await.unwrap());
    assert!(store.set_tag(&doc.key, "user-1", "family A").await.unwrap());

    // When: The annotation is replaced by a document with no subscription state
    let replacement = classified(7, "Pathogenic");
    assert!(replacement.subscribers.is_empty());
    let result = store
        .bulk_write(vec![WriteOp::Replace(doc.key.clone(), replacement)])
        .await;

    // Then: The classification changed, subscribers and tags did not
    assert_eq!(result.modified_count, 1);
    let stored = store.get_variant(&doc.key).await.unwrap().unwrap();
    assert_eq!(stored.category(), Category::Pathogenic);
    assert_eq!(stored.subscribers, BTreeSet::from(["user-1".to_string()]));
    assert_eq!(stored.tag_for("user-1"), Some("family A"));
}

#[tokio::test]
async fn test_replace_missing_variant_fails() {
    let store = test_store().await;
    let doc = classified(3, "Benign");

    let result = store
        .bulk_write(vec![WriteOp::Replace(doc.key.clone(), doc.clone())])
        .await;

    assert_eq!(result.modified_count, 0);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].kind, WriteKind::Replace);
}

#[tokio::test]
async fn test_empty_bulk_write() {
    let store = test_store().await;
    let result = store.bulk_write(Vec::new()).await;
    assert_eq!(result, BulkWriteResult::default());
}

#[tokio::test]
async fn test_subscribe_unsubscribe_and_tags() {
    let store = test_store().await;
    let doc = classified(11, "Benign");
    store.insert_variant(&doc).await.unwrap();

    assert!(store.add_subscriber(&doc.key, "user-1").await.unwrap());
    assert!(!store.add_subscriber(&doc.key, "user-1").await.unwrap());
    assert!(store.add_subscriber(&doc.key, "user-2").await.unwrap());

    // Non-subscribers cannot tag
    assert!(!store.set_tag(&doc.key, "user-3", "x").await.unwrap());
    assert!(store.set_tag(&doc.key, "user-1", "first").await.unwrap());
    assert!(store.set_tag(&doc.key, "user-1", "second").await.unwrap());

    let stored = store.get_variant(&doc.key).await.unwrap().unwrap();
    assert_eq!(stored.subscribers.len(), 2);
    assert_eq!(stored.tag_for("user-1"), Some("second"));

    assert!(!store.remove_tag(&doc.key, "user-2").await.unwrap());
    assert!(store.set_tag(&doc.key, "user-2", "temp").await.unwrap());
    assert!(store.remove_tag(&doc.key, "user-2").await.unwrap());
    let stored = store.get_variant(&doc.key).await.unwrap().unwrap();
    assert!(stored.tag_for("user-2").is_none());
    assert!(stored.subscribers.contains("user-2"));

    // Unsubscribing drops the user's tag
    assert!(store.remove_subscriber(&doc.key, "user-1").await.unwrap());
    assert!(!store.remove_subscriber(&doc.key, "user-1").await.unwrap());

    let stored = store.get_variant(&doc.key).await.unwrap().unwrap();
    assert_eq!(stored.subscribers, BTreeSet::from(["user-2".to_string()]));
    assert!(stored.tag_for("user-1").is_none());
}

#[tokio::test]
async fn test_subscribe_to_unknown_variant_is_false() {
    let store = test_store().await;
    let added = store
        .add_subscriber(&VariantKey::from_raw("b37-9-9-T-C"), "user-1")
        .await
        .unwrap();
    assert!(!added);
}

#[tokio::test]
async fn test_count_subscribed_variants() {
    let store = test_store().await;
    for pos in 1..=3 {
        store.insert_variant(&classified(pos, "Benign")).await.unwrap();
    }
    assert_eq!(store.count_subscribed_variants().await.unwrap(), 0);

    store.add_subscriber(&coords(1).key(), "u1").await.unwrap();
    store.add_subscriber(&coords(1).key(), "u2").await.unwrap();
    store.add_subscriber(&coords(3).key(), "u1").await.unwrap();
    assert_eq!(store.count_subscribed_variants().await.unwrap(), 2);

    store.remove_subscriber(&coords(3).key(), "u1").await.unwrap();
    assert_eq!(store.count_subscribed_variants().await.unwrap(), 1);
}

fn test_user(email: &str) -> UserDocument {
    let mut user = UserDocument::new(email);
    user.joined_at = Utc.with_ymd_and_hms(2017, 4, 2, 9, 30, 0).unwrap();
    user
}

#[tokio::test]
async fn test_user_lookup() {
    let store = test_store().await;
    let mut user = test_user("someone@example.org");
    user.token = Some("tok-123".to_string());
    store.insert_user(&user).await.unwrap();

    assert_eq!(store.get_user(&user.id).await.unwrap(), Some(user.clone()));
    assert_eq!(
        store.find_user_by_email("someone@example.org").await.unwrap(),
        Some(user.clone())
    );
    assert_eq!(store.find_user_by_token("tok-123").await.unwrap(), Some(user));
    assert!(store.get_user("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let store = test_store().await;
    store.insert_user(&test_user("dup@example.org")).await.unwrap();
    assert!(store.insert_user(&test_user("dup@example.org")).await.is_err());
}

#[tokio::test]
async fn test_update_preferences_and_slack() {
    let store = test_store().await;
    let user = test_user("prefs@example.org");
    store.insert_user(&user).await.unwrap();

    let prefs = NotificationPreferences {
        vus_to_path: false,
        notify_emails: false,
        ..Default::default()
    };
    assert!(store.update_preferences(&user.id, &prefs).await.unwrap());
    assert!(store
        .set_slack_webhook(&user.id, Some("https://hooks.slack.example/T1"))
        .await
        .unwrap());

    let loaded = store.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(loaded.notification_preferences, prefs);
    assert!(!loaded.can_email());
    assert!(loaded.can_slack());

    assert!(!store.update_preferences("missing", &prefs).await.unwrap());
}

#[tokio::test]
async fn test_partial_stored_preferences_default_on() {
    let store = test_store().await;
    let user = test_user("legacy@example.org");
    store.insert_user(&user).await.unwrap();

    sqlx::query("UPDATE users SET notification_preferences = ? WHERE id = ?")
        .bind(r#"{"benign_to_path": false}"#)
        .bind(&user.id)
        .execute(store.pool())
        .await
        .unwrap();

    let loaded = store.get_user(&user.id).await.unwrap().unwrap();
    let prefs = loaded.notification_preferences;
    assert_eq!(prefs.allows(Category::Benign, Category::Pathogenic), Some(false));
    assert_eq!(prefs.allows(Category::Uncertain, Category::Pathogenic), Some(true));
}

fn run_at(hour: u32, inserted: u64) -> IngestionRun {
    let started = Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap();
    let mut run = IngestionRun::begin(Uuid::new_v4(), started);
    run.inserted_count = inserted;
    run.modified_count = 2;
    run.notified_count = 1;
    run.skipped_count = 3;
    run.finish(started + chrono::Duration::minutes(5))
}

#[tokio::test]
async fn test_run_ledger_latest_run() {
    let store = test_store().await;
    assert!(store.latest_run().await.unwrap().is_none());
    assert!(store.last_updated().await.unwrap().is_none());

    let early = run_at(3, 10);
    let late = run_at(11, 20);
    store.record_run(&late).await.unwrap();
    store.record_run(&early).await.unwrap();

    assert_eq!(store.latest_run().await.unwrap(), Some(late.clone()));
    assert_eq!(store.last_updated().await.unwrap(), Some(late.finished_at));

    let recent = store.recent_runs(10).await.unwrap();
    assert_eq!(recent, vec![late, early]);
}

#[tokio::test]
async fn test_site_stats() {
    let store = test_store().await;
    let doc = classified(1, "Benign");
    store.insert_variant(&doc).await.unwrap();
    store.add_subscriber(&doc.key, "u1").await.unwrap();
    let run = run_at(8, 1);
    store.record_run(&run).await.unwrap();

    let stats = store.site_stats().await.unwrap();
    assert_eq!(stats.subscribed_variants, 1);
    assert_eq!(stats.last_updated, Some(run.finished_at));
}
