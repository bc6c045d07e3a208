//! Notification fan-out
//!
//! Turns persisted category transitions into per-user queues, filtered by
//! each subscriber's preference matrix. Queues accumulate over the whole
//! run and are handed to delivery once every record has been processed.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

use vss_common::db::UserStore;
use vss_common::models::{Category, NotificationPreferences, UserDocument, VariantDocument};

/// Run-scoped memo of user lookups.
///
/// Each distinct id hits the store at most once per run; unknown ids are
/// remembered as well.
pub struct UserCache<'a> {
    store: &'a dyn UserStore,
    users: HashMap<String, Option<UserDocument>>,
}

impl<'a> UserCache<'a> {
    pub fn new(store: &'a dyn UserStore) -> Self {
        Self {
            store,
            users: HashMap::new(),
        }
    }

    /// Resolve a user id; `None` if the user does not exist.
    ///
    /// Store errors are logged and not cached, so a later call retries.
    pub async fn get(&mut self, user_id: &str) -> Option<UserDocument> {
        if let Some(cached) = self.users.get(user_id) {
            return cached.clone();
        }

        match self.store.get_user(user_id).await {
            Ok(user) => {
                if user.is_none() {
                    warn!(user_id, "Subscriber not found");
                }
                self.users.insert(user_id.to_string(), user.clone());
                user
            }
            Err(e) => {
                error!(user_id, error = %e, "Failed to load subscriber");
                None
            }
        }
    }
}

/// One variant change queued for one user
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationItem {
    pub old_category: Category,
    pub new_category: Category,
    pub old_doc: VariantDocument,
    pub new_doc: VariantDocument,
}

/// Everything one user is told about in this run
#[derive(Debug, Clone)]
pub struct UserQueue {
    pub user: UserDocument,
    pub items: Vec<NotificationItem>,
}

/// Accumulates per-user notification queues for one run
pub struct UpdateNotifier<'a> {
    users: UserCache<'a>,
    queues: BTreeMap<String, Vec<NotificationItem>>,
    variants_notified: u64,
}

impl<'a> UpdateNotifier<'a> {
    pub fn new(users: UserCache<'a>) -> Self {
        Self {
            users,
            queues: BTreeMap::new(),
            variants_notified: 0,
        }
    }

    /// Queue a persisted change for every subscriber of `old` who wants it
    pub async fn notify_of_change(&mut self, old: &VariantDocument, new: &VariantDocument) {
        let old_category = old.category();
        let new_category = new.category();
        self.variants_notified += 1;

        debug!(
            key = %new.key,
            from = %old_category,
            to = %new_category,
            subscribers = old.subscribers.len(),
            "Fanning out variant change"
        );

        for user_id in &old.subscribers {
            let Some(user) = self.users.get(user_id).await else {
                continue;
            };
            if !user.is_active {
                debug!(user_id = %user.id, "Skipping inactive subscriber");
                continue;
            }

            match user
                .notification_preferences
                .allows(old_category, new_category)
            {
                None => {
                    error!(
                        user_id = %user.id,
                        from = %old_category,
                        to = %new_category,
                        "Missing notification preference for transition"
                    );
                }
                Some(false) => {
                    info!(
                        user_id = %user.id,
                        key = %new.key,
                        preference = NotificationPreferences::preference_name(old_category, new_category)
                            .unwrap_or_default(),
                        "Skipping notification due to user preferences"
                    );
                }
                Some(true) => {
                    info!(user_id = %user.id, key = %new.key, "Will notify user of change");
                    self.queues
                        .entry(user.id.clone())
                        .or_default()
                        .push(NotificationItem {
                            old_category,
                            new_category,
                            old_doc: old.clone(),
                            new_doc: new.clone(),
                        });
                }
            }
        }
    }

    /// Variants fanned out so far
    pub fn variants_notified(&self) -> u64 {
        self.variants_notified
    }

    /// Queued items for a user (empty if none)
    pub fn queue_for(&self, user_id: &str) -> &[NotificationItem] {
        self.queues.get(user_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Non-empty queues paired with their users
    pub async fn into_queues(mut self) -> Vec<UserQueue> {
        let queues = std::mem::take(&mut self.queues);
        let mut result = Vec::with_capacity(queues.len());
        for (user_id, items) in queues {
            if let Some(user) = self.users.get(&user_id).await {
                result.push(UserQueue { user, items });
            }
        }
        result
    }
}
