//! User documents and notification preferences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::Category;

fn default_true() -> bool {
    true
}

/// Per-transition notification switches plus channel toggles.
///
/// Only nine transitions have a switch. Transitions into `unknown` are not
/// offered, so [`NotificationPreferences::allows`] returns `None` for them.
/// Switches missing from a stored document default to on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_true")]
    pub unknown_to_benign: bool,
    #[serde(default = "default_true")]
    pub vus_to_benign: bool,
    #[serde(default = "default_true")]
    pub path_to_benign: bool,

    #[serde(default = "default_true")]
    pub unknown_to_vus: bool,
    #[serde(default = "default_true")]
    pub benign_to_vus: bool,
    #[serde(default = "default_true")]
    pub path_to_vus: bool,

    #[serde(default = "default_true")]
    pub unknown_to_path: bool,
    #[serde(default = "default_true")]
    pub benign_to_path: bool,
    #[serde(default = "default_true")]
    pub vus_to_path: bool,

    #[serde(default = "default_true")]
    pub notify_emails: bool,
    #[serde(default = "default_true")]
    pub notify_slack: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            unknown_to_benign: true,
            vus_to_benign: true,
            path_to_benign: true,
            unknown_to_vus: true,
            benign_to_vus: true,
            path_to_vus: true,
            unknown_to_path: true,
            benign_to_path: true,
            vus_to_path: true,
            notify_emails: true,
            notify_slack: true,
        }
    }
}

impl NotificationPreferences {
    /// Preference field name for a transition, if the product offers one
    pub fn preference_name(from: Category, to: Category) -> Option<&'static str> {
        use Category::*;
        match (from, to) {
            (Unknown, Benign) => Some("unknown_to_benign"),
            (Uncertain, Benign) => Some("vus_to_benign"),
            (Pathogenic, Benign) => Some("path_to_benign"),
            (Unknown, Uncertain) => Some("unknown_to_vus"),
            (Benign, Uncertain) => Some("benign_to_vus"),
            (Pathogenic, Uncertain) => Some("path_to_vus"),
            (Unknown, Pathogenic) => Some("unknown_to_path"),
            (Benign, Pathogenic) => Some("benign_to_path"),
            (Uncertain, Pathogenic) => Some("vus_to_path"),
            _ => None,
        }
    }

    /// Whether the user wants to hear about `from -> to`.
    ///
    /// `None` means the matrix has no entry for this transition.
    pub fn allows(&self, from: Category, to: Category) -> Option<bool> {
        let flag = match Self::preference_name(from, to)? {
            "unknown_to_benign" => self.unknown_to_benign,
            "vus_to_benign" => self.vus_to_benign,
            "path_to_benign" => self.path_to_benign,
            "unknown_to_vus" => self.unknown_to_vus,
            "benign_to_vus" => self.benign_to_vus,
            "path_to_vus" => self.path_to_vus,
            "unknown_to_path" => self.unknown_to_path,
            "benign_to_path" => self.benign_to_path,
            "vus_to_path" => self.vus_to_path,
            _ => return None,
        };
        Some(flag)
    }

    /// Turn both delivery channels off, leaving transition switches alone
    pub fn suspend(&mut self) {
        self.notify_emails = false;
        self.notify_slack = false;
    }
}

/// User account as seen by the pipeline (read-only here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDocument {
    pub id: String,
    pub email: Option<String>,
    /// Login token; issued elsewhere, only looked up here
    pub token: Option<String>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub notification_preferences: NotificationPreferences,
    /// Slack incoming-webhook URL, if the user connected Slack
    pub slack_webhook_url: Option<String>,
}

impl UserDocument {
    /// New active user with default (all-on) preferences
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.into()),
            token: None,
            is_active: true,
            joined_at: Utc::now(),
            notification_preferences: NotificationPreferences::default(),
            slack_webhook_url: None,
        }
    }

    pub fn can_email(&self) -> bool {
        self.notification_preferences.notify_emails
            && self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn can_slack(&self) -> bool {
        self.notification_preferences.notify_slack
            && self
                .slack_webhook_url
                .as_deref()
                .is_some_and(|u| !u.trim().is_empty())
    }
}
