//! User account persistence

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{db_timestamp, parse_db_timestamp, retry_on_lock, SqliteStore, UserStore};
use crate::models::{NotificationPreferences, UserDocument};
use crate::{Error, Result};

const USER_COLUMNS: &str =
    "id, email, token, is_active, joined_at, notification_preferences, slack_webhook_url";

fn user_from_row(row: &SqliteRow) -> Result<UserDocument> {
    let id: String = row.get("id");
    let joined_at: String = row.get("joined_at");
    let preferences: String = row.get("notification_preferences");

    // Corrupt preferences fall back to defaults
    let notification_preferences = serde_json::from_str(&preferences).unwrap_or_else(|e| {
        warn!(user_id = %id, error = %e, "Unreadable notification preferences, using defaults");
        NotificationPreferences::default()
    });

    Ok(UserDocument {
        email: row.get("email"),
        token: row.get("token"),
        is_active: row.get::<i64, _>("is_active") != 0,
        joined_at: parse_db_timestamp("joined_at", &joined_at)?,
        notification_preferences,
        slack_webhook_url: row.get("slack_webhook_url"),
        id,
    })
}

impl SqliteStore {
    async fn fetch_user_where(&self, column: &str, value: &str) -> Result<Option<UserDocument>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserDocument>> {
        self.fetch_user_where("id", id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDocument>> {
        self.fetch_user_where("email", email).await
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<UserDocument>> {
        self.fetch_user_where("token", token).await
    }

    async fn insert_user(&self, user: &UserDocument) -> Result<()> {
        let preferences = serde_json::to_string(&user.notification_preferences)?;
        let joined_at = db_timestamp(&user.joined_at);

        retry_on_lock("insert_user", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO users (
                    id, email, token, is_active, joined_at,
                    notification_preferences, slack_webhook_url
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.token)
            .bind(user.is_active as i64)
            .bind(&joined_at)
            .bind(&preferences)
            .bind(&user.slack_webhook_url)
            .execute(&self.pool)
            .await
            .map_err(Error::from)
        })
        .await?;

        Ok(())
    }

    async fn update_preferences(
        &self,
        id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<bool> {
        let json = serde_json::to_string(preferences)?;
        let result = retry_on_lock("update_preferences", self.max_lock_wait_ms, || async {
            sqlx::query("UPDATE users SET notification_preferences = ? WHERE id = ?")
                .bind(&json)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_slack_webhook(&self, id: &str, url: Option<&str>) -> Result<bool> {
        let result = retry_on_lock("set_slack_webhook", self.max_lock_wait_ms, || async {
            sqlx::query("UPDATE users SET slack_webhook_url = ? WHERE id = ?")
                .bind(url)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
