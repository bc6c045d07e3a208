//! Multi-channel delivery of per-user queues
//!
//! Each user gets at most one email and one Slack message per run. Channels
//! and users are independent: a failure is logged and counted, and delivery
//! carries on with everything else.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::fanout::UserQueue;
use super::render::{email_body, slack_payload, subject, SlackPayload};
use crate::error::DeliveryError;

/// Outgoing email provider
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Submit one plain-text email; returns the provider's HTTP status
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<u16, DeliveryError>;
}

/// Chat incoming-webhook poster
#[async_trait]
pub trait ChatWebhook: Send + Sync {
    /// Post a payload to a webhook URL; returns the HTTP status
    async fn post(&self, url: &str, payload: &SlackPayload) -> Result<u16, DeliveryError>;
}

fn check_status(status: u16, channel: &str) -> Result<(), DeliveryError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(DeliveryError::Rejected {
            status,
            body: format!("{} delivery rejected", channel),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelOutcome {
    Sent,
    Failed,
    /// Channel disabled or not configured for this user
    Skipped,
    DryRun,
}

/// Delivery counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub users: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub chats_sent: usize,
    pub chats_failed: usize,
    /// Messages logged instead of sent
    pub dry_run_messages: usize,
}

impl DeliveryReport {
    fn record(&mut self, email: ChannelOutcome, chat: ChannelOutcome) {
        self.users += 1;
        match email {
            ChannelOutcome::Sent => self.emails_sent += 1,
            ChannelOutcome::Failed => self.emails_failed += 1,
            ChannelOutcome::DryRun => self.dry_run_messages += 1,
            ChannelOutcome::Skipped => {}
        }
        match chat {
            ChannelOutcome::Sent => self.chats_sent += 1,
            ChannelOutcome::Failed => self.chats_failed += 1,
            ChannelOutcome::DryRun => self.dry_run_messages += 1,
            ChannelOutcome::Skipped => {}
        }
    }
}

/// Sends queued notifications over email and Slack
pub struct Delivery {
    mail: Option<Arc<dyn MailTransport>>,
    chat: Arc<dyn ChatWebhook>,
    base_url: String,
    concurrency: usize,
    dry_run: bool,
}

impl Delivery {
    /// `mail` is `None` when no mail provider is configured; email is then
    /// skipped for every user.
    pub fn new(mail: Option<Arc<dyn MailTransport>>, chat: Arc<dyn ChatWebhook>) -> Self {
        Self {
            mail,
            chat,
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            concurrency: 4,
            dry_run: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Deliver every queue, several users at a time
    pub async fn deliver_all(&self, queues: Vec<UserQueue>) -> DeliveryReport {
        debug!(users = queues.len(), "Sending notifications");

        let outcomes: Vec<(ChannelOutcome, ChannelOutcome)> = stream::iter(queues)
            .map(|queue| async move { self.deliver_user(&queue).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = DeliveryReport::default();
        for (email, chat) in outcomes {
            report.record(email, chat);
        }

        info!(
            users = report.users,
            emails_sent = report.emails_sent,
            emails_failed = report.emails_failed,
            chats_sent = report.chats_sent,
            chats_failed = report.chats_failed,
            "Delivery finished"
        );
        report
    }

    async fn deliver_user(&self, queue: &UserQueue) -> (ChannelOutcome, ChannelOutcome) {
        let email = self.deliver_email(queue).await;
        let chat = self.deliver_chat(queue).await;
        (email, chat)
    }

    async fn deliver_email(&self, queue: &UserQueue) -> ChannelOutcome {
        let user = &queue.user;
        let to = match user.email.as_deref() {
            Some(to) if user.can_email() => to,
            _ => {
                debug!(user_id = %user.id, "Email disabled for user");
                return ChannelOutcome::Skipped;
            }
        };

        let subject = subject(&queue.items);
        let body = email_body(&user.id, &queue.items);

        if self.dry_run {
            info!(user_id = %user.id, to, subject = %subject, "Dry run: email not sent\n{}", body);
            return ChannelOutcome::DryRun;
        }

        let Some(mail) = &self.mail else {
            debug!(user_id = %user.id, "No mail transport configured");
            return ChannelOutcome::Skipped;
        };

        let result = mail
            .send(to, &subject, &body)
            .await
            .and_then(|status| check_status(status, "email"));

        match result {
            Ok(()) => {
                debug!(user_id = %user.id, items = queue.items.len(), "Sent email");
                ChannelOutcome::Sent
            }
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Error sending email");
                ChannelOutcome::Failed
            }
        }
    }

    async fn deliver_chat(&self, queue: &UserQueue) -> ChannelOutcome {
        let user = &queue.user;
        let url = match user.slack_webhook_url.as_deref() {
            Some(url) if user.can_slack() => url,
            _ => {
                debug!(user_id = %user.id, "Slack disabled for user");
                return ChannelOutcome::Skipped;
            }
        };

        let payload = slack_payload(&user.id, &queue.items, &self.base_url);

        if self.dry_run {
            info!(
                user_id = %user.id,
                fields = payload.attachments.iter().map(|a| a.fields.len()).sum::<usize>(),
                "Dry run: Slack message not posted"
            );
            return ChannelOutcome::DryRun;
        }

        let result = self
            .chat
            .post(url, &payload)
            .await
            .and_then(|status| check_status(status, "Slack"));

        match result {
            Ok(()) => {
                debug!(user_id = %user.id, "Posted to Slack");
                ChannelOutcome::Sent
            }
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Error posting to Slack");
                ChannelOutcome::Failed
            }
        }
    }
}
