//! Slack incoming-webhook transport

use async_trait::async_trait;
use std::time::Duration;

use super::delivery::ChatWebhook;
use super::render::SlackPayload;
use super::sendgrid::USER_AGENT;
use crate::error::DeliveryError;

/// Posts JSON payloads to per-user Slack webhook URLs
pub struct SlackWebhookClient {
    http_client: reqwest::Client,
}

impl SlackWebhookClient {
    pub fn new() -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl ChatWebhook for SlackWebhookClient {
    async fn post(&self, url: &str, payload: &SlackPayload) -> Result<u16, DeliveryError> {
        let response = self.http_client.post(url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %error_text, "Slack rejected message");
        }

        Ok(status.as_u16())
    }
}
