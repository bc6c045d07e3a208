//! SendGrid v3 mail transport

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::delivery::MailTransport;
use crate::error::DeliveryError;

pub(crate) const USER_AGENT: &str = concat!("vss-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

/// `POST /v3/mail/send` request body
#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

/// Mail transport backed by the SendGrid HTTP API
pub struct SendGridMailer {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl SendGridMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            from_name: from_name.into(),
        })
    }

    fn request<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> MailRequest<'a> {
        MailRequest {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: to,
                    name: None,
                }],
            }],
            from: Address {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            subject,
            content: vec![Content {
                content_type: "text/plain",
                value: body,
            }],
        }
    }
}

#[async_trait]
impl MailTransport for SendGridMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<u16, DeliveryError> {
        tracing::debug!(to, subject, "Submitting email to SendGrid");

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request(to, subject, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %error_text, "SendGrid rejected email");
        }

        Ok(status.as_u16())
    }
}
