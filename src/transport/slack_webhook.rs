//! Slack incoming-webhook transport.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::lookup_string;
use crate::error::TransportError;
use crate::render::SlackAttachment;
use crate::transport::{SlackEnvelope, SlackTransport};

const TRANSPORT_NAME: &str = "slack-webhook";

/// Environment variable for the Slack webhook URL.
const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

#[derive(Debug, Clone)]
pub struct SlackWebhookConfig {
    pub webhook_url: SecretString,
}

impl SlackWebhookConfig {
    /// Returns `None` if `SLACK_WEBHOOK_URL` is not set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup_string(&lookup, ENV_SLACK_WEBHOOK_URL).map(|url| Self {
            webhook_url: SecretString::from(url),
        })
    }
}

/// Posts [`SlackEnvelope`]s to an incoming webhook.
pub struct SlackWebhookTransport {
    webhook_url: SecretString,
    client: reqwest::Client,
}

impl SlackWebhookTransport {
    pub fn new(config: SlackWebhookConfig) -> Self {
        Self {
            webhook_url: config.webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// The envelope's endpoint override, else the configured webhook.
    fn target<'a>(&'a self, envelope: &'a SlackEnvelope) -> &'a str {
        envelope
            .endpoint
            .as_deref()
            .unwrap_or_else(|| self.webhook_url.expose_secret())
    }
}

#[async_trait]
impl SlackTransport for SlackWebhookTransport {
    fn name(&self) -> &str {
        TRANSPORT_NAME
    }

    async fn deliver(&self, envelope: SlackEnvelope) -> Result<(), TransportError> {
        let payload = WebhookPayload::from_envelope(&envelope);

        tracing::debug!(channel = %envelope.to, "Posting Slack webhook");

        let response = self
            .client
            .post(self.target(&envelope))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed {
                transport: TRANSPORT_NAME.to_string(),
                reason: e.to_string(),
                code: e.status().map_or(0, |s| i32::from(s.as_u16())),
            })?;

        if response.status().is_success() {
            tracing::debug!(channel = %envelope.to, "Slack message posted");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, body = %body, "Slack webhook request failed");

        Err(TransportError::Rejected {
            transport: TRANSPORT_NAME.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
    text: &'a str,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [SlackAttachment],
    link_names: bool,
}

fn no_attachments(attachments: &&[SlackAttachment]) -> bool {
    attachments.is_empty()
}

impl<'a> WebhookPayload<'a> {
    fn from_envelope(envelope: &'a SlackEnvelope) -> Self {
        let icon = envelope.icon.as_deref();
        let is_emoji = icon.is_some_and(|i| i.starts_with(':') && i.ends_with(':'));
        Self {
            channel: &envelope.to,
            username: envelope.from.as_deref(),
            icon_emoji: icon.filter(|_| is_emoji),
            icon_url: icon.filter(|_| !is_emoji),
            text: &envelope.message.text,
            attachments: &envelope.message.attachments,
            link_names: envelope.link_names,
        }
    }
}
