//! Senders that actually put a rendered message on the wire.
//!
//! Both traits are narrow on purpose: a transport either delivers the
//! envelope or fails with a [`TransportError`]. Retrying is the dispatcher's
//! job.

pub mod slack_webhook;
pub mod smtp;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::render::{MailData, SlackMessage};

pub use slack_webhook::{SlackWebhookConfig, SlackWebhookTransport};
pub use smtp::{SmtpConfig, SmtpMailTransport};

/// A rendered mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: MailData,
}

/// A rendered Slack message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackEnvelope {
    /// `#channel` or `@user`.
    pub to: String,
    pub from: Option<String>,
    pub icon: Option<String>,
    pub message: SlackMessage,
    pub link_names: bool,
    /// Webhook URL to post to instead of the transport's configured one.
    pub endpoint: Option<String>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, envelope: MailEnvelope) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SlackTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, envelope: SlackEnvelope) -> Result<(), TransportError>;
}

/// Stand-in for a transport whose settings are missing. Every delivery fails
/// with `NotConfigured` naming the missing key.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    transport: String,
    key: String,
}

impl Unconfigured {
    pub fn new(transport: &str, key: &str) -> Self {
        Self {
            transport: transport.to_string(),
            key: key.to_string(),
        }
    }

    fn error(&self) -> TransportError {
        TransportError::NotConfigured {
            transport: self.transport.clone(),
            key: self.key.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for Unconfigured {
    fn name(&self) -> &str {
        &self.transport
    }

    async fn deliver(&self, _envelope: MailEnvelope) -> Result<(), TransportError> {
        Err(self.error())
    }
}

#[async_trait]
impl SlackTransport for Unconfigured {
    fn name(&self) -> &str {
        &self.transport
    }

    async fn deliver(&self, _envelope: SlackEnvelope) -> Result<(), TransportError> {
        Err(self.error())
    }
}
