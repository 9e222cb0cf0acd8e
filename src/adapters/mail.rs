//! Mail adapter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::Adapter;
use crate::config::NotifyConfig;
use crate::content::Content;
use crate::error::{ConfigError, NotifyError, TransportError};
use crate::options::{OptionSet, validate_mail_address};
use crate::render::render_mail;
use crate::transport::{MailEnvelope, MailTransport};

/// Sends notifications as email.
pub struct MailAdapter {
    options: OptionSet,
    from_address: String,
    transport: Arc<dyn MailTransport>,
}

impl MailAdapter {
    /// Defaults come from `config.mail`; `base` supplies everything else
    /// (typically request fields).
    pub fn new(config: &NotifyConfig, base: OptionSet, transport: Arc<dyn MailTransport>) -> Self {
        let options = OptionSet {
            to: config.mail.to.clone(),
            from: config.mail.from_name.clone(),
            subject: Some(config.mail.subject.clone()),
            ..base
        };
        Self {
            options,
            from_address: config.mail.from_address.clone(),
            transport,
        }
    }

    pub fn set_subject(&mut self, subject: &str) {
        self.options.subject = Some(subject.to_string());
    }

    fn envelope(&self, content: &Content, options: &OptionSet) -> Result<MailEnvelope, TransportError> {
        let to = options.to.clone().ok_or_else(|| TransportError::NotConfigured {
            transport: self.transport.name().to_string(),
            key: "to".into(),
        })?;
        Ok(MailEnvelope {
            from_address: self.from_address.clone(),
            from_name: options.from.clone(),
            to,
            subject: options.subject.clone().unwrap_or_default(),
            body: render_mail(content, options),
        })
    }
}

#[async_trait]
impl Adapter for MailAdapter {
    fn name(&self) -> &str {
        "mail"
    }

    fn defaults(&self) -> &OptionSet {
        &self.options
    }

    fn set_to(&mut self, address: &str) -> Result<(), NotifyError> {
        validate_mail_address(address)?;
        self.options.to = Some(address.to_string());
        Ok(())
    }

    fn set_from(&mut self, name: &str) {
        self.options.from = Some(name.to_string());
    }

    fn check_ready(&self) -> Result<(), NotifyError> {
        if self.from_address.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "NOTIFY_MAIL_FROM_ADDRESS".into(),
                hint: "Set it, or SMTP_USERNAME, to the sender address.".into(),
            }
            .into());
        }
        if validate_mail_address(&self.from_address).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_MAIL_FROM_ADDRESS".into(),
                message: format!("{:?} is not an email address", self.from_address),
            }
            .into());
        }
        Ok(())
    }

    async fn deliver(&self, content: &Content, options: &OptionSet) -> Result<(), TransportError> {
        let envelope = self.envelope(content, options)?;
        tracing::debug!(
            transport = self.transport.name(),
            to = %envelope.to,
            subject = %envelope.subject,
            "Delivering mail"
        );
        self.transport.deliver(envelope).await
    }
}
