//! SMTP mail transport built on lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::config::{lookup_parsed, lookup_string};
use crate::error::{ConfigError, TransportError};
use crate::transport::{MailEnvelope, MailTransport};

const TRANSPORT_NAME: &str = "smtp";

/// Port that speaks TLS from the first byte; anything else uses STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP connection settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Build from environment variables.
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (mail transport disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup_string(&lookup, "SMTP_HOST") else {
            return Ok(None);
        };
        let port = lookup_parsed(&lookup, "SMTP_PORT")?.unwrap_or(587);
        let username = lookup_string(&lookup, "SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup_string(&lookup, "SMTP_PASSWORD").unwrap_or_default());

        Ok(Some(Self {
            host,
            port,
            username,
            password,
        }))
    }
}

/// Sends [`MailEnvelope`]s over SMTP.
///
/// lettre's `SmtpTransport` is blocking, so each delivery runs on the
/// blocking pool.
pub struct SmtpMailTransport {
    transport: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| TransportError::send_failed(TRANSPORT_NAME, format!("SMTP relay error: {e}")))?
        .port(config.port);

        let builder = if config.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
        };

        tracing::debug!(host = %config.host, port = config.port, "SMTP transport configured");
        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Build the lettre message for an envelope.
pub fn build_message(envelope: &MailEnvelope) -> Result<Message, TransportError> {
    let from_address: lettre::Address = envelope.from_address.parse().map_err(|e| {
        TransportError::send_failed(TRANSPORT_NAME, format!("Invalid from address: {e}"))
    })?;
    let to_address: lettre::Address = envelope.to.parse().map_err(|e| {
        TransportError::send_failed(TRANSPORT_NAME, format!("Invalid to address: {e}"))
    })?;

    Message::builder()
        .from(Mailbox::new(envelope.from_name.clone(), from_address))
        .to(Mailbox::new(None, to_address))
        .subject(envelope.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(envelope.body.to_plain_text())
        .map_err(|e| TransportError::send_failed(TRANSPORT_NAME, format!("Failed to build email: {e}")))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn name(&self) -> &str {
        TRANSPORT_NAME
    }

    async fn deliver(&self, envelope: MailEnvelope) -> Result<(), TransportError> {
        let message = build_message(&envelope)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| TransportError::send_failed(TRANSPORT_NAME, format!("SMTP task panicked: {e}")))?
            .map_err(|e| TransportError::SendFailed {
                transport: TRANSPORT_NAME.to_string(),
                reason: format!("SMTP send failed: {e}"),
                code: e
                    .status()
                    .and_then(|code| code.to_string().parse().ok())
                    .unwrap_or(0),
            })?;

        tracing::info!(to = %envelope.to, "Email sent");
        Ok(())
    }
}
