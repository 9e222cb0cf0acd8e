//! Error types for notify-relay.

use std::time::Duration;

/// Top-level error returned by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{}Input Adapter Name is in a Wrong Format: {name}", default_prefix(.default))]
    UnknownAdapter { name: String, default: bool },

    #[error("Input address for {channel} is in a Wrong Format: {value}")]
    InvalidAddress { channel: String, value: String },

    #[error("All Attempts Failed in {channel}. Max Retry Count : {max_attempts}. Last error: {source}")]
    AllAttemptsFailed {
        channel: String,
        max_attempts: u32,
        #[source]
        source: TransportError,
    },

    /// A failure that retrying cannot fix, such as a transport with missing
    /// settings. Raised on the first attempt.
    #[error("{channel} cannot deliver: {source}")]
    Undeliverable {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl NotifyError {
    /// Numeric code inherited from the root cause, `0` when there is none.
    pub fn code(&self) -> i32 {
        match self {
            Self::AllAttemptsFailed { source, .. } | Self::Undeliverable { source, .. } => {
                source.code()
            }
            _ => 0,
        }
    }
}

fn default_prefix(default: &bool) -> &'static str {
    if *default { "Default " } else { "" }
}

/// Failure reported by a mail or Slack transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{transport} send failed: {reason}")]
    SendFailed {
        transport: String,
        reason: String,
        code: i32,
    },

    #[error("{transport} rejected the message with status {status}: {body}")]
    Rejected {
        transport: String,
        status: u16,
        body: String,
    },

    #[error("{transport} did not answer within {timeout:?}")]
    TimedOut { transport: String, timeout: Duration },

    #[error("{transport} is not configured: {key} is missing")]
    NotConfigured { transport: String, key: String },
}

impl TransportError {
    pub fn send_failed(transport: &str, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            transport: transport.to_string(),
            reason: reason.into(),
            code: 0,
        }
    }

    /// SMTP reply code or HTTP status of the failure, `0` otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Self::SendFailed { code, .. } => *code,
            Self::Rejected { status, .. } => i32::from(*status),
            Self::TimedOut { .. } | Self::NotConfigured { .. } => 0,
        }
    }

    /// Whether another attempt could succeed. Missing settings never fix
    /// themselves between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotConfigured { .. })
    }

    /// Name of the transport that failed.
    pub fn transport(&self) -> &str {
        match self {
            Self::SendFailed { transport, .. }
            | Self::Rejected { transport, .. }
            | Self::TimedOut { transport, .. }
            | Self::NotConfigured { transport, .. } => transport,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
