//! Configuration types.
//!
//! Everything is read from environment variables. Each section also has a
//! `from_lookup` constructor taking a key → value function so tests can
//! supply variables without touching the process environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Adapter used when the caller does not name one.
    pub default_adapter: String,
    /// Per-channel enable flags. Channels missing from the map are disabled.
    pub enabled: HashMap<String, bool>,
    pub mail: MailSettings,
    pub slack: SlackSettings,
    pub retry: RetryPolicy,
}

/// Defaults for the mail adapter.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub to: Option<String>,
    /// Envelope sender address.
    pub from_address: String,
    /// Display name of the sender.
    pub from_name: Option<String>,
    pub subject: String,
}

/// Defaults for the Slack adapter.
#[derive(Debug, Clone)]
pub struct SlackSettings {
    /// `#channel` or `@user`.
    pub channel: Option<String>,
    pub username: Option<String>,
    pub icon: Option<String>,
    pub mention: Option<String>,
    /// Pause after every successful send (Slack allows ~1 message/second).
    pub send_interval: Duration,
}

/// Bounded retry with a fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts before giving up.
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub backoff: Duration,
    /// Deadline for a single attempt. `None` waits indefinitely.
    pub delivery_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            delivery_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
            delivery_timeout: None,
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            to: None,
            from_address: String::new(),
            from_name: None,
            subject: "This is Title!".to_string(),
        }
    }
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            channel: None,
            username: None,
            icon: None,
            mention: None,
            send_interval: Duration::from_secs(1),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_adapter: "slack".to_string(),
            enabled: HashMap::new(),
            mail: MailSettings::default(),
            slack: SlackSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl NotifyConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut enabled = HashMap::new();
        enabled.insert(
            "slack".to_string(),
            lookup_bool(&lookup, "NOTIFY_SLACK_ENABLED")?.unwrap_or(false),
        );
        enabled.insert(
            "mail".to_string(),
            lookup_bool(&lookup, "NOTIFY_MAIL_ENABLED")?.unwrap_or(false),
        );

        let mail = MailSettings {
            to: lookup_string(&lookup, "NOTIFY_MAIL_TO"),
            from_address: lookup_string(&lookup, "NOTIFY_MAIL_FROM_ADDRESS")
                .or_else(|| lookup_string(&lookup, "SMTP_USERNAME"))
                .unwrap_or_default(),
            from_name: lookup_string(&lookup, "NOTIFY_MAIL_FROM_NAME"),
            subject: lookup_string(&lookup, "NOTIFY_MAIL_SUBJECT").unwrap_or(defaults.mail.subject),
        };

        let slack = SlackSettings {
            channel: lookup_string(&lookup, "NOTIFY_SLACK_CHANNEL"),
            username: lookup_string(&lookup, "NOTIFY_SLACK_USERNAME"),
            icon: lookup_string(&lookup, "NOTIFY_SLACK_ICON"),
            mention: lookup_string(&lookup, "NOTIFY_SLACK_MENTION"),
            send_interval: lookup_millis(&lookup, "NOTIFY_SLACK_SEND_INTERVAL_MS")?
                .unwrap_or(defaults.slack.send_interval),
        };

        let retry = RetryPolicy {
            max_attempts: lookup_parsed(&lookup, "NOTIFY_MAX_RETRY")?
                .unwrap_or(defaults.retry.max_attempts),
            backoff: lookup_millis(&lookup, "NOTIFY_RETRY_BACKOFF_MS")?
                .unwrap_or(defaults.retry.backoff),
            delivery_timeout: lookup_millis(&lookup, "NOTIFY_DELIVERY_TIMEOUT_MS")?,
        };

        Ok(Self {
            default_adapter: lookup_string(&lookup, "NOTIFY_DEFAULT")
                .map(|name| name.to_lowercase())
                .unwrap_or(defaults.default_adapter),
            enabled,
            mail,
            slack,
            retry,
        })
    }

    /// Whether the named channel may send without `force`.
    pub fn is_enabled(&self, channel: &str) -> bool {
        self.enabled
            .get(&channel.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    pub fn set_enabled(&mut self, channel: &str, enabled: bool) {
        self.enabled.insert(channel.to_lowercase(), enabled);
    }
}

/// Non-empty, trimmed value for `key`.
pub(crate) fn lookup_string<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn lookup_parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup_string(lookup, key)
        .map(|raw| {
            raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

/// `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`, case-insensitive.
pub(crate) fn lookup_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_string(lookup, key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?} is not a boolean"),
            }),
        })
        .transpose()
}

fn lookup_millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(lookup_parsed::<F, u64>(lookup, key)?.map(Duration::from_millis))
}
