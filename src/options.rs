//! Per-call option overlays and the rules for merging them onto adapter
//! defaults.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// `#channel` or `@user`.
static SLACK_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[#@][A-Za-z0-9._-]+$").expect("slack target pattern is valid")
});

/// Contextual metadata attached to error reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFields {
    pub user_agent: String,
    pub request_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl RequestFields {
    pub fn new(user_agent: impl Into<String>, request_uri: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            request_uri: request_uri.into(),
            ip_address: None,
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    /// Build from an ordered `[user_agent, request_uri, ip_address?]` sequence.
    ///
    /// Returns `None` unless the sequence has two or three elements.
    pub fn from_sequence<S: AsRef<str>>(values: &[S]) -> Option<Self> {
        match values {
            [ua, uri] => Some(Self::new(ua.as_ref(), uri.as_ref())),
            [ua, uri, ip] => Some(Self::new(ua.as_ref(), uri.as_ref()).with_ip(ip.as_ref())),
            _ => None,
        }
    }
}

/// Option overlay for a single send, or the persisted defaults of an adapter.
///
/// Every key is optional. Absent keys in a per-call set are filled from the
/// adapter defaults by [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSet {
    /// Mail recipient, or Slack `#channel` / `@user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Display name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Slack icon: an emoji such as `:fire:` or an image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<RequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry: Option<u32>,
    /// Bypass the per-channel enable flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
    /// Send Slack text as-is instead of wrapping it in a code block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,
    /// Slack webhook URL used instead of the transport's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sender display name.
    pub fn sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn fields(mut self, fields: RequestFields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = Some(max_retry);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    pub fn mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = Some(mention.into());
        self
    }

    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_forced(&self) -> bool {
        self.force == Some(true)
    }

    pub fn is_raw(&self) -> bool {
        self.raw == Some(true)
    }
}

/// Overlay `caller` onto `defaults`. Caller keys always win; keys the caller
/// left out are copied from `defaults`. `defaults` is never modified.
pub fn merge(caller: OptionSet, defaults: &OptionSet) -> OptionSet {
    if caller.is_empty() {
        return defaults.clone();
    }
    OptionSet {
        to: caller.to.or_else(|| defaults.to.clone()),
        from: caller.from.or_else(|| defaults.from.clone()),
        subject: caller.subject.or_else(|| defaults.subject.clone()),
        icon: caller.icon.or_else(|| defaults.icon.clone()),
        fields: caller.fields.or_else(|| defaults.fields.clone()),
        max_retry: caller.max_retry.or(defaults.max_retry),
        force: caller.force.or(defaults.force),
        mention: caller.mention.or_else(|| defaults.mention.clone()),
        raw: caller.raw.or(defaults.raw),
        endpoint: caller.endpoint.or_else(|| defaults.endpoint.clone()),
    }
}

/// Check standard email address syntax.
pub fn validate_mail_address(address: &str) -> Result<(), NotifyError> {
    address
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| NotifyError::InvalidAddress {
            channel: "mail".into(),
            value: address.to_string(),
        })
}

/// Check a Slack target: `#channel` or `@user`.
pub fn validate_slack_target(target: &str) -> Result<(), NotifyError> {
    if SLACK_TARGET.is_match(target) {
        Ok(())
    } else {
        Err(NotifyError::InvalidAddress {
            channel: "slack".into(),
            value: target.to_string(),
        })
    }
}
