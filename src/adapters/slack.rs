//! Slack adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::Adapter;
use crate::config::NotifyConfig;
use crate::content::Content;
use crate::error::{NotifyError, TransportError};
use crate::options::{OptionSet, validate_slack_target};
use crate::render::render_slack;
use crate::transport::{SlackEnvelope, SlackTransport};

/// Sends notifications to a Slack channel or user.
pub struct SlackAdapter {
    options: OptionSet,
    /// Pause after each successful send.
    send_interval: Duration,
    transport: Arc<dyn SlackTransport>,
}

impl SlackAdapter {
    pub fn new(config: &NotifyConfig, base: OptionSet, transport: Arc<dyn SlackTransport>) -> Self {
        let options = OptionSet {
            to: config.slack.channel.clone(),
            from: config.slack.username.clone(),
            icon: config.slack.icon.clone(),
            mention: config.slack.mention.clone(),
            ..base
        };
        Self {
            options,
            send_interval: config.slack.send_interval,
            transport,
        }
    }

    /// Icon emoji (`:robot_face:`) or image URL.
    pub fn set_icon(&mut self, icon: &str) {
        self.options.icon = Some(icon.to_string());
    }

    fn envelope(&self, content: &Content, options: &OptionSet) -> Result<SlackEnvelope, TransportError> {
        let to = options.to.clone().ok_or_else(|| TransportError::NotConfigured {
            transport: self.transport.name().to_string(),
            key: "to".into(),
        })?;
        Ok(SlackEnvelope {
            to,
            from: options.from.clone(),
            icon: options.icon.clone(),
            message: render_slack(content, options),
            link_names: true,
            endpoint: options.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Adapter for SlackAdapter {
    fn name(&self) -> &str {
        "slack"
    }

    fn defaults(&self) -> &OptionSet {
        &self.options
    }

    fn set_to(&mut self, channel: &str) -> Result<(), NotifyError> {
        validate_slack_target(channel)?;
        self.options.to = Some(channel.to_string());
        Ok(())
    }

    fn set_from(&mut self, username: &str) {
        self.options.from = Some(username.to_string());
    }

    async fn deliver(&self, content: &Content, options: &OptionSet) -> Result<(), TransportError> {
        let envelope = self.envelope(content, options)?;
        tracing::debug!(transport = self.transport.name(), to = %envelope.to, "Delivering Slack message");
        self.transport.deliver(envelope).await
    }

    /// Slack accepts about one message per second.
    async fn after_delivery(&self) {
        if !self.send_interval.is_zero() {
            tokio::time::sleep(self.send_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::Recorder;
    use crate::content::ErrorReport;
    use crate::options::RequestFields;

    fn config(interval: Duration) -> NotifyConfig {
        let mut config = NotifyConfig::default();
        config.slack.channel = Some("#alerts".into());
        config.slack.username = Some("notify-bot".into());
        config.slack.icon = Some(":robot_face:".into());
        config.slack.send_interval = interval;
        config
    }

    fn adapter(interval: Duration) -> (SlackAdapter, Arc<Recorder<SlackEnvelope>>) {
        let transport = Arc::new(Recorder::<SlackEnvelope>::default());
        let adapter = SlackAdapter::new(&config(interval), OptionSet::new(), transport.clone());
        (adapter, transport)
    }

    #[test]
    fn set_to_requires_channel_or_user_prefix() {
        let (mut adapter, _) = adapter(Duration::ZERO);
        assert!(adapter.set_to("@alice").is_ok());
        assert_eq!(adapter.defaults().to.as_deref(), Some("@alice"));

        let err = adapter.set_to("general").unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress { ref value, .. } if value == "general"));
        assert_eq!(adapter.defaults().to.as_deref(), Some("@alice"));
    }

    #[test]
    fn setters_update_defaults() {
        let (mut adapter, _) = adapter(Duration::ZERO);
        adapter.set_from("deploy-bot");
        adapter.set_icon("https://example.com/icon.png");
        assert_eq!(adapter.defaults().from.as_deref(), Some("deploy-bot"));
        assert_eq!(
            adapter.defaults().icon.as_deref(),
            Some("https://example.com/icon.png")
        );
    }

    #[tokio::test]
    async fn deliver_wraps_text_and_links_names() {
        let (adapter, transport) = adapter(Duration::ZERO);
        let options = adapter.defaults().clone();
        adapter.deliver(&Content::from("hello"), &options).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let env = &sent[0];
        assert_eq!(env.to, "#alerts");
        assert_eq!(env.from.as_deref(), Some("notify-bot"));
        assert_eq!(env.icon.as_deref(), Some(":robot_face:"));
        assert_eq!(env.message.text, "```hello```");
        assert!(env.link_names);
    }

    #[tokio::test]
    async fn deliver_report_attaches_trace() {
        let (mut adapter, transport) = adapter(Duration::ZERO);
        let options = adapter
            .resolve_options(OptionSet::new().fields(RequestFields::new("UA", "/checkout")))
            .unwrap();
        let report = ErrorReport::new("Timeout", "src/pay.rs", 12, "gateway timeout", "#0 gateway timeout");
        adapter.deliver(&Content::from(report), &options).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let att = &sent[0].message.attachments[0];
        assert_eq!(att.title, "gateway timeout");
        assert_eq!(att.fields[1].value, "/checkout");
    }

    #[tokio::test]
    async fn endpoint_override_reaches_envelope() {
        let (mut adapter, transport) = adapter(Duration::ZERO);
        let options = adapter
            .resolve_options(OptionSet::new().endpoint("https://hooks.slack.test/ops"))
            .unwrap();
        adapter.deliver(&Content::from("x"), &options).await.unwrap();
        assert_eq!(
            transport.sent.lock().unwrap()[0].endpoint.as_deref(),
            Some("https://hooks.slack.test/ops")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_itself_does_not_pause() {
        let (adapter, transport) = adapter(Duration::from_secs(1));
        let options = adapter.defaults().clone();
        let started = tokio::time::Instant::now();
        adapter.deliver(&Content::from("x"), &options).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn after_delivery_waits_send_interval() {
        let (adapter, _) = adapter(Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        adapter.after_delivery().await;
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
