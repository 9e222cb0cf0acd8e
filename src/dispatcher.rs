//! The notifier: picks an adapter, checks the enable flags, and drives the
//! bounded retry loop.
//!
//! A dispatch moves through `Idle → Sending → {Success, Retrying → Sending,
//! Exhausted}`, or stops at `Disabled` before any attempt when the channel is
//! switched off and the call is not forced.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::adapters::{Adapter, AdapterRegistry};
use crate::config::NotifyConfig;
use crate::content::Content;
use crate::error::{NotifyError, Result, TransportError};
use crate::options::{OptionSet, RequestFields};

/// Receives every failed delivery attempt.
pub trait FailureLog: Send + Sync {
    fn log(&self, channel: &str, attempt: u32, error: &TransportError);
}

/// Logs failed attempts through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureLog;

impl FailureLog for TracingFailureLog {
    fn log(&self, channel: &str, attempt: u32, error: &TransportError) {
        tracing::warn!(
            channel = %channel,
            attempt,
            code = error.code(),
            error = %error,
            "Notification attempt failed"
        );
    }
}

/// Sends notifications through the active adapter.
///
/// A single dispatch holds `&mut self` for its whole duration, retry waits
/// included. Use one `Notifier` per concurrent caller.
pub struct Notifier {
    config: Arc<NotifyConfig>,
    registry: AdapterRegistry,
    adapter: Box<dyn Adapter>,
    /// Options every new adapter starts from (request fields).
    base_options: OptionSet,
    failure_log: Arc<dyn FailureLog>,
}

impl Notifier {
    /// Build a notifier using `config.default_adapter`.
    pub fn new(config: NotifyConfig, registry: AdapterRegistry) -> Result<Self> {
        let name = config.default_adapter.clone();
        Self::build(config, registry, &name, true)
    }

    /// Build a notifier starting on the named adapter.
    pub fn with_adapter(config: NotifyConfig, registry: AdapterRegistry, name: &str) -> Result<Self> {
        Self::build(config, registry, name, false)
    }

    fn build(config: NotifyConfig, registry: AdapterRegistry, name: &str, default: bool) -> Result<Self> {
        let base_options = OptionSet::new();
        let adapter = registry
            .create(name, &config, &base_options)
            .ok_or_else(|| NotifyError::UnknownAdapter {
                name: name.to_string(),
                default,
            })?;

        tracing::debug!(adapter = adapter.name(), "Notifier ready");

        Ok(Self {
            config: Arc::new(config),
            registry,
            adapter,
            base_options,
            failure_log: Arc::new(TracingFailureLog),
        })
    }

    pub fn with_failure_log(mut self, failure_log: Arc<dyn FailureLog>) -> Self {
        self.failure_log = failure_log;
        self
    }

    /// Attach request context to every report sent from now on.
    ///
    /// Rebuilds the active adapter so its defaults carry the fields; earlier
    /// `set_to` / `set_from` changes are discarded.
    pub fn with_request_fields(mut self, fields: RequestFields) -> Self {
        self.base_options.fields = Some(fields);
        let name = self.adapter.name().to_string();
        if let Some(adapter) = self.registry.create(&name, &self.config, &self.base_options) {
            self.adapter = adapter;
        }
        self
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn adapter_mut(&mut self) -> &mut dyn Adapter {
        self.adapter.as_mut()
    }

    /// Replace the active adapter with a fresh one built from config.
    pub fn set_adapter(&mut self, name: &str) -> Result<()> {
        self.adapter = self.create_adapter(name)?;
        Ok(())
    }

    pub fn set_to(&mut self, address: &str) -> Result<()> {
        self.adapter.set_to(address)
    }

    pub fn set_from(&mut self, name: &str) {
        self.adapter.set_from(name);
    }

    /// Send regardless of the channel's enable flag.
    pub async fn force(
        &mut self,
        content: impl Into<Content>,
        options: OptionSet,
        channel: Option<&str>,
    ) -> Result<bool> {
        self.send(content, options.force(true), channel).await
    }

    /// Send `content`, retrying transport failures.
    ///
    /// Returns `Ok(true)` once delivered and `Ok(false)` if the channel is
    /// disabled and `options.force` is not set. Invalid recipients, unknown
    /// channels and missing settings fail without retrying; other transport
    /// failures fail with `AllAttemptsFailed` once the attempt budget is spent.
    pub async fn send(
        &mut self,
        content: impl Into<Content>,
        options: OptionSet,
        channel: Option<&str>,
    ) -> Result<bool> {
        let content = content.into();
        let dispatch_id = Uuid::new_v4();

        if let Some(name) = channel
            && !name.eq_ignore_ascii_case(self.adapter.name())
        {
            self.adapter = self.create_adapter(name)?;
        }

        let span = tracing::debug_span!(
            "dispatch",
            id = %dispatch_id,
            channel = %self.adapter.name()
        );
        self.dispatch(content, options).instrument(span).await
    }

    async fn dispatch(&mut self, content: Content, options: OptionSet) -> Result<bool> {
        let channel = self.adapter.name().to_string();

        if !options.is_forced() && !self.config.is_enabled(&channel) {
            tracing::debug!("Channel disabled, skipping notification");
            return Ok(false);
        }

        let content = content.normalize();
        let max_attempts = options
            .max_retry
            .unwrap_or(self.config.retry.max_attempts)
            .max(1);
        let options = self.adapter.resolve_options(options)?;

        let mut attempt = 0;
        loop {
            tracing::debug!(attempt = attempt + 1, max_attempts, "Sending notification");
            match self.attempt(&content, &options).await {
                Ok(()) => {
                    tracing::info!(attempts = attempt + 1, "Notification delivered");
                    self.adapter.after_delivery().await;
                    return Ok(true);
                }
                Err(err) => {
                    attempt += 1;
                    self.failure_log.log(&channel, attempt, &err);
                    if !err.is_retryable() {
                        tracing::error!(error = %err, "Notification cannot be delivered");
                        return Err(NotifyError::Undeliverable {
                            channel,
                            source: err,
                        });
                    }
                    if attempt >= max_attempts {
                        tracing::error!(max_attempts, error = %err, "All notification attempts failed");
                        return Err(NotifyError::AllAttemptsFailed {
                            channel,
                            max_attempts,
                            source: err,
                        });
                    }
                    if !self.config.retry.backoff.is_zero() {
                        tokio::time::sleep(self.config.retry.backoff).await;
                    }
                }
            }
        }
    }

    /// One delivery, bounded by the configured deadline if any. The deadline
    /// does not cover [`Adapter::after_delivery`].
    async fn attempt(&self, content: &Content, options: &OptionSet) -> std::result::Result<(), TransportError> {
        let delivery = self.adapter.deliver(content, options);
        match self.config.retry.delivery_timeout {
            Some(timeout) => tokio::time::timeout(timeout, delivery)
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::TimedOut {
                        transport: self.adapter.name().to_string(),
                        timeout,
                    })
                }),
            None => delivery.await,
        }
    }

    fn create_adapter(&self, name: &str) -> Result<Box<dyn Adapter>> {
        self.registry
            .create(name, &self.config, &self.base_options)
            .ok_or_else(|| NotifyError::UnknownAdapter {
                name: name.to_string(),
                default: false,
            })
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("adapter", &self.adapter.name())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::adapters::testing::Recorder;
    use crate::config::RetryPolicy;
    use crate::transport::{MailEnvelope, SlackEnvelope};

    struct Harness {
        mail: Arc<Recorder<MailEnvelope>>,
        slack: Arc<Recorder<SlackEnvelope>>,
    }

    impl Harness {
        fn new(mail_failures: u32, slack_failures: u32) -> Self {
            Self {
                mail: Arc::new(Recorder::failing(mail_failures)),
                slack: Arc::new(Recorder::failing(slack_failures)),
            }
        }

        fn registry(&self) -> AdapterRegistry {
            AdapterRegistry::standard(self.mail.clone(), self.slack.clone())
        }
    }

    fn config() -> NotifyConfig {
        let mut config = NotifyConfig::default();
        config.set_enabled("slack", true);
        config.set_enabled("mail", true);
        config.mail.to = Some("ops@example.com".into());
        config.mail.from_address = "bot@example.com".into();
        config.slack.channel = Some("#alerts".into());
        config.slack.send_interval = Duration::ZERO;
        config.retry = RetryPolicy::immediate(3);
        config
    }

    #[derive(Default)]
    struct CountingLog(Mutex<Vec<u32>>);

    impl FailureLog for CountingLog {
        fn log(&self, _channel: &str, attempt: u32, _error: &TransportError) {
            self.0.lock().unwrap().push(attempt);
        }
    }

    #[test]
    fn unknown_default_adapter_is_flagged() {
        let harness = Harness::new(0, 0);
        let mut cfg = config();
        cfg.default_adapter = "pager".into();
        let err = Notifier::new(cfg, harness.registry()).unwrap_err();
        assert!(matches!(err, NotifyError::UnknownAdapter { default: true, .. }));
    }

    #[test]
    fn set_adapter_switches_channel() {
        let harness = Harness::new(0, 0);
        let mut notifier = Notifier::new(config(), harness.registry()).unwrap();
        assert_eq!(notifier.adapter_name(), "slack");
        notifier.set_adapter("mail").unwrap();
        assert_eq!(notifier.adapter_name(), "mail");
        let err = notifier.set_adapter("fax").unwrap_err();
        assert!(matches!(err, NotifyError::UnknownAdapter { default: false, .. }));
        assert_eq!(notifier.adapter_name(), "mail");
    }

    #[tokio::test]
    async fn failures_are_logged_per_attempt() {
        let harness = Harness::new(0, 2);
        let log = Arc::new(CountingLog::default());
        let mut notifier = Notifier::new(config(), harness.registry())
            .unwrap()
            .with_failure_log(log.clone());

        assert!(notifier.send("x", OptionSet::new(), None).await.unwrap());
        assert_eq!(*log.0.lock().unwrap(), vec![1, 2]);
        assert_eq!(harness.slack.attempts(), 3);
    }

    #[tokio::test]
    async fn max_retry_zero_still_attempts_once() {
        let harness = Harness::new(0, 5);
        let mut notifier = Notifier::new(config(), harness.registry()).unwrap();
        let err = notifier
            .send("x", OptionSet::new().max_retry(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::AllAttemptsFailed { max_attempts: 1, .. }));
        assert_eq!(harness.slack.attempts(), 1);
    }

    #[tokio::test]
    async fn same_channel_override_keeps_adapter_state() {
        let harness = Harness::new(0, 0);
        let mut notifier = Notifier::new(config(), harness.registry()).unwrap();
        notifier.set_to("#deploys").unwrap();
        notifier.send("x", OptionSet::new(), Some("Slack")).await.unwrap();
        assert_eq!(harness.slack.sent.lock().unwrap()[0].to, "#deploys");
    }

    #[tokio::test]
    async fn request_fields_reach_reports() {
        let harness = Harness::new(0, 0);
        let mut notifier = Notifier::with_adapter(config(), harness.registry(), "mail")
            .unwrap()
            .with_request_fields(RequestFields::new("UA", "/orders").with_ip("9.9.9.9"));
        let report = crate::content::ErrorReport::new("E", "f.rs", 1, "t", "");
        notifier.send(report, OptionSet::new(), None).await.unwrap();
        let sent = harness.mail.sent.lock().unwrap();
        assert_eq!(sent[0].body.ip_address.as_deref(), Some("9.9.9.9"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_delivery_times_out_and_counts_as_failure() {
        struct Hang;

        #[async_trait::async_trait]
        impl crate::transport::SlackTransport for Hang {
            fn name(&self) -> &str {
                "hang"
            }

            async fn deliver(&self, _envelope: SlackEnvelope) -> std::result::Result<(), TransportError> {
                std::future::pending().await
            }
        }

        let mut cfg = config();
        cfg.retry = RetryPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
            delivery_timeout: Some(Duration::from_secs(5)),
        };
        let registry = AdapterRegistry::standard(Arc::new(Recorder::<MailEnvelope>::default()), Arc::new(Hang));
        let mut notifier = Notifier::new(cfg, registry).unwrap();

        let err = notifier.send("x", OptionSet::new(), None).await.unwrap_err();
        match err {
            NotifyError::AllAttemptsFailed { source, .. } => {
                assert!(matches!(source, TransportError::TimedOut { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_transport_settings_stop_after_one_attempt() {
        let mut cfg = config();
        cfg.retry = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
            delivery_timeout: None,
        };
        let log = Arc::new(CountingLog::default());
        let registry = AdapterRegistry::standard(
            Arc::new(Recorder::<MailEnvelope>::default()),
            Arc::new(crate::transport::Unconfigured::new("slack-webhook", "SLACK_WEBHOOK_URL")),
        );
        let mut notifier = Notifier::new(cfg, registry).unwrap().with_failure_log(log.clone());

        let started = tokio::time::Instant::now();
        let err = notifier.send("x", OptionSet::new(), None).await.unwrap_err();

        assert!(matches!(
            err,
            NotifyError::Undeliverable { source: TransportError::NotConfigured { .. }, .. }
        ));
        assert!(err.to_string().contains("SLACK_WEBHOOK_URL"));
        assert_eq!(*log.0.lock().unwrap(), vec![1]);
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
