//! Channel adapters and the registry that builds them by name.

pub mod mail;
pub mod slack;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::NotifyConfig;
use crate::content::Content;
use crate::error::{NotifyError, TransportError};
use crate::options::{OptionSet, merge};
use crate::transport::{MailTransport, SlackTransport};

pub use mail::MailAdapter;
pub use slack::SlackAdapter;

/// Policy object bound to one delivery channel.
///
/// An adapter owns its default options and mutates them in place through
/// [`set_to`](Adapter::set_to) / [`set_from`](Adapter::set_from); do not share
/// one instance between concurrent callers.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Channel name (`"mail"`, `"slack"`).
    fn name(&self) -> &str;

    /// Persisted defaults used to fill options a caller leaves out.
    fn defaults(&self) -> &OptionSet;

    /// Validate and persist a new default recipient.
    fn set_to(&mut self, address: &str) -> Result<(), NotifyError>;

    /// Persist a new default sender display name.
    fn set_from(&mut self, name: &str);

    /// Apply a caller's options: a `to` goes through [`set_to`](Adapter::set_to)
    /// first, then everything else is merged onto the defaults.
    ///
    /// Fails with `InvalidAddress` if no recipient is known after the merge,
    /// or with whatever [`check_ready`](Adapter::check_ready) reports.
    fn resolve_options(&mut self, caller: OptionSet) -> Result<OptionSet, NotifyError> {
        if let Some(to) = caller.to.as_deref() {
            self.set_to(to)?;
        }
        let resolved = merge(caller, self.defaults());
        if resolved.to.is_none() {
            return Err(NotifyError::InvalidAddress {
                channel: self.name().to_string(),
                value: String::new(),
            });
        }
        self.check_ready()?;
        Ok(resolved)
    }

    /// Settings the adapter needs besides a recipient.
    fn check_ready(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    /// Render `content` and hand it to the transport. `options` must already
    /// be resolved.
    async fn deliver(&self, content: &Content, options: &OptionSet) -> Result<(), TransportError>;

    /// Runs once after a successful [`deliver`](Adapter::deliver), outside
    /// any delivery deadline.
    async fn after_delivery(&self) {}
}

/// Builds an adapter from the config and the notifier's base options.
pub type AdapterFactory = Arc<dyn Fn(&NotifyConfig, &OptionSet) -> Box<dyn Adapter> + Send + Sync>;

/// Explicit channel-name → factory map.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `mail` and `slack` adapters bound to the given
    /// transports.
    pub fn standard(mail: Arc<dyn MailTransport>, slack: Arc<dyn SlackTransport>) -> Self {
        let mut registry = Self::new();
        registry.register("mail", move |config, base| {
            Box::new(MailAdapter::new(config, base.clone(), Arc::clone(&mail)))
        });
        registry.register("slack", move |config, base| {
            Box::new(SlackAdapter::new(config, base.clone(), Arc::clone(&slack)))
        });
        registry
    }

    /// Register (or replace) the factory for `name`. Names are case-insensitive.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&NotifyConfig, &OptionSet) -> Box<dyn Adapter> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_lowercase(), Arc::new(factory));
        tracing::debug!(adapter = %name, "Registered adapter");
    }

    /// Build the adapter registered under `name`, or `None` for an unknown name.
    pub fn create(
        &self,
        name: &str,
        config: &NotifyConfig,
        base: &OptionSet,
    ) -> Option<Box<dyn Adapter>> {
        self.factories
            .get(&name.to_lowercase())
            .map(|factory| factory(config, base))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}
