//! Notify Relay: operational notifications over mail or Slack.
//!
//! A [`Notifier`] owns one active channel [`Adapter`](adapters::Adapter),
//! resolves per-call options against that adapter's defaults, renders the
//! content for the channel, and retries failed deliveries a bounded number of
//! times before giving up.

pub mod adapters;
pub mod config;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod options;
pub mod render;
pub mod transport;

pub use adapters::{Adapter, AdapterRegistry};
pub use config::NotifyConfig;
pub use content::{Content, ErrorReport};
pub use dispatcher::{FailureLog, Notifier, TracingFailureLog};
pub use error::{NotifyError, TransportError};
pub use options::{OptionSet, RequestFields};
