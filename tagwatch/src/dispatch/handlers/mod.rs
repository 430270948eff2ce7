//! Built-in handlers.
//!
//! - [`LogHandler`]: writes every event to the log
//! - [`WebhookHandler`]: POSTs items and tags to an HTTP endpoint

mod logger;
mod webhook;

pub use logger::LogHandler;
pub use webhook::{WebhookConfig, WebhookHandler};
