//! tagwatch library crate.
//!
//! Polls a fixed set of topics under a global rate budget, detects items that
//! have not been seen before, matches configured tags against their titles and
//! fans the results out to registered handlers.

pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod source;
pub mod tags;

pub use config::MonitorConfig;
pub use dispatch::{Dispatcher, HandlerRegistration};
pub use error::{Error, Result};
pub use monitor::{Monitor, MonitorState};
