//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// `Fetch`, `Parse` and `Storage` abort a single poll of one topic and are
/// broadcast to failers. `Config` is fatal at startup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error for topic {topic}: {reason}")]
    Fetch { topic: String, reason: String },

    #[error("Parse error for topic {topic}: {reason}")]
    Parse { topic: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] kv_store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Handler {handler} failed: {reason}")]
    Handler { handler: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn fetch(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the per-poll pipeline (fetch, parse, storage).
    pub fn is_pipeline_error(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Parse { .. } | Self::Storage(_) | Self::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_classification() {
        assert!(Error::fetch("rust", "timeout").is_pipeline_error());
        assert!(Error::parse("rust", "bad json").is_pipeline_error());
        assert!(Error::Storage(kv_store::StoreError::backend("down")).is_pipeline_error());
        assert!(!Error::config("no topics").is_pipeline_error());
        assert!(!Error::handler("webhook", "503").is_pipeline_error());
    }

    #[test]
    fn test_display_includes_topic() {
        let err = Error::fetch("spacex", "connection refused");
        assert_eq!(
            err.to_string(),
            "Fetch error for topic spacex: connection refused"
        );
    }
}
