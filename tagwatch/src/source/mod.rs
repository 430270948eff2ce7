//! Remote payload retrieval and parsing.

mod http;
mod listing;

pub use http::{DEFAULT_SOURCE_URL, HttpFetcher, HttpFetcherConfig};
pub use listing::ListingParser;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::domain::Item;

/// Retrieves the raw payload for a topic.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current payload. Failures are [`Error::Fetch`](crate::Error::Fetch).
    async fn fetch(&self, topic: &str) -> Result<Bytes>;
}

/// Turns a raw payload into items.
pub trait Parser: Send + Sync {
    /// Parse a payload fetched for `topic`. Failures are
    /// [`Error::Parse`](crate::Error::Parse).
    fn parse(&self, topic: &str, payload: &[u8]) -> Result<Vec<Item>>;
}
