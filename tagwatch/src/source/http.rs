use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, trace};
use url::Url;

use super::Fetcher;
use crate::{Error, Result};

/// Listing endpoint polled when no template is configured.
pub const DEFAULT_SOURCE_URL: &str = "https://www.reddit.com/r/{topic}/new/.json";

const TOPIC_PLACEHOLDER: &str = "{topic}";

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// URL template; `{topic}` is replaced by the topic name.
    pub url_template: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_SOURCE_URL.to_string(),
            user_agent: concat!("tagwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Fetches topic payloads over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    url_template: String,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        if !config.url_template.contains(TOPIC_PLACEHOLDER) {
            return Err(Error::config(format!(
                "source url '{}' must contain {}",
                config.url_template, TOPIC_PLACEHOLDER
            )));
        }

        let client = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            url_template: config.url_template,
        })
    }

    /// The URL polled for `topic`. The topic is percent-encoded, so it always
    /// fills exactly the placeholder.
    pub fn url_for(&self, topic: &str) -> Result<Url> {
        let raw = self
            .url_template
            .replace(TOPIC_PLACEHOLDER, &urlencoding::encode(topic));
        Url::parse(&raw).map_err(|e| Error::fetch(topic, format!("invalid url {raw}: {e}")))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, topic: &str) -> Result<Bytes> {
        let url = self.url_for(topic)?;
        trace!(%url, "Fetching topic");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::fetch(topic, format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(topic, format!("{url} returned HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::fetch(topic, format!("failed to read body: {e}")))?;

        debug!(topic, bytes = body.len(), "Fetched topic");
        Ok(body)
    }
}
