//! Webhook handler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::dispatch::{AnyTagHandler, HandlerRegistration, ItemHandler};
use crate::domain::{Item, TagEvent};
use crate::{Error, Result};

/// Webhook handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Custom headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            headers: BTreeMap::new(),
            timeout_secs: default_timeout(),
        }
    }
}

/// POSTs a JSON document for every item and every matched tag.
pub struct WebhookHandler {
    url: url::Url,
    headers: HeaderMap,
    client: Client,
}

impl WebhookHandler {
    /// Build the handler. An unparsable URL or header is a configuration error.
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let url = url::Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid webhook url '{}': {}", config.url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build webhook client: {}", e)))?;

        Ok(Self {
            url,
            headers: Self::build_headers(config)?,
            client,
        })
    }

    fn build_headers(config: &WebhookConfig) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        for (name, value) in &config.headers {
            let name = name
                .parse::<HeaderName>()
                .map_err(|e| Error::config(format!("invalid webhook header '{}': {}", name, e)))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| Error::config(format!("invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        if let Some(token) = &config.bearer_token {
            let value = format!("Bearer {}", token)
                .parse::<HeaderValue>()
                .map_err(|e| Error::config(format!("invalid webhook bearer token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    fn item_payload(item: &Item) -> serde_json::Value {
        json!({
            "event_type": "item",
            "topic": item.topic,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "item": item,
        })
    }

    fn tag_payload(event: &TagEvent) -> serde_json::Value {
        json!({
            "event_type": "tag",
            "tag": event.tag,
            "scope": event.scope,
            "topic": event.item.topic,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "item": event.item,
        })
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::handler("webhook", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(url = %self.url, %status, "Webhook rejected event");
            return Err(Error::handler(
                "webhook",
                format!("{} - {}", status, body),
            ));
        }

        debug!(url = %self.url, "Webhook event sent");
        Ok(())
    }
}

#[async_trait]
impl ItemHandler for WebhookHandler {
    async fn on_item(&self, item: Arc<Item>) -> Result<()> {
        self.post(&Self::item_payload(&item)).await
    }
}

#[async_trait]
impl AnyTagHandler for WebhookHandler {
    async fn on_any_tag(&self, event: TagEvent) -> Result<()> {
        self.post(&Self::tag_payload(&event)).await
    }
}

impl From<Arc<WebhookHandler>> for HandlerRegistration {
    fn from(handler: Arc<WebhookHandler>) -> Self {
        HandlerRegistration::new(format!("webhook:{}", handler.url.host_str().unwrap_or("-")))
            .item(handler.clone())
            .any_tag(handler)
    }
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, HandlerCounts};
    use crate::domain::TagScope;

    #[test]
    fn test_headers_include_bearer_and_custom() {
        let mut config = WebhookConfig::new("https://example.com/hook");
        config.bearer_token = Some("secret".into());
        config.headers.insert("X-Source".into(), "tagwatch".into());

        let handler = WebhookHandler::new(&config).unwrap();

        assert_eq!(handler.headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert_eq!(handler.headers.get("x-source").unwrap(), "tagwatch");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            WebhookHandler::new(&WebhookConfig::new("not a url")),
            Err(Error::Config(_))
        ));

        let mut config = WebhookConfig::new("https://example.com/hook");
        config.headers.insert("bad header".into(), "x".into());
        assert!(matches!(WebhookHandler::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_tag_payload_shape() {
        let mut item = Item::new("t3_1", "SpaceX launch", "space");
        item.global_tags = vec!["spacex".into()];
        let event = TagEvent::new("spacex", TagScope::Global, Arc::new(item));

        let payload = WebhookHandler::tag_payload(&event);

        assert_eq!(payload["event_type"], "tag");
        assert_eq!(payload["tag"], "spacex");
        assert_eq!(payload["scope"], "global");
        assert_eq!(payload["item"]["id"], "t3_1");
        assert_eq!(payload["item"]["global_tags"][0], "spacex");
    }

    #[test]
    fn test_registration_covers_item_and_any_tag() {
        let handler =
            Arc::new(WebhookHandler::new(&WebhookConfig::new("https://example.com/hook")).unwrap());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(handler).unwrap();

        assert_eq!(
            dispatcher.handler_counts(),
            HandlerCounts {
                items: 1,
                any_tags: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_handler_error() {
        let mut config = WebhookConfig::new("http://127.0.0.1:9/hook");
        config.timeout_secs = 1;
        let handler = WebhookHandler::new(&config).unwrap();

        let err = handler
            .on_item(Arc::new(Item::new("1", "x", "rust")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handler { .. }));
    }
}
