use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a monitored source.
pub type Topic = String;

/// A single unit of content discovered on a topic.
///
/// Everything the source reports beyond `id` and `title` is kept verbatim in
/// `metadata`. Detected tags are filled in by the tag matcher before the item
/// is persisted and dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub topic: Topic,
    #[serde(default)]
    pub global_tags: Vec<String>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>, topic: impl Into<Topic>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            topic: topic.into(),
            global_tags: Vec::new(),
            topic_tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Look up a metadata field as a string.
    pub fn meta_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(Value::as_str)
    }

    /// Serialized form persisted by the dedup store.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// One event per detected tag, global tags first, each group in token order.
    pub fn tag_events(self: &Arc<Self>) -> Vec<TagEvent> {
        let global = self
            .global_tags
            .iter()
            .map(|tag| TagEvent::new(tag.clone(), TagScope::Global, Arc::clone(self)));
        let topic = self
            .topic_tags
            .iter()
            .map(|tag| TagEvent::new(tag.clone(), TagScope::Topic, Arc::clone(self)));
        global.chain(topic).collect()
    }
}

/// Where a tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagScope {
    /// Matched the global vocabulary.
    Global,
    /// Matched the vocabulary of the item's topic.
    Topic,
}

impl fmt::Display for TagScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Topic => f.write_str("topic"),
        }
    }
}

/// A matched tag together with the item it was found in.
#[derive(Debug, Clone, Serialize)]
pub struct TagEvent {
    pub tag: String,
    pub scope: TagScope,
    pub item: Arc<Item>,
}

impl TagEvent {
    pub fn new(tag: impl Into<String>, scope: TagScope, item: Arc<Item>) -> Self {
        Self {
            tag: tag.into(),
            scope,
            item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trips_through_flatten() {
        let raw = r#"{"id":"abc","title":"Hello","author":"ferris","score":12}"#;
        let item: Item = serde_json::from_str(raw).unwrap();

        assert_eq!(item.id, "abc");
        assert_eq!(item.meta_str("author"), Some("ferris"));
        assert_eq!(item.metadata.get("score"), Some(&Value::from(12)));
        assert!(item.global_tags.is_empty());

        let bytes = item.to_bytes().unwrap();
        let back: Item = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_tag_events_order_and_scope() {
        let mut item = Item::new("1", "rust release spacex", "rust");
        item.global_tags = vec!["spacex".into()];
        item.topic_tags = vec!["rust".into(), "release".into()];
        let item = Arc::new(item);

        let events = item.tag_events();
        let summary: Vec<(&str, TagScope)> =
            events.iter().map(|e| (e.tag.as_str(), e.scope)).collect();

        assert_eq!(
            summary,
            vec![
                ("spacex", TagScope::Global),
                ("rust", TagScope::Topic),
                ("release", TagScope::Topic),
            ]
        );
        assert!(events.iter().all(|e| Arc::ptr_eq(&e.item, &item)));
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(TagScope::Global.to_string(), "global");
        assert_eq!(TagScope::Topic.to_string(), "topic");
    }
}
