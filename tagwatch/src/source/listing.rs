use serde::Deserialize;
use serde_json::{Map, Value};

use super::Parser;
use crate::domain::Item;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Map<String, Value>,
}

/// Parses `{"data": {"children": [{"data": {...}}]}}` listings.
///
/// Each post needs a string `id` and `title`; every other field is kept as
/// item metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListingParser;

impl ListingParser {
    pub fn new() -> Self {
        Self
    }

    fn take_string(topic: &str, post: &mut Map<String, Value>, field: &str) -> Result<String> {
        match post.remove(field) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(Error::parse(
                topic,
                format!("field '{field}' is not a string: {other}"),
            )),
            None => Err(Error::parse(topic, format!("post is missing '{field}'"))),
        }
    }
}

impl Parser for ListingParser {
    fn parse(&self, topic: &str, payload: &[u8]) -> Result<Vec<Item>> {
        let listing: Listing = serde_json::from_slice(payload)
            .map_err(|e| Error::parse(topic, format!("unexpected listing shape: {e}")))?;

        listing
            .data
            .children
            .into_iter()
            .map(|child| {
                let mut post = child.data;
                let id = Self::take_string(topic, &mut post, "id")?;
                let title = Self::take_string(topic, &mut post, "title")?;

                let mut item = Item::new(id, title, topic);
                item.metadata = post;
                Ok(item)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "modhash": "",
            "children": [
                {"kind": "t3", "data": {"id": "a1", "title": "First", "author": "ferris", "score": 3}},
                {"kind": "t3", "data": {"id": "b2", "title": "Second", "over_18": false}}
            ]
        }
    }"#;

    #[test]
    fn test_parse_listing() {
        let items = ListingParser::new().parse("rust", LISTING.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a1");
        assert_eq!(items[0].title, "First");
        assert_eq!(items[0].topic, "rust");
        assert_eq!(items[0].meta_str("author"), Some("ferris"));
        assert!(!items[0].metadata.contains_key("id"));
        assert_eq!(items[1].metadata.get("over_18"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_empty_listing() {
        let items = ListingParser::new()
            .parse("rust", br#"{"data": {"children": []}}"#)
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_parse_error() {
        let err = ListingParser::new().parse("rust", b"<html>").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        let err = ListingParser::new()
            .parse("rust", br#"{"error": 404}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_post_without_title_is_parse_error() {
        let err = ListingParser::new()
            .parse("rust", br#"{"data": {"children": [{"data": {"id": "x"}}]}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
