//! Title normalization and tag matching.
//!
//! A title is stripped of a fixed set of punctuation characters, split on
//! whitespace and lower-cased. Every resulting token is then tested for exact
//! membership in the global vocabulary and in the vocabulary of the item's
//! topic. Vocabulary entries go through the same normalization, so
//! `launch-party` in a vocabulary matches `launch-party` in a title (both
//! become `launchparty`).

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use tracing::warn;

/// Characters removed from titles and tags before matching.
pub const DEFAULT_STRIP_CHARS: &str = "'[](){}<>:,،、-._?\";/\\&@*";

/// Tokenizer shared by titles and vocabularies.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    strip: HashSet<char>,
}

impl Default for TagMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_STRIP_CHARS)
    }
}

impl TagMatcher {
    pub fn new(strip_chars: &str) -> Self {
        Self {
            strip: strip_chars.chars().collect(),
        }
    }

    fn strip(&self, input: &str) -> String {
        input.chars().filter(|c| !self.strip.contains(c)).collect()
    }

    /// Normalize a single vocabulary entry.
    pub fn normalize(&self, tag: &str) -> String {
        self.strip(tag).trim().to_lowercase()
    }

    /// Normalized tokens of a title, in order.
    pub fn tokens(&self, title: &str) -> Vec<String> {
        self.strip(title)
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }

    /// Match a title against both vocabularies.
    ///
    /// Matches keep token order and are not deduplicated: a token appearing
    /// twice yields the tag twice.
    pub fn match_title(&self, title: &str, global: &TagSet, topic: &TagSet) -> TagMatches {
        let mut matches = TagMatches::default();
        if global.is_empty() && topic.is_empty() {
            return matches;
        }

        for token in self.tokens(title) {
            if global.contains(&token) {
                matches.global.push(token.clone());
            }
            if topic.contains(&token) {
                matches.topic.push(token);
            }
        }

        matches
    }
}

/// Result of matching one title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMatches {
    pub global: Vec<String>,
    pub topic: Vec<String>,
}

/// A normalized vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(HashSet<String>);

static EMPTY_TAG_SET: LazyLock<TagSet> = LazyLock::new(TagSet::default);

impl TagSet {
    /// Normalize `tags` with `matcher`.
    ///
    /// Entries that are empty or still contain whitespace after normalization
    /// can never equal a single token; they are dropped with a warning.
    pub fn from_tags<I, S>(matcher: &TagMatcher, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for tag in tags {
            let raw = tag.as_ref();
            let normalized = matcher.normalize(raw);
            if normalized.is_empty() || normalized.contains(char::is_whitespace) {
                warn!(tag = %raw, "Tag can never match a single title token, ignoring");
                continue;
            }
            set.insert(normalized);
        }
        Self(set)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Global and per-topic vocabularies, normalized once at startup.
#[derive(Debug, Clone, Default)]
pub struct TagVocabulary {
    global: TagSet,
    topics: HashMap<String, TagSet>,
}

impl TagVocabulary {
    pub fn new(
        matcher: &TagMatcher,
        global_tags: &[String],
        topic_tags: &HashMap<String, Vec<String>>,
    ) -> Self {
        let topics = topic_tags
            .iter()
            .map(|(topic, tags)| (topic.to_lowercase(), TagSet::from_tags(matcher, tags)))
            .collect();

        Self {
            global: TagSet::from_tags(matcher, global_tags),
            topics,
        }
    }

    pub fn global(&self) -> &TagSet {
        &self.global
    }

    /// Vocabulary for a topic. Topic names compare case-insensitively.
    pub fn for_topic(&self, topic: &str) -> &TagSet {
        self.topics
            .get(&topic.to_lowercase())
            .unwrap_or(&EMPTY_TAG_SET)
    }
}
