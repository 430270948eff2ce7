use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::dedup::DedupStore;
use crate::dispatch::Dispatcher;
use crate::domain::Item;
use crate::source::{Fetcher, Parser};
use crate::tags::{TagMatcher, TagVocabulary};
use crate::{Error, Result};

/// Counters for a single poll of one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Items in the payload.
    pub fetched: usize,
    /// Items not seen before, persisted and dispatched.
    pub new_items: usize,
    /// Tag events dispatched.
    pub tags: usize,
}

/// Fetch, dedup, tag-match and dispatch for one topic.
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn Parser>,
    dedup: DedupStore,
    matcher: TagMatcher,
    vocabulary: TagVocabulary,
    dispatcher: Arc<Dispatcher>,
    /// Cancelled after a pipeline error when `exit_on_error` is set.
    exit_request: Option<CancellationToken>,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn Parser>,
        dedup: DedupStore,
        matcher: TagMatcher,
        vocabulary: TagVocabulary,
        dispatcher: Arc<Dispatcher>,
        exit_request: Option<CancellationToken>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            dedup,
            matcher,
            vocabulary,
            dispatcher,
            exit_request,
        }
    }

    /// Poll a topic and report any error to the failers.
    ///
    /// With an exit request token, the token is cancelled once the failers
    /// have run.
    pub async fn run(&self, topic: &str) {
        match self.poll(topic).await {
            Ok(outcome) => {
                if outcome.new_items > 0 {
                    debug!(
                        topic,
                        fetched = outcome.fetched,
                        new_items = outcome.new_items,
                        tags = outcome.tags,
                        "Poll finished"
                    );
                } else {
                    trace!(topic, fetched = outcome.fetched, "Poll finished, nothing new");
                }
            }
            Err(e) => self.report(topic, e),
        }
    }

    fn report(&self, topic: &str, e: Error) {
        warn!(topic, error = %e, "Poll failed");
        self.dispatcher.dispatch_error(&e);

        if let Some(exit_request) = &self.exit_request {
            error!(topic, "Requesting exit after pipeline error (exit_on_error is set)");
            exit_request.cancel();
        }
    }

    /// Poll a topic once. The first error aborts the rest of the poll; items
    /// already dispatched stay dispatched.
    pub async fn poll(&self, topic: &str) -> Result<PollOutcome> {
        let payload = self.fetcher.fetch(topic).await?;
        let items = self.parser.parse(topic, &payload)?;

        let mut outcome = PollOutcome {
            fetched: items.len(),
            ..Default::default()
        };

        for item in items {
            if self.dedup.has_seen(&item.id).await? {
                continue;
            }

            let item = self.tag(topic, item);
            let serialized = item.to_bytes()?;
            self.dedup.mark_seen(&item.id, &serialized).await?;

            outcome.new_items += 1;
            outcome.tags += item.global_tags.len() + item.topic_tags.len();
            self.dispatcher.dispatch(Arc::new(item));
        }

        Ok(outcome)
    }

    fn tag(&self, topic: &str, mut item: Item) -> Item {
        let matches = self.matcher.match_title(
            &item.title,
            self.vocabulary.global(),
            self.vocabulary.for_topic(topic),
        );
        item.global_tags = matches.global;
        item.topic_tags = matches.topic;
        item
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("dispatcher", &self.dispatcher)
            .field("exit_on_error", &self.exit_request.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::test_store::FaultyStore;
    use crate::dispatch::{Failer, ItemHandler};
    use async_trait::async_trait;
    use bytes::Bytes;
    use kv_store::MemoryStore;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct StaticFetcher(&'static str);

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _topic: &str) -> Result<Bytes> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }
    }

    struct DownFetcher;

    #[async_trait]
    impl Fetcher for DownFetcher {
        async fn fetch(&self, topic: &str) -> Result<Bytes> {
            Err(Error::fetch(topic, "connection refused"))
        }
    }

    #[derive(Default)]
    struct RecordingFailer(Mutex<Vec<String>>);

    impl Failer for RecordingFailer {
        fn fail(&self, error: &Error) {
            self.0.lock().push(error.to_string());
        }
    }

    struct ChannelHandler(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl ItemHandler for ChannelHandler {
        async fn on_item(&self, item: Arc<Item>) -> Result<()> {
            let _ = self.0.send(item.id.clone());
            Ok(())
        }
    }

    const PAYLOAD: &str = r#"{"data": {"children": [
        {"data": {"id": "a", "title": "SpaceX launch today"}},
        {"data": {"id": "b", "title": "Rust release notes"}}
    ]}}"#;

    fn pipeline(fetcher: Arc<dyn Fetcher>, dispatcher: Dispatcher) -> (Pipeline, DedupStore) {
        let dedup = DedupStore::new(Arc::new(MemoryStore::new()));
        let matcher = TagMatcher::default();
        let mut topic_tags = HashMap::new();
        topic_tags.insert("rust".to_string(), vec!["release".to_string()]);
        let vocabulary = TagVocabulary::new(&matcher, &["spacex".to_string()], &topic_tags);

        let pipeline = Pipeline::new(
            fetcher,
            Arc::new(crate::source::ListingParser::new()),
            dedup.clone(),
            matcher,
            vocabulary,
            Arc::new(dispatcher),
            None,
        );
        (pipeline, dedup)
    }

    #[tokio::test]
    async fn test_poll_persists_tagged_items() {
        let (pipeline, dedup) = pipeline(Arc::new(StaticFetcher(PAYLOAD)), Dispatcher::new());

        let outcome = pipeline.poll("rust").await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome {
                fetched: 2,
                new_items: 2,
                tags: 2,
            }
        );

        let stored = dedup.seen_payload("b").await.unwrap().unwrap();
        let item: Item = serde_json::from_slice(&stored).unwrap();
        assert_eq!(item.topic_tags, vec!["release"]);
        assert!(item.global_tags.is_empty());
    }

    #[tokio::test]
    async fn test_second_poll_finds_nothing_new() {
        let (pipeline, _) = pipeline(Arc::new(StaticFetcher(PAYLOAD)), Dispatcher::new());

        pipeline.poll("rust").await.unwrap();
        let outcome = pipeline.poll("rust").await.unwrap();

        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.new_items, 0);
    }

    #[tokio::test]
    async fn test_fetch_error_reaches_failers() {
        let failer = Arc::new(RecordingFailer::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_failer("recording", failer.clone());

        let (pipeline, _) = pipeline(Arc::new(DownFetcher), dispatcher);
        pipeline.run("rust").await;

        let errors = failer.0.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_parse_error_reaches_failers() {
        let failer = Arc::new(RecordingFailer::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_failer("recording", failer.clone());

        let (pipeline, _) = pipeline(Arc::new(StaticFetcher("not json")), dispatcher);
        pipeline.run("rust").await;

        assert!(failer.0.lock()[0].starts_with("Parse error for topic rust"));
    }

    #[tokio::test]
    async fn test_concurrent_polls_can_dispatch_the_same_item_twice() {
        const SINGLE: &str = r#"{"data": {"children": [
            {"data": {"id": "a", "title": "SpaceX launch today"}}
        ]}}"#;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_item_handler("channel", Arc::new(ChannelHandler(tx)));

        // Both dedup checks read the store before either poll marks the item.
        let dedup = DedupStore::new(Arc::new(FaultyStore::with_read_gate(2)));
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(SINGLE)),
            Arc::new(crate::source::ListingParser::new()),
            dedup.clone(),
            TagMatcher::default(),
            TagVocabulary::default(),
            Arc::new(dispatcher),
            None,
        );

        let (first, second) = tokio::join!(pipeline.poll("rust"), pipeline.poll("rust"));
        assert_eq!(first.unwrap().new_items, 1);
        assert_eq!(second.unwrap().new_items, 1);

        for _ in 0..2 {
            let id = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
                .await
                .expect("item handler did not run")
                .expect("channel closed");
            assert_eq!(id, "a");
        }
        assert!(dedup.has_seen("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_exit_on_error_cancels_exit_request_after_failers() {
        let failer = Arc::new(RecordingFailer::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_failer("recording", failer.clone());

        let exit_request = CancellationToken::new();
        let pipeline = Pipeline::new(
            Arc::new(DownFetcher),
            Arc::new(crate::source::ListingParser::new()),
            DedupStore::new(Arc::new(MemoryStore::new())),
            TagMatcher::default(),
            TagVocabulary::default(),
            Arc::new(dispatcher),
            Some(exit_request.clone()),
        );

        pipeline.poll("rust").await.unwrap_err();
        assert!(!exit_request.is_cancelled());

        pipeline.run("rust").await;
        assert!(exit_request.is_cancelled());
        assert_eq!(failer.0.lock().len(), 1);
    }
}
