use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::Result;
use crate::dispatch::{
    AnyTagHandler, Failer, GlobalTagHandler, HandlerRegistration, ItemHandler, TopicTagHandler,
};
use crate::domain::{Item, TagEvent};

/// Writes every event as a structured log record.
///
/// Tags are logged at info level by the any-tag capability only; the scoped
/// capabilities log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl LogHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Failer for LogHandler {
    fn fail(&self, err: &crate::Error) {
        error!(error = %err, "Pipeline error");
    }
}

#[async_trait]
impl ItemHandler for LogHandler {
    async fn on_item(&self, item: Arc<Item>) -> Result<()> {
        info!(
            topic = %item.topic,
            id = %item.id,
            global_tags = item.global_tags.len(),
            topic_tags = item.topic_tags.len(),
            "New item: {}",
            item.title
        );
        Ok(())
    }
}

#[async_trait]
impl GlobalTagHandler for LogHandler {
    async fn on_global_tag(&self, event: TagEvent) -> Result<()> {
        debug!(tag = %event.tag, id = %event.item.id, "Global tag");
        Ok(())
    }
}

#[async_trait]
impl TopicTagHandler for LogHandler {
    async fn on_topic_tag(&self, event: TagEvent) -> Result<()> {
        debug!(
            tag = %event.tag,
            topic = %event.item.topic,
            id = %event.item.id,
            "Topic tag"
        );
        Ok(())
    }
}

#[async_trait]
impl AnyTagHandler for LogHandler {
    async fn on_any_tag(&self, event: TagEvent) -> Result<()> {
        info!(
            tag = %event.tag,
            scope = %event.scope,
            topic = %event.item.topic,
            id = %event.item.id,
            "Tag matched"
        );
        Ok(())
    }
}

impl From<Arc<LogHandler>> for HandlerRegistration {
    fn from(handler: Arc<LogHandler>) -> Self {
        HandlerRegistration::new("log")
            .failer(handler.clone())
            .item(handler.clone())
            .global_tag(handler.clone())
            .topic_tag(handler.clone())
            .any_tag(handler)
    }
}
