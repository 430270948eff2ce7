use std::sync::Arc;

use super::{AnyTagHandler, Failer, GlobalTagHandler, ItemHandler, TopicTagHandler};

/// The capabilities one handler offers, declared explicitly.
///
/// ```ignore
/// let handler = Arc::new(MyHandler::new());
/// dispatcher.register(
///     HandlerRegistration::new("mine")
///         .item(handler.clone())
///         .any_tag(handler),
/// )?;
/// ```
#[derive(Clone)]
pub struct HandlerRegistration {
    pub(super) name: String,
    pub(super) failer: Option<Arc<dyn Failer>>,
    pub(super) item: Option<Arc<dyn ItemHandler>>,
    pub(super) global_tag: Option<Arc<dyn GlobalTagHandler>>,
    pub(super) topic_tag: Option<Arc<dyn TopicTagHandler>>,
    pub(super) any_tag: Option<Arc<dyn AnyTagHandler>>,
}

impl HandlerRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failer: None,
            item: None,
            global_tag: None,
            topic_tag: None,
            any_tag: None,
        }
    }

    pub fn failer(mut self, handler: Arc<dyn Failer>) -> Self {
        self.failer = Some(handler);
        self
    }

    pub fn item(mut self, handler: Arc<dyn ItemHandler>) -> Self {
        self.item = Some(handler);
        self
    }

    pub fn global_tag(mut self, handler: Arc<dyn GlobalTagHandler>) -> Self {
        self.global_tag = Some(handler);
        self
    }

    pub fn topic_tag(mut self, handler: Arc<dyn TopicTagHandler>) -> Self {
        self.topic_tag = Some(handler);
        self
    }

    pub fn any_tag(mut self, handler: Arc<dyn AnyTagHandler>) -> Self {
        self.any_tag = Some(handler);
        self
    }

    /// Whether no capability has been declared.
    pub fn is_empty(&self) -> bool {
        self.failer.is_none()
            && self.item.is_none()
            && self.global_tag.is_none()
            && self.topic_tag.is_none()
            && self.any_tag.is_none()
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("name", &self.name)
            .field("failer", &self.failer.is_some())
            .field("item", &self.item.is_some())
            .field("global_tag", &self.global_tag.is_some())
            .field("topic_tag", &self.topic_tag.is_some())
            .field("any_tag", &self.any_tag.is_some())
            .finish()
    }
}
