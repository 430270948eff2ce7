//! Capability-based handler dispatch.
//!
//! Handlers declare what they can do by implementing one or more of the five
//! capability traits and are registered through a [`HandlerRegistration`]
//! that names each capability explicitly. Event handlers run in their own
//! tokio task and are never awaited. Failers are called inline, one after the
//! other.

pub mod handlers;
mod registration;

pub use registration::HandlerRegistration;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{Item, TagEvent, TagScope};
use crate::{Error, Result};

/// Receives errors raised by the fetch, parse and storage pipeline.
pub trait Failer: Send + Sync {
    fn fail(&self, error: &Error);
}

/// Receives every newly seen item.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    async fn on_item(&self, item: Arc<Item>) -> Result<()>;
}

/// Receives tags matched against the global vocabulary.
#[async_trait]
pub trait GlobalTagHandler: Send + Sync {
    async fn on_global_tag(&self, event: TagEvent) -> Result<()>;
}

/// Receives tags matched against the vocabulary of the item's topic.
#[async_trait]
pub trait TopicTagHandler: Send + Sync {
    async fn on_topic_tag(&self, event: TagEvent) -> Result<()>;
}

/// Receives every matched tag regardless of scope.
#[async_trait]
pub trait AnyTagHandler: Send + Sync {
    async fn on_any_tag(&self, event: TagEvent) -> Result<()>;
}

struct Registered<H: ?Sized> {
    name: Arc<str>,
    handler: Arc<H>,
}

impl<H: ?Sized> Registered<H> {
    fn new(name: &Arc<str>, handler: Arc<H>) -> Self {
        Self {
            name: Arc::clone(name),
            handler,
        }
    }
}

impl<H: ?Sized> Clone for Registered<H> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Number of handlers registered per capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerCounts {
    pub failers: usize,
    pub items: usize,
    pub global_tags: usize,
    pub topic_tags: usize,
    pub any_tags: usize,
}

/// Holds handler registrations and fans events out to them.
#[derive(Default)]
pub struct Dispatcher {
    failers: Vec<Registered<dyn Failer>>,
    item_handlers: Vec<Registered<dyn ItemHandler>>,
    global_tag_handlers: Vec<Registered<dyn GlobalTagHandler>>,
    topic_tag_handlers: Vec<Registered<dyn TopicTagHandler>>,
    any_tag_handlers: Vec<Registered<dyn AnyTagHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every capability present in `registration`.
    ///
    /// Fails with a configuration error when the registration provides none.
    pub fn register(&mut self, registration: impl Into<HandlerRegistration>) -> Result<()> {
        let registration = registration.into();
        if registration.is_empty() {
            return Err(Error::config(format!(
                "handler '{}' implements none of the handler capabilities",
                registration.name
            )));
        }

        let name: Arc<str> = Arc::from(registration.name.as_str());
        let mut capabilities = Vec::new();

        if let Some(handler) = registration.failer {
            self.failers.push(Registered::new(&name, handler));
            capabilities.push("failer");
        }
        if let Some(handler) = registration.item {
            self.item_handlers.push(Registered::new(&name, handler));
            capabilities.push("item");
        }
        if let Some(handler) = registration.global_tag {
            self.global_tag_handlers.push(Registered::new(&name, handler));
            capabilities.push("global_tag");
        }
        if let Some(handler) = registration.topic_tag {
            self.topic_tag_handlers.push(Registered::new(&name, handler));
            capabilities.push("topic_tag");
        }
        if let Some(handler) = registration.any_tag {
            self.any_tag_handlers.push(Registered::new(&name, handler));
            capabilities.push("any_tag");
        }

        debug!(handler = %name, ?capabilities, "Registered handler");
        Ok(())
    }

    pub fn register_failer(&mut self, name: &str, handler: Arc<dyn Failer>) {
        self.failers.push(Registered::new(&Arc::from(name), handler));
    }

    pub fn register_item_handler(&mut self, name: &str, handler: Arc<dyn ItemHandler>) {
        self.item_handlers.push(Registered::new(&Arc::from(name), handler));
    }

    pub fn register_global_tag_handler(&mut self, name: &str, handler: Arc<dyn GlobalTagHandler>) {
        self.global_tag_handlers.push(Registered::new(&Arc::from(name), handler));
    }

    pub fn register_topic_tag_handler(&mut self, name: &str, handler: Arc<dyn TopicTagHandler>) {
        self.topic_tag_handlers.push(Registered::new(&Arc::from(name), handler));
    }

    pub fn register_any_tag_handler(&mut self, name: &str, handler: Arc<dyn AnyTagHandler>) {
        self.any_tag_handlers.push(Registered::new(&Arc::from(name), handler));
    }

    pub fn handler_counts(&self) -> HandlerCounts {
        HandlerCounts {
            failers: self.failers.len(),
            items: self.item_handlers.len(),
            global_tags: self.global_tag_handlers.len(),
            topic_tags: self.topic_tag_handlers.len(),
            any_tags: self.any_tag_handlers.len(),
        }
    }

    /// Whether anything at all is registered.
    pub fn is_empty(&self) -> bool {
        self.handler_counts() == HandlerCounts::default()
    }

    /// Fan a newly seen item and its tags out to the event handlers.
    ///
    /// Each handler invocation is spawned as its own task; none are awaited.
    /// Must be called from within a tokio runtime. Returns the number of tasks
    /// spawned.
    pub fn dispatch(&self, item: Arc<Item>) -> usize {
        let mut spawned = 0;

        for registered in &self.item_handlers {
            let Registered { name, handler } = registered.clone();
            let item = Arc::clone(&item);
            tokio::spawn(async move {
                if let Err(e) = handler.on_item(item).await {
                    warn!(handler = %name, error = %e, "Item handler failed");
                }
            });
            spawned += 1;
        }

        for event in item.tag_events() {
            spawned += self.dispatch_tag(event);
        }

        spawned
    }

    /// Fan a single tag event out to the any-tag handlers and the handlers of
    /// its scope. Returns the number of tasks spawned.
    pub fn dispatch_tag(&self, event: TagEvent) -> usize {
        let mut spawned = 0;

        for registered in &self.any_tag_handlers {
            let Registered { name, handler } = registered.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.on_any_tag(event).await {
                    warn!(handler = %name, error = %e, "Tag handler failed");
                }
            });
            spawned += 1;
        }

        match event.scope {
            TagScope::Global => {
                for registered in &self.global_tag_handlers {
                    let Registered { name, handler } = registered.clone();
                    let event = event.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.on_global_tag(event).await {
                            warn!(handler = %name, error = %e, "Global tag handler failed");
                        }
                    });
                    spawned += 1;
                }
            }
            TagScope::Topic => {
                for registered in &self.topic_tag_handlers {
                    let Registered { name, handler } = registered.clone();
                    let event = event.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.on_topic_tag(event).await {
                            warn!(handler = %name, error = %e, "Topic tag handler failed");
                        }
                    });
                    spawned += 1;
                }
            }
        }

        spawned
    }

    /// Report a pipeline error to every failer, in registration order.
    pub fn dispatch_error(&self, error: &Error) {
        for registered in &self.failers {
            debug!(handler = %registered.name, "Reporting error to failer");
            registered.handler.fail(error);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handler_counts())
            .finish()
    }
}
