//! The monitor loop and its lifecycle.
//!
//! The loop runs in its own task and owns the scheduler. Each iteration asks
//! the rate limiter for a permit; with a permit it pops the earliest topic,
//! spawns a pipeline for it and immediately reschedules it at the current
//! time. Pipelines and the handler tasks they spawn are never awaited, so they
//! may still be running after [`Monitor::stop`] returns.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use kv_store::KvStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, MonotonicClock};
use super::pipeline::Pipeline;
use super::rate_limiter::RateLimiter;
use super::scheduler::PriorityScheduler;
use crate::config::{IdleStrategy, MonitorConfig};
use crate::dedup::DedupStore;
use crate::dispatch::Dispatcher;
use crate::domain::Topic;
use crate::source::{Fetcher, HttpFetcher, ListingParser, Parser};
use crate::tags::{TagMatcher, TagVocabulary};
use crate::{Error, Result};

/// Lifecycle state of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorState {
    /// Constructed, not started yet.
    Idle = 0,
    Running = 1,
    /// Terminal.
    Stopped = 2,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Polls topics under a global rate budget and fans new items out to handlers.
pub struct Monitor {
    topics: Vec<Topic>,
    limiter: Arc<RateLimiter>,
    pipeline: Arc<Pipeline>,
    clock: Arc<dyn Clock>,
    idle_strategy: IdleStrategy,
    max_idle_backoff: Duration,
    state: Arc<AtomicU8>,
    polls_started: Arc<AtomicU64>,
    /// Cancelled by a pipeline error when `exit_on_error` is set.
    exit_request: CancellationToken,
    /// Child of `exit_request`, cancelled by [`Monitor::stop`].
    cancellation_token: CancellationToken,
}

impl Monitor {
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Number of pipelines launched so far.
    pub fn polls_started(&self) -> u64 {
        self.polls_started.load(Ordering::Relaxed)
    }

    /// Seed the scheduler and spawn the loop.
    ///
    /// Only an idle monitor can be started; a running or stopped one returns
    /// [`Error::InvalidStateTransition`].
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let mut scheduler = PriorityScheduler::new(Arc::clone(&self.clock));
        scheduler.seed(self.topics.iter().cloned())?;

        self.state
            .compare_exchange(
                MonitorState::Idle as u8,
                MonitorState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| Error::InvalidStateTransition {
                from: MonitorState::from_u8(current).to_string(),
                to: MonitorState::Running.to_string(),
            })?;

        info!(
            topics = scheduler.size(),
            idle_strategy = ?self.idle_strategy,
            "Starting monitor"
        );

        let worker = LoopWorker {
            scheduler,
            limiter: Arc::clone(&self.limiter),
            pipeline: Arc::clone(&self.pipeline),
            idle_strategy: self.idle_strategy,
            max_idle_backoff: self.max_idle_backoff,
            polls_started: Arc::clone(&self.polls_started),
            cancellation_token: self.cancellation_token.clone(),
        };

        Ok(tokio::spawn(worker.run()))
    }

    /// Stop the loop. Idempotent; a stopped monitor cannot be restarted.
    ///
    /// The loop notices the request before its next iteration. In-flight
    /// pipelines and handler tasks keep running.
    pub fn stop(&self) {
        let previous = MonitorState::from_u8(
            self.state
                .swap(MonitorState::Stopped as u8, Ordering::SeqCst),
        );
        self.cancellation_token.cancel();

        if previous != MonitorState::Stopped {
            info!(from = %previous, "Monitor stopped");
        }
    }

    /// Resolves once a pipeline error has requested an exit.
    ///
    /// Only happens with `exit_on_error` set. The loop has already stopped
    /// launching polls by then; the caller decides how to end the process.
    pub async fn exit_requested(&self) {
        self.exit_request.cancelled().await;
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit_request.is_cancelled()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("topics", &self.topics)
            .field("state", &self.state())
            .field("idle_strategy", &self.idle_strategy)
            .finish_non_exhaustive()
    }
}

struct LoopWorker {
    scheduler: PriorityScheduler,
    limiter: Arc<RateLimiter>,
    pipeline: Arc<Pipeline>,
    idle_strategy: IdleStrategy,
    max_idle_backoff: Duration,
    polls_started: Arc<AtomicU64>,
    cancellation_token: CancellationToken,
}

impl LoopWorker {
    async fn run(mut self) {
        while !self.cancellation_token.is_cancelled() {
            if self.limiter.try_acquire() {
                self.launch_next();
                continue;
            }

            match self.idle_strategy {
                IdleStrategy::Spin => tokio::task::yield_now().await,
                IdleStrategy::Backoff => {
                    let wait = self
                        .limiter
                        .time_until_available()
                        .min(self.max_idle_backoff);
                    tokio::select! {
                        _ = self.cancellation_token.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        debug!(
            polls_started = self.polls_started.load(Ordering::Relaxed),
            "Monitor loop exited"
        );
    }

    fn launch_next(&mut self) {
        let Some(entry) = self.scheduler.pop_earliest() else {
            warn!("Scheduler is empty, nothing to poll");
            return;
        };

        trace!(topic = %entry.topic, sequence = entry.sequence, "Launching poll");

        let pipeline = Arc::clone(&self.pipeline);
        let topic = entry.topic.clone();
        tokio::spawn(async move { pipeline.run(&topic).await });
        self.polls_started.fetch_add(1, Ordering::Relaxed);

        self.scheduler.reschedule_now(entry.topic);
    }
}

/// Assembles a [`Monitor`] from its configuration and collaborators.
pub struct MonitorBuilder {
    config: MonitorConfig,
    store: Option<Arc<dyn KvStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    parser: Option<Arc<dyn Parser>>,
    dispatcher: Dispatcher,
    clock: Option<Arc<dyn Clock>>,
}

impl MonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: None,
            fetcher: None,
            parser: None,
            dispatcher: Dispatcher::new(),
            clock: None,
        }
    }

    /// Backing store for seen items. Required.
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to an [`HttpFetcher`] built from the configuration.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Defaults to [`ListingParser`].
    pub fn parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Defaults to [`MonotonicClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Monitor> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .ok_or_else(|| Error::config("a backing store is required"))?;
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(config.fetcher())?),
        };
        let parser = self
            .parser
            .unwrap_or_else(|| Arc::new(ListingParser::new()));

        if self.dispatcher.is_empty() {
            warn!("No handlers registered, new items will only be recorded");
        }

        let exit_request = CancellationToken::new();
        let matcher = TagMatcher::new(&config.strip_chars);
        let vocabulary = TagVocabulary::new(&matcher, &config.global_tags, &config.topic_tags);
        let pipeline = Pipeline::new(
            fetcher,
            parser,
            DedupStore::new(store),
            matcher,
            vocabulary,
            Arc::new(self.dispatcher),
            config.exit_on_error.then(|| exit_request.clone()),
        );

        Ok(Monitor {
            topics: config.topics,
            limiter: Arc::new(RateLimiter::new(config.throttling.rate_limiter()?)),
            pipeline: Arc::new(pipeline),
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            idle_strategy: config.throttling.idle_strategy,
            max_idle_backoff: config.throttling.max_idle_backoff(),
            state: Arc::new(AtomicU8::new(MonitorState::Idle as u8)),
            polls_started: Arc::new(AtomicU64::new(0)),
            cancellation_token: exit_request.child_token(),
            exit_request,
        })
    }
}
