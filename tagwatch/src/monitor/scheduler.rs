//! Time-ordered topic scheduler.
//!
//! Entries are ordered by `(next_eligible, sequence)`. Every insertion draws a
//! fresh sequence number, so topics sharing a timestamp come out in insertion
//! order. Rescheduling at "now" after each pop therefore yields round-robin
//! polling as long as the clock does not go backwards; a regressing clock only
//! degrades fairness.
//!
//! The scheduler is owned by the monitor loop task and is not synchronized.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::clock::Clock;
use crate::domain::Topic;
use crate::{Error, Result};

/// A topic together with its next eligible poll time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub topic: Topic,
    /// Clock reading in nanoseconds.
    pub next_eligible: u64,
    /// Insertion counter used as a tie-break.
    pub sequence: u64,
}

type EntryKey = (u64, u64);

pub struct PriorityScheduler {
    clock: Arc<dyn Clock>,
    queue: BTreeMap<EntryKey, Topic>,
    index: HashMap<Topic, EntryKey>,
    next_sequence: u64,
}

impl PriorityScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: BTreeMap::new(),
            index: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Insert every topic at the current time, in the given order.
    ///
    /// Fails with a configuration error when `topics` is empty. Topics already
    /// scheduled are skipped.
    pub fn seed<I, T>(&mut self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        let now = self.clock.now_nanos();
        let mut seeded = 0usize;

        for topic in topics {
            let topic = topic.into();
            if self.index.contains_key(&topic) {
                warn!(topic = %topic, "Duplicate topic, skipping");
                continue;
            }
            self.insert(topic, now);
            seeded += 1;
        }

        if self.queue.is_empty() {
            return Err(Error::config("at least one topic must be configured"));
        }

        debug!(seeded, total = self.queue.len(), "Scheduler seeded");
        Ok(())
    }

    /// Remove and return the entry with the smallest `(next_eligible, sequence)`.
    pub fn pop_earliest(&mut self) -> Option<ScheduleEntry> {
        let ((next_eligible, sequence), topic) = self.queue.pop_first()?;
        self.index.remove(&topic);
        Some(ScheduleEntry {
            topic,
            next_eligible,
            sequence,
        })
    }

    /// Schedule `topic` at the current time with a fresh sequence number.
    ///
    /// A topic that is still scheduled is moved rather than duplicated.
    pub fn reschedule_now(&mut self, topic: impl Into<Topic>) {
        let topic = topic.into();
        if let Some(key) = self.index.remove(&topic) {
            self.queue.remove(&key);
        }
        let now = self.clock.now_nanos();
        self.insert(topic, now);
    }

    /// Peek at the next entry without removing it.
    pub fn peek(&self) -> Option<ScheduleEntry> {
        self.queue
            .first_key_value()
            .map(|(&(next_eligible, sequence), topic)| ScheduleEntry {
                topic: topic.clone(),
                next_eligible,
                sequence,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.index.contains_key(topic)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }

    fn insert(&mut self, topic: Topic, at: u64) {
        let key = (at, self.next_sequence);
        self.next_sequence += 1;
        self.index.insert(topic.clone(), key);
        self.queue.insert(key, topic);
    }
}

impl std::fmt::Debug for PriorityScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityScheduler")
            .field("size", &self.queue.len())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::clock::ManualClock;
    use std::collections::HashSet;
    use std::time::Duration;

    fn scheduler() -> (Arc<ManualClock>, PriorityScheduler) {
        let clock = Arc::new(ManualClock::new(1_000));
        let scheduler = PriorityScheduler::new(clock.clone());
        (clock, scheduler)
    }

    #[test]
    fn test_seed_rejects_empty_topics() {
        let (_, mut scheduler) = scheduler();
        let err = scheduler.seed(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_seed_skips_duplicates() {
        let (_, mut scheduler) = scheduler();
        scheduler.seed(["a", "b", "a"]).unwrap();
        assert_eq!(scheduler.size(), 2);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let (clock, mut scheduler) = scheduler();
        scheduler.seed(["a", "b"]).unwrap();

        let first = scheduler.pop_earliest().unwrap();
        let second = scheduler.pop_earliest().unwrap();
        assert_eq!(first.topic, "a");
        assert_eq!(second.topic, "b");
        assert_eq!(first.next_eligible, second.next_eligible);
        assert!(first.sequence < second.sequence);

        clock.advance(Duration::from_millis(1));
        scheduler.reschedule_now("a");
        scheduler.reschedule_now("b");
        assert_eq!(scheduler.pop_earliest().unwrap().topic, "a");
    }

    #[test]
    fn test_rescheduled_topic_goes_behind_waiting_topics() {
        let (clock, mut scheduler) = scheduler();
        scheduler.seed(["a", "b"]).unwrap();

        let a = scheduler.pop_earliest().unwrap();
        clock.advance(Duration::from_millis(5));
        scheduler.reschedule_now(a.topic);

        assert_eq!(scheduler.pop_earliest().unwrap().topic, "b");
        assert_eq!(scheduler.pop_earliest().unwrap().topic, "a");
        assert!(scheduler.pop_earliest().is_none());
    }

    #[test]
    fn test_pop_returns_minimal_entry() {
        let (clock, mut scheduler) = scheduler();
        scheduler.seed(["a", "b", "c", "d"]).unwrap();

        // Scramble timestamps.
        for (topic, at) in [("c", 10), ("a", 30), ("d", 20), ("b", 30)] {
            clock.set(at);
            scheduler.reschedule_now(topic);
        }

        let mut previous = (0, 0);
        let mut order = Vec::new();
        while let Some(entry) = scheduler.pop_earliest() {
            let key = (entry.next_eligible, entry.sequence);
            assert!(key > previous);
            previous = key;
            order.push(entry.topic);
        }
        assert_eq!(order, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn test_round_robin_fairness() {
        let topics = ["a", "b", "c", "d", "e"];
        let (clock, mut scheduler) = scheduler();
        scheduler.seed(topics).unwrap();

        for round in 0..4 {
            let mut visited = HashSet::new();
            for _ in 0..topics.len() {
                let entry = scheduler.pop_earliest().unwrap();
                visited.insert(entry.topic.clone());
                clock.advance(Duration::from_nanos(round % 2));
                scheduler.reschedule_now(entry.topic);
            }
            assert_eq!(visited.len(), topics.len());
        }
    }

    #[test]
    fn test_entries_stay_unique_per_topic() {
        let (_, mut scheduler) = scheduler();
        scheduler.seed(["a", "b"]).unwrap();

        scheduler.reschedule_now("a");
        scheduler.reschedule_now("a");

        assert_eq!(scheduler.size(), 2);
        assert_eq!(scheduler.pop_earliest().unwrap().topic, "b");
        assert_eq!(scheduler.pop_earliest().unwrap().topic, "a");
    }

    #[test]
    fn test_clock_regression_degrades_order_without_error() {
        let (clock, mut scheduler) = scheduler();
        scheduler.seed(["a", "b"]).unwrap();

        let a = scheduler.pop_earliest().unwrap();
        clock.set(0);
        scheduler.reschedule_now(a.topic);

        // "a" jumps ahead of "b" because its timestamp is older.
        assert_eq!(scheduler.pop_earliest().unwrap().topic, "a");
        assert_eq!(scheduler.size(), 1);
    }

    #[test]
    fn test_clear() {
        let (_, mut scheduler) = scheduler();
        scheduler.seed(["a", "b"]).unwrap();
        assert!(scheduler.contains("a"));

        scheduler.clear();

        assert!(scheduler.is_empty());
        assert!(!scheduler.contains("a"));
        assert!(scheduler.peek().is_none());
    }
}
