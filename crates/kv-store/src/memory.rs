//! In-process store backend.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{KvStore, Result, ScoredMember, resolve_rank_range};

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<Vec<u8>, i64>,
    ordered: BTreeSet<(i64, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct Inner {
    scalars: HashMap<Vec<u8>, Vec<u8>>,
    zsets: HashMap<Vec<u8>, SortedSet>,
    lists: HashMap<Vec<u8>, VecDeque<Vec<u8>>>,
    sets: HashMap<Vec<u8>, HashSet<Vec<u8>>>,
}

/// Store backend that keeps everything in memory.
///
/// Nothing survives a restart. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().scalars.get(key).cloned())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .scalars
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.inner.lock().scalars.remove(key).is_some())
    }

    async fn zadd(&self, key: &[u8], member: &[u8], score: i64) -> Result<bool> {
        let mut inner = self.inner.lock();
        let zset = inner.zsets.entry(key.to_vec()).or_default();

        let previous = zset.scores.insert(member.to_vec(), score);
        if let Some(old_score) = previous {
            zset.ordered.remove(&(old_score, member.to_vec()));
        }
        zset.ordered.insert((score, member.to_vec()));

        Ok(previous.is_none())
    }

    async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(zset) = inner.zsets.get_mut(key) else {
            return Ok(false);
        };

        match zset.scores.remove(member) {
            Some(score) => {
                zset.ordered.remove(&(score, member.to_vec()));
                if zset.scores.is_empty() {
                    inner.zsets.remove(key);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<ScoredMember>> {
        let inner = self.inner.lock();
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };

        let Some((offset, count)) = resolve_rank_range(zset.ordered.len() as u64, start, stop)
        else {
            return Ok(Vec::new());
        };

        Ok(zset
            .ordered
            .iter()
            .skip(offset as usize)
            .take(count as usize)
            .map(|(score, member)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect())
    }

    async fn zcard(&self, key: &[u8]) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .zsets
            .get(key)
            .map(|z| z.scores.len() as u64)
            .unwrap_or(0))
    }

    async fn zclear(&self, key: &[u8]) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .zsets
            .remove(key)
            .map(|z| z.scores.len() as u64)
            .unwrap_or(0))
    }

    async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let list = inner.lists.entry(key.to_vec()).or_default();
        list.push_front(value.to_vec());
        Ok(list.len() as u64)
    }

    async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let list = inner.lists.entry(key.to_vec()).or_default();
        list.push_back(value.to_vec());
        Ok(list.len() as u64)
    }

    async fn lpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(None);
        };
        let value = list.pop_front();
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(value)
    }

    async fn rpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(None);
        };
        let value = list.pop_back();
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(value)
    }

    async fn llen(&self, key: &[u8]) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .lists
            .get(key)
            .map(|l| l.len() as u64)
            .unwrap_or(0))
    }

    async fn lclear(&self, key: &[u8]) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .lists
            .remove(key)
            .map(|l| l.len() as u64)
            .unwrap_or(0))
    }

    async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .sets
            .entry(key.to_vec())
            .or_default()
            .insert(member.to_vec()))
    }

    async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            inner.sets.remove(key);
        }
        Ok(removed)
    }

    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .is_some_and(|s| s.contains(member)))
    }

    async fn scard(&self, key: &[u8]) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn sclear(&self, key: &[u8]) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .sets
            .remove(key)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }
}
