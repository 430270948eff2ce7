//! Store wrapper with injectable failures and a gate on reads.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kv_store::{KvStore, MemoryStore, Result, ScoredMember, StoreError};
use tokio::sync::Barrier;

/// [`MemoryStore`] whose `rpush` and `srem` fail a configured number of
/// times, and whose first `gated_gets` reads wait at `get_gate` after reading.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    pub rpush_failures: AtomicUsize,
    pub srem_failures: AtomicUsize,
    pub gated_gets: AtomicUsize,
    pub get_gate: Option<Barrier>,
}

impl FaultyStore {
    /// A store whose first `n` reads wait until all `n` have arrived.
    pub fn with_read_gate(n: usize) -> Self {
        Self {
            gated_gets: AtomicUsize::new(n),
            get_gate: Some(Barrier::new(n)),
            ..Default::default()
        }
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.inner.get(key).await?;
        if let Some(gate) = &self.get_gate {
            if take(&self.gated_gets) {
                gate.wait().await;
            }
        }
        Ok(value)
    }
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.set(key, value).await
    }
    async fn delete(&self, key: &[u8]) -> Result<bool> {
        self.inner.delete(key).await
    }
    async fn zadd(&self, key: &[u8], member: &[u8], score: i64) -> Result<bool> {
        self.inner.zadd(key, member, score).await
    }
    async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        self.inner.zrem(key, member).await
    }
    async fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<ScoredMember>> {
        self.inner.zrange(key, start, stop).await
    }
    async fn zcard(&self, key: &[u8]) -> Result<u64> {
        self.inner.zcard(key).await
    }
    async fn zclear(&self, key: &[u8]) -> Result<u64> {
        self.inner.zclear(key).await
    }
    async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        self.inner.lpush(key, value).await
    }
    async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        if take(&self.rpush_failures) {
            return Err(StoreError::backend("rpush unavailable"));
        }
        self.inner.rpush(key, value).await
    }
    async fn lpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.lpop(key).await
    }
    async fn rpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.rpop(key).await
    }
    async fn llen(&self, key: &[u8]) -> Result<u64> {
        self.inner.llen(key).await
    }
    async fn lclear(&self, key: &[u8]) -> Result<u64> {
        self.inner.lclear(key).await
    }
    async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        self.inner.sadd(key, member).await
    }
    async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        if take(&self.srem_failures) {
            return Err(StoreError::backend("srem unavailable"));
        }
        self.inner.srem(key, member).await
    }
    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        self.inner.sismember(key, member).await
    }
    async fn scard(&self, key: &[u8]) -> Result<u64> {
        self.inner.scard(key).await
    }
    async fn sclear(&self, key: &[u8]) -> Result<u64> {
        self.inner.sclear(key).await
    }
}
