use std::sync::Arc;

use kv_store::KvStore;
use tracing::{debug, warn};

use crate::Result;

/// FIFO queue with a mirrored membership set.
///
/// A value is queued at most once at a time: pushing a value that is already
/// queued is rejected, so the list and the set always hold the same values.
/// Popping a value removes it from both, after which it may be queued again.
#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<dyn KvStore>,
    list_key: Vec<u8>,
    set_key: Vec<u8>,
}

impl WorkQueue {
    pub fn new(store: Arc<dyn KvStore>, name: &str) -> Self {
        Self {
            store,
            list_key: format!("{name}:list").into_bytes(),
            set_key: format!("{name}:members").into_bytes(),
        }
    }

    /// Append a value. Returns `false` if it was already queued.
    ///
    /// If the append fails the membership entry is removed again, so a failed
    /// push leaves the queue as it was.
    pub async fn push(&self, value: &[u8]) -> Result<bool> {
        if !self.store.sadd(&self.set_key, value).await? {
            return Ok(false);
        }
        if let Err(e) = self.store.rpush(&self.list_key, value).await {
            if let Err(undo) = self.store.srem(&self.set_key, value).await {
                warn!(
                    queue = %self.name(),
                    error = %undo,
                    "Failed to roll back membership after a failed push"
                );
            }
            return Err(e.into());
        }
        Ok(true)
    }

    /// Remove and return the oldest value.
    ///
    /// If the membership entry cannot be removed the value is put back at
    /// the head, so a failed pop can be retried.
    pub async fn pop(&self) -> Result<Option<Vec<u8>>> {
        let Some(value) = self.store.lpop(&self.list_key).await? else {
            return Ok(None);
        };
        match self.store.srem(&self.set_key, &value).await {
            Ok(true) => {}
            Ok(false) => debug!(queue = %self.name(), "Popped value had no membership entry"),
            Err(e) => {
                warn!(queue = %self.name(), error = %e, "Failed to unmark popped value");
                if let Err(undo) = self.store.lpush(&self.list_key, &value).await {
                    warn!(
                        queue = %self.name(),
                        error = %undo,
                        "Failed to requeue value after a failed pop"
                    );
                }
                return Err(e.into());
            }
        }
        Ok(Some(value))
    }

    fn name(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.list_key)
    }

    pub async fn contains(&self, value: &[u8]) -> Result<bool> {
        Ok(self.store.sismember(&self.set_key, value).await?)
    }

    pub async fn size(&self) -> Result<u64> {
        Ok(self.store.llen(&self.list_key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// Drop every queued value.
    pub async fn clear(&self) -> Result<()> {
        self.store.lclear(&self.list_key).await?;
        self.store.sclear(&self.set_key).await?;
        Ok(())
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("list_key", &self.name())
            .finish_non_exhaustive()
    }
}
