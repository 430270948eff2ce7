//! Seen-item tracking and the at-most-once work queue.

mod queue;
#[cfg(test)]
pub(crate) mod test_store;

pub use queue::WorkQueue;

use std::sync::Arc;

use kv_store::KvStore;
use tracing::trace;

use crate::Result;

const SEEN_PREFIX: &str = "seen:";

/// Records which item ids have already been processed.
///
/// Membership is monotonic: there is no way to forget an id.
///
/// `has_seen` followed by `mark_seen` is not atomic. Two pipelines that see the
/// same new id concurrently can both pass the check and both dispatch it.
#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn KvStore>,
}

impl DedupStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(item_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(SEEN_PREFIX.len() + item_id.len());
        key.extend_from_slice(SEEN_PREFIX.as_bytes());
        key.extend_from_slice(item_id.as_bytes());
        key
    }

    pub async fn has_seen(&self, item_id: &str) -> Result<bool> {
        Ok(self.store.get(&Self::key(item_id)).await?.is_some())
    }

    /// Mark an id as seen, storing the serialized item alongside it.
    ///
    /// Marking the same id again only replaces the stored payload.
    pub async fn mark_seen(&self, item_id: &str, serialized: &[u8]) -> Result<()> {
        self.store.set(&Self::key(item_id), serialized).await?;
        trace!(item_id, "Marked item as seen");
        Ok(())
    }

    /// The payload stored by the last `mark_seen` for this id.
    pub async fn seen_payload(&self, item_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get(&Self::key(item_id)).await?)
    }
}

impl std::fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupStore").finish_non_exhaustive()
    }
}
