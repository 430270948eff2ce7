//! Byte-keyed associative store.
//!
//! The store exposes four independent structure kinds, each addressed by a
//! byte-string key:
//!
//! - scalars (`get` / `set`)
//! - sorted sets ordered by an `i64` score, ties broken by member bytes
//! - lists with push/pop at both ends
//! - unordered sets with membership tests
//!
//! Two backends are provided: [`MemoryStore`] for tests and ephemeral runs,
//! and [`SqliteStore`] (feature `sqlite`) for persistence across restarts.

mod error;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, SqliteStoreConfig};

use async_trait::async_trait;

/// A sorted set member together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: Vec<u8>,
    pub score: i64,
}

/// Operations every backend must provide.
///
/// All operations are safe to call concurrently. Individual operations are
/// atomic; sequences of operations are not.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a scalar value.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a scalar value, replacing any previous value.
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a scalar value. Returns whether a value was present.
    async fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Insert a member or update its score. Returns `true` if the member is new.
    async fn zadd(&self, key: &[u8], member: &[u8], score: i64) -> Result<bool>;

    /// Remove a member. Returns whether it was present.
    async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool>;

    /// Members by rank, `start..=stop`, ascending by `(score, member)`.
    ///
    /// Negative indexes count from the end (`-1` is the last member).
    async fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<ScoredMember>>;

    /// Number of members in the sorted set.
    async fn zcard(&self, key: &[u8]) -> Result<u64>;

    /// Remove the whole sorted set. Returns the number of removed members.
    async fn zclear(&self, key: &[u8]) -> Result<u64>;

    /// Push to the head of a list. Returns the new length.
    async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<u64>;

    /// Push to the tail of a list. Returns the new length.
    async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<u64>;

    /// Pop from the head of a list.
    async fn lpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Pop from the tail of a list.
    async fn rpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Length of a list.
    async fn llen(&self, key: &[u8]) -> Result<u64>;

    /// Remove the whole list. Returns the number of removed values.
    async fn lclear(&self, key: &[u8]) -> Result<u64>;

    /// Add a member to a set. Returns `true` if it was not already present.
    async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool>;

    /// Remove a member from a set. Returns whether it was present.
    async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool>;

    /// Membership test.
    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool>;

    /// Number of members in a set.
    async fn scard(&self, key: &[u8]) -> Result<u64>;

    /// Remove the whole set. Returns the number of removed members.
    async fn sclear(&self, key: &[u8]) -> Result<u64>;
}

/// Resolve a Redis-style inclusive rank range against a collection length.
///
/// Returns `(offset, count)` or `None` when the range selects nothing.
pub(crate) fn resolve_rank_range(len: u64, start: i64, stop: i64) -> Option<(u64, u64)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return None;
    }

    Some((start as u64, (stop - start + 1) as u64))
}

#[cfg(test)]
mod tests {
    use super::resolve_rank_range;

    #[test]
    fn test_rank_range_positive() {
        assert_eq!(resolve_rank_range(5, 0, 0), Some((0, 1)));
        assert_eq!(resolve_rank_range(5, 1, 3), Some((1, 3)));
        assert_eq!(resolve_rank_range(5, 0, 100), Some((0, 5)));
    }

    #[test]
    fn test_rank_range_negative() {
        assert_eq!(resolve_rank_range(5, 0, -1), Some((0, 5)));
        assert_eq!(resolve_rank_range(5, -2, -1), Some((3, 2)));
        assert_eq!(resolve_rank_range(5, -100, 1), Some((0, 2)));
    }

    #[test]
    fn test_rank_range_empty() {
        assert_eq!(resolve_rank_range(0, 0, -1), None);
        assert_eq!(resolve_rank_range(5, 3, 1), None);
        assert_eq!(resolve_rank_range(5, 5, 10), None);
        assert_eq!(resolve_rank_range(5, 0, -6), None);
    }
}
