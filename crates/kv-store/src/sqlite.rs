//! SQLite store backend built on sqlx.
//!
//! Each structure kind lives in its own table, created by the migrations in
//! `migrations/`. Single-row mutations are one statement each; operations that
//! report a derived value (new list length, whether a sorted-set member is new)
//! run inside a transaction.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::{KvStore, Result, ScoredMember, StoreError, resolve_rank_range};

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 8;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// SQLite database URL (e.g., "sqlite:tagwatch.db?mode=rwc").
    pub url: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
}

impl SqliteStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_POOL_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    /// In-memory databases are per-connection, so they must use a single one.
    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Persistent store backend.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` with default settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(SqliteStoreConfig::new(url)).await
    }

    /// Open the database and apply any pending migrations.
    pub async fn connect_with(config: SqliteStoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::InvalidUrl {
                url: config.url.clone(),
                reason: e.to_string(),
            })?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let max_connections = if config.is_in_memory() {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!(
            url = %config.url,
            max_connections,
            "SQLite store opened"
        );

        Ok(store)
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<()> {
        debug!("Running store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Store migrations completed");
        Ok(())
    }

    async fn count(&self, sql: &str, key: &[u8]) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn clear(&self, sql: &str, key: &[u8]) -> Result<u64> {
        let result = sqlx::query(sql).bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = sqlx::query_scalar("SELECT value FROM kv_scalar WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_scalar (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_scalar WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn zadd(&self, key: &[u8], member: &[u8], score: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO kv_zset (key, member, score) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(member)
        .bind(score)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            sqlx::query("UPDATE kv_zset SET score = ? WHERE key = ? AND member = ?")
                .bind(score)
                .bind(key)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_zset WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<ScoredMember>> {
        let len = self.zcard(key).await?;
        let Some((offset, count)) = resolve_rank_range(len, start, stop) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT member, score FROM kv_zset WHERE key = ?
             ORDER BY score ASC, member ASC LIMIT ? OFFSET ?",
        )
        .bind(key)
        .bind(count as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ScoredMember> {
                Ok(ScoredMember {
                    member: row.try_get("member")?,
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }

    async fn zcard(&self, key: &[u8]) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM kv_zset WHERE key = ?", key)
            .await
    }

    async fn zclear(&self, key: &[u8]) -> Result<u64> {
        self.clear("DELETE FROM kv_zset WHERE key = ?", key).await
    }

    async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO kv_list (key, pos, value)
             VALUES (?, COALESCE((SELECT MIN(pos) FROM kv_list WHERE key = ?), 1) - 1, ?)",
        )
        .bind(key)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_list WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(len.max(0) as u64)
    }

    async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO kv_list (key, pos, value)
             VALUES (?, COALESCE((SELECT MAX(pos) FROM kv_list WHERE key = ?), -1) + 1, ?)",
        )
        .bind(key)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_list WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(len.max(0) as u64)
    }

    async fn lpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = sqlx::query_scalar(
            "DELETE FROM kv_list
             WHERE key = ? AND pos = (SELECT MIN(pos) FROM kv_list WHERE key = ?)
             RETURNING value",
        )
        .bind(key)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn rpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = sqlx::query_scalar(
            "DELETE FROM kv_list
             WHERE key = ? AND pos = (SELECT MAX(pos) FROM kv_list WHERE key = ?)
             RETURNING value",
        )
        .bind(key)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn llen(&self, key: &[u8]) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM kv_list WHERE key = ?", key)
            .await
    }

    async fn lclear(&self, key: &[u8]) -> Result<u64> {
        self.clear("DELETE FROM kv_list WHERE key = ?", key).await
    }

    async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO kv_set (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_set WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM kv_set WHERE key = ? AND member = ?")
                .bind(key)
                .bind(member)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn scard(&self, key: &[u8]) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM kv_set WHERE key = ?", key)
            .await
    }

    async fn sclear(&self, key: &[u8]) -> Result<u64> {
        self.clear("DELETE FROM kv_set WHERE key = ?", key).await
    }
}
