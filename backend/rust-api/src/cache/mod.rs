use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

use crate::metrics::record_cache_operation;

pub mod memory;

/// Snapshot keys live for one hour.
pub const SNAPSHOT_TTL_SECS: u64 = 3600;

/// Answer maps live for twenty minutes from the FIRST answer write;
/// later writes do not extend the deadline.
pub const ANSWER_TTL_SECS: u64 = 1200;

/// Key of the staged question/choice snapshot for one attempt.
pub fn snapshot_key(quiz_id: i64, attempt_id: i64) -> String {
    format!("quiz:{}:user_quiz_attempts:{}", quiz_id, attempt_id)
}

/// Key of the per-attempt answer hash (question_id -> choice_id).
pub fn answers_key(quiz_id: i64, attempt_id: i64) -> String {
    format!("quiz:{}:user_quiz_attempts:{}:answers", quiz_id, attempt_id)
}

/// The session cache capability. Constructed once at startup and
/// passed explicitly through `AppState`; nothing reaches it through a
/// global. The operations mirror the Redis commands the attempt
/// protocol needs, so a conforming fake is a drop-in for tests.
///
/// `ttl` follows Redis semantics: -2 when the key does not exist,
/// -1 when it exists without an expiry, otherwise remaining seconds.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn ttl(&self, key: &str) -> Result<i64>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed session cache over a shared `ConnectionManager`.
pub struct RedisSessionCache {
    conn: ConnectionManager,
}

impl RedisSessionCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .context("Cache GET failed");
        record_cache_operation("get", res.is_ok());
        res
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .context("Cache SETEX failed");
        record_cache_operation("setex", res.is_ok());
        res
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .context("Cache HSET failed");
        record_cache_operation("hset", res.is_ok());
        res
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("HGETALL")
            .arg(key)
            .query_async::<HashMap<String, String>>(&mut conn)
            .await
            .context("Cache HGETALL failed");
        record_cache_operation("hgetall", res.is_ok());
        res
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<bool>(&mut conn)
            .await
            .context("Cache EXISTS failed");
        record_cache_operation("exists", res.is_ok());
        res
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("TTL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .context("Cache TTL failed");
        record_cache_operation("ttl", res.is_ok());
        res
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async::<bool>(&mut conn)
            .await
            .context("Cache EXPIRE failed");
        record_cache_operation("expire", res.is_ok());
        res
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let res = redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .context("Cache DEL failed");
        record_cache_operation("del", res.is_ok());
        res
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Cache PING failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_key_shape() {
        assert_eq!(snapshot_key(7, 42), "quiz:7:user_quiz_attempts:42");
    }

    #[test]
    fn answers_key_extends_snapshot_key() {
        assert_eq!(
            answers_key(7, 42),
            format!("{}:answers", snapshot_key(7, 42))
        );
    }
}
