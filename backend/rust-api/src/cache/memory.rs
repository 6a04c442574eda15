use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::SessionCache;

enum Stored {
    Text(String),
    Hash(HashMap<String, String>),
}

struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Instant::now())
    }
}

/// In-memory `SessionCache` with real-time expiry. Used by the test
/// suite and for running the service without a Redis instance.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => match &entry.value {
                Stored::Text(s) => Ok(Some(s.clone())),
                Stored::Hash(_) => bail!("WRONGTYPE: {} holds a hash", key),
            },
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Text(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Stored::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Stored::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Stored::Text(_) => bail!("WRONGTYPE: {} holds a string", key),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(HashMap::new())
            }
            Some(entry) => match &entry.value {
                Stored::Hash(map) => Ok(map.clone()),
                Stored::Text(_) => bail!("WRONGTYPE: {} holds a string", key),
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(-2)
            }
            Some(entry) => match entry.expires_at {
                Some(at) => Ok(at.saturating_duration_since(Instant::now()).as_secs() as i64),
                None => Ok(-1),
            },
            None => Ok(-2),
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(false)
            }
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_ex_then_get() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.ttl("k").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn expired_key_reads_as_missing() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.ttl("k").await.unwrap(), -2);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn hash_without_expiry_reports_minus_one() {
        let cache = InMemoryCache::new();
        cache.hset("h", "1", "2").await.unwrap();
        assert_eq!(cache.ttl("h").await.unwrap(), -1);
        assert!(cache.expire("h", 60).await.unwrap());
        assert!(cache.ttl("h").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn hset_overwrites_field() {
        let cache = InMemoryCache::new();
        cache.hset("h", "q", "1").await.unwrap();
        cache.hset("h", "q", "2").await.unwrap();
        let map = cache.hgetall("h").await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("q").map(String::as_str), Some("2"));
    }
}
