//! # Key-Value Store Abstraction
//!
//! One trait in front of the shared Redis instance. Every coordination
//! primitive (locks, counters, blacklist, queue) goes through
//! [`KeyValueStore`]; nothing else in the workspace talks to Redis.
//!
//! ## Key Patterns
//! ```text
//! lock:{resource}                    → holder token (TTL = lock expiry)
//! ratelimit:{identifier}:{endpoint}  → window counter (TTL = window)
//! blacklist:{tokenId}                → sentinel (TTL = token remainder)
//! usertokens:{userId}                → set of active token ids
//! usertokens:{userId}:expiry         → hash tokenId → RFC3339 expiry
//! audit:queue                        → list of serialized AuditEntry
//! seq:{ruleType}                     → next document number
//! ```
//!
//! ## Backends
//! - [`RedisStore`] - production backend over a clonable
//!   auto-reconnecting connection manager, constructed once at startup
//!   and passed explicitly to every component (no ambient globals).
//! - [`MemoryStore`] - single-process backend for tests and local
//!   development. TTLs are tracked against the tokio clock so
//!   paused-clock tests can exercise expiry deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::CoordResult;

// =============================================================================
// Trait
// =============================================================================

/// Minimal abstraction over a remote in-memory structured store.
///
/// All operations are atomic on the store side and may fail with
/// [`CoordError::StoreUnavailable`](crate::CoordError::StoreUnavailable)
/// when the backing connection is down. The store is the single
/// serialization point for the whole coordination layer: callers never
/// perform an unprotected read-modify-write against shared state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically creates `key` only if absent, with a TTL.
    /// Returns whether the creation succeeded.
    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> CoordResult<bool>;

    /// Atomically deletes `key` only if its current value equals
    /// `expected`. Returns whether a deletion occurred.
    ///
    /// Required for safe lock release: a holder whose TTL already
    /// expired must never delete a successor's lock.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> CoordResult<bool>;

    /// Atomic increment; creates the key at 0 if absent. Returns the
    /// new value.
    async fn increment(&self, key: &str, by: i64) -> CoordResult<i64>;

    /// Sets or refreshes a TTL. No-op if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CoordResult<()>;

    /// Reads a string key.
    async fn get(&self, key: &str) -> CoordResult<Option<String>>;

    /// Writes a string key, optionally with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<()>;

    /// Deletes a key (any type). No-op if absent.
    async fn delete(&self, key: &str) -> CoordResult<()>;

    /// Returns whether a key exists.
    async fn exists(&self, key: &str) -> CoordResult<bool>;

    // -- Hash operations ------------------------------------------------------

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CoordResult<()>;
    async fn hash_get(&self, key: &str, field: &str) -> CoordResult<Option<String>>;
    async fn hash_get_all(&self, key: &str) -> CoordResult<HashMap<String, String>>;
    async fn hash_delete(&self, key: &str, field: &str) -> CoordResult<()>;

    // -- Set operations -------------------------------------------------------

    async fn set_add(&self, key: &str, member: &str) -> CoordResult<()>;
    async fn set_remove(&self, key: &str, member: &str) -> CoordResult<()>;
    async fn set_members(&self, key: &str) -> CoordResult<Vec<String>>;
    async fn set_contains(&self, key: &str, member: &str) -> CoordResult<bool>;

    // -- List operations (lpush + rpop = FIFO) --------------------------------

    /// Pushes onto the head of the list.
    async fn list_push(&self, key: &str, value: &str) -> CoordResult<()>;

    /// Pops up to `count` values from the tail of the list. Returns
    /// fewer (possibly zero) values when the list empties.
    async fn list_pop(&self, key: &str, count: usize) -> CoordResult<Vec<String>>;

    /// Current list length.
    async fn list_len(&self, key: &str) -> CoordResult<i64>;

    /// Fire-and-forget broadcast. No delivery guarantee to absent
    /// subscribers.
    async fn publish(&self, channel: &str, message: &str) -> CoordResult<()>;
}

// =============================================================================
// Redis Backend
// =============================================================================

/// Production [`KeyValueStore`] over Redis.
///
/// Holds a [`redis::aio::ConnectionManager`], which multiplexes one
/// connection, reconnects automatically, and is cheap to clone per
/// operation.
#[derive(Clone)]
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
    cad_script: redis::Script,
}

/// Compare-and-delete as a Lua script so the GET and DEL are one
/// atomic step on the server.
const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

impl RedisStore {
    /// Connects to Redis and prepares the connection manager.
    pub async fn connect(url: &str) -> CoordResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        info!("Connected to Redis");

        Ok(RedisStore {
            manager,
            cad_script: redis::Script::new(COMPARE_AND_DELETE),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> CoordResult<bool> {
        let mut conn = self.manager.clone();
        // SET key value NX PX ms → OK when created, nil when the key exists
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(created.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> CoordResult<bool> {
        let mut conn = self.manager.clone();
        let deleted: i64 = self
            .cad_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn increment(&self, key: &str, by: i64) -> CoordResult<i64> {
        let mut conn = self.manager.clone();
        let value: i64 = conn.incr(key, by).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: bool = conn.pexpire(key, ttl.as_millis() as i64).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CoordResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl.as_millis() as u64)
                    .query_async(&mut conn)
                    .await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CoordResult<bool> {
        let mut conn = self.manager.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> CoordResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> CoordResult<HashMap<String, String>> {
        let mut conn = self.manager.clone();
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CoordResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_contains(&self, key: &str, member: &str) -> CoordResult<bool> {
        let mut conn = self.manager.clone();
        let found: bool = conn.sismember(key, member).await?;
        Ok(found)
    }

    async fn list_push(&self, key: &str, value: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn list_pop(&self, key: &str, count: usize) -> CoordResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let values: Vec<String> = conn.rpop(key, NonZeroUsize::new(count)).await?;
        Ok(values)
    }

    async fn list_len(&self, key: &str) -> CoordResult<i64> {
        let mut conn = self.manager.clone();
        let len: i64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn publish(&self, channel: &str, message: &str) -> CoordResult<()> {
        let mut conn = self.manager.clone();
        let receivers: i64 = conn.publish(channel, message).await?;
        debug!(channel, receivers, "Published message");
        Ok(())
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, (HashMap<String, String>, Option<Instant>)>,
    sets: HashMap<String, (HashSet<String>, Option<Instant>)>,
    lists: HashMap<String, VecDeque<String>>,
    published: Vec<(String, String)>,
}

impl MemoryInner {
    /// Drops any container whose deadline has passed.
    fn purge_expired(&mut self, now: Instant) {
        self.strings.retain(|_, (_, exp)| exp.map_or(true, |e| e > now));
        self.hashes.retain(|_, (_, exp)| exp.map_or(true, |e| e > now));
        self.sets.retain(|_, (_, exp)| exp.map_or(true, |e| e > now));
    }
}

/// Single-process [`KeyValueStore`] for tests and local development.
///
/// TTLs are tracked with [`tokio::time::Instant`], so tests running
/// under `#[tokio::test(start_paused = true)]` can advance the clock
/// past an expiry deterministically. Never wired as an implicit
/// production fallback.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Messages published so far, oldest first. Test observability for
    /// the fire-and-forget broadcast path.
    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().published.clone()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut MemoryInner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap();
        inner.purge_expired(Instant::now());
        f(&mut inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> CoordResult<bool> {
        Ok(self.with_inner(|inner| {
            if inner.strings.contains_key(key) {
                false
            } else {
                inner
                    .strings
                    .insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
                true
            }
        }))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> CoordResult<bool> {
        Ok(self.with_inner(|inner| match inner.strings.get(key) {
            Some((current, _)) if current == expected => {
                inner.strings.remove(key);
                true
            }
            _ => false,
        }))
    }

    async fn increment(&self, key: &str, by: i64) -> CoordResult<i64> {
        Ok(self.with_inner(|inner| {
            let entry = inner
                .strings
                .entry(key.to_string())
                .or_insert_with(|| ("0".to_string(), None));
            let current: i64 = entry.0.parse().unwrap_or(0);
            let next = current + by;
            entry.0 = next.to_string();
            next
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoordResult<()> {
        let deadline = Instant::now() + ttl;
        self.with_inner(|inner| {
            if let Some(entry) = inner.strings.get_mut(key) {
                entry.1 = Some(deadline);
            }
            if let Some(entry) = inner.hashes.get_mut(key) {
                entry.1 = Some(deadline);
            }
            if let Some(entry) = inner.sets.get_mut(key) {
                entry.1 = Some(deadline);
            }
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> CoordResult<Option<String>> {
        Ok(self.with_inner(|inner| inner.strings.get(key).map(|(v, _)| v.clone())))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<()> {
        let deadline = ttl.map(|t| Instant::now() + t);
        self.with_inner(|inner| {
            inner.strings.insert(key.to_string(), (value.to_string(), deadline));
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            inner.strings.remove(key);
            inner.hashes.remove(key);
            inner.sets.remove(key);
            inner.lists.remove(key);
        });
        Ok(())
    }

    async fn exists(&self, key: &str) -> CoordResult<bool> {
        Ok(self.with_inner(|inner| {
            inner.strings.contains_key(key)
                || inner.hashes.contains_key(key)
                || inner.sets.contains_key(key)
                || inner.lists.contains_key(key)
        }))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            inner
                .hashes
                .entry(key.to_string())
                .or_insert_with(|| (HashMap::new(), None))
                .0
                .insert(field.to_string(), value.to_string());
        });
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> CoordResult<Option<String>> {
        Ok(self.with_inner(|inner| {
            inner
                .hashes
                .get(key)
                .and_then(|(fields, _)| fields.get(field).cloned())
        }))
    }

    async fn hash_get_all(&self, key: &str) -> CoordResult<HashMap<String, String>> {
        Ok(self.with_inner(|inner| {
            inner
                .hashes
                .get(key)
                .map(|(fields, _)| fields.clone())
                .unwrap_or_default()
        }))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            if let Some((fields, _)) = inner.hashes.get_mut(key) {
                fields.remove(field);
            }
        });
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            inner
                .sets
                .entry(key.to_string())
                .or_insert_with(|| (HashSet::new(), None))
                .0
                .insert(member.to_string());
        });
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            if let Some((members, _)) = inner.sets.get_mut(key) {
                members.remove(member);
            }
        });
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CoordResult<Vec<String>> {
        Ok(self.with_inner(|inner| {
            inner
                .sets
                .get(key)
                .map(|(members, _)| members.iter().cloned().collect())
                .unwrap_or_default()
        }))
    }

    async fn set_contains(&self, key: &str, member: &str) -> CoordResult<bool> {
        Ok(self.with_inner(|inner| {
            inner
                .sets
                .get(key)
                .map(|(members, _)| members.contains(member))
                .unwrap_or(false)
        }))
    }

    async fn list_push(&self, key: &str, value: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            inner
                .lists
                .entry(key.to_string())
                .or_default()
                .push_front(value.to_string());
        });
        Ok(())
    }

    async fn list_pop(&self, key: &str, count: usize) -> CoordResult<Vec<String>> {
        Ok(self.with_inner(|inner| {
            let Some(list) = inner.lists.get_mut(key) else {
                return Vec::new();
            };
            let mut popped = Vec::new();
            for _ in 0..count {
                match list.pop_back() {
                    Some(value) => popped.push(value),
                    None => break,
                }
            }
            if list.is_empty() {
                inner.lists.remove(key);
            }
            popped
        }))
    }

    async fn list_len(&self, key: &str) -> CoordResult<i64> {
        Ok(self.with_inner(|inner| inner.lists.get(key).map(|l| l.len() as i64).unwrap_or(0)))
    }

    async fn publish(&self, channel: &str, message: &str) -> CoordResult<()> {
        self.with_inner(|inner| {
            inner
                .published
                .push((channel.to_string(), message.to_string()));
        });
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_not_exists_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store
            .set_if_not_exists("lock:a", "t1", Duration::from_secs(5))
            .await
            .unwrap());
        assert!(!store
            .set_if_not_exists("lock:a", "t2", Duration::from_secs(5))
            .await
            .unwrap());
        assert_eq!(store.get("lock:a").await.unwrap().as_deref(), Some("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_frees_key() {
        let store = MemoryStore::new();
        store
            .set_if_not_exists("lock:a", "t1", Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(!store.exists("lock:a").await.unwrap());
        // A fresh holder can now take the key
        assert!(store
            .set_if_not_exists("lock:a", "t2", Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete_requires_match() {
        let store = MemoryStore::new();
        store.set("k", "expected", None).await.unwrap();

        assert!(!store.compare_and_delete("k", "other").await.unwrap());
        assert!(store.exists("k").await.unwrap());

        assert!(store.compare_and_delete("k", "expected").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_creates_at_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("counter", 1).await.unwrap(), 1);
        assert_eq!(store.increment("counter", 1).await.unwrap(), 2);
        assert_eq!(store.increment("counter", 5).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_list_push_pop_is_fifo() {
        let store = MemoryStore::new();
        for value in ["e1", "e2", "e3"] {
            store.list_push("q", value).await.unwrap();
        }
        assert_eq!(store.list_len("q").await.unwrap(), 3);

        let popped = store.list_pop("q", 2).await.unwrap();
        assert_eq!(popped, vec!["e1".to_string(), "e2".to_string()]);

        // Over-asking returns what is left
        let rest = store.list_pop("q", 10).await.unwrap();
        assert_eq!(rest, vec!["e3".to_string()]);
        assert_eq!(store.list_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hash_and_set_ops() {
        let store = MemoryStore::new();
        store.hash_set("h", "f1", "v1").await.unwrap();
        store.hash_set("h", "f2", "v2").await.unwrap();
        assert_eq!(store.hash_get("h", "f1").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(store.hash_get_all("h").await.unwrap().len(), 2);
        store.hash_delete("h", "f1").await.unwrap();
        assert!(store.hash_get("h", "f1").await.unwrap().is_none());

        store.set_add("s", "a").await.unwrap();
        store.set_add("s", "a").await.unwrap();
        store.set_add("s", "b").await.unwrap();
        assert_eq!(store.set_members("s").await.unwrap().len(), 2);
        assert!(store.set_contains("s", "a").await.unwrap());
        store.set_remove("s", "a").await.unwrap();
        assert!(!store.set_contains("s", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_is_recorded() {
        let store = MemoryStore::new();
        store.publish("events", "hello").await.unwrap();
        assert_eq!(store.published(), vec![("events".to_string(), "hello".to_string())]);
    }
}
