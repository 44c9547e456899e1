use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value primitives the service is built on.
///
/// Every method is atomic with respect to its key. Semantics follow the
/// Redis commands of the same name.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Increments the counter at `key` and returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()>;

    /// Sets `field` only if absent. Returns whether the write happened.
    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Returns whether the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Returns whether the member was present.
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn smembers(&self, key: &str) -> StoreResult<HashSet<String>>;

    /// Prepends `value` to the list at `key`.
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Inclusive range; negative indexes count from the end.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Cloneable handle to the shared store. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl Store {
    pub fn new(inner: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn memory(timeout: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), timeout)
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn timed<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    pub async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.timed(self.inner.incr(key)).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.timed(self.inner.hget(key, field)).await
    }

    pub async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.timed(self.inner.hgetall(key)).await
    }

    pub async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        self.timed(self.inner.hset_multiple(key, fields)).await
    }

    pub async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.timed(self.inner.hset_nx(key, field, value)).await
    }

    pub async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        self.timed(self.inner.hkeys(key)).await
    }

    pub async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.timed(self.inner.sadd(key, member)).await
    }

    pub async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.timed(self.inner.srem(key, member)).await
    }

    pub async fn smembers(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.timed(self.inner.smembers(key)).await
    }

    pub async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.timed(self.inner.lpush(key, value)).await
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.timed(self.inner.lrange(key, start, stop)).await
    }

    pub async fn del(&self, key: &str) -> StoreResult<()> {
        self.timed(self.inner.del(key)).await
    }
}

#[derive(Default)]
struct MemoryState {
    counters: HashMap<String, i64>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// In-process store. One lock guards everything, so each primitive is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut MemoryState) -> T,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Backend(format!("memory store lock poisoned: {}", e)))?;
        Ok(f(&mut state))
    }
}

/// Resolves a Redis-style inclusive range against a list of `len` items.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.with_state(|s| {
            let counter = s.counters.entry(key.to_string()).or_insert(0);
            *counter += 1;
            *counter
        })
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.with_state(|s| s.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.with_state(|s| s.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        self.with_state(|s| {
            let hash = s.hashes.entry(key.to_string()).or_default();
            for (field, value) in fields {
                hash.insert(field.to_string(), value.to_string());
            }
        })
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.with_state(|s| {
            let hash = s.hashes.entry(key.to_string()).or_default();
            if hash.contains_key(field) {
                false
            } else {
                hash.insert(field.to_string(), value.to_string());
                true
            }
        })
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        self.with_state(|s| {
            s.hashes
                .get(key)
                .map(|h| h.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_state(|s| s.sets.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_state(|s| s.sets.get_mut(key).map(|set| set.remove(member)).unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.with_state(|s| s.sets.get(key).cloned().unwrap_or_default())
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_state(|s| {
            s.lists
                .entry(key.to_string())
                .or_default()
                .push_front(value.to_string())
        })
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.with_state(|s| {
            let Some(list) = s.lists.get(key) else {
                return Vec::new();
            };
            match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }
        })
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.with_state(|s| {
            s.counters.remove(key);
            s.hashes.remove(key);
            s.sets.remove(key);
            s.lists.remove(key);
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
