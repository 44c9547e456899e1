use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::core::db::{KeyValueStore, StoreResult};

/// Redis backend. `ConnectionManager` reconnects on its own and is cheap to clone.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let value: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(value)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let written: bool = conn.hset_nx(key, field, value).await?;
        Ok(written)
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.hkeys(key).await?;
        Ok(keys)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<HashSet<String>> {
        let mut conn = self.conn.clone();
        let members: HashSet<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(key, start, stop).await?;
        Ok(items)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
