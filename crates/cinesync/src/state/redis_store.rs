//! 🔑 The Redis state store — where watermarks sleep between drain cycles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;

use crate::state::StateStore;

/// 📡 Redis-backed [`StateStore`].
///
/// Wraps a [`ConnectionManager`], which multiplexes and auto-reconnects under
/// the hood and clones for pennies — so every method takes `&self` and clones
/// its own handle. The retry policy upstream handles the moods of the network;
/// this type only translates operations and dresses up errors with context.
#[derive(Clone)]
pub(crate) struct RedisStateStore {
    manager: ConnectionManager,
}

// ConnectionManager drags a lot of internals into any derived Debug output.
// Nobody debugging a watermark wants to read a connection pool's diary.
impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore").finish()
    }
}

impl RedisStateStore {
    /// 🚀 Open a managed connection to Redis.
    ///
    /// Fails fast on a malformed URL, and fails honestly when the server is
    /// unreachable — the caller wraps this in the retry policy, so "honestly"
    /// beats "heroically" here.
    pub(crate) async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("💀 '{url}' does not parse as a redis url"))?;
        let manager = ConnectionManager::new(client)
            .await
            .with_context(|| format!("redis at '{url}' refused the handshake"))?;
        debug!("🔑 redis connection manager is up");
        Ok(Self { manager })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("failed to GET '{key}' from redis"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(key, value)
            .await
            .with_context(|| format!("failed to SET '{key}' in redis"))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        // SETNX — the entire mutual-exclusion story fits in one command.
        let acquired: bool = conn
            .set_nx(key, value)
            .await
            .with_context(|| format!("failed to SETNX '{key}' in redis"))?;
        Ok(acquired)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: bool = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .with_context(|| format!("failed to EXPIRE '{key}' in redis"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: usize = conn
            .del(key)
            .await
            .with_context(|| format!("failed to DEL '{key}' in redis"))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let present: bool = conn
            .exists(key)
            .await
            .with_context(|| format!("failed to check EXISTS '{key}' in redis"))?;
        Ok(present)
    }
}
