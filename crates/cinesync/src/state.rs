//! 🔑 State — the key-value store behind watermarks and the init lock.
//!
//! One narrow trait, two backends: Redis for production, an in-memory map for
//! tests. The contract is deliberately tiny — get/set strings, atomic
//! set-if-absent, expiry, delete, exists — because that is everything the
//! pipeline needs and nothing it has to regret later.
//!
//! # Contract 📜
//! - `set_if_absent` is the only operation with cross-caller semantics: it
//!   must be atomic, because the schema-init guard builds its mutual
//!   exclusion on it.
//! - Watermark keys see plain get/set; exactly one worker owns each key, so
//!   no locking is required there. Disjoint keys, peaceful coexistence.
//! - No transactions. Callers are designed around crash-between-load-and-set,
//!   not protected from it.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub(crate) mod in_mem_store;
pub(crate) mod redis_store;

pub(crate) use in_mem_store::InMemoryStateStore;
pub(crate) use redis_store::RedisStateStore;

/// 🗄️ The storage seam. Implementors hold a cheap, cloneable handle and take
/// `&self` — callers clone connections per call rather than serializing every
/// operation through one `&mut` bottleneck.
#[async_trait]
pub(crate) trait StateStore: std::fmt::Debug + Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Atomically set `key` only if it does not exist. Returns whether we won.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// 🎭 The many faces of a state store — enum dispatch so the pipeline never
/// has to care whether its watermarks live in Redis or in a test's HashMap.
#[derive(Debug, Clone)]
pub(crate) enum StateBackend {
    Redis(RedisStateStore),
    InMemory(InMemoryStateStore),
}

#[async_trait]
impl StateStore for StateBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            StateBackend::Redis(store) => store.get(key).await,
            StateBackend::InMemory(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            StateBackend::Redis(store) => store.set(key, value).await,
            StateBackend::InMemory(store) => store.set(key, value).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        match self {
            StateBackend::Redis(store) => store.set_if_absent(key, value).await,
            StateBackend::InMemory(store) => store.set_if_absent(key, value).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        match self {
            StateBackend::Redis(store) => store.expire(key, ttl).await,
            StateBackend::InMemory(store) => store.expire(key, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            StateBackend::Redis(store) => store.delete(key).await,
            StateBackend::InMemory(store) => store.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self {
            StateBackend::Redis(store) => store.exists(key).await,
            StateBackend::InMemory(store) => store.exists(key).await,
        }
    }
}
