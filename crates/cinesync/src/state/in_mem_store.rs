//! 📦 The in-memory state store — Redis with the network surgically removed.
//!
//! ⚠️ This is NOT for production. This is for tests. The lock semantics are
//! real (one mutex, one winner), the TTLs are not (nothing expires — the
//! schema guard's timeout tests drive their own clocks via `max_wait`).

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::state::StateStore;

/// 🗄️ A `HashMap` wearing a Redis costume. Clone-able because tests need to
/// peek inside after handing a copy to the pipeline — everyone shares the
/// same map through the `Arc`.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStateStore {
    entries: Arc<tokio::sync::Mutex<HashMap<String, String>>>,
}

impl InMemoryStateStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        // The mutex makes check-then-insert one indivisible step, which is the
        // exact property the schema-init guard leans on.
        let mut entries = self.entries.lock().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<()> {
        // TTLs are not modeled in RAM. Tests that care about waiting use the
        // guard's own max_wait instead of simulated key decay.
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_set_then_get_round_trips() -> Result<()> {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get("movies").await?, None);

        store.set("movies", "2024-01-01T00:00:00.000000Z").await?;
        assert_eq!(
            store.get("movies").await?.as_deref(),
            Some("2024-01-01T00:00:00.000000Z")
        );

        store.delete("movies").await?;
        assert_eq!(store.get("movies").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_only_the_first_claimant_wins() -> Result<()> {
        let store = InMemoryStateStore::new();
        assert!(store.set_if_absent("db_init_lock", "1").await?);
        assert!(!store.set_if_absent("db_init_lock", "1").await?);
        assert!(store.exists("db_init_lock").await?);

        store.delete("db_init_lock").await?;
        assert!(store.set_if_absent("db_init_lock", "1").await?);
        Ok(())
    }
}
