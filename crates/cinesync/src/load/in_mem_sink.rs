//! 📦 The in-memory sink — a search cluster with the search surgically removed.
//!
//! ⚠️ This is NOT for production. This is for tests. It models exactly the two
//! behaviors the pipeline's guarantees are built on: upsert-by-id (same id
//! twice = one entry) and per-document rejection (so partial-failure paths can
//! be rehearsed without breaking a real cluster's feelings).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::common::Document;
use crate::load::{BulkFailure, BulkReport, Loader};

/// 🗄️ Nested maps standing in for a cluster: index name → (doc id → body).
/// Clone-able so tests can keep a handle and peek after the pipeline ran.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySink {
    indexed: Arc<tokio::sync::Mutex<HashMap<String, BTreeMap<String, Value>>>>,
    reject_ids: Arc<tokio::sync::Mutex<HashSet<String>>>,
    calls: Arc<tokio::sync::Mutex<usize>>,
}

impl InMemorySink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arrange for a given document id to be rejected, cluster-style.
    pub(crate) async fn reject(&self, id: &str) {
        self.reject_ids.lock().await.insert(id.to_string());
    }

    /// The transient fault "clears".
    pub(crate) async fn clear_rejections(&self) {
        self.reject_ids.lock().await.clear();
    }

    pub(crate) async fn doc(&self, index: &str, id: &str) -> Option<Value> {
        self.indexed
            .lock()
            .await
            .get(index)
            .and_then(|index| index.get(id).cloned())
    }

    pub(crate) async fn len(&self, index: &str) -> usize {
        self.indexed
            .lock()
            .await
            .get(index)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// How many bulk submissions arrived, successful or not.
    pub(crate) async fn call_count(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait]
impl Loader for InMemorySink {
    async fn bulk_upsert(&self, index: &str, docs: &[Document]) -> Result<BulkReport> {
        *self.calls.lock().await += 1;

        let reject_ids = self.reject_ids.lock().await.clone();
        let mut indexed = self.indexed.lock().await;
        let entries = indexed.entry(index.to_string()).or_default();

        let mut failures = Vec::new();
        for doc in docs {
            if reject_ids.contains(&doc.id) {
                failures.push(BulkFailure {
                    id: doc.id.clone(),
                    reason: "simulated mapping conflict".to_string(),
                });
                continue;
            }
            // Upsert: same id overwrites, no duplicates, no drama.
            entries.insert(doc.id.clone(), doc.body.clone());
        }

        Ok(BulkReport {
            accepted: docs.len() - failures.len(),
            failures,
        })
    }
}
