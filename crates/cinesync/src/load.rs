//! 🕳️ Load — the sink end of the pipeline.
//!
//! A [`Loader`] takes a batch of documents and upserts them by id into a named
//! index. Upsert-by-id is the load-bearing word: re-delivering a document is
//! always safe, which is what lets the orchestrator retry whole drains without
//! double-counting anything.
//!
//! # Contract 📜
//! - `bulk_upsert` ships the entire batch in one request and reports per
//!   document: how many the index accepted, and exactly which ones it spat
//!   back (with the remote's own words for why).
//! - A transport-level failure is an `Err` — retryable upstream. A rejected
//!   document is NOT an `Err`; it comes back in the [`BulkReport`] so the
//!   orchestrator can freeze the watermark and take the whole boundary again
//!   next cycle.
//! - Loaders never touch the watermark. Sinks do I/O; bookkeeping lives with
//!   the worker that owns the drain.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::Document;

pub(crate) mod elasticsearch_sink;
pub(crate) mod in_mem_sink;

pub(crate) use elasticsearch_sink::ElasticsearchSink;
pub(crate) use in_mem_sink::InMemorySink;

/// 📛 One rejected document: its id and the index's stated reason.
#[derive(Debug, Clone)]
pub(crate) struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// 🧾 The outcome of one bulk submission.
#[derive(Debug, Clone, Default)]
pub(crate) struct BulkReport {
    pub accepted: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub(crate) fn fully_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

#[async_trait]
pub(crate) trait Loader: std::fmt::Debug + Send + Sync {
    async fn bulk_upsert(&self, index: &str, docs: &[Document]) -> Result<BulkReport>;
}

/// 🎭 The many faces of a Sink. Production ships NDJSON to a cluster;
/// tests ship to a HashMap with opinions.
#[derive(Debug)]
pub(crate) enum LoadBackend {
    Elasticsearch(ElasticsearchSink),
    InMemory(InMemorySink),
}

#[async_trait]
impl Loader for LoadBackend {
    async fn bulk_upsert(&self, index: &str, docs: &[Document]) -> Result<BulkReport> {
        match self {
            LoadBackend::Elasticsearch(sink) => sink.bulk_upsert(index, docs).await,
            LoadBackend::InMemory(sink) => sink.bulk_upsert(index, docs).await,
        }
    }
}
