//! 🎬 Sync — the orchestrator that drives extract → transform → load, forever.
//!
//! One [`SyncWorker`] per document kind, each an independent tokio task.
//! They share connection handles and nothing else: every kind owns its own
//! watermark key, so the workers never coordinate, never lock, and never
//! hear about each other's bad days.
//!
//! The loop per worker reads like the state machine it is:
//!
//! ```text
//!   CHECKING ──no change──▶ SLEEPING ──▶ CHECKING ...
//!      │
//!   boundary found
//!      ▼
//!   EXTRACTING ──batch──▶ LOADING ──▶ EXTRACTING ... (until the pages run dry)
//!      ▼
//!   SLEEPING
//! ```
//!
//! The crash-consistency rule lives here and only here: the watermark for a
//! kind advances to the drain boundary only after a bulk load came back with
//! zero rejections. Anything less leaves the watermark frozen, which makes
//! the next cycle re-extract the same boundary — at-least-once delivery,
//! funded by upsert-by-id.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app_config::SyncConfig;
use crate::common::{EPOCH_MARKER, Kind};
use crate::extract::{Source, SourceBackend};
use crate::load::{LoadBackend, Loader};
use crate::retry::RetryPolicy;
use crate::state::{StateBackend, StateStore};
use crate::transform::DocTransform;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// 🔄 One kind's sync loop: check, extract, transform, load, sleep, repeat.
#[derive(Debug)]
pub(crate) struct SyncWorker {
    kind: Kind,
    source: SourceBackend,
    transform: DocTransform,
    sink: LoadBackend,
    state: StateBackend,
    batch_size: usize,
    sleep_interval: Duration,
    retry: RetryPolicy,
}

impl SyncWorker {
    pub(crate) fn new(
        kind: Kind,
        source: SourceBackend,
        sink: LoadBackend,
        state: StateBackend,
        sync_config: &SyncConfig,
    ) -> Self {
        Self {
            kind,
            source,
            transform: DocTransform::new(kind),
            sink,
            state,
            batch_size: sync_config.batch_size,
            sleep_interval: Duration::from_secs(sync_config.sleep_secs),
            retry: sync_config.retry.clone(),
        }
    }

    /// One full drain: detect the boundary, then page batches through
    /// transform and load until the extractor runs dry.
    ///
    /// Returns `Ok` for both "synced things" and "nothing to do" — the caller
    /// only distinguishes errors, which it logs and survives.
    pub(crate) async fn drain_cycle(&self) -> Result<()> {
        let index = self.kind.index();
        let retry = &self.retry;
        let state = &self.state;
        let source = &self.source;
        let sink = &self.sink;

        // CHECKING: where are we, and did anything move past that point?
        let previous = match retry.run("read watermark", || state.get(index)).await? {
            Some(marker) => marker,
            None => {
                info!(kind = %self.kind, "no watermark yet — starting from the beginning of time");
                retry
                    .run("seed watermark", || state.set(index, EPOCH_MARKER))
                    .await?;
                EPOCH_MARKER.to_string()
            }
        };
        let previous = previous.as_str();

        let boundary = match retry
            .run("check for changes", || source.latest_modified(previous))
            .await?
        {
            Some(boundary) => boundary,
            None => {
                debug!(kind = %self.kind, watermark = previous, "nothing new under the watermark");
                return Ok(());
            }
        };

        info!(kind = %self.kind, from = previous, to = %boundary, "🚰 drain cycle started");

        // EXTRACTING ⇄ LOADING: page through everything behind the boundary.
        let limit = self.batch_size as i64;
        let mut offset = 0i64;
        let mut total_docs = 0usize;

        loop {
            let rows = retry
                .run("fetch batch", || source.fetch_page(previous, limit, offset))
                .await?;
            if rows.is_empty() {
                // Zero rows on the first page happens when the boundary raced
                // a concurrent writer; either way there is nothing to confirm,
                // so the watermark stays put until a page actually lands.
                break;
            }
            let fetched = rows.len();

            let batch = self.transform.transform_batch(rows);
            if batch.skipped > 0 {
                warn!(
                    kind = %self.kind,
                    skipped = batch.skipped,
                    "malformed rows dropped from this batch — see the errors above for ids"
                );
            }

            if !batch.docs.is_empty() {
                let docs = batch.docs;
                let report = retry
                    .run("bulk load", || sink.bulk_upsert(index, &docs))
                    .await?;
                if !report.fully_ok() {
                    // Per-document details were already logged by the sink.
                    // Freeze the watermark and abort the drain: next cycle
                    // re-extracts the same boundary from the same watermark,
                    // and upsert-by-id makes the re-delivery harmless.
                    bail!(
                        "the index rejected {}/{} documents for '{index}'; watermark stays at '{previous}' and the drain will be retried",
                        report.failures.len(),
                        docs.len()
                    );
                }
                total_docs += docs.len();
            }

            // This batch is durably in the index (or was all skip-logged);
            // the boundary is now safe to claim for it.
            retry
                .run("advance watermark", || state.set(index, &boundary))
                .await
                .context("bulk load landed but the watermark would not advance")?;

            offset += fetched as i64;
            if fetched < self.batch_size {
                break;
            }
        }

        info!(
            kind = %self.kind,
            docs = total_docs,
            watermark = %boundary,
            "✅ drain cycle complete"
        );
        Ok(())
    }
}

impl Worker for SyncWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            info!(kind = %self.kind, "🎬 sync worker rolling");
            loop {
                // Errors are logged and contained here: one kind's bad cycle
                // never reaches another kind's worker.
                if let Err(err) = self.drain_cycle().await {
                    error!(kind = %self.kind, "💀 drain cycle failed: {err:#}");
                }
                // SLEEPING
                tokio::time::sleep(self.sleep_interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPOCH_MARKER;
    use crate::extract::{InMemorySource, MovieRow, SourceRow};
    use crate::load::InMemorySink;
    use crate::state::InMemoryStateStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn movie_row(n: u128, day: u32, title: &str) -> SourceRow {
        SourceRow::Movie(MovieRow {
            id: Uuid::from_u128(n),
            title: title.to_string(),
            description: None,
            imdb_rating: Some(7.0),
            actors: json!([]),
            directors: json!([]),
            writers: json!([]),
            genre: json!([{"id": Uuid::from_u128(900), "name": "Drama"}]),
            actors_names: vec![],
            directors_names: vec![],
            writers_names: vec![],
            modified: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        })
    }

    fn fast_config(batch_size: usize) -> SyncConfig {
        SyncConfig {
            batch_size,
            sleep_secs: 0,
            schema_wait_secs: 1,
            retry: RetryPolicy {
                start_delay_ms: 1,
                factor: 1,
                max_delay_ms: 2,
                max_attempts: 2,
            },
        }
    }

    fn worker_with(
        rows: Vec<SourceRow>,
        sink: &InMemorySink,
        state: &InMemoryStateStore,
        batch_size: usize,
    ) -> SyncWorker {
        SyncWorker::new(
            Kind::Movies,
            SourceBackend::InMemory(InMemorySource::new(rows)),
            LoadBackend::InMemory(sink.clone()),
            StateBackend::InMemory(state.clone()),
            &fast_config(batch_size),
        )
    }

    #[tokio::test]
    async fn the_one_where_the_first_drain_carries_everything() -> Result<()> {
        let sink = InMemorySink::new();
        let state = InMemoryStateStore::new();
        let worker = worker_with(
            vec![movie_row(1, 1, "Alien"), movie_row(2, 2, "Heat")],
            &sink,
            &state,
            100,
        );

        worker.drain_cycle().await?;

        assert_eq!(sink.len("movies").await, 2);
        // Watermark advanced to the boundary: the newest modified in the drain.
        assert_eq!(
            state.get("movies").await?.as_deref(),
            Some("2024-01-02T00:00:00.000000Z")
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_nothing_changed_and_nothing_happened() -> Result<()> {
        let sink = InMemorySink::new();
        let state = InMemoryStateStore::new();
        let worker = worker_with(vec![movie_row(1, 1, "Alien")], &sink, &state, 100);

        worker.drain_cycle().await?;
        let watermark_after_first = state.get("movies").await?;
        let calls_after_first = sink.call_count().await;

        // Second cycle: the source is frozen, so no boundary, no batch,
        // no load call, no watermark movement. Peak efficiency.
        worker.drain_cycle().await?;

        assert_eq!(sink.call_count().await, calls_after_first);
        assert_eq!(state.get("movies").await?, watermark_after_first);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_rejected_document_freezes_the_watermark() -> Result<()> {
        let sink = InMemorySink::new();
        let state = InMemoryStateStore::new();
        let rejected_id = Uuid::from_u128(2).to_string();
        sink.reject(&rejected_id).await;

        let worker = worker_with(
            vec![movie_row(1, 1, "Alien"), movie_row(2, 2, "Heat")],
            &sink,
            &state,
            100,
        );

        // The drain fails and the watermark stays at the seeded epoch.
        assert!(worker.drain_cycle().await.is_err());
        assert_eq!(state.get("movies").await?.as_deref(), Some(EPOCH_MARKER));

        // The fault clears; the same boundary re-extracts identically and the
        // earlier-accepted document is simply overwritten by id.
        sink.clear_rejections().await;
        worker.drain_cycle().await?;

        assert_eq!(sink.len("movies").await, 2);
        assert_eq!(
            state.get("movies").await?.as_deref(),
            Some("2024-01-02T00:00:00.000000Z")
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_backlog_pages_through_in_batches() -> Result<()> {
        let sink = InMemorySink::new();
        let state = InMemoryStateStore::new();
        let worker = worker_with(
            vec![
                movie_row(1, 1, "Alien"),
                movie_row(2, 2, "Heat"),
                movie_row(3, 3, "Ronin"),
            ],
            &sink,
            &state,
            1, // one document per batch, three bulk calls
        );

        worker.drain_cycle().await?;

        assert_eq!(sink.call_count().await, 3);
        assert_eq!(sink.len("movies").await, 3);
        assert_eq!(
            state.get("movies").await?.as_deref(),
            Some("2024-01-03T00:00:00.000000Z")
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_malformed_row_is_left_behind_not_blocking() -> Result<()> {
        let sink = InMemorySink::new();
        let state = InMemoryStateStore::new();

        let mut broken = movie_row(1, 1, "Corrupted");
        if let SourceRow::Movie(ref mut row) = broken {
            row.actors = json!("definitely not a cast list");
        }

        let worker = worker_with(vec![broken, movie_row(2, 2, "Heat")], &sink, &state, 100);
        worker.drain_cycle().await?;

        // The good row landed, the bad row was logged and skipped, and the
        // drain still completed with an advanced watermark.
        assert_eq!(sink.len("movies").await, 1);
        assert!(sink.doc("movies", &Uuid::from_u128(2).to_string()).await.is_some());
        assert_eq!(
            state.get("movies").await?.as_deref(),
            Some("2024-01-02T00:00:00.000000Z")
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_watermark_only_ever_moves_forward() -> Result<()> {
        let sink = InMemorySink::new();
        let state = InMemoryStateStore::new();

        // Watermark already past every row in the source.
        state.set("movies", "2024-06-01T00:00:00.000000Z").await?;

        let worker = worker_with(vec![movie_row(1, 1, "Alien")], &sink, &state, 100);
        worker.drain_cycle().await?;

        // Older rows are invisible; the watermark never rewinds for them.
        assert_eq!(sink.call_count().await, 0);
        assert_eq!(
            state.get("movies").await?.as_deref(),
            Some("2024-06-01T00:00:00.000000Z")
        );
        Ok(())
    }
}
