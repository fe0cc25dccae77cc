//! 🎬 cinesync — incremental Postgres → Elasticsearch sync for a movie catalog.
//!
//! Three document kinds (movies, persons, genres), one independent sync
//! worker each, a Redis watermark per kind, and a lock-guarded schema init
//! at boot. The workers loop forever: detect changes past the watermark,
//! extract denormalized batches, transform them into index documents, bulk
//! upsert, advance the watermark, sleep, repeat.

pub mod app_config;
mod common;
mod extract;
mod load;
mod retry;
mod schema;
mod state;
mod sync;
mod transform;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::app_config::AppConfig;
use crate::common::Kind;
use crate::extract::{PostgresSource, SourceBackend};
use crate::load::{ElasticsearchSink, LoadBackend};
use crate::schema::SchemaInitGuard;
use crate::state::{RedisStateStore, StateBackend};
use crate::sync::{SyncWorker, Worker};

/// 🚀 Wire everything up and run until the process is told to stop.
///
/// Boot order matters: storage handles first (each under the retry policy,
/// because replicas and their dependencies rarely finish booting in the
/// polite order), then the schema guard, then the workers.
pub async fn run(config: AppConfig) -> Result<()> {
    let retry = config.sync.retry.clone();

    let postgres_url = config.postgres.url.as_str();
    let max_connections = config.postgres.max_connections;
    let pool = retry
        .run("connect to postgres", || async move {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(postgres_url)
                .await
                .context("postgres connection attempt failed")
        })
        .await
        .context("💀 could not reach postgres — the catalog is unreachable, so there is nothing to sync")?;
    info!("🐘 postgres connected");

    let redis_url = config.redis.url.as_str();
    let state = StateBackend::Redis(
        retry
            .run("connect to redis", || RedisStateStore::connect(redis_url))
            .await
            .context("💀 could not reach redis — without the watermark store, every drain would start from 1970")?,
    );
    info!("🔑 redis connected");

    SchemaInitGuard::new(
        state.clone(),
        Duration::from_secs(config.sync.schema_wait_secs),
    )
    .run(|| schema::apply_schema(&pool))
    .await
    .context("database schema initialization failed")?;

    let mut workers = Vec::with_capacity(Kind::ALL.len());
    for kind in Kind::ALL {
        let sink = LoadBackend::Elasticsearch(
            retry
                .run("connect to elasticsearch", || {
                    ElasticsearchSink::new(config.elasticsearch.clone())
                })
                .await
                .context("💀 could not reach elasticsearch — documents need somewhere to land")?,
        );
        let source = SourceBackend::Postgres(PostgresSource::new(pool.clone(), kind));
        let worker = SyncWorker::new(kind, source, sink, state.clone(), &config.sync);
        workers.push(worker.start());
    }
    info!("🎬 all sync workers rolling");

    // The workers run forever; this only returns if one of them dies,
    // which is worth surfacing loudly rather than limping on two-thirds
    // of a pipeline.
    let outcomes = futures::future::try_join_all(workers)
        .await
        .context("a sync worker panicked")?;
    for outcome in outcomes {
        outcome?;
    }
    Ok(())
}
