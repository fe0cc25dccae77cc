//! 🚰 Extract — change detection and batch extraction from the relational source.
//!
//! A [`Source`] answers two questions per drain cycle:
//!
//! 1. *Did anything move?* — `latest_modified` computes the change boundary:
//!    the maximum `modified` timestamp strictly newer than the watermark, or
//!    `None` when the cycle can go straight back to sleep.
//! 2. *Give me the rows.* — `fetch_page` pulls one fixed-size, denormalized
//!    batch of rows newer than the watermark, ordered by `(modified, id)`
//!    ascending so a drain is deterministic for a frozen source.
//!
//! The sequence of pages is finite per invocation and restartable only in the
//! sense that the next cycle recomputes the boundary from scratch — nobody
//! resumes mid-sequence after a crash, they just drain again.
//!
//! # Knowledge Graph 🧠
//! - Pattern: trait → concrete impls (PostgresSource, InMemorySource) → SourceBackend enum
//! - Rows come out raw: jsonb aggregates stay `serde_json::Value` here and get
//!   validated downstream by the transformer. The source is a faucet, not a chef.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

pub(crate) mod in_mem_source;
pub(crate) mod postgres_source;
pub(crate) mod queries;

pub(crate) use in_mem_source::InMemorySource;
pub(crate) use postgres_source::PostgresSource;

/// 🎬 One denormalized film row: the film itself plus its cast, crew and
/// genres aggregated into jsonb buckets by the extraction query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MovieRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub imdb_rating: Option<f64>,
    /// `[{"id": …, "full_name": …}]` per role bucket, raw from jsonb_agg.
    pub actors: Value,
    pub directors: Value,
    pub writers: Value,
    /// `[{"id": …, "name": …}]` — the structured genre records.
    pub genre: Value,
    pub actors_names: Vec<String>,
    pub directors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct GenreRow {
    pub id: Uuid,
    pub name: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PersonRow {
    pub id: Uuid,
    pub full_name: String,
    /// `[{"id": <film id>, "roles": [...]}]`, raw from the roles CTE.
    pub films: Value,
    pub modified: DateTime<Utc>,
}

/// 🎭 One raw row of whichever kind this worker drains.
#[derive(Debug, Clone)]
pub(crate) enum SourceRow {
    Movie(MovieRow),
    Genre(GenreRow),
    Person(PersonRow),
}

impl SourceRow {
    pub(crate) fn id(&self) -> Uuid {
        match self {
            SourceRow::Movie(row) => row.id,
            SourceRow::Genre(row) => row.id,
            SourceRow::Person(row) => row.id,
        }
    }

    pub(crate) fn modified(&self) -> DateTime<Utc> {
        match self {
            SourceRow::Movie(row) => row.modified,
            SourceRow::Genre(row) => row.modified,
            SourceRow::Person(row) => row.modified,
        }
    }
}

/// 🚰 The extraction seam.
///
/// # Contract 📜
/// - `latest_modified(newer_than)` returns the change boundary as a marker
///   string, or `None` when nothing is newer. An epoch marker means "all rows
///   are new" and must be tolerated, not special-cased.
/// - `fetch_page` never advances anything; reading is free of side effects.
/// - Connectivity failures surface as errors — the retry policy upstream
///   decides how stubborn to be. Nothing here touches a watermark.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send + Sync {
    async fn latest_modified(&self, newer_than: &str) -> Result<Option<String>>;
    async fn fetch_page(&self, newer_than: &str, limit: i64, offset: i64)
    -> Result<Vec<SourceRow>>;
}

/// 🎭 The many faces of a Source. Production reads Postgres; tests read a Vec.
/// Ancient proverb: "He who hardcodes the backend, migrates only once."
#[derive(Debug)]
pub(crate) enum SourceBackend {
    Postgres(PostgresSource),
    InMemory(InMemorySource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn latest_modified(&self, newer_than: &str) -> Result<Option<String>> {
        match self {
            SourceBackend::Postgres(source) => source.latest_modified(newer_than).await,
            SourceBackend::InMemory(source) => source.latest_modified(newer_than).await,
        }
    }

    async fn fetch_page(
        &self,
        newer_than: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SourceRow>> {
        match self {
            SourceBackend::Postgres(source) => source.fetch_page(newer_than, limit, offset).await,
            SourceBackend::InMemory(source) => source.fetch_page(newer_than, limit, offset).await,
        }
    }
}
