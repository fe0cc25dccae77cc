//! 🐘 The Postgres source — where the change detector and the batch extractor
//! actually meet a database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::common::{Kind, format_marker, parse_marker};
use crate::extract::{GenreRow, MovieRow, PersonRow, Source, SourceRow, queries};

/// 📡 Postgres-backed [`Source`] for one kind.
///
/// Holds a cloned [`PgPool`] handle — pools are cheap to clone and shared
/// across all three workers, so each worker gets its own `PostgresSource`
/// without anyone opening three times the connections.
#[derive(Debug)]
pub(crate) struct PostgresSource {
    pool: PgPool,
    kind: Kind,
}

impl PostgresSource {
    pub(crate) fn new(pool: PgPool, kind: Kind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait]
impl Source for PostgresSource {
    async fn latest_modified(&self, newer_than: &str) -> Result<Option<String>> {
        let since = parse_marker(newer_than)?;
        let sql = queries::check_modified(self.kind.table());

        debug!(kind = %self.kind, watermark = %newer_than, "checking the table for changes");

        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(&sql)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .with_context(|| {
                format!(
                    "💀 change check against 'content.{}' failed — postgres is unreachable or unhappy",
                    self.kind.table()
                )
            })?;

        Ok(latest.map(format_marker))
    }

    async fn fetch_page(
        &self,
        newer_than: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SourceRow>> {
        let since = parse_marker(newer_than)?;

        let rows = match self.kind {
            Kind::Movies => sqlx::query_as::<_, MovieRow>(queries::MOVIES)
                .bind(since)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().map(SourceRow::Movie).collect::<Vec<_>>()),
            Kind::Genres => sqlx::query_as::<_, GenreRow>(queries::GENRES)
                .bind(since)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().map(SourceRow::Genre).collect::<Vec<_>>()),
            Kind::Persons => sqlx::query_as::<_, PersonRow>(queries::PERSONS)
                .bind(since)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().map(SourceRow::Person).collect::<Vec<_>>()),
        }
        .with_context(|| {
            format!(
                "💀 batch extraction for '{}' failed at offset {offset} — nothing was committed, the drain can simply run again",
                self.kind
            )
        })?;

        debug!(kind = %self.kind, rows = rows.len(), offset, "fetched one page");
        Ok(rows)
    }
}
