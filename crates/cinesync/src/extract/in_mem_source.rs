//! 📦 The in-memory source — a Vec of rows cosplaying as a movie database.
//!
//! ⚠️ This is NOT for production. This is for tests. It implements the same
//! watermark-and-pagination contract as the Postgres source, minus the
//! network, the SQL, and the 3am pages.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{format_marker, parse_marker};
use crate::extract::{Source, SourceRow};

#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySource {
    rows: Vec<SourceRow>,
}

impl InMemorySource {
    pub(crate) fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn latest_modified(&self, newer_than: &str) -> Result<Option<String>> {
        let since = parse_marker(newer_than)?;
        Ok(self
            .rows
            .iter()
            .map(SourceRow::modified)
            .filter(|modified| *modified > since)
            .max()
            .map(format_marker))
    }

    async fn fetch_page(
        &self,
        newer_than: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SourceRow>> {
        let since = parse_marker(newer_than)?;
        // Same ordering contract as the SQL: (modified, id) ascending.
        let mut changed: Vec<SourceRow> = self
            .rows
            .iter()
            .filter(|row| row.modified() > since)
            .cloned()
            .collect();
        changed.sort_by_key(|row| (row.modified(), row.id()));

        Ok(changed
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::GenreRow;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn genre_row(n: u128, day: u32) -> SourceRow {
        SourceRow::Genre(GenreRow {
            id: Uuid::from_u128(n),
            name: format!("genre-{n}"),
            modified: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn the_one_where_the_quiet_source_reports_no_boundary() -> Result<()> {
        let source = InMemorySource::new(vec![genre_row(1, 1)]);
        // Watermark already past every row: silence.
        assert_eq!(
            source.latest_modified("2024-02-01T00:00:00Z").await?,
            None
        );
        // Epoch watermark: everything is new.
        assert_eq!(
            source.latest_modified("1970-01-01T00:00:00Z").await?,
            Some("2024-01-01T00:00:00.000000Z".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_pages_slice_the_backlog_in_order() -> Result<()> {
        let source = InMemorySource::new(vec![genre_row(3, 3), genre_row(1, 1), genre_row(2, 2)]);

        let first = source.fetch_page("1970-01-01T00:00:00Z", 2, 0).await?;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id(), Uuid::from_u128(1));
        assert_eq!(first[1].id(), Uuid::from_u128(2));

        let second = source.fetch_page("1970-01-01T00:00:00Z", 2, 2).await?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id(), Uuid::from_u128(3));

        let third = source.fetch_page("1970-01-01T00:00:00Z", 2, 3).await?;
        assert!(third.is_empty());
        Ok(())
    }
}
