//! 🔄 Transform — raw rows in, validated documents out.
//!
//! This is the one genuinely pure stage of the pipeline: no I/O, no clocks,
//! no state. One row becomes exactly one document, deterministically, which
//! makes the whole stage trivially retryable — run it twice, get the same
//! bytes twice.
//!
//! A malformed row does NOT take its batch down with it. It fails loudly —
//! logged with its id and the exact decode error — and only that row is
//! skipped. The watermark logic upstream neither knows nor cares; it counts
//! documents, not casualties.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::error;

use crate::common::{Document, Kind};
use crate::extract::SourceRow;

pub(crate) mod documents;

use documents::{FilmRoles, GenreDoc, GenreRef, MovieDoc, PersonDoc, PersonRef};

/// 📦 What a batch looks like after transformation: the survivors, and a count
/// of the rows that didn't make it (already logged individually).
#[derive(Debug)]
pub(crate) struct TransformedBatch {
    pub docs: Vec<Document>,
    pub skipped: usize,
}

/// 🔄 The per-kind row-to-document mapper.
#[derive(Debug, Clone)]
pub(crate) struct DocTransform {
    kind: Kind,
}

impl DocTransform {
    pub(crate) fn new(kind: Kind) -> Self {
        Self { kind }
    }

    /// Map a whole batch, skipping (and logging) malformed rows.
    pub(crate) fn transform_batch(&self, rows: Vec<SourceRow>) -> TransformedBatch {
        let mut docs = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;

        for row in rows {
            let row_id = row.id();
            match self.transform_row(row) {
                Ok(doc) => docs.push(doc),
                Err(err) => {
                    skipped += 1;
                    error!(
                        kind = %self.kind,
                        id = %row_id,
                        "🗑️ dropping malformed row, the rest of the batch continues: {err:#}"
                    );
                }
            }
        }

        TransformedBatch { docs, skipped }
    }

    /// One row in, one document out. Pure function; all the `?`s are shape
    /// validation, not I/O.
    fn transform_row(&self, row: SourceRow) -> Result<Document> {
        match row {
            SourceRow::Movie(row) => {
                let actors: Vec<PersonRef> = decode_aggregate(row.actors, "actors")?;
                let directors: Vec<PersonRef> = decode_aggregate(row.directors, "directors")?;
                let writers: Vec<PersonRef> = decode_aggregate(row.writers, "writers")?;
                let genre: Vec<GenreRef> = decode_aggregate(row.genre, "genre")?;
                // The flat name list is derived, not queried — one source of truth.
                let genres = genre.iter().map(|g| g.name.clone()).collect();

                let id = row.id;
                let doc = MovieDoc {
                    id,
                    imdb_rating: row.imdb_rating,
                    title: row.title,
                    description: row.description,
                    genres,
                    genre,
                    actors_names: row.actors_names,
                    directors_names: row.directors_names,
                    writers_names: row.writers_names,
                    actors,
                    directors,
                    writers,
                };
                into_document(id.to_string(), &doc)
            }
            SourceRow::Genre(row) => {
                let doc = GenreDoc {
                    id: row.id,
                    name: row.name,
                };
                into_document(row.id.to_string(), &doc)
            }
            SourceRow::Person(row) => {
                let films: Vec<FilmRoles> = decode_aggregate(row.films, "films")?;
                let doc = PersonDoc {
                    id: row.id,
                    full_name: row.full_name,
                    films,
                };
                into_document(row.id.to_string(), &doc)
            }
        }
    }
}

/// Decode one jsonb aggregate column into its typed shape.
/// NULL is forgiven (empty collection); anything else malformed is not.
fn decode_aggregate<T: DeserializeOwned>(value: Value, field: &str) -> Result<Vec<T>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value)
        .with_context(|| format!("aggregate column '{field}' does not decode into the expected shape"))
}

fn into_document<T: serde::Serialize>(id: String, doc: &T) -> Result<Document> {
    let body = serde_json::to_value(doc).context("document failed to serialize — this is a bug, not bad data")?;
    Ok(Document { id, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{GenreRow, MovieRow, PersonRow};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn movie_row(n: u128) -> MovieRow {
        MovieRow {
            id: Uuid::from_u128(n),
            title: "Blade Runner".to_string(),
            description: Some("Do androids dream?".to_string()),
            imdb_rating: Some(8.1),
            actors: json!([
                {"id": Uuid::from_u128(100), "full_name": "Harrison Ford"},
                {"id": Uuid::from_u128(101), "full_name": "Sean Young"},
            ]),
            directors: json!([{"id": Uuid::from_u128(102), "full_name": "Ridley Scott"}]),
            writers: json!([]),
            genre: json!([{"id": Uuid::from_u128(200), "name": "Sci-Fi"}]),
            actors_names: vec!["Harrison Ford".to_string(), "Sean Young".to_string()],
            directors_names: vec!["Ridley Scott".to_string()],
            writers_names: vec![],
            modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn the_one_where_a_movie_row_becomes_a_full_document() {
        let transform = DocTransform::new(Kind::Movies);
        let batch = transform.transform_batch(vec![SourceRow::Movie(movie_row(1))]);

        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.docs.len(), 1);

        let doc = &batch.docs[0];
        assert_eq!(doc.id, Uuid::from_u128(1).to_string());
        assert_eq!(doc.body["title"], "Blade Runner");
        assert_eq!(doc.body["imdb_rating"], 8.1);
        // Flat genre names derived from the structured records.
        assert_eq!(doc.body["genres"], json!(["Sci-Fi"]));
        assert_eq!(doc.body["genre"][0]["name"], "Sci-Fi");
        assert_eq!(doc.body["actors"].as_array().unwrap().len(), 2);
        assert_eq!(doc.body["actors_names"], json!(["Harrison Ford", "Sean Young"]));
        assert_eq!(doc.body["writers"], json!([]));
    }

    #[test]
    fn the_one_where_missing_optionals_normalize_to_empty() {
        let mut row = movie_row(2);
        row.description = None;
        row.imdb_rating = None;
        row.actors = Value::Null; // jsonb NULL instead of '[]' — forgiven
        row.actors_names = vec![];

        let transform = DocTransform::new(Kind::Movies);
        let batch = transform.transform_batch(vec![SourceRow::Movie(row)]);

        assert_eq!(batch.skipped, 0);
        let doc = &batch.docs[0];
        assert_eq!(doc.body["description"], Value::Null);
        assert_eq!(doc.body["imdb_rating"], Value::Null);
        assert_eq!(doc.body["actors"], json!([]));
        assert_eq!(doc.body["actors_names"], json!([]));
    }

    #[test]
    fn the_one_where_one_bad_row_does_not_poison_the_batch() {
        let mut bad = movie_row(3);
        bad.actors = json!(42); // a number is not a cast list, no matter how confident it looks

        let transform = DocTransform::new(Kind::Movies);
        let batch =
            transform.transform_batch(vec![SourceRow::Movie(bad), SourceRow::Movie(movie_row(4))]);

        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.docs.len(), 1);
        assert_eq!(batch.docs[0].id, Uuid::from_u128(4).to_string());
    }

    #[test]
    fn the_one_where_persons_carry_their_filmography() {
        let row = PersonRow {
            id: Uuid::from_u128(5),
            full_name: "Ridley Scott".to_string(),
            films: json!([
                {"id": Uuid::from_u128(1), "roles": ["director"]},
                {"id": Uuid::from_u128(2), "roles": ["director", "writer"]},
            ]),
            modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };

        let transform = DocTransform::new(Kind::Persons);
        let batch = transform.transform_batch(vec![SourceRow::Person(row)]);

        assert_eq!(batch.skipped, 0);
        let doc = &batch.docs[0];
        assert_eq!(doc.body["full_name"], "Ridley Scott");
        assert_eq!(doc.body["films"].as_array().unwrap().len(), 2);
        assert_eq!(doc.body["films"][1]["roles"], json!(["director", "writer"]));
    }

    #[test]
    fn the_one_where_genres_are_exactly_as_small_as_they_look() {
        let row = GenreRow {
            id: Uuid::from_u128(6),
            name: "Noir".to_string(),
            modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };

        let transform = DocTransform::new(Kind::Genres);
        let batch = transform.transform_batch(vec![SourceRow::Genre(row)]);

        let doc = &batch.docs[0];
        assert_eq!(doc.id, Uuid::from_u128(6).to_string());
        assert_eq!(doc.body, json!({"id": Uuid::from_u128(6), "name": "Noir"}));
    }

    #[test]
    fn the_one_where_transforming_twice_yields_identical_bytes() {
        // Determinism is the whole retry story: same row, same document.
        let transform = DocTransform::new(Kind::Movies);
        let once = transform.transform_batch(vec![SourceRow::Movie(movie_row(7))]);
        let twice = transform.transform_batch(vec![SourceRow::Movie(movie_row(7))]);
        assert_eq!(once.docs, twice.docs);
    }
}
