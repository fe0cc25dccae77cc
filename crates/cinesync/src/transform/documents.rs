//! 🎞️ The index-ready document shapes — what the cluster actually stores.
//!
//! These are the validated forms of the raw jsonb aggregates coming off the
//! extraction queries. Deserialization IS the validation: a row whose
//! aggregates don't fit these shapes never becomes a document.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One credited person inside a movie document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PersonRef {
    pub id: Uuid,
    pub full_name: String,
}

/// One structured genre record inside a movie document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GenreRef {
    pub id: Uuid,
    pub name: String,
}

/// One film inside a person's filmography, with the roles they held in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FilmRoles {
    pub id: Uuid,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// 🎬 A movie document.
///
/// Carries the genre names twice on purpose: `genres` is the flat string list
/// the search UI filters on, `genre` keeps the structured records. Same deal
/// for people — three `*_names` arrays for matching, three structured arrays
/// for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MovieDoc {
    pub id: Uuid,
    #[serde(default)]
    pub imdb_rating: Option<f64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub genre: Vec<GenreRef>,
    #[serde(default)]
    pub actors_names: Vec<String>,
    #[serde(default)]
    pub directors_names: Vec<String>,
    #[serde(default)]
    pub writers_names: Vec<String>,
    #[serde(default)]
    pub actors: Vec<PersonRef>,
    #[serde(default)]
    pub directors: Vec<PersonRef>,
    #[serde(default)]
    pub writers: Vec<PersonRef>,
}

/// 🏷️ A genre document. It is exactly as small as it looks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GenreDoc {
    pub id: Uuid,
    pub name: String,
}

/// 🧑‍🎤 A person document with their filmography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PersonDoc {
    pub id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub films: Vec<FilmRoles>,
}
