//! 📦 Common data structures — the building blocks of cinesync.
//!
//! Three kinds of documents make the trip from Postgres to the search
//! cluster: movies, persons, genres. Everything in here is the shared
//! vocabulary the rest of the pipeline speaks: which kind, which index,
//! which table, and what a sync watermark looks like on the wire.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;

/// ⏰ The beginning of (unix) time. A kind with no watermark yet starts here,
/// which makes every row in its table "newer than last time" by definition.
pub(crate) const EPOCH_MARKER: &str = "1970-01-01T00:00:00Z";

/// 🎭 The three document kinds we synchronize. One independent worker per kind;
/// they share connections but never a watermark key, so they never have to talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Kind {
    Movies,
    Persons,
    Genres,
}

impl Kind {
    pub(crate) const ALL: [Kind; 3] = [Kind::Movies, Kind::Persons, Kind::Genres];

    /// 📡 The search index this kind lands in. Doubles as the watermark key —
    /// one name, two jobs, zero extra bookkeeping.
    pub(crate) fn index(self) -> &'static str {
        match self {
            Kind::Movies => "movies",
            Kind::Persons => "persons",
            Kind::Genres => "genres",
        }
    }

    /// 🐘 The relational table whose `modified` column drives change detection.
    pub(crate) fn table(self) -> &'static str {
        match self {
            Kind::Movies => "film_work",
            Kind::Persons => "person",
            Kind::Genres => "genre",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index())
    }
}

/// 🎯 One index-ready document: a stable id and the JSON body that will live
/// under it. Same id twice = upsert, which is the whole idempotence story.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Document {
    pub id: String,
    pub body: Value,
}

/// 🔖 Parse a stored watermark back into a timestamp we can bind into SQL.
///
/// Watermarks only ever come from [`format_marker`] or [`EPOCH_MARKER`], so a
/// parse failure here means someone hand-edited the store. We fail loudly
/// rather than silently resyncing from a garbage boundary.
pub(crate) fn parse_marker(marker: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(marker)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("watermark '{marker}' is not a valid RFC 3339 timestamp"))
}

/// 🔖 Render a boundary timestamp as the string that goes into the store.
///
/// Fixed precision + UTC `Z` suffix, so markers from different cycles stay
/// byte-comparable in the same order as the timestamps they stand for.
pub(crate) fn format_marker(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
