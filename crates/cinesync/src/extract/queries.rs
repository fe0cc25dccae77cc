//! 📜 The SQL. All of it, in one place, where it can be read without scrolling
//! past Rust.
//!
//! Every page query binds the same three parameters: `$1` the previous
//! watermark, `$2` the page size, `$3` the page offset — and orders by
//! `(modified, id)` so pagination is stable while the source holds still.
//! Rows touched between the boundary check and the page fetch may slip to the
//! next cycle; that window is an accepted part of the design, not a bug to
//! paper over here.

/// Change boundary for one table: the newest `modified` past the watermark,
/// or NULL when the table has been quiet.
pub(crate) fn check_modified(table: &str) -> String {
    // `table` comes from Kind::table(), a closed set of three identifiers.
    // No user input ever reaches this format string.
    format!("SELECT MAX(modified) AS last_modified FROM content.{table} WHERE modified > $1")
}

/// 🎬 Films, denormalized: cast and crew grouped into three role buckets plus
/// three name-only arrays, genres both structured and (downstream) flattened.
///
/// The boundary fans out across the joins — a film is "changed" when the film
/// itself, any of its people, or any of its genres moved.
pub(crate) const MOVIES: &str = r#"
SELECT
    fw.id AS id,
    fw.title AS title,
    fw.description AS description,
    fw.rating AS imdb_rating,
    COALESCE(
        jsonb_agg(
            DISTINCT jsonb_build_object(
                'id', p.id,
                'full_name', p.full_name
            )
        ) FILTER (WHERE pfw.role = 'actor'),
        '[]'
    ) AS actors,
    COALESCE(
        jsonb_agg(
            DISTINCT jsonb_build_object(
                'id', p.id,
                'full_name', p.full_name
            )
        ) FILTER (WHERE pfw.role = 'director'),
        '[]'
    ) AS directors,
    COALESCE(
        jsonb_agg(
            DISTINCT jsonb_build_object(
                'id', p.id,
                'full_name', p.full_name
            )
        ) FILTER (WHERE pfw.role = 'writer'),
        '[]'
    ) AS writers,
    COALESCE(
        jsonb_agg(
            DISTINCT jsonb_build_object(
                'id', g.id,
                'name', g.name
            )
        ) FILTER (WHERE g.id IS NOT NULL),
        '[]'
    ) AS genre,
    COALESCE(array_agg(DISTINCT p.full_name) FILTER (WHERE pfw.role = 'actor'), ARRAY[]::text[]) AS actors_names,
    COALESCE(array_agg(DISTINCT p.full_name) FILTER (WHERE pfw.role = 'director'), ARRAY[]::text[]) AS directors_names,
    COALESCE(array_agg(DISTINCT p.full_name) FILTER (WHERE pfw.role = 'writer'), ARRAY[]::text[]) AS writers_names,
    MAX(fw.modified) AS modified
FROM content.film_work fw
LEFT JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
LEFT JOIN content.person p ON p.id = pfw.person_id
LEFT JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
LEFT JOIN content.genre g ON g.id = gfw.genre_id
WHERE fw.modified > $1
    OR p.modified > $1
    OR g.modified > $1
GROUP BY fw.id, fw.title, fw.description, fw.rating
ORDER BY MAX(fw.modified), fw.id
LIMIT $2 OFFSET $3
"#;

/// 🏷️ Genres travel light: no joins, no aggregates, just the row.
pub(crate) const GENRES: &str = r#"
SELECT
    g.id AS id,
    g.name AS name,
    g.modified AS modified
FROM content.genre AS g
WHERE g.modified > $1
ORDER BY g.modified, g.id
LIMIT $2 OFFSET $3
"#;

/// 🧑‍🎤 Persons with their filmography: roles grouped per (person, film) in a
/// CTE, then folded into one `films` array per person.
pub(crate) const PERSONS: &str = r#"
WITH person_roles AS (
    SELECT pfw.person_id,
           pfw.film_work_id,
           COALESCE(
               jsonb_agg(
                   pfw.role
               ),
               '[]'::jsonb
           ) AS roles
    FROM content.person_film_work AS pfw
    GROUP BY pfw.person_id, pfw.film_work_id
)
SELECT p.id AS id,
       p.full_name AS full_name,
       COALESCE(
           jsonb_agg(
               jsonb_build_object(
                   'id', person_roles.film_work_id,
                   'roles', person_roles.roles
               )
           ) FILTER (WHERE person_roles.film_work_id IS NOT NULL),
           '[]'::jsonb
       ) AS films,
       MAX(p.modified) AS modified
FROM content.person AS p
         LEFT JOIN person_roles ON person_roles.person_id = p.id
WHERE p.modified > $1
GROUP BY p.id, p.full_name
ORDER BY MAX(p.modified), p.id
LIMIT $2 OFFSET $3
"#;
