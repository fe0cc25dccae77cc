//! 🔒 Schema — the "create the database exactly once" ritual.
//!
//! N replicas boot at the same time. All of them want the schema to exist.
//! Exactly one of them should run DDL, and the rest should wait politely —
//! not race, not crash, not shrug and hope. A Redis `SETNX` lock with a TTL
//! is the entire mechanism: no consensus protocol, no leader election, just
//! one key and a poll loop. The TTL bounds the worst-case stall if the lock
//! holder dies mid-DDL, and the DDL itself is idempotent (`IF NOT EXISTS`
//! everywhere) so a second run after a crash is a no-op, not a disaster.
//!
//! A replica that times out waiting does NOT proceed — booting without a
//! schema is how you trade one loud startup error for a thousand quiet
//! runtime ones.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use tracing::info;

use crate::state::{StateBackend, StateStore};

/// The lock key every replica fights over at boot.
pub(crate) const LOCK_KEY: &str = "db_init_lock";

const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 🐘 The catalog schema, idempotent end to end. Re-running any statement
/// against an initialized database changes nothing.
pub(crate) const CONTENT_SCHEMA_DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS content",
    r#"
    CREATE TABLE IF NOT EXISTS content.film_work (
        id uuid PRIMARY KEY,
        title text NOT NULL,
        description text,
        creation_date date,
        rating double precision,
        type text NOT NULL DEFAULT 'movie',
        created timestamp with time zone DEFAULT now(),
        modified timestamp with time zone NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content.person (
        id uuid PRIMARY KEY,
        full_name text NOT NULL,
        created timestamp with time zone DEFAULT now(),
        modified timestamp with time zone NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content.genre (
        id uuid PRIMARY KEY,
        name text NOT NULL,
        description text,
        created timestamp with time zone DEFAULT now(),
        modified timestamp with time zone NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content.person_film_work (
        id uuid PRIMARY KEY,
        person_id uuid NOT NULL REFERENCES content.person (id) ON DELETE CASCADE,
        film_work_id uuid NOT NULL REFERENCES content.film_work (id) ON DELETE CASCADE,
        role text NOT NULL,
        created timestamp with time zone DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content.genre_film_work (
        id uuid PRIMARY KEY,
        genre_id uuid NOT NULL REFERENCES content.genre (id) ON DELETE CASCADE,
        film_work_id uuid NOT NULL REFERENCES content.film_work (id) ON DELETE CASCADE,
        created timestamp with time zone DEFAULT now()
    )
    "#,
    // The `modified` indexes are what keep the change detector's MAX() scans
    // from aging the on-call engineer prematurely.
    "CREATE INDEX IF NOT EXISTS film_work_modified_idx ON content.film_work (modified)",
    "CREATE INDEX IF NOT EXISTS person_modified_idx ON content.person (modified)",
    "CREATE INDEX IF NOT EXISTS genre_modified_idx ON content.genre (modified)",
    "CREATE UNIQUE INDEX IF NOT EXISTS film_work_person_role_idx ON content.person_film_work (film_work_id, person_id, role)",
    "CREATE UNIQUE INDEX IF NOT EXISTS film_work_genre_idx ON content.genre_film_work (film_work_id, genre_id)",
];

/// Apply the catalog DDL, one statement at a time.
pub(crate) async fn apply_schema(pool: &PgPool) -> Result<()> {
    for statement in CONTENT_SCHEMA_DDL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| {
                format!(
                    "💀 schema statement failed: {}…",
                    statement.trim().lines().next().unwrap_or_default()
                )
            })?;
    }
    Ok(())
}

/// 🔒 The lock-protected, idempotent "create schema once across N replicas"
/// routine.
#[derive(Debug)]
pub(crate) struct SchemaInitGuard {
    state: StateBackend,
    max_wait: Duration,
    lock_ttl: Duration,
    poll_interval: Duration,
}

impl SchemaInitGuard {
    pub(crate) fn new(state: StateBackend, max_wait: Duration) -> Self {
        Self {
            state,
            max_wait,
            lock_ttl: DEFAULT_LOCK_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Tighten the clocks. Tests use this so "wait up to five minutes"
    /// becomes "wait up to fifty milliseconds".
    #[cfg(test)]
    pub(crate) fn with_timings(mut self, lock_ttl: Duration, poll_interval: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self.poll_interval = poll_interval;
        self
    }

    /// 🚀 Run `apply` exactly once across every concurrent caller.
    ///
    /// Winner: sets the lock (TTL-bounded), runs `apply`, releases the lock —
    /// releases it even when `apply` fails, so a broken migration doesn't
    /// wedge every other replica until the TTL clears it.
    ///
    /// Everyone else: polls for the lock to disappear and then proceeds on
    /// the assumption the winner finished. Past `max_wait`, gives up with a
    /// fatal error — the caller must NOT continue as if the schema exists.
    pub(crate) async fn run<F, Fut>(&self, apply: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.state.set_if_absent(LOCK_KEY, "1").await? {
            info!("🔒 init lock acquired — this replica creates the schema");
            self.state.expire(LOCK_KEY, self.lock_ttl).await?;

            let outcome = apply().await;
            let released = self.state.delete(LOCK_KEY).await;

            outcome.context("schema creation failed while holding the init lock")?;
            released.context("schema created, but the init lock would not release")?;
            info!("✅ schema created, lock released");
            return Ok(());
        }

        info!("another replica holds the init lock — waiting for it to finish");
        let mut waited = Duration::ZERO;
        loop {
            if !self.state.exists(LOCK_KEY).await? {
                break;
            }
            if waited >= self.max_wait {
                bail!(
                    "💀 timed out after {:?} waiting for another replica to initialize the schema — refusing to boot without one",
                    self.max_wait
                );
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
            if waited.as_secs() > 0 && waited.subsec_nanos() == 0 && waited.as_secs() % 10 == 0 {
                info!("still waiting on the schema init lock ({}s)", waited.as_secs());
            }
        }
        info!(
            "init lock released after {:?} — the schema is somebody else's finished work",
            waited
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateStore;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_guard(store: &InMemoryStateStore, max_wait: Duration) -> SchemaInitGuard {
        SchemaInitGuard::new(StateBackend::InMemory(store.clone()), max_wait)
            .with_timings(Duration::from_secs(60), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn the_one_where_four_replicas_race_and_only_one_builds() -> Result<()> {
        let store = InMemoryStateStore::new();
        let builds = Arc::new(AtomicUsize::new(0));

        let mut replicas = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let builds = builds.clone();
            replicas.push(tokio::spawn(async move {
                let guard = quick_guard(&store, Duration::from_secs(1));
                guard
                    .run(move || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        // A believable amount of DDL time, so the losers
                        // actually have to wait instead of sailing through.
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        Ok(())
                    })
                    .await
            }));
        }

        for replica in replicas {
            replica.await.expect("replica task panicked")?;
        }

        // Mutual exclusion: N callers, one schema creation, zero leftovers.
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(!store.exists(LOCK_KEY).await?);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_holder_never_lets_go_and_we_give_up() -> Result<()> {
        let store = InMemoryStateStore::new();
        // Somebody grabbed the lock and went to lunch.
        store.set(LOCK_KEY, "1").await?;

        let builds = Arc::new(AtomicUsize::new(0));
        let builds_seen = builds.clone();

        let guard = quick_guard(&store, Duration::from_millis(30));
        let outcome = guard
            .run(move || async move {
                builds_seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        // Timing out is fatal, and the schema work never ran here.
        assert!(outcome.is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_build_still_releases_the_lock() -> Result<()> {
        let store = InMemoryStateStore::new();

        let guard = quick_guard(&store, Duration::from_secs(1));
        let outcome = guard
            .run(|| async { Err(anyhow!("DDL said no")) })
            .await;
        assert!(outcome.is_err());
        // The lock is NOT wedged for everyone else.
        assert!(!store.exists(LOCK_KEY).await?);

        // And a retry (the DDL is idempotent, after all) can now win cleanly.
        let builds = Arc::new(AtomicUsize::new(0));
        let builds_seen = builds.clone();
        let guard = quick_guard(&store, Duration::from_secs(1));
        guard
            .run(move || async move {
                builds_seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await?;
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn the_one_where_every_ddl_statement_is_rerunnable() {
        for statement in CONTENT_SCHEMA_DDL {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "idempotence is the contract: {statement}"
            );
        }
    }
}
