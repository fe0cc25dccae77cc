//! 🔄 Retry — geometric backoff for the three flaky friends we depend on.
//!
//! Postgres, Redis and the search cluster all live on the other side of a
//! network, and networks have moods. Every I/O call site wraps itself in a
//! [`RetryPolicy`] instead of hiding retries inside the clients: the policy is
//! explicit, configurable, and visible right where the call happens.
//!
//! The shape is classic geometric backoff: start small, multiply hard, cap at
//! a ceiling, give up after a bounded number of attempts. With the defaults
//! the delay ladder reads 0.4s → 1.6s → 6.4s → 10s → 10s → … and the whole
//! thing surrenders after 15 attempts. When it surrenders, the caller's cycle
//! no-ops — nothing was committed, nothing is lost, next cycle tries again.

use anyhow::Result;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

fn default_start_delay_ms() -> u64 {
    100
}

fn default_factor() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    15
}

/// 🔄 An explicit retry policy, applied at the call site of each I/O operation.
///
/// After the n-th failure the next delay is `min(delay * 2^factor, max_delay)`.
/// Yes, `2^factor`, not `factor` — the multiplier is 4 with the defaults.
/// That is the contract the rest of the system was tuned against; change the
/// numbers in config, not the formula.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            start_delay_ms: default_start_delay_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryPolicy {
    /// How long to sleep after the given number of consecutive failures.
    fn delay_after(&self, failures: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(self.factor);
        let mut delay_ms = self.start_delay_ms;
        for _ in 0..failures {
            delay_ms = delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        }
        Duration::from_millis(delay_ms)
    }

    /// 🚀 Run `op` until it succeeds or the attempt budget runs out.
    ///
    /// `what` is the human-readable label that shows up in the retry logs —
    /// "check for changes", "bulk load", that sort of thing. Keep it short;
    /// it will be read at 3am.
    ///
    /// On exhaustion the last error is returned as-is, with the attempt count
    /// noted, so the caller can log the full chain and move on with its life.
    pub(crate) async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        return Err(err.context(format!(
                            "💀 gave up on '{what}' after {} attempts",
                            self.max_attempts
                        )));
                    }
                    let delay = self.delay_after(failures);
                    warn!(
                        "⚠️ '{what}' failed (attempt {failures}/{}): {err:#}. retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A policy with delays measured in microscopic units, so the failure
    /// tests don't turn `cargo test` into a coffee break.
    fn twitchy_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            start_delay_ms: 1,
            factor: 1,
            max_delay_ms: 4,
            max_attempts,
        }
    }

    #[test]
    fn the_one_where_the_delay_ladder_matches_the_contract() {
        let policy = RetryPolicy::default();
        // 0.1s base, multiplier 2^2 = 4, capped at 10s.
        assert_eq!(policy.delay_after(1), Duration::from_millis(400));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1_600));
        assert_eq!(policy.delay_after(3), Duration::from_millis(6_400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay_after(5), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn the_one_where_the_third_attempt_is_the_charm() -> Result<()> {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_seen = calls.clone();

        let value = twitchy_policy(5)
            .run("flaky op", || {
                let calls = calls_seen.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow!("connection reset by peer (allegedly)"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await?;

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_budget_runs_out() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_seen = calls.clone();

        let outcome: Result<()> = twitchy_policy(3)
            .run("doomed op", || {
                let calls = calls_seen.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow!("still down"))
                }
            })
            .await;

        assert!(outcome.is_err());
        // Exactly max_attempts calls — no bonus attempt, no early surrender.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let rendered = format!("{:#}", outcome.unwrap_err());
        assert!(rendered.contains("after 3 attempts"));
    }
}
