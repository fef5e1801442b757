//! Fixed-window upload rate limiter.
//!
//! Counts are kept in Redis when a URL is configured, so every replica
//! shares the same windows, and in process memory otherwise. A Redis error
//! lets the request through.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use redis::AsyncCommands;
use tokio::sync::Mutex;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request fits in the current window.
    Allowed {
        /// Requests left in this window after this one.
        remaining: u32,
    },
    /// The window is exhausted.
    Limited {
        /// Seconds until the window resets.
        retry_after_seconds: u64,
    },
}

impl RateDecision {
    /// Whether the request may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
struct WindowEntry {
    started: Instant,
    count: u32,
}

enum Backend {
    Memory(Mutex<HashMap<String, WindowEntry>>),
    Redis(redis::Client),
}

/// Per-key request limiter.
pub struct RateLimiter {
    name: &'static str,
    limit: u32,
    window: Duration,
    backend: Backend,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        };
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("backend", &backend)
            .finish()
    }
}

impl RateLimiter {
    /// In-process limiter.
    #[must_use]
    pub fn in_memory(name: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            name,
            limit,
            window,
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Redis-backed limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid Redis URL. No connection is
    /// made until the first check.
    pub fn redis(
        name: &'static str,
        limit: u32,
        window: Duration,
        url: &str,
    ) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            name,
            limit,
            window,
            backend: Backend::Redis(client),
        })
    }

    /// Record one request for `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> RateDecision {
        match &self.backend {
            Backend::Memory(entries) => self.check_memory(entries, key).await,
            Backend::Redis(client) => match self.check_redis(client, key).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(error = %e, limiter = self.name, "Rate limiter unavailable, allowing request");
                    RateDecision::Allowed {
                        remaining: self.limit,
                    }
                }
            },
        }
    }

    async fn check_memory(
        &self,
        entries: &Mutex<HashMap<String, WindowEntry>>,
        key: &str,
    ) -> RateDecision {
        let mut entries = entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return RateDecision::Limited {
                retry_after_seconds: remaining.as_secs().max(1),
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - entry.count,
        }
    }

    async fn check_redis(&self, client: &redis::Client, key: &str) -> redis::RedisResult<RateDecision> {
        let window_secs = self.window.as_secs().max(1);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let window_index = now / window_secs;
        let redis_key = format!("ratelimit:{}:{key}:{window_index}", self.name);

        let mut conn = client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.incr(&redis_key, 1u64).await?;
        if count == 1 {
            let ttl = i64::try_from(window_secs).unwrap_or(i64::MAX);
            let _: () = conn.expire(&redis_key, ttl).await?;
        }

        if count > u64::from(self.limit) {
            return Ok(RateDecision::Limited {
                retry_after_seconds: (window_secs - now % window_secs).max(1),
            });
        }

        Ok(RateDecision::Allowed {
            remaining: u32::try_from(u64::from(self.limit) - count).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = RateLimiter::in_memory("upload", 3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            assert_eq!(
                limiter.check("user-a").await,
                RateDecision::Allowed {
                    remaining: expected_remaining
                }
            );
        }

        let decision = limiter.check("user-a").await;
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::in_memory("upload", 1, Duration::from_secs(60));

        assert!(limiter.check("user-a").await.is_allowed());
        assert!(!limiter.check("user-a").await.is_allowed());
        assert!(limiter.check("user-b").await.is_allowed());
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::in_memory("upload", 1, Duration::from_secs(10));

        assert!(limiter.check("user-a").await.is_allowed());
        assert!(!limiter.check("user-a").await.is_allowed());

        // Age the window past its length.
        if let Backend::Memory(entries) = &limiter.backend {
            for entry in entries.lock().await.values_mut() {
                entry.started = Instant::now()
                    .checked_sub(Duration::from_secs(11))
                    .unwrap_or_else(Instant::now);
            }
        }

        assert!(limiter.check("user-a").await.is_allowed());
    }

    #[tokio::test]
    async fn unreachable_redis_fails_open() {
        let limiter =
            RateLimiter::redis("upload", 1, Duration::from_secs(60), "redis://127.0.0.1:1").unwrap();

        assert!(limiter.check("user-a").await.is_allowed());
        assert!(limiter.check("user-a").await.is_allowed());
    }
}
