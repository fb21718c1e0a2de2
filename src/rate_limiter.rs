//! Sliding-window admission control for outbound scrape traffic
//!
//! Each source gets its own quota, and one global limiter caps total
//! outbound volume; every request passes through both. When a window is
//! saturated the caller sleeps until the oldest request ages out. Waiters
//! that queued on the same window wake together and all record into the
//! freed window, so short bursts above the nominal rate are possible;
//! throttling here is best-effort admission control, not a token bucket.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub requests: usize,
    pub remaining: usize,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request tagged with `key`, sleeping first if the window
    /// is full.
    pub async fn acquire(&self, key: &str) {
        let wait = {
            let mut history = self.history.lock().await;
            let now = Instant::now();
            let entries = history.entry(key.to_string()).or_default();
            Self::prune(entries, now, self.window);

            if entries.len() >= self.max_requests {
                let oldest = *entries.front().expect("non-empty window");
                Some((oldest + self.window).saturating_duration_since(now))
            } else {
                entries.push_back(now);
                None
            }
        };

        if let Some(delay) = wait {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let mut history = self.history.lock().await;
            let now = Instant::now();
            let entries = history.entry(key.to_string()).or_default();
            Self::prune(entries, now, self.window);
            entries.push_back(now);
        }
    }

    fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = entries.front() {
            if now.saturating_duration_since(*front) > window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn stats(&self, key: &str) -> LimiterStats {
        let mut history = self.history.lock().await;
        let now = Instant::now();
        match history.get_mut(key) {
            Some(entries) => {
                Self::prune(entries, now, self.window);
                LimiterStats {
                    requests: entries.len(),
                    remaining: self.max_requests.saturating_sub(entries.len()),
                }
            }
            None => LimiterStats {
                requests: 0,
                remaining: self.max_requests,
            },
        }
    }

    pub async fn reset(&self, key: &str) {
        self.history.lock().await.remove(key);
    }

    pub async fn reset_all(&self) {
        self.history.lock().await.clear();
    }
}

/// Per-source limiters composed with a process-wide global limiter.
pub struct SourceLimiters {
    sources: HashMap<String, RateLimiter>,
    global: RateLimiter,
}

impl SourceLimiters {
    pub fn new(quotas: HashMap<String, (usize, Duration)>, global: (usize, Duration)) -> Self {
        let sources = quotas
            .into_iter()
            .map(|(name, (max, window))| (name, RateLimiter::new(max, window)))
            .collect();
        Self {
            sources,
            global: RateLimiter::new(global.0, global.1),
        }
    }

    /// Apply the source-specific quota (when one exists) and then the
    /// global quota. Both are awaited in turn, not the max of the two.
    pub async fn throttle(&self, source: &str) {
        if let Some(limiter) = self.sources.get(source) {
            limiter.acquire(source).await;
        }
        self.global.acquire("global").await;
    }

    pub async fn stats(&self, source: &str) -> Option<LimiterStats> {
        match self.sources.get(source) {
            Some(limiter) => Some(limiter.stats(source).await),
            None => None,
        }
    }

    pub async fn global_stats(&self) -> LimiterStats {
        self.global.stats("global").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn under_limit_is_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        limiter.acquire("k").await;
        limiter.acquire("k").await;
        let stats = limiter.stats("k").await;
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_window_waits_for_oldest_to_age_out() {
        let limiter = RateLimiter::new(2, Duration::from_millis(500));
        limiter.acquire("k").await;
        limiter.acquire("k").await;

        let before = Instant::now();
        limiter.acquire("k").await;
        let waited = Instant::now().duration_since(before);
        assert!(waited >= Duration::from_millis(400), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        limiter.acquire("k").await;
        sleep(Duration::from_millis(150)).await;
        let stats = limiter.stats("k").await;
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.remaining, 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire("a").await;
        let stats_b = limiter.stats("b").await;
        assert_eq!(stats_b.requests, 0);
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire("a").await;
        limiter.reset("a").await;
        assert_eq!(limiter.stats("a").await.requests, 0);
    }

    #[tokio::test]
    async fn throttle_applies_source_and_global() {
        let mut quotas = HashMap::new();
        quotas.insert("komiku".to_string(), (5, Duration::from_secs(60)));
        let limiters = SourceLimiters::new(quotas, (30, Duration::from_secs(60)));

        limiters.throttle("komiku").await;
        limiters.throttle("unknown-source").await;

        assert_eq!(limiters.stats("komiku").await.unwrap().requests, 1);
        // Both calls passed through the global limiter.
        assert_eq!(limiters.global_stats().await.requests, 2);
    }
}
