//! Rate limiting for outbound source requests.
//!
//! Each adapter owns a [`RateLimiter`]: a sliding window of request
//! timestamps. [`RateLimiter::try_acquire`] refuses once the window is full;
//! [`RateLimiter::acquire`] waits until a slot frees up instead.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::SearchError;

/// Sliding-window rate limiter, safe to share between concurrent requests.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests allowed per window.
    max_requests: u32,
    /// Window length.
    window: Duration,
    /// Timestamps of requests inside the current window.
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests_per_minute` requests per minute.
    #[must_use]
    pub fn per_minute(max_requests_per_minute: u32) -> Self {
        Self::new(max_requests_per_minute, Duration::from_secs(60))
    }

    /// Create a limiter allowing `max_requests` per `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to record a request, returning an error if the window is full.
    ///
    /// On success, records the request timestamp and returns `Ok(())`.
    /// On failure, returns [`SearchError::RateLimited`] with the delay until
    /// the oldest request ages out.
    pub fn try_acquire(&self) -> Result<(), SearchError> {
        let now = Instant::now();
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| SearchError::Http("rate limiter lock poisoned".into()))?;

        // Remove timestamps outside the window
        while let Some(&first) = sent.front() {
            if now.duration_since(first) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }

        if sent.len() >= self.max_requests as usize {
            let oldest = sent.front().copied().unwrap_or(now);
            let remaining = self.window.saturating_sub(now.duration_since(oldest));
            let retry_after_ms = u64::try_from(remaining.as_millis())
                .unwrap_or(u64::MAX)
                .saturating_add(1);
            return Err(SearchError::RateLimited { retry_after_ms });
        }

        sent.push_back(now);
        Ok(())
    }

    /// Wait until a request slot is available, then record it.
    ///
    /// Callers bound the total wait with their own timeout; the executor's
    /// per-source timeout covers this wait.
    pub async fn acquire(&self) -> Result<(), SearchError> {
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(SearchError::RateLimited { retry_after_ms }) => {
                    tracing::debug!(retry_after_ms, "rate limited, waiting");
                    tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Number of requests remaining in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let used = self.sent.lock().map_or(self.max_requests as usize, |sent| {
            sent.iter()
                .filter(|t| now.duration_since(**t) < self.window)
                .count()
        });
        self.max_requests.saturating_sub(used as u32)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn allows_within_limit() {
        let limiter = RateLimiter::per_minute(5);
        for _ in 0..5 {
            assert!(limiter.try_acquire().is_ok());
        }
    }

    #[test]
    fn blocks_exceeding_limit() {
        let limiter = RateLimiter::per_minute(3);
        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }

        match limiter.try_acquire() {
            Err(SearchError::RateLimited { retry_after_ms }) => {
                assert!(retry_after_ms > 0);
                assert!(retry_after_ms <= 60_001);
            }
            other => unreachable!("expected rate limit exceeded, got {other:?}"),
        }
    }

    #[test]
    fn remaining_count_decreases() {
        let limiter = RateLimiter::per_minute(5);
        assert_eq!(limiter.remaining(), 5);
        limiter.try_acquire().unwrap();
        assert_eq!(limiter.remaining(), 4);
        limiter.try_acquire().unwrap();
        assert_eq!(limiter.remaining(), 3);
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn acquire_waits_for_free_slot() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.acquire().await.unwrap();

        let started = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RateLimiter>();
    }
}
