//! Sliding-window request quota for rate-limited providers.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ChannelError;

/// Bounds requests to `limit` per sliding `window`.
///
/// Acquisition is synchronous and never blocks: callers that hit the bound
/// get a `QuotaExceeded` error, which the dispatch layer treats as a
/// retryable failure.
pub struct QuotaLimiter {
    limit: u32,
    window: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl QuotaLimiter {
    /// Create a limiter allowing `limit` requests per `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Claim one request slot, or fail if the window is saturated.
    pub fn try_acquire(&self) -> Result<(), ChannelError> {
        let now = Instant::now();
        let mut stamps = self.stamps.lock().expect("quota lock poisoned");

        while let Some(front) = stamps.front() {
            if now.duration_since(*front) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.limit as usize {
            return Err(ChannelError::QuotaExceeded {
                limit: self.limit,
                window_secs: self.window.as_secs(),
            });
        }

        stamps.push_back(now);
        Ok(())
    }

    /// Requests currently counted against the window.
    pub fn in_flight(&self) -> usize {
        self.stamps.lock().expect("quota lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_saturated() {
        let limiter = QuotaLimiter::new(3, Duration::from_secs(60));

        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());

        let err = limiter.try_acquire().unwrap_err();
        assert!(matches!(err, ChannelError::QuotaExceeded { limit: 3, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let limiter = QuotaLimiter::new(1, Duration::from_millis(10));

        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.try_acquire().is_ok());
    }
}
