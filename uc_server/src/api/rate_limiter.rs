//! Rate limiting for WebSocket messages.
//!
//! Each connection gets a [`MessageLimits`]: a short burst window and a
//! longer sustained window, both sliding.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// When each request still inside the window arrived
    timestamps: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Allow `max_requests` per `window`.
    ///
    /// ```
    /// use uc_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
    /// assert!(limiter.check());
    /// assert!(limiter.check());
    /// assert!(!limiter.check());
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// 10 messages per second
    pub fn burst() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// 100 messages per minute
    pub fn sustained() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a request if the window has room for it.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&mut self, now: Instant) -> bool {
        self.evict(now);
        if self.timestamps.len() >= self.max_requests {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    /// Requests still allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }
}

/// Which window a message ran into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitExceeded {
    Burst,
    Sustained,
}

impl LimitExceeded {
    pub fn message(self) -> &'static str {
        match self {
            Self::Burst => "Rate limit exceeded. Please slow down.",
            Self::Sustained => "Too many messages. Please wait before sending more.",
        }
    }
}

/// Burst and sustained limits of one connection.
#[derive(Debug)]
pub struct MessageLimits {
    burst: RateLimiter,
    sustained: RateLimiter,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            burst: RateLimiter::burst(),
            sustained: RateLimiter::sustained(),
        }
    }
}

impl MessageLimits {
    /// A message blocked by the burst window doesn't count against the
    /// sustained one.
    pub fn check(&mut self) -> Result<(), LimitExceeded> {
        if !self.burst.check() {
            return Err(LimitExceeded::Burst);
        }
        if !self.sustained.check() {
            return Err(LimitExceeded::Sustained);
        }
        Ok(())
    }
}
