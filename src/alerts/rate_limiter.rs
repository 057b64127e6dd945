use crate::events::Timestamp;
use chrono::{Duration, Utc};
use std::collections::VecDeque;

/// Sliding-window limiter for audible SOS notifications
///
/// A burst of people becoming trapped in the same cycle would otherwise ring
/// the operator's bell once per person. The limiter tracks when notifications
/// were played and refuses new ones once `max_per_window` have been played in
/// the trailing window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    /// Times of recent notifications, oldest first
    recent: VecDeque<Timestamp>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(6)
    }
}

impl RateLimiter {
    /// Allow at most `max_per_window` notifications in any `window`
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            recent: VecDeque::new(),
        }
    }

    pub fn per_minute(max_per_minute: usize) -> Self {
        Self::new(max_per_minute, Duration::minutes(1))
    }

    /// Whether a notification may be played now
    pub fn can_send(&mut self) -> bool {
        self.can_send_at(Utc::now())
    }

    /// Whether a notification may be played at `now`
    pub fn can_send_at(&mut self, now: Timestamp) -> bool {
        self.expire(now);
        self.recent.len() < self.max_per_window
    }

    /// Record a notification played now
    pub fn record(&mut self) {
        self.record_at(Utc::now());
    }

    pub fn record_at(&mut self, now: Timestamp) {
        self.recent.push_back(now);
        self.expire(now);
    }

    /// Check and record in one step; returns false when throttled
    pub fn try_acquire_at(&mut self, now: Timestamp) -> bool {
        if self.can_send_at(now) {
            self.record_at(now);
            true
        } else {
            false
        }
    }

    /// Notifications counted in the window ending at `now`
    pub fn count_at(&mut self, now: Timestamp) -> usize {
        self.expire(now);
        self.recent.len()
    }

    fn expire(&mut self, now: Timestamp) {
        let cutoff = now - self.window;
        self.recent.retain(|&t| t > cutoff);
    }
}
