use std::time::{Duration, Instant};

/// A recurring deadline for the refresh cycle
///
/// The timer does not sleep or spawn anything itself. The host asks for
/// [`RefreshTimer::next_due`], waits until then and calls
/// [`RefreshTimer::fire`]. Only one deadline is tracked, so a timer can never
/// schedule two overlapping cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTimer {
    interval: Duration,
    next_due: Instant,
    /// Increments every time the timer is armed
    generation: u64,
}

impl RefreshTimer {
    /// Arm a timer whose first deadline is one interval after `now`
    pub fn arm(interval: Duration, now: Instant, generation: u64) -> Self {
        Self {
            interval,
            next_due: now + interval,
            generation,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Consume the current deadline if it has passed
    ///
    /// Returns true when a cycle should run. The next deadline is one
    /// interval later; deadlines missed while the host was busy are skipped
    /// rather than replayed back to back.
    pub fn fire(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_SECONDS: Duration = Duration::from_millis(5000);

    #[test]
    fn test_first_deadline_is_one_interval_out() {
        let start = Instant::now();
        let timer = RefreshTimer::arm(FIVE_SECONDS, start, 1);

        assert_eq!(timer.next_due(), start + FIVE_SECONDS);
        assert!(!timer.is_due(start + Duration::from_millis(4999)));
        assert!(timer.is_due(start + FIVE_SECONDS));
    }

    #[test]
    fn test_fires_once_per_interval() {
        let start = Instant::now();
        let mut timer = RefreshTimer::arm(FIVE_SECONDS, start, 1);

        let mut fired = 0;
        for ms in (0..=20_000).step_by(100) {
            if timer.fire(start + Duration::from_millis(ms)) {
                fired += 1;
            }
        }

        assert_eq!(fired, 4);
    }

    #[test]
    fn test_missed_deadlines_are_skipped() {
        let start = Instant::now();
        let mut timer = RefreshTimer::arm(FIVE_SECONDS, start, 1);

        let late = start + Duration::from_secs(23);
        assert!(timer.fire(late));
        assert!(!timer.fire(late));
        assert_eq!(timer.next_due(), late + FIVE_SECONDS);
    }
}
