//! # Refresh Loop
//!
//! Fixed-cadence timer for hosts that don't already have a tick loop to
//! hang [`UpdateScheduler::tick`](crate::UpdateScheduler::tick) on.
//!
//! ## Design
//!
//! Unlike a simulation loop, a refresh loop never catches up. If the host
//! falls several intervals behind, the missed intervals are counted and
//! dropped, and the next refresh runs once: rebuilding twice in a row would
//! only produce two identical generations.

use std::time::{Duration, Instant};

use crate::config::CacheConfig;

/// Refresh timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshStats {
    /// Shortest refresh observed.
    pub min_refresh_us: u64,
    /// Longest refresh observed.
    pub max_refresh_us: u64,
    /// Rolling average refresh duration.
    pub avg_refresh_us: u64,
    /// Refreshes that took longer than the interval.
    pub late_refreshes: u64,
    /// Intervals dropped because the host fell behind.
    pub missed_intervals: u64,
    /// Refreshes measured.
    pub total_refreshes: u64,
}

impl RefreshStats {
    fn fresh(interval: Duration) -> Self {
        Self {
            min_refresh_us: u64::MAX,
            max_refresh_us: 0,
            avg_refresh_us: micros(interval),
            late_refreshes: 0,
            missed_intervals: 0,
            total_refreshes: 0,
        }
    }
}

/// Fixed-cadence refresh controller.
#[derive(Debug)]
pub struct RefreshLoop {
    interval: Duration,
    last_poll: Instant,
    accumulator: Duration,
    refresh_count: u64,
    stats: RefreshStats,
}

impl RefreshLoop {
    /// Creates a loop firing every `interval` (at least 1 ms).
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            last_poll: Instant::now(),
            accumulator: Duration::ZERO,
            refresh_count: 0,
            stats: RefreshStats::fresh(interval),
        }
    }

    /// Creates a loop at the configured refresh interval.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.refresh_interval())
    }

    /// Returns true if a refresh is due.
    #[must_use]
    pub fn should_refresh(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_poll);
        self.last_poll = now;

        self.accumulator >= self.interval
    }

    /// Marks the start of a refresh and returns its start time.
    ///
    /// Any whole intervals beyond the one being served are dropped.
    #[must_use]
    pub fn begin(&mut self) -> Instant {
        let pending = self.accumulator.as_nanos() / self.interval.as_nanos();
        if pending > 1 {
            self.stats.missed_intervals += u64::try_from(pending - 1).unwrap_or(u64::MAX);
        }
        let remainder = self.accumulator.as_nanos() % self.interval.as_nanos();
        self.accumulator = Duration::from_nanos(u64::try_from(remainder).unwrap_or(0));
        self.refresh_count += 1;
        Instant::now()
    }

    /// Marks the end of a refresh started at `start`.
    pub fn end(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = micros(duration);

        self.stats.total_refreshes += 1;
        self.stats.min_refresh_us = self.stats.min_refresh_us.min(duration_us);
        self.stats.max_refresh_us = self.stats.max_refresh_us.max(duration_us);
        self.stats.avg_refresh_us = (self.stats.avg_refresh_us * 15 + duration_us) / 16;

        if duration > self.interval {
            self.stats.late_refreshes += 1;
        }
    }

    /// Sleeps until the next refresh is due.
    pub fn wait_for_next(&self) {
        let owed = self.interval.saturating_sub(self.accumulator);
        let elapsed = self.last_poll.elapsed();
        if elapsed < owed {
            std::thread::sleep(owed - elapsed);
        }
    }

    /// Refreshes started so far.
    #[must_use]
    pub const fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Target interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = RefreshStats::fresh(self.interval);
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_loop_creation() {
        let refresh = RefreshLoop::from_config(&CacheConfig::default());
        assert_eq!(refresh.refresh_count(), 0);
        assert_eq!(refresh.interval(), Duration::from_millis(100));
        assert_eq!(RefreshLoop::new(Duration::ZERO).interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_refresh_execution() {
        let mut refresh = RefreshLoop::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(3));

        assert!(refresh.should_refresh());
        let start = refresh.begin();
        refresh.end(start);

        assert_eq!(refresh.refresh_count(), 1);
        assert_eq!(refresh.stats().total_refreshes, 1);
    }

    #[test]
    fn test_backlog_is_dropped_not_replayed() {
        let mut refresh = RefreshLoop::new(Duration::from_millis(2));
        std::thread::sleep(Duration::from_millis(10));

        assert!(refresh.should_refresh());
        let start = refresh.begin();
        refresh.end(start);

        assert_eq!(refresh.refresh_count(), 1);
        assert!(refresh.stats().missed_intervals >= 3);
    }

    #[test]
    fn test_wait_for_next() {
        let mut refresh = RefreshLoop::new(Duration::from_millis(5));
        let _ = refresh.should_refresh();
        refresh.wait_for_next();
        assert!(refresh.should_refresh());
    }
}
