//! Wall-clock pacing of server ticks.

use shared::GameConfig;
use std::time::{Duration, Instant};

/// Works out how long to wait before each tick so that ticks keep to the
/// configured period on average.
///
/// A late tick shortens the following wait rather than pushing every later
/// tick back. The correction never exceeds one period: a wait is always
/// between zero and one period long.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    expected: Option<Instant>,
}

impl TickScheduler {
    pub fn new(config: &GameConfig) -> Self {
        let factor = config.debug.slow_motion_factor.max(0.0);
        Self {
            period: config.tick_period.mul_f64(factor),
            expected: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Called as a tick fires at `now`; returns the wait until the next one.
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        let delay = match self.expected {
            None => self.period,
            Some(expected) => (expected + self.period).saturating_duration_since(now),
        };
        self.expected = Some(now + delay);
        delay
    }

    /// Forgets the timing history, e.g. after the game was stopped.
    pub fn reset(&mut self) {
        self.expected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::DebugContext;

    fn scheduler() -> TickScheduler {
        TickScheduler::new(&GameConfig::default())
    }

    #[test]
    fn test_first_delay_is_one_period() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.next_delay(Instant::now()), Duration::from_millis(50));
    }

    #[test]
    fn test_late_tick_shortens_next_wait() {
        let mut scheduler = scheduler();
        let start = Instant::now();
        scheduler.next_delay(start);

        // Fired 20ms late
        let delay = scheduler.next_delay(start + Duration::from_millis(70));
        assert_eq!(delay, Duration::from_millis(30));
    }

    #[test]
    fn test_correction_is_bounded_to_one_period() {
        let mut scheduler = scheduler();
        let start = Instant::now();
        scheduler.next_delay(start);

        let delay = scheduler.next_delay(start + Duration::from_secs(2));
        assert_eq!(delay, Duration::ZERO);
        // The backlog is dropped rather than replayed
        let delay = scheduler.next_delay(start + Duration::from_secs(2));
        assert_eq!(delay, Duration::from_millis(50));
    }

    #[test]
    fn test_slow_motion_stretches_period() {
        let config = GameConfig {
            debug: DebugContext {
                slow_motion_factor: 4.0,
                ..DebugContext::default()
            },
            ..GameConfig::default()
        };
        assert_eq!(TickScheduler::new(&config).period(), Duration::from_millis(200));
    }
}
