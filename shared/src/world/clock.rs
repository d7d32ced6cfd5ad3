use crate::constants::TICK_PERIOD;
use crate::event::Event;
use serde::{Deserialize, Serialize};

/// Everything about the clock that crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    /// Seconds shown on the clock
    pub value: f64,
    /// A countdown flashes once it drops to this many seconds
    pub flash_below: f64,
    pub counting: bool,
    pub showing: bool,
    pub upwards: bool,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            value: 0.0,
            flash_below: 10.0,
            counting: false,
            showing: false,
            upwards: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Clock {
    pub state: ClockState,
    pub on_zero: Event<()>,
}

impl Clock {
    pub fn set_state(&mut self, state: ClockState) {
        self.state = state;
    }

    pub fn start_countdown(&mut self, seconds: f64) {
        self.state = ClockState {
            value: seconds,
            counting: true,
            showing: true,
            upwards: false,
            ..self.state
        };
    }

    pub fn start_count_up(&mut self) {
        self.state = ClockState {
            value: 0.0,
            counting: true,
            showing: true,
            upwards: true,
            ..self.state
        };
    }

    pub fn stop(&mut self) {
        self.state.counting = false;
    }

    /// Advances the clock by one tick of game time.
    pub fn tick(&mut self) {
        if !self.state.counting {
            return;
        }
        if self.state.upwards {
            self.state.value += TICK_PERIOD;
            return;
        }
        self.state.value -= TICK_PERIOD;
        if self.state.value <= 1e-9 {
            self.state.value = 0.0;
            self.state.counting = false;
            self.on_zero.fire(&());
        }
    }

    pub fn should_flash(&self) -> bool {
        !self.state.upwards && self.state.counting && self.state.value <= self.state.flash_below
    }

    pub fn time_string(&self) -> String {
        if !self.state.showing {
            return String::new();
        }
        let total = if self.state.upwards {
            self.state.value.floor()
        } else {
            self.state.value.ceil()
        } as u64;
        format!("{}:{:02}", total / 60, total % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_countdown_fires_on_zero_once() {
        let mut clock = Clock::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        clock.on_zero.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        clock.start_countdown(3.0 * TICK_PERIOD);
        for _ in 0..10 {
            clock.tick();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(clock.state.value, 0.0);
        assert!(!clock.state.counting);
    }

    #[test]
    fn test_time_string() {
        let mut clock = Clock::default();
        clock.start_countdown(125.0);
        assert_eq!(clock.time_string(), "2:05");
        clock.tick();
        assert_eq!(clock.time_string(), "2:05");

        clock.start_count_up();
        assert_eq!(clock.time_string(), "0:00");
    }

    #[test]
    fn test_flash_threshold() {
        let mut clock = Clock::default();
        clock.start_countdown(60.0);
        assert!(!clock.should_flash());
        clock.start_countdown(5.0);
        assert!(clock.should_flash());
    }
}
