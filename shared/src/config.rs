//! Explicit game configuration handed to the game and scheduler at
//! construction time.

use crate::constants::*;
use std::time::Duration;

/// Tunables for one game session.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub tick_period: Duration,
    pub max_per_team: usize,
    pub max_total: usize,
    pub lag_threshold: i32,
    pub lag_buffer: i32,
    pub initial_assumed_latency: i32,
    /// Ticks between recomputations of each agent's ideal delay
    pub delay_update_interval: u64,
    pub resync_expiry: u64,
    pub shot_bucket_resolution: f32,
    pub debug: DebugContext,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs_f64(TICK_PERIOD),
            max_per_team: 8,
            max_total: 16,
            lag_threshold: LAG_THRESHOLD,
            lag_buffer: LAG_BUFFER,
            initial_assumed_latency: INITIAL_ASSUMED_LATENCY,
            delay_update_interval: DELAY_UPDATE_INTERVAL,
            resync_expiry: RESYNC_EXPIRY,
            shot_bucket_resolution: SHOT_BUCKET_RESOLUTION,
            debug: DebugContext::default(),
        }
    }
}

impl GameConfig {
    /// Total player capacity, which can never exceed two full teams.
    pub fn max_total_players(&self) -> usize {
        self.max_total.min(2 * self.max_per_team)
    }

    pub fn with_capacity(mut self, max_per_team: usize, max_total: usize) -> Self {
        self.max_per_team = max_per_team;
        self.max_total = max_total;
        self
    }
}

/// Debugging knobs passed in from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugContext {
    /// Minimum delay in ticks applied to every timestamped request
    pub force_delay: Option<i32>,
    /// Stretches the wall-clock tick period without touching game time
    pub slow_motion_factor: f64,
}

impl Default for DebugContext {
    fn default() -> Self {
        Self {
            force_delay: None,
            slow_motion_factor: 1.0,
        }
    }
}
