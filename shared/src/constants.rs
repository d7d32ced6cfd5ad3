//! Simulation constants shared by every consumer of the world model.
//!
//! Durations that the server and clients must agree on are expressed in
//! ticks so that nothing in the deterministic path depends on wall time.

/// Wall-clock length of one simulation step in seconds.
pub const TICK_PERIOD: f64 = 0.05;

/// Tick ids wrap at this value. Only ever compare them with [`tick_distance`].
pub const TICK_LIMIT: u32 = 1 << 16;

/// Protocol greeting sent by a client before its first frame.
pub const PROTOCOL_GREETING: &[u8] = b"Arena18\n";
pub const SERVER_VERSION: &str = "0.1.0";

pub const PLAYER_ID_MIN: u8 = 1;
pub const PLAYER_ID_MAX: u8 = 255;
/// Written into a removed player's id so stale handles cannot resolve.
pub const NO_PLAYER: u8 = 0;

// Latency compensation, all in ticks
pub const INITIAL_ASSUMED_LATENCY: i32 = 8;
pub const LAG_THRESHOLD: i32 = 6;
pub const LAG_BUFFER: i32 = 3;
pub const DELAY_UPDATE_INTERVAL: u64 = 200;
pub const RESYNC_EXPIRY: u64 = 100;
pub const SYNC_CHECK_PERIOD: u64 = 60;
pub const SYNC_TOLERANCE: f32 = 2.0;

// Zone capture
pub const DEFENCE_CAP: usize = 3;
pub const PITY_BASE: f64 = 0.2;
pub const ZONE_WIDTH: f32 = 1000.0;
pub const ZONE_HEIGHT: f32 = 750.0;
pub const ORB_RADIUS: f32 = 60.0;

// Collision grid
pub const SHOT_BUCKET_RESOLUTION: f32 = 200.0;
pub const PLAYER_RADIUS: f32 = 20.0;
pub const SHOT_RADIUS: f32 = 3.0;
pub const COIN_RADIUS: f32 = 15.0;

// Movement, in map units per second
pub const GRAVITY: f32 = 1500.0;
pub const RUN_SPEED: f32 = 360.0;
pub const JUMP_SPEED: f32 = 700.0;
pub const GHOST_SPEED: f32 = 480.0;
pub const SHOT_SPEED: f32 = 1200.0;
pub const TROSBALL_THROW_SPEED: f32 = 900.0;

// Lifetimes in ticks
pub const SHOT_LIFETIME: u32 = 20;
pub const GRENADE_FUSE: u32 = 40;
pub const GRENADE_BLAST_RADIUS: f32 = 300.0;
pub const RESPAWN_TICKS: u32 = 100;
pub const COLLECTABLE_COIN_LIFETIME: u64 = 300;
pub const TROSBALL_THROW_COOLDOWN: u32 = 20;

// Economy
pub const KILL_REWARD: u32 = 20;
pub const COLLECTABLE_COIN_VALUE: u32 = 10;
pub const TAG_REWARD: u32 = 20;

pub type TickId = u16;
pub type PlayerId = u8;
pub type ZoneId = u16;
pub type ShotId = u16;
pub type CoinId = u16;

/// Signed number of ticks from `earlier` to `later`, taken the short way
/// around the wrap. Positive when `later` is ahead.
pub fn tick_distance(later: TickId, earlier: TickId) -> i32 {
    later.wrapping_sub(earlier) as i16 as i32
}

/// Converts a number of seconds to a whole number of ticks.
pub fn seconds_to_ticks(seconds: f64) -> u64 {
    (seconds / TICK_PERIOD).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_distance_plain() {
        assert_eq!(tick_distance(10, 8), 2);
        assert_eq!(tick_distance(8, 10), -2);
        assert_eq!(tick_distance(5, 5), 0);
    }

    #[test]
    fn test_tick_distance_across_wrap() {
        let limit_minus_one = (TICK_LIMIT - 1) as TickId;
        assert_eq!(tick_distance(0, limit_minus_one), 1);
        assert_eq!(tick_distance(3, limit_minus_one - 6), 10);
        assert_eq!(tick_distance(limit_minus_one, 1), -2);
    }

    #[test]
    fn test_seconds_to_ticks() {
        assert_eq!(seconds_to_ticks(10.0), DELAY_UPDATE_INTERVAL);
        assert_eq!(seconds_to_ticks(3.0), SYNC_CHECK_PERIOD);
        assert_eq!(seconds_to_ticks(0.0), 0);
    }
}
