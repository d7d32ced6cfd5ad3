//! Projectiles, pickups and the contested ball.

use super::physics::{floor_below, tick_seconds, PhysicsParams, Vector2};
use super::team::TeamId;
use crate::constants::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotKind {
    Normal,
    Ricochet,
    Turret,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: ShotId,
    pub team: Option<TeamId>,
    pub shooter: PlayerId,
    pub pos: Vector2,
    pub vel: Vector2,
    /// Ticks left before the shot fizzles
    pub time_left: u32,
    pub kind: ShotKind,
    pub expired: bool,
}

impl Shot {
    pub fn advance(&mut self, speed: f32, map_size: Vector2) {
        if self.expired {
            return;
        }
        self.pos = self.pos.add(&self.vel.scale(tick_seconds(speed)));
        self.time_left = self.time_left.saturating_sub(1);

        let out_x = self.pos.x < 0.0 || self.pos.x > map_size.x;
        let out_y = self.pos.y < 0.0 || self.pos.y > map_size.y;
        if out_x || out_y {
            if self.kind == ShotKind::Ricochet {
                if out_x {
                    self.vel.x = -self.vel.x;
                    self.pos.x = self.pos.x.clamp(0.0, map_size.x);
                }
                if out_y {
                    self.vel.y = -self.vel.y;
                    self.pos.y = self.pos.y.clamp(0.0, map_size.y);
                }
            } else {
                self.expired = true;
            }
        }
        if self.time_left == 0 {
            self.expired = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grenade {
    pub player: PlayerId,
    pub pos: Vector2,
    pub vel: Vector2,
    pub time_left: u32,
}

impl Grenade {
    /// Returns true once the fuse has burnt out.
    pub fn advance(&mut self, physics: &PhysicsParams, speed: f32, map_size: Vector2) -> bool {
        let dt = tick_seconds(speed);
        self.vel.y += physics.gravity * dt;
        let previous_y = self.pos.y;
        self.pos = self.pos.add(&self.vel.scale(dt));

        let floor = floor_below(previous_y, SHOT_RADIUS, map_size.y);
        if self.pos.y >= floor && self.vel.y > 0.0 {
            self.pos.y = floor;
            self.vel.y = -self.vel.y * 0.5;
            self.vel.x *= 0.7;
        }
        if self.pos.x < 0.0 || self.pos.x > map_size.x {
            self.vel.x = -self.vel.x;
            self.pos.x = self.pos.x.clamp(0.0, map_size.x);
        }

        self.time_left = self.time_left.saturating_sub(1);
        self.time_left == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectableCoin {
    pub id: CoinId,
    /// Monotonic tick the coin appeared on; negative for coins restored from
    /// a snapshot that predate this consumer.
    pub created_tick: i64,
    pub pos: Vector2,
    pub vel: Vector2,
}

impl CollectableCoin {
    pub fn advance(&mut self, physics: &PhysicsParams, speed: f32, map_size: Vector2) {
        let dt = tick_seconds(speed);
        let floor = floor_below(self.pos.y, COIN_RADIUS, map_size.y);
        if self.pos.y >= floor && self.vel.y >= 0.0 {
            self.pos.y = floor;
            self.vel = Vector2::ZERO;
            return;
        }
        self.vel.y += physics.gravity * dt;
        self.pos = self.pos.add(&self.vel.scale(dt));
        self.pos.x = self.pos.x.clamp(COIN_RADIUS, map_size.x - COIN_RADIUS);
        if self.pos.y >= floor {
            self.pos.y = floor;
            self.vel = Vector2::ZERO;
        }
    }

    pub fn created_ago(&self, monotonic_ticks: u64) -> u64 {
        (monotonic_ticks as i64 - self.created_tick).max(0) as u64
    }
}

/// Where the contested ball is and who has it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrosballState {
    Free { pos: Vector2, vel: Vector2 },
    Held { player: PlayerId, catch_ticks_ago: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trosball {
    pub state: TrosballState,
}

impl Trosball {
    pub fn holder(&self) -> Option<PlayerId> {
        match self.state {
            TrosballState::Held { player, .. } => Some(player),
            TrosballState::Free { .. } => None,
        }
    }

    pub fn advance(&mut self, physics: &PhysicsParams, speed: f32, map_size: Vector2) {
        match &mut self.state {
            TrosballState::Held { catch_ticks_ago, .. } => {
                *catch_ticks_ago = catch_ticks_ago.saturating_add(1);
            }
            TrosballState::Free { pos, vel } => {
                let dt = tick_seconds(speed);
                let previous_y = pos.y;
                vel.y += physics.gravity * dt;
                *pos = pos.add(&vel.scale(dt));
                let floor = floor_below(previous_y, PLAYER_RADIUS, map_size.y);
                if pos.y >= floor && vel.y > 0.0 {
                    pos.y = floor;
                    vel.y = -vel.y * 0.6;
                    vel.x *= 0.8;
                    if vel.y.abs() < 30.0 {
                        vel.y = 0.0;
                    }
                }
                if pos.x < PLAYER_RADIUS || pos.x > map_size.x - PLAYER_RADIUS {
                    vel.x = -vel.x;
                    pos.x = pos.x.clamp(PLAYER_RADIUS, map_size.x - PLAYER_RADIUS);
                }
            }
        }
    }
}
