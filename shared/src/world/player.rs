use super::items::{ItemSet, UpgradeKind};
use super::physics::{floor_below, tick_seconds, PhysicsParams, Vector2};
use super::team::TeamId;
use crate::constants::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerKey {
    Left,
    Right,
    Jump,
    Down,
}

impl PlayerKey {
    pub const ALL: [PlayerKey; 4] = [PlayerKey::Left, PlayerKey::Right, PlayerKey::Jump, PlayerKey::Down];
}

/// Which movement keys a player is holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub down: bool,
}

impl KeyState {
    pub fn get(&self, key: PlayerKey) -> bool {
        match key {
            PlayerKey::Left => self.left,
            PlayerKey::Right => self.right,
            PlayerKey::Jump => self.jump,
            PlayerKey::Down => self.down,
        }
    }

    pub fn set(&mut self, key: PlayerKey, value: bool) {
        match key {
            PlayerKey::Left => self.left = value,
            PlayerKey::Right => self.right = value,
            PlayerKey::Jump => self.jump = value,
            PlayerKey::Down => self.down = value,
        }
    }

    /// Keys whose state differs from `other`, paired with this state's value.
    pub fn diff(&self, other: &KeyState) -> Vec<(PlayerKey, bool)> {
        PlayerKey::ALL
            .iter()
            .filter(|key| self.get(**key) != other.get(**key))
            .map(|key| (*key, self.get(*key)))
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        *self == KeyState::default()
    }
}

/// The part of a player that moves every tick and is resynced as a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMotion {
    pub pos: Vector2,
    pub vel: Vector2,
    pub keys: KeyState,
    pub angle: f32,
    pub on_ground: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub nick: String,
    pub team: Option<TeamId>,
    pub bot: bool,
    pub motion: PlayerMotion,
    pub health: u8,
    pub dead: bool,
    pub items: ItemSet,
    pub coins: u32,
    /// Ticks until a dead player may respawn
    pub respawn_ticks: u32,
    pub throw_cooldown: u32,
}

impl Player {
    pub fn new(id: PlayerId, nick: &str, team: Option<TeamId>, bot: bool, pos: Vector2) -> Self {
        Self {
            id,
            nick: nick.to_string(),
            team,
            bot,
            motion: PlayerMotion {
                pos,
                ..PlayerMotion::default()
            },
            health: 1,
            dead: false,
            items: ItemSet::default(),
            coins: 0,
            respawn_ticks: 0,
            throw_cooldown: 0,
        }
    }

    pub fn pos(&self) -> Vector2 {
        self.motion.pos
    }

    pub fn is_turret(&self) -> bool {
        self.items.has(UpgradeKind::Turret)
    }

    pub fn is_enemy_of(&self, team: Option<TeamId>) -> bool {
        match (self.team, team) {
            (Some(mine), Some(theirs)) => mine != theirs,
            _ => true,
        }
    }

    /// True when nothing about the player will change on the next tick, so
    /// shifting its input timing cannot be seen.
    pub fn is_static(&self) -> bool {
        if self.dead {
            return self.motion.keys.is_idle();
        }
        self.motion.on_ground
            && !self.motion.keys.left
            && !self.motion.keys.right
            && !self.motion.keys.jump
            && self.motion.vel == Vector2::ZERO
    }

    /// Integrates one tick of movement inside a map of the given size.
    pub fn advance(&mut self, physics: &PhysicsParams, speed: f32, map_size: Vector2) {
        let dt = tick_seconds(speed);
        let keys = self.motion.keys;
        let axis = |negative: bool, positive: bool| (positive as i8 - negative as i8) as f32;

        if self.dead {
            self.respawn_ticks = self.respawn_ticks.saturating_sub(1);
            let dir = Vector2::new(axis(keys.left, keys.right), axis(keys.jump, keys.down)).normalize();
            self.motion.vel = dir.scale(physics.ghost_speed);
            self.motion.pos = self.motion.pos.add(&self.motion.vel.scale(dt));
            self.clamp_to(map_size);
            return;
        }

        self.throw_cooldown = self.throw_cooldown.saturating_sub(1);

        if self.is_turret() {
            self.motion.vel = Vector2::ZERO;
            return;
        }

        self.motion.vel.x = axis(keys.left, keys.right) * physics.run_speed;
        if self.motion.on_ground {
            if keys.jump {
                self.motion.vel.y = -physics.jump_speed;
                self.motion.on_ground = false;
            } else if keys.down && self.motion.pos.y + PLAYER_RADIUS < map_size.y {
                // Drop through to the row below
                self.motion.pos.y += 2.0 * PLAYER_RADIUS + 1.0;
                self.motion.on_ground = false;
            }
        }

        if !self.motion.on_ground {
            self.motion.vel.y += physics.gravity * dt;
        }
        self.motion.pos = self.motion.pos.add(&self.motion.vel.scale(dt));

        let floor = floor_below(self.motion.pos.y - self.motion.vel.y * dt, PLAYER_RADIUS, map_size.y);
        if self.motion.vel.y >= 0.0 && self.motion.pos.y >= floor {
            self.motion.pos.y = floor;
            self.motion.vel.y = 0.0;
            self.motion.on_ground = true;
        }
        self.clamp_to(map_size);
    }

    fn clamp_to(&mut self, map_size: Vector2) {
        self.motion.pos.x = self.motion.pos.x.clamp(PLAYER_RADIUS, map_size.x - PLAYER_RADIUS);
        self.motion.pos.y = self.motion.pos.y.clamp(PLAYER_RADIUS, map_size.y - PLAYER_RADIUS);
    }

    pub fn die(&mut self) {
        self.dead = true;
        self.health = 0;
        self.items.clear();
        self.respawn_ticks = RESPAWN_TICKS;
        self.motion.vel = Vector2::ZERO;
        self.motion.on_ground = false;
    }

    pub fn respawn(&mut self, pos: Vector2) {
        self.dead = false;
        self.health = 1;
        self.respawn_ticks = 0;
        self.motion.pos = pos;
        self.motion.vel = Vector2::ZERO;
        self.motion.on_ground = false;
    }
}
