//! Client-side prediction of the locally controlled player.
//!
//! The world mirror only changes when server commands arrive, so anything
//! the user does shows up there a round trip later. [`LocalState`] keeps a
//! second copy of our own player that takes input immediately, plus the
//! shots and grenades we have fired but the server has not confirmed yet.

use log::debug;
use shared::constants::*;
use shared::world::items::UpgradeKind;
use shared::world::physics::Vector2;
use shared::world::player::{KeyState, Player, PlayerKey, PlayerMotion};
use shared::world::units::{Grenade, Shot, ShotKind};
use shared::World;
use std::collections::BTreeMap;

/// A shot we fired that has not been matched to a server shot yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalShot {
    pub local_id: ShotId,
    pub shot: Shot,
}

#[derive(Debug, Default)]
pub struct LocalState {
    player: Option<Player>,
    shots: BTreeMap<ShotId, LocalShot>,
    last_shot_id: ShotId,
    /// Grenades thrown on a guess, waiting for the server's verdict
    unverified_grenades: Vec<Grenade>,
    /// Delay in ticks the server currently holds our requests back by
    pub server_delay: i32,
}

impl LocalState {
    pub fn new() -> Self {
        Self {
            server_delay: INITIAL_ASSUMED_LATENCY,
            ..Self::default()
        }
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn shots(&self) -> impl Iterator<Item = &LocalShot> {
        self.shots.values()
    }

    pub fn grenades(&self) -> &[Grenade] {
        &self.unverified_grenades
    }

    /// Takes a fresh copy of our player from the world, dropping anything
    /// predicted so far.
    pub fn reset_from(&mut self, world: &World, player_id: Option<PlayerId>) {
        self.player = player_id.and_then(|id| world.player(id)).cloned();
        self.shots.clear();
        self.unverified_grenades.clear();
    }

    pub fn clear(&mut self) {
        self.player = None;
        self.shots.clear();
        self.unverified_grenades.clear();
    }

    pub fn keys(&self) -> KeyState {
        self.player.as_ref().map(|p| p.motion.keys).unwrap_or_default()
    }

    pub fn set_key(&mut self, key: PlayerKey, value: bool) {
        if let Some(player) = self.player.as_mut() {
            player.motion.keys.set(key, value);
        }
    }

    pub fn set_angle(&mut self, angle: f32) {
        if let Some(player) = self.player.as_mut() {
            player.motion.angle = angle;
        }
    }

    /// Adopts the server's motion while keeping the keys the user is
    /// actually holding. Returns the keys that differ from the server's
    /// view, with our value for each.
    pub fn adopt_motion(&mut self, motion: PlayerMotion) -> Vec<(PlayerKey, bool)> {
        let Some(player) = self.player.as_mut() else {
            return Vec::new();
        };
        let intended = player.motion.keys;
        let angle = player.motion.angle;
        player.motion = motion;
        player.motion.keys = intended;
        player.motion.angle = angle;
        intended.diff(&motion.keys)
    }

    /// Copies items, coins and life state from the world so they reach the
    /// local copy. Motion stays predicted unless the player died or came
    /// back to life, which moves it.
    pub fn refresh_status(&mut self, world: &World) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let Some(truth) = world.player(player.id) else {
            return;
        };
        let mut motion = player.motion;
        if player.dead != truth.dead {
            motion = PlayerMotion {
                keys: motion.keys,
                angle: motion.angle,
                ..truth.motion
            };
        }
        *player = truth.clone();
        player.motion = motion;
    }

    pub fn next_shot_id(&mut self) -> ShotId {
        loop {
            self.last_shot_id = self.last_shot_id.wrapping_add(1);
            if !self.shots.contains_key(&self.last_shot_id) {
                return self.last_shot_id;
            }
        }
    }

    /// Starts a predicted shot from our player. Returns its local id.
    pub fn fire_shot(&mut self, world: &World) -> Option<ShotId> {
        let (pos, angle, team, shooter, kind) = {
            let player = self.player.as_ref()?;
            if player.dead {
                return None;
            }
            let kind = if player.is_turret() {
                ShotKind::Turret
            } else if player.items.has(UpgradeKind::Ricochet) {
                ShotKind::Ricochet
            } else {
                ShotKind::Normal
            };
            (player.pos(), player.motion.angle, player.team, player.id, kind)
        };
        let local_id = self.next_shot_id();
        let shot = Shot {
            id: local_id,
            team,
            shooter,
            pos,
            vel: Vector2::from_angle(angle).scale(world.physics.shot_speed),
            time_left: SHOT_LIFETIME,
            kind,
            expired: false,
        };
        self.shots.insert(local_id, LocalShot { local_id, shot });
        Some(local_id)
    }

    /// The server fired our shot; the world mirror now owns it.
    pub fn match_shot(&mut self, local_id: ShotId) -> bool {
        self.shots.remove(&local_id).is_some()
    }

    /// Applies an upgrade locally before the server approves it.
    pub fn predict_upgrade(&mut self, kind: UpgradeKind) {
        let Some(player) = self.player.as_ref() else {
            return;
        };
        if kind == UpgradeKind::Grenade {
            self.unverified_grenades.push(Grenade {
                player: player.id,
                pos: player.pos(),
                vel: Vector2::from_angle(player.motion.angle).scale(600.0),
                time_left: GRENADE_FUSE,
            });
        }
    }

    /// The server accepted the purchase; its own grenade takes over.
    pub fn confirm_upgrade(&mut self, kind: UpgradeKind) {
        if kind == UpgradeKind::Grenade && !self.unverified_grenades.is_empty() {
            self.unverified_grenades.remove(0);
        }
    }

    /// The server refused the purchase; forget the guess.
    pub fn roll_back_upgrade(&mut self, kind: UpgradeKind) {
        if kind == UpgradeKind::Grenade && !self.unverified_grenades.is_empty() {
            debug!("Rolling back predicted grenade");
            self.unverified_grenades.remove(0);
        }
    }

    /// Advances the predicted state by one tick, the same way the world
    /// advances its own units.
    pub fn tick(&mut self, world: &World) {
        let map_size = world.map_size();
        let (physics, speed) = (world.physics, world.speed);

        if let Some(player) = self.player.as_mut() {
            player.advance(&physics, speed, map_size);
            player.items.tick();
        }

        self.shots.retain(|_, local| !local.shot.expired);
        for local in self.shots.values_mut() {
            local.shot.advance(speed, map_size);
        }
        self.unverified_grenades
            .retain_mut(|grenade| !grenade.advance(&physics, speed, map_size));
    }
}
