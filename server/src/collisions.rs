//! Shot against player collision detection using a coarse spatial hash.

use shared::constants::{PlayerId, ShotId, PLAYER_RADIUS, SHOT_RADIUS};
use shared::world::physics::Vector2;
use shared::world::World;
use std::collections::HashMap;

pub type Bucket = (i64, i64);

pub fn bucket_of(pos: &Vector2, resolution: f32) -> Bucket {
    ((pos.x / resolution).floor() as i64, (pos.y / resolution).floor() as i64)
}

/// Living players indexed by grid bucket. Each player is entered in its own
/// bucket and the eight around it, so a lookup of a single bucket finds
/// everyone close enough to matter.
#[derive(Debug, Default)]
pub struct PlayerGrid {
    resolution: f32,
    buckets: HashMap<Bucket, Vec<PlayerId>>,
}

impl PlayerGrid {
    pub fn new(resolution: f32) -> Self {
        Self {
            resolution,
            buckets: HashMap::new(),
        }
    }

    pub fn insert(&mut self, player_id: PlayerId, pos: &Vector2) {
        let (bx, by) = bucket_of(pos, self.resolution);
        for dx in -1..=1 {
            for dy in -1..=1 {
                self.buckets.entry((bx + dx, by + dy)).or_default().push(player_id);
            }
        }
    }

    /// Players that could be touching something at `pos`.
    pub fn candidates(&self, pos: &Vector2) -> &[PlayerId] {
        self.buckets
            .get(&bucket_of(pos, self.resolution))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Every live shot that touches at least one enemy player this tick, with
/// all the players it touches.
pub fn find_shot_hits(world: &World, resolution: f32) -> Vec<(ShotId, Vec<PlayerId>)> {
    let mut grid = PlayerGrid::new(resolution);
    for player in world.players.values().filter(|p| !p.dead) {
        grid.insert(player.id, &player.pos());
    }

    let reach = PLAYER_RADIUS + SHOT_RADIUS;
    let mut hits = Vec::new();
    for shot in world.shots.values().filter(|s| !s.expired) {
        let hit: Vec<PlayerId> = grid
            .candidates(&shot.pos)
            .iter()
            .copied()
            .filter(|id| {
                world
                    .players
                    .get(id)
                    .map(|p| p.id != shot.shooter && p.is_enemy_of(shot.team) && p.pos().distance(&shot.pos) <= reach)
                    .unwrap_or(false)
            })
            .collect();
        if !hit.is_empty() {
            hits.push((shot.id, hit));
        }
    }
    hits
}
