//! Map regions that report players entering and leaving them, for level
//! scripting.

use shared::constants::{PlayerId, ZoneId};
use shared::world::physics::Rect;
use shared::world::player::Player;
use shared::world::World;
use shared::Event;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);

#[derive(Debug, Clone, PartialEq)]
pub enum RegionShape {
    Rect(Rect),
    Zone(ZoneId),
}

pub struct Region {
    pub shape: RegionShape,
    /// Only living players count when set
    pub living_only: bool,
    players: BTreeSet<PlayerId>,
    pub on_enter: Event<PlayerId>,
    pub on_exit: Event<PlayerId>,
}

impl Region {
    pub fn rect(rect: Rect) -> Self {
        Self::new(RegionShape::Rect(rect))
    }

    pub fn zone(zone_id: ZoneId) -> Self {
        Self::new(RegionShape::Zone(zone_id))
    }

    fn new(shape: RegionShape) -> Self {
        Self {
            shape,
            living_only: true,
            players: BTreeSet::new(),
            on_enter: Event::new(),
            on_exit: Event::new(),
        }
    }

    pub fn contains(&self, world: &World, player: &Player) -> bool {
        if self.living_only && player.dead {
            return false;
        }
        let pos = player.pos();
        match &self.shape {
            RegionShape::Rect(rect) => rect.contains(&pos),
            RegionShape::Zone(zone_id) => world.layout.zone_at(&pos) == Some(*zone_id),
        }
    }

    /// Players inside the region as of the last tick.
    pub fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    pub fn is_occupied(&self) -> bool {
        !self.players.is_empty()
    }

    fn tick(&mut self, world: &World) {
        let now: BTreeSet<PlayerId> = world
            .players
            .values()
            .filter(|p| self.contains(world, p))
            .map(|p| p.id)
            .collect();
        for player_id in now.difference(&self.players) {
            self.on_enter.fire(player_id);
        }
        for player_id in self.players.difference(&now) {
            self.on_exit.fire(player_id);
        }
        self.players = now;
    }
}

/// All regions registered by the running level.
#[derive(Default)]
pub struct RegionSet {
    next_id: u32,
    regions: BTreeMap<RegionId, Region>,
}

impl RegionSet {
    pub fn add(&mut self, region: Region) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        self.regions.insert(id, region);
        id
    }

    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        self.regions.remove(&id)
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(&id)
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Recomputes every region's occupants, firing enter and exit events
    /// for the differences.
    pub fn tick(&mut self, world: &World) {
        for region in self.regions.values_mut() {
            region.tick(world);
        }
    }
}
