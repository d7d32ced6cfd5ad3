//! Capturable map regions and the rules that decide who may take them.

use super::physics::{Rect, Vector2};
use super::team::TeamId;
use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub rect: Rect,
    pub owner: Option<TeamId>,
    pub dark: bool,
    /// Levels may freeze a zone to forbid respawning in it
    pub frozen: bool,
    pub neighbours: Vec<ZoneId>,
    /// Recomputed from scratch every tick
    pub players: BTreeSet<PlayerId>,
}

impl Zone {
    pub fn new(id: ZoneId, rect: Rect, owner: Option<TeamId>, neighbours: Vec<ZoneId>) -> Self {
        Self {
            id,
            rect,
            owner,
            dark: false,
            frozen: false,
            neighbours,
            players: BTreeSet::new(),
        }
    }

    /// The orb rests on the zone's floor, midway across.
    pub fn orb_pos(&self) -> Vector2 {
        Vector2::new(self.rect.centre().x, self.rect.bottom() - ORB_RADIUS)
    }

    pub fn contains(&self, pos: &Vector2) -> bool {
        self.rect.contains(pos)
    }

    pub fn is_touching_orb(&self, pos: &Vector2) -> bool {
        self.orb_pos().distance(pos) <= ORB_RADIUS + PLAYER_RADIUS
    }

    /// Distance from `pos` to the nearest edge of the zone.
    pub fn distance_to_edge(&self, pos: &Vector2) -> f32 {
        let dx = (pos.x - self.rect.left).min(self.rect.right() - pos.x);
        let dy = (pos.y - self.rect.top).min(self.rect.bottom() - pos.y);
        dx.min(dy)
    }

    /// Hands the zone to `team` and returns the previous owner.
    pub fn tag(&mut self, team: Option<TeamId>) -> Option<TeamId> {
        let previous = self.owner;
        self.owner = team;
        self.dark = false;
        previous
    }
}

/// Living players per team currently inside a zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneCounts {
    counts: [usize; 2],
}

impl ZoneCounts {
    pub fn add(&mut self, team: TeamId) {
        self.counts[team.index()] += 1;
    }

    pub fn get(&self, team: TeamId) -> usize {
        self.counts[team.index()]
    }
}

/// Whether `attackers` outnumber the capped defence of a zone.
///
/// This is the whole authoritative rule. Chance-based estimates belong to
/// the bot layer and are never consulted here.
pub fn outnumbers_defence(attackers: usize, defenders: usize) -> bool {
    attackers > defenders.min(DEFENCE_CAP)
}

/// Whether `team` may tag `zone` right now, given the live counts inside it
/// and whether the team owns a zone next to it.
pub fn capture_eligible(zone: &Zone, team: TeamId, counts: &ZoneCounts, adjacent_to_friendly: bool) -> bool {
    if zone.owner == Some(team) || !adjacent_to_friendly {
        return false;
    }
    let defenders = zone.owner.map(|owner| counts.get(owner)).unwrap_or(0);
    outnumbers_defence(counts.get(team), defenders)
}

/// Wire form of a zone's ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: ZoneId,
    pub owner: Option<TeamId>,
    pub dark: bool,
    pub frozen: bool,
}

impl From<&Zone> for ZoneRecord {
    fn from(zone: &Zone) -> Self {
        Self {
            id: zone.id,
            owner: zone.owner,
            dark: zone.dark,
            frozen: zone.frozen,
        }
    }
}
