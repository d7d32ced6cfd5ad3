//! Map layouts: a grid of zones, each drawn from a named block layout that
//! every consumer must recognise.

use super::physics::{Rect, Vector2};
use super::team::TeamId;
use super::zone::Zone;
use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayout {
    pub columns: u16,
    pub rows: u16,
    /// Block layout key per zone, row-major
    pub blocks: Vec<String>,
    /// Starting owner per zone, row-major
    pub owners: Vec<Option<TeamId>>,
}

impl MapLayout {
    /// Blue half on the left, red half on the right and a neutral middle
    /// column when the width is odd.
    pub fn standard(columns: u16, rows: u16) -> Self {
        let count = columns as usize * rows as usize;
        let mut owners = Vec::with_capacity(count);
        for _ in 0..rows {
            for column in 0..columns {
                let owner = if column * 2 + 1 == columns {
                    None
                } else if column * 2 < columns {
                    Some(TeamId::A)
                } else {
                    Some(TeamId::B)
                };
                owners.push(owner);
            }
        }
        let keys = LayoutDatabase::default().keys();
        let blocks = (0..count).map(|i| keys[i % keys.len()].clone()).collect();
        Self {
            columns,
            rows,
            blocks,
            owners,
        }
    }

    /// The lobby map: a single row with every zone neutral.
    pub fn lobby(columns: u16) -> Self {
        let mut layout = Self::standard(columns, 1);
        layout.owners = vec![None; columns as usize];
        layout
    }

    pub fn size(&self) -> Vector2 {
        Vector2::new(
            self.columns as f32 * ZONE_WIDTH,
            self.rows as f32 * ZONE_HEIGHT,
        )
    }

    pub fn zone_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Zone ids are 1-based row-major indices.
    pub fn zone_id(&self, column: u16, row: u16) -> ZoneId {
        row * self.columns + column + 1
    }

    pub fn build_zones(&self) -> Vec<Zone> {
        let mut zones = Vec::with_capacity(self.zone_count());
        for row in 0..self.rows {
            for column in 0..self.columns {
                let index = (row * self.columns + column) as usize;
                let rect = Rect::new(
                    column as f32 * ZONE_WIDTH,
                    row as f32 * ZONE_HEIGHT,
                    ZONE_WIDTH,
                    ZONE_HEIGHT,
                );
                let mut neighbours = Vec::new();
                if row > 0 {
                    neighbours.push(self.zone_id(column, row - 1));
                }
                if column > 0 {
                    neighbours.push(self.zone_id(column - 1, row));
                }
                if column + 1 < self.columns {
                    neighbours.push(self.zone_id(column + 1, row));
                }
                if row + 1 < self.rows {
                    neighbours.push(self.zone_id(column, row + 1));
                }
                let owner = self.owners.get(index).copied().flatten();
                zones.push(Zone::new(self.zone_id(column, row), rect, owner, neighbours));
            }
        }
        zones
    }

    pub fn zone_at(&self, pos: &Vector2) -> Option<ZoneId> {
        if pos.x < 0.0 || pos.y < 0.0 {
            return None;
        }
        let column = (pos.x / ZONE_WIDTH) as u16;
        let row = (pos.y / ZONE_HEIGHT) as u16;
        if column >= self.columns || row >= self.rows {
            return None;
        }
        Some(self.zone_id(column, row))
    }
}

/// The set of block layouts this build knows how to load.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDatabase {
    known: BTreeSet<String>,
}

impl Default for LayoutDatabase {
    fn default() -> Self {
        Self::with_keys(&["open", "platforms", "bridge", "tower", "cave"])
    }
}

impl LayoutDatabase {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            known: keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.known.iter().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.known.contains(key)
    }

    /// Block keys used by `layout` that this database cannot load, deduplicated.
    pub fn unknown_keys(&self, layout: &MapLayout) -> Vec<String> {
        let unknown: BTreeSet<&String> = layout
            .blocks
            .iter()
            .filter(|key| !self.known.contains(*key))
            .collect();
        unknown.into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout_ownership() {
        let layout = MapLayout::standard(3, 1);
        assert_eq!(layout.owners, vec![Some(TeamId::A), None, Some(TeamId::B)]);

        let layout = MapLayout::standard(4, 2);
        assert_eq!(&layout.owners[0..4], &[Some(TeamId::A), Some(TeamId::A), Some(TeamId::B), Some(TeamId::B)]);
    }

    #[test]
    fn test_zone_adjacency_is_grid() {
        let layout = MapLayout::standard(3, 2);
        let zones = layout.build_zones();
        let centre_top = &zones[1];
        assert_eq!(centre_top.id, 2);
        assert_eq!(centre_top.neighbours, vec![1, 3, 5]);
        for zone in &zones {
            for neighbour in &zone.neighbours {
                let other = &zones[*neighbour as usize - 1];
                assert!(other.neighbours.contains(&zone.id));
            }
        }
    }

    #[test]
    fn test_zone_at() {
        let layout = MapLayout::standard(3, 2);
        assert_eq!(layout.zone_at(&Vector2::new(10.0, 10.0)), Some(1));
        assert_eq!(layout.zone_at(&Vector2::new(ZONE_WIDTH * 2.5, ZONE_HEIGHT * 1.5)), Some(6));
        assert_eq!(layout.zone_at(&Vector2::new(-1.0, 10.0)), None);
        assert_eq!(layout.zone_at(&Vector2::new(ZONE_WIDTH * 3.0, 10.0)), None);
    }

    #[test]
    fn test_unknown_keys_are_reported_once() {
        let mut layout = MapLayout::standard(3, 1);
        layout.blocks = vec!["open".into(), "lava".into(), "lava".into()];
        let db = LayoutDatabase::default();
        assert_eq!(db.unknown_keys(&layout), vec!["lava".to_string()]);
    }
}
