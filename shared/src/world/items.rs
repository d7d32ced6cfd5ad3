//! Purchasable upgrades: the per-world price table and the set of items a
//! player currently has active.

use crate::constants::seconds_to_ticks;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpgradeKind {
    Shield,
    Turret,
    Grenade,
    Ricochet,
    Ninja,
}

impl UpgradeKind {
    pub const ALL: [UpgradeKind; 5] = [
        UpgradeKind::Shield,
        UpgradeKind::Turret,
        UpgradeKind::Grenade,
        UpgradeKind::Ricochet,
        UpgradeKind::Ninja,
    ];

    /// Single-use upgrades fire once on activation and never sit in an [`ItemSet`].
    pub fn is_single_use(self) -> bool {
        matches!(self, UpgradeKind::Grenade)
    }
}

/// One row of the upgrade table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeSpec {
    pub kind: UpgradeKind,
    pub cost: u32,
    /// Ticks the item stays active, `None` for until used up
    pub time_limit: Option<u32>,
    pub enabled: bool,
    /// Clients apply the item immediately and roll back if the server refuses
    pub do_not_wait_for_server: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTable {
    specs: BTreeMap<UpgradeKind, UpgradeSpec>,
}

impl Default for UpgradeTable {
    fn default() -> Self {
        let row = |kind, cost, seconds: Option<f64>, do_not_wait_for_server| UpgradeSpec {
            kind,
            cost,
            time_limit: seconds.map(|s| seconds_to_ticks(s) as u32),
            enabled: true,
            do_not_wait_for_server,
        };
        Self::from_specs(vec![
            row(UpgradeKind::Shield, 45, Some(30.0), false),
            row(UpgradeKind::Turret, 50, Some(50.0), false),
            row(UpgradeKind::Grenade, 30, None, true),
            row(UpgradeKind::Ricochet, 40, Some(30.0), false),
            row(UpgradeKind::Ninja, 30, Some(25.0), false),
        ])
    }
}

impl UpgradeTable {
    pub fn from_specs(specs: Vec<UpgradeSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|spec| (spec.kind, spec)).collect(),
        }
    }

    pub fn get(&self, kind: UpgradeKind) -> Option<&UpgradeSpec> {
        self.specs.get(&kind)
    }

    pub fn update(&mut self, kind: UpgradeKind, cost: u32, time_limit: Option<u32>, enabled: bool) {
        let do_not_wait_for_server = self
            .specs
            .get(&kind)
            .map(|spec| spec.do_not_wait_for_server)
            .unwrap_or(false);
        self.specs.insert(
            kind,
            UpgradeSpec {
                kind,
                cost,
                time_limit,
                enabled,
                do_not_wait_for_server,
            },
        );
    }

    pub fn specs(&self) -> Vec<UpgradeSpec> {
        self.specs.values().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveItem {
    pub kind: UpgradeKind,
    pub ticks_left: Option<u32>,
    /// Hits a shield can still absorb
    pub charges: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSet {
    items: BTreeMap<UpgradeKind, ActiveItem>,
}

impl ItemSet {
    pub fn activate(&mut self, spec: &UpgradeSpec) {
        if spec.kind.is_single_use() {
            return;
        }
        let charges = match spec.kind {
            UpgradeKind::Shield => 1,
            _ => 0,
        };
        self.items.insert(
            spec.kind,
            ActiveItem {
                kind: spec.kind,
                ticks_left: spec.time_limit,
                charges,
            },
        );
    }

    pub fn has(&self, kind: UpgradeKind) -> bool {
        self.items.contains_key(&kind)
    }

    pub fn has_any(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn get_mut(&mut self, kind: UpgradeKind) -> Option<&mut ActiveItem> {
        self.items.get_mut(&kind)
    }

    pub fn remove(&mut self, kind: UpgradeKind) -> Option<ActiveItem> {
        self.items.remove(&kind)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn kinds(&self) -> Vec<UpgradeKind> {
        self.items.keys().copied().collect()
    }

    /// Counts down timed items and returns the kinds that ran out.
    pub fn tick(&mut self) -> Vec<UpgradeKind> {
        let mut expired = Vec::new();
        for item in self.items.values_mut() {
            if let Some(left) = item.ticks_left.as_mut() {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    expired.push(item.kind);
                }
            }
        }
        for kind in &expired {
            self.items.remove(kind);
        }
        expired
    }
}
