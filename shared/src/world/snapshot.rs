//! Full-world snapshots used for joining agents and for world resets.

use super::clock::ClockState;
use super::items::{UpgradeSpec, UpgradeTable};
use super::layout::MapLayout;
use super::options::{Abilities, ScoreBoard, UiOptions};
use super::physics::{GameMode, PhysicsParams, Vector2};
use super::player::Player;
use super::team::Team;
use super::units::{CollectableCoin, Grenade, Shot, Trosball, TrosballState};
use super::zone::ZoneRecord;
use super::World;
use crate::constants::*;
use crate::error::ProtocolError;
use crate::messages::{Message, WorldResetMsg};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrosballRecord {
    pub pos: Vector2,
    pub vel: Vector2,
    pub player_id: Option<PlayerId>,
    pub catch_ticks_ago: u32,
}

/// Coins are stored relative to the snapshot's tick so that a restored
/// world keeps their age regardless of its own tick counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub id: CoinId,
    pub created_ago: u64,
    pub pos: Vector2,
    pub vel: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub loading: bool,
    pub paused: bool,
    pub teams: Vec<Team>,
    pub world_map: MapLayout,
    pub mode: GameMode,
    pub speed: f32,
    pub zones: Vec<ZoneRecord>,
    pub players: Vec<Player>,
    pub trosball: Option<TrosballRecord>,
    pub upgrades: Vec<UpgradeSpec>,
    pub elephant: Option<PlayerId>,
    pub shots: Vec<Shot>,
    pub coins: Vec<CoinRecord>,
    pub grenades: Vec<Grenade>,
    pub physics: PhysicsParams,
    pub clock: ClockState,
    pub scoreboard: ScoreBoard,
    pub ui_options: UiOptions,
    pub abilities: Abilities,
    pub last_tick_id: TickId,
}

impl WorldSnapshot {
    pub fn to_blob(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(blob)?)
    }
}

impl World {
    /// Captures everything a freshly joined consumer needs to mirror this
    /// world.
    pub fn dump_everything(&self) -> WorldSnapshot {
        let trosball = self.trosball.as_ref().map(|ball| match &ball.state {
            TrosballState::Free { pos, vel } => TrosballRecord {
                pos: *pos,
                vel: *vel,
                player_id: None,
                catch_ticks_ago: 0,
            },
            TrosballState::Held { player, catch_ticks_ago } => TrosballRecord {
                pos: self.players.get(player).map(|p| p.pos()).unwrap_or_default(),
                vel: Vector2::ZERO,
                player_id: Some(*player),
                catch_ticks_ago: *catch_ticks_ago,
            },
        });

        WorldSnapshot {
            loading: self.loading,
            paused: self.paused,
            teams: self.teams.to_vec(),
            world_map: self.layout.clone(),
            mode: self.mode,
            speed: self.speed,
            zones: self.zones.values().map(ZoneRecord::from).collect(),
            players: self.players.values().cloned().collect(),
            trosball,
            upgrades: self.upgrades.specs(),
            elephant: self.elephant,
            shots: self.shots.values().cloned().collect(),
            coins: self
                .coins
                .values()
                .map(|coin| CoinRecord {
                    id: coin.id,
                    created_ago: coin.created_ago(self.monotonic_ticks),
                    pos: coin.pos,
                    vel: coin.vel,
                })
                .collect(),
            grenades: self.grenades.clone(),
            physics: self.physics,
            clock: self.clock.state,
            scoreboard: self.scoreboard.clone(),
            ui_options: self.ui_options.clone(),
            abilities: self.abilities,
            last_tick_id: self.last_tick_id,
        }
    }

    /// Replaces this world's state with `snapshot`.
    ///
    /// Fails without touching the world when the snapshot's map uses block
    /// layouts this build does not have.
    pub fn restore_everything(&mut self, snapshot: WorldSnapshot) -> Result<(), ProtocolError> {
        let unknown = self.layouts.unknown_keys(&snapshot.world_map);
        if !unknown.is_empty() {
            return Err(ProtocolError::UnknownMapLayouts { keys: unknown });
        }

        self.load_layout(snapshot.world_map);
        for record in snapshot.zones {
            if let Some(zone) = self.zones.get_mut(&record.id) {
                zone.owner = record.owner;
                zone.dark = record.dark;
                zone.frozen = record.frozen;
            }
        }

        self.loading = snapshot.loading;
        self.paused = snapshot.paused;
        for team in snapshot.teams {
            let index = team.id.index();
            self.teams[index] = team;
        }
        self.recount_team_zones();
        self.mode = snapshot.mode;
        self.speed = snapshot.speed;
        self.players = snapshot.players.into_iter().map(|p| (p.id, p)).collect();
        self.trosball = snapshot.trosball.map(|record| Trosball {
            state: match record.player_id {
                Some(player) => TrosballState::Held {
                    player,
                    catch_ticks_ago: record.catch_ticks_ago,
                },
                None => TrosballState::Free {
                    pos: record.pos,
                    vel: record.vel,
                },
            },
        });
        self.upgrades = UpgradeTable::from_specs(snapshot.upgrades);
        self.elephant = snapshot.elephant;
        self.shots = snapshot.shots.into_iter().map(|s| (s.id, s)).collect();
        self.coins = snapshot
            .coins
            .into_iter()
            .map(|record| {
                let coin = CollectableCoin {
                    id: record.id,
                    created_tick: self.monotonic_ticks as i64 - record.created_ago as i64,
                    pos: record.pos,
                    vel: record.vel,
                };
                (coin.id, coin)
            })
            .collect();
        self.grenades = snapshot.grenades;
        self.physics = snapshot.physics;
        self.clock.set_state(snapshot.clock);
        self.scoreboard = snapshot.scoreboard;
        self.ui_options = snapshot.ui_options;
        self.abilities = snapshot.abilities;
        self.last_tick_id = snapshot.last_tick_id;

        self.take_effects();
        self.update_zone_inhabitants();
        self.events.on_reset.fire(&());
        Ok(())
    }

    /// A reset command carrying this world's current state.
    pub fn reset_message(&self) -> Result<Message, ProtocolError> {
        Ok(WorldResetMsg {
            settings: self.dump_everything().to_blob()?,
        }
        .into())
    }
}
