//! The neutral lobby played between rounds.

use super::{set_abilities, set_game_info, update_clock, Level, LevelChange, StandardSettings};
use crate::game::LocalGame;
use log::{error, info};
use shared::constants::seconds_to_ticks;
use shared::messages::{SetUiOptionsMsg, UpdateScoreBoardModeMsg};
use shared::world::layout::MapLayout;
use shared::world::options::{AbilitiesPatch, UiOptionsPatch};

const LOBBY_COLUMNS: u16 = 3;
/// How long enough players must stay before a round starts
const READY_SECONDS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct LobbyLevel {
    pub min_players: usize,
    pub next_round: StandardSettings,
    ready_ticks: u64,
}

impl Default for LobbyLevel {
    fn default() -> Self {
        Self::new(2, StandardSettings::default())
    }
}

impl LobbyLevel {
    pub fn new(min_players: usize, next_round: StandardSettings) -> Self {
        Self {
            min_players,
            next_round,
            ready_ticks: 0,
        }
    }

    fn enough_players(&self, game: &LocalGame) -> bool {
        game.world.players.len() >= self.min_players && game.human_player_count() > 0
    }
}

impl Level for LobbyLevel {
    fn name(&self) -> &'static str {
        "lobby"
    }

    fn setup_map(&mut self, game: &mut LocalGame) {
        if let Err(e) = game.reset_map(MapLayout::lobby(LOBBY_COLUMNS)) {
            error!("Could not load the lobby map: {}", e);
        }
    }

    fn start(&mut self, game: &mut LocalGame) {
        set_abilities(
            game,
            AbilitiesPatch {
                upgrades: Some(false),
                respawn: Some(true),
                leave_friendly_zones: Some(true),
                zone_caps: Some(false),
                renaming: Some(true),
            },
        );
        game.send_server_command(
            SetUiOptionsMsg {
                patch: UiOptionsPatch {
                    winning_team: Some(None),
                    ..UiOptionsPatch::default()
                },
            }
            .into(),
        );
        game.send_server_command(
            UpdateScoreBoardModeMsg {
                teams: false,
                players: false,
            }
            .into(),
        );
        update_clock(game, |clock| {
            clock.stop();
            clock.state.showing = false;
        });
        set_game_info(game, "Lobby", &["Waiting for players"]);
        self.ready_ticks = 0;
    }

    fn tick(&mut self, game: &mut LocalGame) -> Option<LevelChange> {
        if !self.enough_players(game) {
            self.ready_ticks = 0;
            return None;
        }
        self.ready_ticks += 1;
        if self.ready_ticks < seconds_to_ticks(READY_SECONDS) {
            return None;
        }
        info!("{} players ready; starting a round", game.world.players.len());
        Some(LevelChange::Standard(self.next_round.clone()))
    }
}
