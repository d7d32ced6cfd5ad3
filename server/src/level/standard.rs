//! The standard zone-capture round.
//!
//! A round waits for enough human players, counts down, then runs until one
//! team holds no zones or the clock runs out. The result is shown for a
//! while before everyone returns to the lobby.

use super::{set_abilities, set_game_info, update_clock, Level, LevelChange};
use crate::game::LocalGame;
use log::{error, info};
use shared::constants::seconds_to_ticks;
use shared::messages::{SetUiOptionsMsg, UpdateScoreBoardModeMsg};
use shared::world::layout::MapLayout;
use shared::world::options::{AbilitiesPatch, UiOptionsPatch};
use shared::world::team::TeamId;

#[derive(Debug, Clone, PartialEq)]
pub struct StandardSettings {
    pub columns: u16,
    pub rows: u16,
    pub min_humans: usize,
    pub countdown_seconds: f64,
    /// Without a limit the round lasts until a team is wiped out
    pub duration_seconds: Option<f64>,
    pub game_over_seconds: f64,
}

impl Default for StandardSettings {
    fn default() -> Self {
        Self {
            columns: 5,
            rows: 3,
            min_humans: 1,
            countdown_seconds: 10.0,
            duration_seconds: Some(600.0),
            game_over_seconds: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    WaitingForPlayers,
    Countdown { ticks_left: u64 },
    Running { elapsed: u64 },
    GameOver { ticks_left: u64 },
}

#[derive(Debug, Clone)]
pub struct StandardLevel {
    settings: StandardSettings,
    step: Step,
}

impl StandardLevel {
    pub fn new(settings: StandardSettings) -> Self {
        Self {
            settings,
            step: Step::WaitingForPlayers,
        }
    }

    fn begin_countdown(&mut self, game: &mut LocalGame) {
        info!("Round starts in {} seconds", self.settings.countdown_seconds);
        let seconds = self.settings.countdown_seconds;
        update_clock(game, |clock| clock.start_countdown(seconds));
        set_game_info(game, "Get ready", &["The round is about to start"]);
        self.step = Step::Countdown {
            ticks_left: seconds_to_ticks(seconds),
        };
    }

    fn begin_round(&mut self, game: &mut LocalGame) {
        info!("Round started");
        set_abilities(
            game,
            AbilitiesPatch {
                upgrades: Some(true),
                respawn: Some(true),
                leave_friendly_zones: Some(true),
                zone_caps: Some(true),
                ..AbilitiesPatch::default()
            },
        );
        match self.settings.duration_seconds {
            Some(seconds) => update_clock(game, |clock| clock.start_countdown(seconds)),
            None => update_clock(game, |clock| clock.start_count_up()),
        }
        set_game_info(game, "Capture the zones", &["Take every zone from the enemy"]);
        self.step = Step::Running { elapsed: 0 };
    }

    fn end_round(&mut self, game: &mut LocalGame, winner: Option<TeamId>) {
        match winner {
            Some(team) => info!("Round won by {}", team.default_name()),
            None => info!("Round drawn"),
        }
        game.send_server_command(
            SetUiOptionsMsg {
                patch: UiOptionsPatch {
                    winning_team: Some(Some(winner)),
                    ..UiOptionsPatch::default()
                },
            }
            .into(),
        );
        set_abilities(
            game,
            AbilitiesPatch {
                upgrades: Some(false),
                respawn: Some(false),
                zone_caps: Some(false),
                ..AbilitiesPatch::default()
            },
        );
        update_clock(game, |clock| clock.stop());
        let result = match winner {
            Some(team) => format!("{} win", team.default_name()),
            None => "Draw".to_string(),
        };
        set_game_info(game, "Game over", &[result.as_str()]);
        self.step = Step::GameOver {
            ticks_left: seconds_to_ticks(self.settings.game_over_seconds),
        };
    }

    /// Most zones wins when time runs out.
    fn leader(game: &LocalGame) -> Option<TeamId> {
        let a = game.world.team(TeamId::A).num_zones_owned;
        let b = game.world.team(TeamId::B).num_zones_owned;
        match a.cmp(&b) {
            std::cmp::Ordering::Greater => Some(TeamId::A),
            std::cmp::Ordering::Less => Some(TeamId::B),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl Level for StandardLevel {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn setup_map(&mut self, game: &mut LocalGame) {
        let layout = MapLayout::standard(self.settings.columns, self.settings.rows);
        if let Err(e) = game.reset_map(layout) {
            error!("Could not load the round map: {}", e);
        }
    }

    fn start(&mut self, game: &mut LocalGame) {
        set_abilities(
            game,
            AbilitiesPatch {
                upgrades: Some(false),
                respawn: Some(true),
                leave_friendly_zones: Some(false),
                zone_caps: Some(false),
                ..AbilitiesPatch::default()
            },
        );
        game.send_server_command(
            UpdateScoreBoardModeMsg {
                teams: true,
                players: true,
            }
            .into(),
        );
        set_game_info(game, "Waiting for players", &[]);
        self.step = Step::WaitingForPlayers;
    }

    fn tick(&mut self, game: &mut LocalGame) -> Option<LevelChange> {
        match self.step {
            Step::WaitingForPlayers => {
                if game.human_player_count() >= self.settings.min_humans {
                    self.begin_countdown(game);
                }
            }
            Step::Countdown { ticks_left } => {
                if ticks_left <= 1 {
                    self.begin_round(game);
                } else {
                    self.step = Step::Countdown {
                        ticks_left: ticks_left - 1,
                    };
                }
            }
            Step::Running { elapsed } => {
                let elapsed = elapsed + 1;
                self.step = Step::Running { elapsed };
                let time_up = self
                    .settings
                    .duration_seconds
                    .map_or(false, |seconds| elapsed >= seconds_to_ticks(seconds));
                if let Some(winner) = game.world.winner() {
                    self.end_round(game, winner);
                } else if time_up {
                    let winner = Self::leader(game);
                    self.end_round(game, winner);
                }
            }
            Step::GameOver { ticks_left } => {
                if ticks_left <= 1 {
                    return Some(LevelChange::Lobby);
                }
                self.step = Step::GameOver {
                    ticks_left: ticks_left - 1,
                };
            }
        }
        None
    }

    fn tear_down(&mut self, game: &mut LocalGame) {
        game.send_server_command(
            SetUiOptionsMsg {
                patch: UiOptionsPatch {
                    winning_team: Some(None),
                    ..UiOptionsPatch::default()
                },
            }
            .into(),
        );
    }
}
