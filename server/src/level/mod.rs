//! Level scripting: the lobby between rounds and the standard capture game.
//!
//! A level is the server-side director of a round. The game owns at most
//! one level at a time and calls into it once per tick; the level drives
//! the game exclusively through [`LocalGame`]'s public API so that every
//! change it makes reaches clients as ordinary commands.

pub mod lobby;
pub mod regions;
pub mod standard;

use crate::game::LocalGame;
use rand::Rng;
use shared::messages::{ReasonCode, SetWorldAbilitiesMsg, UpdateClockStateMsg, UpdateGameInfoMsg};
use shared::world::clock::Clock;
use shared::world::options::AbilitiesPatch;
use shared::world::team::TeamId;

pub use lobby::LobbyLevel;
pub use standard::{StandardLevel, StandardSettings};

/// What to switch to once a level is finished.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelChange {
    Lobby,
    Standard(StandardSettings),
}

impl LevelChange {
    pub fn into_level(self) -> Box<dyn Level> {
        match self {
            LevelChange::Lobby => Box::new(LobbyLevel::default()),
            LevelChange::Standard(settings) => Box::new(StandardLevel::new(settings)),
        }
    }
}

pub trait Level: Send {
    fn name(&self) -> &'static str;

    /// Loads the map this level is played on.
    fn setup_map(&mut self, _game: &mut LocalGame) {}

    fn start(&mut self, game: &mut LocalGame);

    /// Runs after every server tick. Returning a change ends this level.
    fn tick(&mut self, game: &mut LocalGame) -> Option<LevelChange>;

    fn find_reason_player_cannot_join(&self, game: &LocalGame, team: Option<TeamId>, _bot: bool) -> Option<ReasonCode> {
        default_reason_player_cannot_join(game, team)
    }

    fn team_to_join(&self, game: &mut LocalGame, preferred: Option<TeamId>, _bot: bool) -> Option<TeamId> {
        preferred_team_otherwise_smallest(game, preferred)
    }

    fn tear_down(&mut self, _game: &mut LocalGame) {}
}

pub fn default_reason_player_cannot_join(game: &LocalGame, team: Option<TeamId>) -> Option<ReasonCode> {
    let config = game.config();
    if game.world.players.len() >= config.max_total_players() {
        return Some(ReasonCode::GameFull);
    }
    match team {
        Some(team) if game.world.team_player_count(team) >= config.max_per_team => Some(ReasonCode::GameFull),
        _ => None,
    }
}

/// Honours a preference, otherwise picks whichever team is smaller. Ties
/// are broken at random.
pub fn preferred_team_otherwise_smallest(game: &mut LocalGame, preferred: Option<TeamId>) -> Option<TeamId> {
    if preferred.is_some() {
        return preferred;
    }
    let a = game.world.team_player_count(TeamId::A);
    let b = game.world.team_player_count(TeamId::B);
    Some(match a.cmp(&b) {
        std::cmp::Ordering::Less => TeamId::A,
        std::cmp::Ordering::Greater => TeamId::B,
        std::cmp::Ordering::Equal => {
            if game.rng().gen_bool(0.5) {
                TeamId::A
            } else {
                TeamId::B
            }
        }
    })
}

/// Edits a copy of the world clock and broadcasts the result, so the
/// server's own clock changes through the same command as everyone else's.
pub fn update_clock(game: &mut LocalGame, edit: impl FnOnce(&mut Clock)) {
    let mut clock = Clock::default();
    clock.set_state(game.world.clock.state);
    edit(&mut clock);
    game.send_server_command(UpdateClockStateMsg { clock: clock.state }.into());
}

pub fn set_game_info(game: &mut LocalGame, title: &str, info: &[&str]) {
    game.send_server_command(
        UpdateGameInfoMsg {
            title: title.to_string(),
            info: info.iter().map(|line| line.to_string()).collect(),
        }
        .into(),
    );
}

pub fn set_abilities(game: &mut LocalGame, patch: AbilitiesPatch) {
    game.send_server_command(SetWorldAbilitiesMsg { patch }.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::messages::{JoinRequestMsg, Message};
    use shared::world::layout::MapLayout;
    use shared::GameConfig;

    #[test]
    fn test_team_balancing_prefers_smaller_team() {
        let mut game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(3, 1), 3);
        assert_eq!(preferred_team_otherwise_smallest(&mut game, Some(TeamId::B)), Some(TeamId::B));

        let agent_id = game.add_agent();
        game.receive_from_agent(
            agent_id,
            JoinRequestMsg {
                nick: "a".into(),
                team: Some(TeamId::A),
                bot: false,
            }
            .into(),
        );
        assert_eq!(preferred_team_otherwise_smallest(&mut game, None), Some(TeamId::B));
    }

    #[test]
    fn test_team_cap_refuses_join() {
        let config = GameConfig::default().with_capacity(1, 10);
        let mut game = LocalGame::with_seed(config, MapLayout::standard(3, 1), 3);
        let agent_id = game.add_agent();
        game.receive_from_agent(
            agent_id,
            JoinRequestMsg {
                nick: "a".into(),
                team: Some(TeamId::A),
                bot: false,
            }
            .into(),
        );
        assert_eq!(
            default_reason_player_cannot_join(&game, Some(TeamId::A)),
            Some(ReasonCode::GameFull)
        );
        assert_eq!(default_reason_player_cannot_join(&game, Some(TeamId::B)), None);
    }

    #[test]
    fn test_clock_update_goes_through_world() {
        let mut game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(3, 1), 3);
        update_clock(&mut game, |clock| clock.start_countdown(30.0));
        assert!(game.world.clock.state.counting);
        assert_eq!(game.world.clock.state.value, 30.0);
        assert!(game
            .drain_outbox()
            .iter()
            .any(|o| matches!(o.message, Message::UpdateClockState(_))));
    }
}
