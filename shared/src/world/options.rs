//! Global game-state flags: what players may do, display hints and the
//! scoreboard.

use super::team::TeamId;
use crate::constants::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    pub upgrades: bool,
    pub respawn: bool,
    pub leave_friendly_zones: bool,
    pub zone_caps: bool,
    pub renaming: bool,
}

impl Default for Abilities {
    fn default() -> Self {
        Self {
            upgrades: true,
            respawn: true,
            leave_friendly_zones: true,
            zone_caps: true,
            renaming: true,
        }
    }
}

/// Partial update of [`Abilities`]; unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilitiesPatch {
    pub upgrades: Option<bool>,
    pub respawn: Option<bool>,
    pub leave_friendly_zones: Option<bool>,
    pub zone_caps: Option<bool>,
    pub renaming: Option<bool>,
}

impl Abilities {
    pub fn apply(&mut self, patch: &AbilitiesPatch) {
        let merge = |field: &mut bool, value: Option<bool>| {
            if let Some(value) = value {
                *field = value;
            }
        };
        merge(&mut self.upgrades, patch.upgrades);
        merge(&mut self.respawn, patch.respawn);
        merge(&mut self.leave_friendly_zones, patch.leave_friendly_zones);
        merge(&mut self.zone_caps, patch.zone_caps);
        merge(&mut self.renaming, patch.renaming);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiOptions {
    pub show_nets: bool,
    /// X position of the contested front line, if one is drawn
    pub front_line: Option<f32>,
    pub show_ready_states: bool,
    /// Set once a round is decided; the inner value is the winner, none for a draw
    pub winning_team: Option<Option<TeamId>>,
    pub user_title: String,
    pub user_info: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiOptionsPatch {
    pub show_nets: Option<bool>,
    pub front_line: Option<Option<f32>>,
    pub show_ready_states: Option<bool>,
    pub winning_team: Option<Option<Option<TeamId>>>,
}

impl UiOptions {
    pub fn apply(&mut self, patch: &UiOptionsPatch) {
        if let Some(show_nets) = patch.show_nets {
            self.show_nets = show_nets;
        }
        if let Some(front_line) = patch.front_line {
            self.front_line = front_line;
        }
        if let Some(show_ready_states) = patch.show_ready_states {
            self.show_ready_states = show_ready_states;
        }
        if let Some(winning_team) = patch.winning_team {
            self.winning_team = winning_team;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub team_scores_enabled: bool,
    pub player_scores_enabled: bool,
    pub team_scores: BTreeMap<TeamId, f32>,
    pub player_scores: BTreeMap<PlayerId, f32>,
}

impl ScoreBoard {
    pub fn set_mode(&mut self, teams: bool, players: bool) {
        self.team_scores_enabled = teams;
        self.player_scores_enabled = players;
    }

    pub fn forget_player(&mut self, player_id: PlayerId) {
        self.player_scores.remove(&player_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abilities_patch_only_touches_set_fields() {
        let mut abilities = Abilities::default();
        abilities.apply(&AbilitiesPatch {
            respawn: Some(false),
            ..AbilitiesPatch::default()
        });
        assert!(!abilities.respawn);
        assert!(abilities.upgrades);
    }

    #[test]
    fn test_ui_patch_can_clear_front_line() {
        let mut options = UiOptions {
            front_line: Some(120.0),
            ..UiOptions::default()
        };
        options.apply(&UiOptionsPatch {
            front_line: Some(None),
            ..UiOptionsPatch::default()
        });
        assert_eq!(options.front_line, None);
        assert!(!options.show_nets);
    }
}
