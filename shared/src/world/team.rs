use serde::{Deserialize, Serialize};

/// The two playing teams. Neutral ownership is `Option::<TeamId>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamId {
    A,
    B,
}

impl TeamId {
    pub const ALL: [TeamId; 2] = [TeamId::A, TeamId::B];

    pub fn opponent(self) -> TeamId {
        match self {
            TeamId::A => TeamId::B,
            TeamId::B => TeamId::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            TeamId::A => 0,
            TeamId::B => 1,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            TeamId::A => "Blue players",
            TeamId::B => "Red players",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub num_zones_owned: usize,
    pub score: u32,
}

impl Team {
    pub fn new(id: TeamId) -> Self {
        Self {
            id,
            name: id.default_name().to_string(),
            num_zones_owned: 0,
            score: 0,
        }
    }

    /// A team without any zones has lost the round.
    pub fn is_loser(&self) -> bool {
        self.num_zones_owned == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponents_are_mutual() {
        for team in TeamId::ALL {
            assert_eq!(team.opponent().opponent(), team);
            assert_ne!(team.opponent(), team);
        }
    }

    #[test]
    fn test_new_team_is_loser_until_it_owns_a_zone() {
        let mut team = Team::new(TeamId::A);
        assert!(team.is_loser());
        team.num_zones_owned = 1;
        assert!(!team.is_loser());
    }
}
