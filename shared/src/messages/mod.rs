//! Typed network messages.
//!
//! Every message kind is one variant of [`Message`] carrying its own payload
//! struct. The catalog below assigns each kind a four-byte wire tag and a
//! [`Role`] describing who may send it and whether it mutates the world.

mod dispatch;
mod payloads;

pub use dispatch::{DispatchTable, Handler};
pub use payloads::*;

use crate::constants::{PlayerId, TickId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Broadcast by the server, applied to every world
    ServerCommand,
    /// Sent by an agent, validated and acted on by the server only
    AgentRequest,
    /// Sent by the server to a single agent, never applied to the world
    AgentNotice,
    /// Sent by an agent and, once validated, broadcast unchanged as a command
    Relayed,
}

impl Role {
    pub fn is_command(self) -> bool {
        matches!(self, Role::ServerCommand | Role::Relayed)
    }

    pub fn is_request(self) -> bool {
        matches!(self, Role::AgentRequest | Role::Relayed)
    }
}

macro_rules! message_catalog {
    ($( $variant:ident($payload:ident) = $tag:literal, $role:ident; )*) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $( $variant($payload), )*
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MessageKind {
            $( $variant, )*
        }

        impl MessageKind {
            pub const ALL: &'static [MessageKind] = &[ $( MessageKind::$variant, )* ];

            pub fn tag(self) -> [u8; 4] {
                match self {
                    $( MessageKind::$variant => *$tag, )*
                }
            }

            pub fn from_tag(tag: [u8; 4]) -> Option<MessageKind> {
                match &tag {
                    $( $tag => Some(MessageKind::$variant), )*
                    _ => None,
                }
            }

            pub fn role(self) -> Role {
                match self {
                    $( MessageKind::$variant => Role::$role, )*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( MessageKind::$variant => stringify!($variant), )*
                }
            }
        }

        impl Message {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $( Message::$variant(_) => MessageKind::$variant, )*
                }
            }

            pub fn encode_payload(&self) -> Result<Vec<u8>, bincode::Error> {
                match self {
                    $( Message::$variant(payload) => bincode::serialize(payload), )*
                }
            }

            pub fn decode_payload(kind: MessageKind, bytes: &[u8]) -> Result<Message, bincode::Error> {
                match kind {
                    $( MessageKind::$variant => Ok(Message::$variant(bincode::deserialize(bytes)?)), )*
                }
            }
        }

        $(
            impl From<$payload> for Message {
                fn from(payload: $payload) -> Self {
                    Message::$variant(payload)
                }
            }
        )*
    };
}

message_catalog! {
    Tick(TickMsg) = b"tick", ServerCommand;
    WorldReset(WorldResetMsg) = b"rset", ServerCommand;
    InitClient(InitClientMsg) = b"init", AgentNotice;
    WorldLoading(WorldLoadingMsg) = b"wldg", ServerCommand;
    PauseGame(PauseGameMsg) = b"paus", ServerCommand;
    SetGameMode(SetGameModeMsg) = b"mode", ServerCommand;
    SetGameSpeed(SetGameSpeedMsg) = b"sped", ServerCommand;
    AddPlayer(AddPlayerMsg) = b"addp", ServerCommand;
    RemovePlayer(RemovePlayerMsg) = b"delp", ServerCommand;
    SetAgentPlayer(SetAgentPlayerMsg) = b"agpl", AgentNotice;
    JoinRequest(JoinRequestMsg) = b"join", AgentRequest;
    CannotJoin(CannotJoinMsg) = b"nojn", AgentNotice;
    ConnectionLost(ConnectionLostMsg) = b"lost", AgentRequest;
    RespawnRequest(RespawnRequestMsg) = b"rspr", AgentRequest;
    CannotRespawn(CannotRespawnMsg) = b"norp", AgentNotice;
    Respawn(RespawnMsg) = b"resp", ServerCommand;
    TaggingZone(TaggingZoneMsg) = b"tagz", ServerCommand;
    ZoneState(ZoneStateMsg) = b"zone", ServerCommand;
    PlayerUpdateState(PlayerUpdateStateMsg) = b"plup", ServerCommand;
    UpdatePlayerState(UpdatePlayerStateMsg) = b"keys", Relayed;
    AimPlayerAt(AimPlayerAtMsg) = b"aimp", Relayed;
    Shoot(ShootMsg) = b"shoo", AgentRequest;
    ShotFired(ShotFiredMsg) = b"shot", ServerCommand;
    ShotHitPlayer(ShotHitPlayerMsg) = b"hitp", ServerCommand;
    GrenadeHitPlayer(GrenadeHitPlayerMsg) = b"ghit", ServerCommand;
    PlayerKilled(PlayerKilledMsg) = b"kill", ServerCommand;
    ResyncPlayer(ResyncPlayerMsg) = b"rsyn", ServerCommand;
    ResyncAcknowledged(ResyncAcknowledgedMsg) = b"rack", AgentRequest;
    CheckSync(CheckSyncMsg) = b"sync", AgentRequest;
    DelayUpdated(DelayUpdatedMsg) = b"dlay", AgentNotice;
    SetWorldAbilities(SetWorldAbilitiesMsg) = b"ablt", ServerCommand;
    SetUiOptions(SetUiOptionsMsg) = b"uiop", ServerCommand;
    UpdateClockState(UpdateClockStateMsg) = b"clok", ServerCommand;
    UpdateScoreBoardMode(UpdateScoreBoardModeMsg) = b"sbmd", ServerCommand;
    SetTeamScore(SetTeamScoreMsg) = b"tscr", ServerCommand;
    SetPlayerScore(SetPlayerScoreMsg) = b"pscr", ServerCommand;
    BuyUpgrade(BuyUpgradeMsg) = b"buyu", AgentRequest;
    UpgradeApproved(UpgradeApprovedMsg) = b"uapp", AgentNotice;
    PlayerHasUpgrade(PlayerHasUpgradeMsg) = b"hasu", Relayed;
    CannotBuyUpgrade(CannotBuyUpgradeMsg) = b"nobu", AgentNotice;
    UpgradeChanged(UpgradeChangedMsg) = b"uchg", ServerCommand;
    PlayerCoinsSpent(PlayerCoinsSpentMsg) = b"cspt", ServerCommand;
    AwardPlayerCoin(AwardPlayerCoinMsg) = b"cawd", ServerCommand;
    SetPlayerCoins(SetPlayerCoinsMsg) = b"cset", ServerCommand;
    CreateCollectableCoin(CreateCollectableCoinMsg) = b"ccrt", ServerCommand;
    RemoveCollectableCoin(RemoveCollectableCoinMsg) = b"cdel", ServerCommand;
    SetTrosballEnabled(SetTrosballEnabledMsg) = b"tbon", ServerCommand;
    PlayerHasTrosball(PlayerHasTrosballMsg) = b"tbhd", ServerCommand;
    TrosballPosition(TrosballPositionMsg) = b"tbps", ServerCommand;
    ThrowTrosball(ThrowTrosballMsg) = b"tbth", AgentRequest;
    PlayerHasElephant(PlayerHasElephantMsg) = b"elph", ServerCommand;
    ChatFromServer(ChatFromServerMsg) = b"srvc", AgentNotice;
    Chat(ChatMsg) = b"chat", Relayed;
    AchievementUnlocked(AchievementUnlockedMsg) = b"achv", ServerCommand;
    PlaySound(PlaySoundMsg) = b"snd_", ServerCommand;
    UpdateGameInfo(UpdateGameInfoMsg) = b"info", ServerCommand;
}

impl Message {
    pub fn role(&self) -> Role {
        self.kind().role()
    }

    /// The tick a timestamped player request was generated on.
    pub fn tick_id(&self) -> Option<TickId> {
        match self {
            Message::RespawnRequest(m) => Some(m.tick_id),
            Message::UpdatePlayerState(m) => Some(m.tick_id),
            Message::AimPlayerAt(m) => Some(m.tick_id),
            Message::Shoot(m) => Some(m.tick_id),
            Message::ResyncAcknowledged(m) => Some(m.tick_id),
            Message::CheckSync(m) => Some(m.tick_id),
            Message::BuyUpgrade(m) => Some(m.tick_id),
            Message::PlayerHasUpgrade(m) => Some(m.tick_id),
            Message::ThrowTrosball(m) => Some(m.tick_id),
            _ => None,
        }
    }

    pub fn is_timestamped(&self) -> bool {
        self.tick_id().is_some()
    }

    /// The player a request claims to act for.
    pub fn acting_player(&self) -> Option<PlayerId> {
        match self {
            Message::RespawnRequest(m) => Some(m.player_id),
            Message::UpdatePlayerState(m) => Some(m.player_id),
            Message::AimPlayerAt(m) => Some(m.player_id),
            Message::Shoot(m) => Some(m.player_id),
            Message::ResyncAcknowledged(m) => Some(m.player_id),
            Message::CheckSync(m) => Some(m.player_id),
            Message::BuyUpgrade(m) => Some(m.player_id),
            Message::PlayerHasUpgrade(m) => Some(m.player_id),
            Message::ThrowTrosball(m) => Some(m.player_id),
            Message::Chat(m) => Some(m.player_id),
            _ => None,
        }
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    GameFull,
    Unauthorised,
    NotEnoughCoins,
    PlayerDead,
    GameNotStarted,
    AlreadyTurret,
    TooCloseToEdge,
    TooCloseToOrb,
    NotInDarkZone,
    InvalidUpgrade,
    DisabledUpgrade,
    AlreadyAlive,
    BePatient,
    EnemyZone,
    FrozenZone,
    Timeout,
}

impl ReasonCode {
    pub fn message(self) -> &'static str {
        match self {
            ReasonCode::GameFull => "The game is full.",
            ReasonCode::Unauthorised => "You are not allowed to do that.",
            ReasonCode::NotEnoughCoins => "You do not have enough coins.",
            ReasonCode::PlayerDead => "You cannot do that while dead.",
            ReasonCode::GameNotStarted => "The game has not started yet.",
            ReasonCode::AlreadyTurret => "There is already a turret in this zone.",
            ReasonCode::TooCloseToEdge => "You are too close to the zone edge.",
            ReasonCode::TooCloseToOrb => "You are too close to the orb.",
            ReasonCode::NotInDarkZone => "You are not in a dark friendly zone.",
            ReasonCode::InvalidUpgrade => "That upgrade does not exist.",
            ReasonCode::DisabledUpgrade => "That upgrade is currently disabled.",
            ReasonCode::AlreadyAlive => "You are already alive.",
            ReasonCode::BePatient => "You cannot respawn yet.",
            ReasonCode::EnemyZone => "Cannot respawn outside friendly zone.",
            ReasonCode::FrozenZone => "That zone has been frozen!",
            ReasonCode::Timeout => "Your connection timed out.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_tags_are_unique_and_reversible() {
        let mut seen = HashSet::new();
        for kind in MessageKind::ALL {
            assert!(seen.insert(kind.tag()), "duplicate tag for {}", kind.name());
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(MessageKind::from_tag(*b"????"), None);
    }

    #[test]
    fn test_roles() {
        assert!(MessageKind::Tick.role().is_command());
        assert!(!MessageKind::Tick.role().is_request());
        assert!(MessageKind::UpdatePlayerState.role().is_command());
        assert!(MessageKind::UpdatePlayerState.role().is_request());
        assert_eq!(MessageKind::DelayUpdated.role(), Role::AgentNotice);
        assert_eq!(MessageKind::JoinRequest.role(), Role::AgentRequest);
    }

    #[test]
    fn test_timestamped_requests() {
        let shoot: Message = ShootMsg {
            player_id: 4,
            tick_id: 99,
            local_id: 1,
        }
        .into();
        assert_eq!(shoot.tick_id(), Some(99));
        assert_eq!(shoot.acting_player(), Some(4));

        let join: Message = JoinRequestMsg {
            nick: "bob".into(),
            team: None,
            bot: false,
        }
        .into();
        assert!(!join.is_timestamped());
    }

    #[test]
    fn test_payload_codec() {
        let msg: Message = TaggingZoneMsg {
            zone_id: 3,
            player_id: None,
        }
        .into();
        let bytes = msg.encode_payload().unwrap();
        let decoded = Message::decode_payload(msg.kind(), &bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
