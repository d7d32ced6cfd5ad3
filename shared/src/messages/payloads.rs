use super::ReasonCode;
use crate::constants::*;
use crate::world::clock::ClockState;
use crate::world::items::UpgradeKind;
use crate::world::options::{AbilitiesPatch, UiOptionsPatch};
use crate::world::physics::{GameMode, Vector2};
use crate::world::player::{PlayerKey, PlayerMotion};
use crate::world::team::TeamId;
use crate::world::units::ShotKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMsg {
    pub tick_id: TickId,
}

/// Replaces the receiver's whole world with a snapshot blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldResetMsg {
    pub settings: Vec<u8>,
}

/// First message an agent receives after connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitClientMsg {
    pub server_version: String,
    pub settings: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldLoadingMsg {
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseGameMsg {
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetGameModeMsg {
    pub mode: GameMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetGameSpeedMsg {
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPlayerMsg {
    pub player_id: PlayerId,
    pub nick: String,
    pub team: Option<TeamId>,
    pub zone_id: ZoneId,
    pub dead: bool,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovePlayerMsg {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAgentPlayerMsg {
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequestMsg {
    pub nick: String,
    pub team: Option<TeamId>,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannotJoinMsg {
    pub reason: ReasonCode,
}

/// Fed through the normal request path when an agent's transport closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionLostMsg;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnRequestMsg {
    pub player_id: PlayerId,
    pub tick_id: TickId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannotRespawnMsg {
    pub reason: ReasonCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnMsg {
    pub player_id: PlayerId,
    pub zone_id: ZoneId,
}

/// Hands a zone to the tagging player's team, or to nobody when no
/// player is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggingZoneMsg {
    pub zone_id: ZoneId,
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStateMsg {
    pub zone_id: ZoneId,
    pub owner: Option<TeamId>,
    pub dark: bool,
    pub frozen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdateStateMsg {
    pub player_id: PlayerId,
    pub motion: PlayerMotion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlayerStateMsg {
    pub player_id: PlayerId,
    pub key: PlayerKey,
    pub value: bool,
    pub tick_id: TickId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AimPlayerAtMsg {
    pub player_id: PlayerId,
    pub angle: f32,
    pub tick_id: TickId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShootMsg {
    pub player_id: PlayerId,
    pub tick_id: TickId,
    /// Client-side id of the predicted shot
    pub local_id: ShotId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotFiredMsg {
    pub player_id: PlayerId,
    pub shot_id: ShotId,
    pub local_id: ShotId,
    pub pos: Vector2,
    pub vel: Vector2,
    pub kind: ShotKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotHitPlayerMsg {
    pub shot_id: ShotId,
    pub player_id: PlayerId,
}

/// A player caught in a grenade blast. Damage goes through shields the
/// same way a shot hit does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrenadeHitPlayerMsg {
    pub thrower_id: PlayerId,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerKilledMsg {
    pub target_id: PlayerId,
    pub killer_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncPlayerMsg {
    pub player_id: PlayerId,
    pub motion: PlayerMotion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncAcknowledgedMsg {
    pub player_id: PlayerId,
    pub tick_id: TickId,
}

/// A client's view of its own position at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSyncMsg {
    pub player_id: PlayerId,
    pub tick_id: TickId,
    pub pos: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayUpdatedMsg {
    pub delay: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetWorldAbilitiesMsg {
    pub patch: AbilitiesPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetUiOptionsMsg {
    pub patch: UiOptionsPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateClockStateMsg {
    pub clock: ClockState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateScoreBoardModeMsg {
    pub teams: bool,
    pub players: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTeamScoreMsg {
    pub team: TeamId,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPlayerScoreMsg {
    pub player_id: PlayerId,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyUpgradeMsg {
    pub player_id: PlayerId,
    pub upgrade: UpgradeKind,
    pub tick_id: TickId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeApprovedMsg {
    pub upgrade: UpgradeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerHasUpgradeMsg {
    pub player_id: PlayerId,
    pub upgrade: UpgradeKind,
    pub tick_id: TickId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannotBuyUpgradeMsg {
    pub upgrade: UpgradeKind,
    pub reason: ReasonCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeChangedMsg {
    pub upgrade: UpgradeKind,
    pub cost: u32,
    pub time_limit: Option<u32>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCoinsSpentMsg {
    pub player_id: PlayerId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardPlayerCoinMsg {
    pub player_id: PlayerId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPlayerCoinsMsg {
    pub player_id: PlayerId,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCollectableCoinMsg {
    pub coin_id: CoinId,
    pub pos: Vector2,
    pub vel: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveCollectableCoinMsg {
    pub coin_id: CoinId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTrosballEnabledMsg {
    pub enabled: bool,
    pub pos: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerHasTrosballMsg {
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrosballPositionMsg {
    pub pos: Vector2,
    pub vel: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowTrosballMsg {
    pub player_id: PlayerId,
    pub tick_id: TickId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerHasElephantMsg {
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFromServerMsg {
    pub text: String,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMsg {
    pub player_id: PlayerId,
    pub team_only: bool,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementUnlockedMsg {
    pub player_id: PlayerId,
    pub achievement_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaySoundMsg {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateGameInfoMsg {
    pub title: String,
    pub info: Vec<String>,
}
