//! The client-side agent: a mirror of the server world, our predicted
//! player, and the requests that go back to the server.
//!
//! Everything the server sends passes through [`ConcreteAgent::receive`].
//! Commands are applied to the mirror in arrival order, which keeps it in
//! step with the server; notices only ever touch agent-local state.

use crate::local_state::LocalState;
use log::{debug, info, warn};
use shared::constants::*;
use shared::messages::*;
use shared::world::items::UpgradeKind;
use shared::world::player::PlayerKey;
use shared::world::snapshot::WorldSnapshot;
use shared::world::team::TeamId;
use shared::{ProtocolError, World, WorldRole};
use std::sync::OnceLock;

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentNotice {
    Joined(PlayerId),
    CannotJoin(ReasonCode),
    CannotRespawn(ReasonCode),
    CannotBuyUpgrade(UpgradeKind, ReasonCode),
    ServerChat { text: String, error: bool },
    Removed,
}

pub struct ConcreteAgent {
    pub world: World,
    pub local: LocalState,
    player_id: Option<PlayerId>,
    /// Last aim the server has been told about
    sent_angle: Option<f32>,
    ticks_since_sync_check: u64,
    requests: Vec<Message>,
    notices: Vec<AgentNotice>,
}

fn dispatch_table() -> &'static DispatchTable<ConcreteAgent> {
    static TABLE: OnceLock<DispatchTable<ConcreteAgent>> = OnceLock::new();
    TABLE.get_or_init(|| {
        DispatchTable::new(ConcreteAgent::apply_command)
            .on(MessageKind::InitClient, ConcreteAgent::init_client)
            .on(MessageKind::WorldReset, ConcreteAgent::world_reset)
            .on(MessageKind::SetAgentPlayer, ConcreteAgent::set_agent_player)
            .on(MessageKind::Tick, ConcreteAgent::tick)
            .on(MessageKind::ResyncPlayer, ConcreteAgent::resync_player)
            .on(MessageKind::PlayerUpdateState, ConcreteAgent::player_update_state)
            .on(MessageKind::ShotFired, ConcreteAgent::shot_fired)
            .on(MessageKind::RemovePlayer, ConcreteAgent::remove_player)
            .on(MessageKind::DelayUpdated, ConcreteAgent::delay_updated)
            .on(MessageKind::UpgradeApproved, ConcreteAgent::upgrade_approved)
            .on(MessageKind::CannotBuyUpgrade, ConcreteAgent::cannot_buy_upgrade)
            .on(MessageKind::CannotJoin, ConcreteAgent::cannot_join)
            .on(MessageKind::CannotRespawn, ConcreteAgent::cannot_respawn)
            .on(MessageKind::ChatFromServer, ConcreteAgent::chat_from_server)
    })
}

impl Default for ConcreteAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcreteAgent {
    pub fn new() -> Self {
        Self {
            world: World::lobby(WorldRole::Client),
            local: LocalState::new(),
            player_id: None,
            sent_angle: None,
            ticks_since_sync_check: 0,
            requests: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Requests queued for the server since the last call.
    pub fn take_requests(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.requests)
    }

    pub fn take_notices(&mut self) -> Vec<AgentNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Handles one message from the server.
    pub fn receive(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        dispatch_table().dispatch(self, msg)
    }

    // ---------------------------------------------------------------------
    // Handlers

    fn apply_command(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if !msg.role().is_command() {
            debug!("Agent ignoring {}", msg.kind().name());
            return Ok(());
        }
        self.world.apply(msg)?;
        if self.refreshes_local_player(msg) {
            self.local.refresh_status(&self.world);
        }
        Ok(())
    }

    fn refreshes_local_player(&self, msg: &Message) -> bool {
        let Some(ours) = self.player_id else {
            return false;
        };
        match msg {
            Message::Respawn(m) => m.player_id == ours,
            Message::PlayerKilled(m) => m.target_id == ours,
            Message::ShotHitPlayer(m) => m.player_id == ours,
            Message::GrenadeHitPlayer(m) => m.player_id == ours,
            Message::PlayerHasUpgrade(m) => m.player_id == ours,
            Message::PlayerCoinsSpent(m) => m.player_id == ours,
            Message::AwardPlayerCoin(m) => m.player_id == ours,
            Message::SetPlayerCoins(m) => m.player_id == ours,
            Message::TaggingZone(_) => true,
            _ => false,
        }
    }

    fn init_client(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let Message::InitClient(m) = msg else {
            return Ok(());
        };
        if m.server_version != SERVER_VERSION {
            return Err(ProtocolError::VersionMismatch {
                server: m.server_version.clone(),
                local: SERVER_VERSION.to_string(),
            });
        }
        let snapshot = WorldSnapshot::from_blob(&m.settings)?;
        self.world.restore_everything(snapshot)?;
        self.local.reset_from(&self.world, self.player_id);
        info!("Connected to server version {}", m.server_version);
        Ok(())
    }

    fn world_reset(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.world.apply(msg)?;
        self.local.reset_from(&self.world, self.player_id);
        self.sent_angle = None;
        Ok(())
    }

    fn set_agent_player(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let Message::SetAgentPlayer(m) = msg else {
            return Ok(());
        };
        self.player_id = m.player_id;
        self.local.reset_from(&self.world, m.player_id);
        self.ticks_since_sync_check = 0;
        match m.player_id {
            Some(player_id) => self.notices.push(AgentNotice::Joined(player_id)),
            None => self.notices.push(AgentNotice::Removed),
        }
        Ok(())
    }

    fn tick(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.world.apply(msg)?;
        self.local.tick(&self.world);
        self.flush_aim();

        self.ticks_since_sync_check += 1;
        if self.ticks_since_sync_check >= SYNC_CHECK_PERIOD {
            self.ticks_since_sync_check = 0;
            self.send_sync_check();
        }
        Ok(())
    }

    /// Tells the server where our predicted player is. The request is held
    /// back by the same delay as our input, so the server compares it with
    /// the tick on which that input took effect.
    fn send_sync_check(&mut self) {
        let Some(player_id) = self.player_id else {
            return;
        };
        let Some(player) = self.local.player() else {
            return;
        };
        let pos = player.pos();
        self.requests.push(
            CheckSyncMsg {
                player_id,
                tick_id: self.world.last_tick_id,
                pos,
            }
            .into(),
        );
    }

    fn resync_player(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.world.apply(msg)?;
        let Message::ResyncPlayer(m) = msg else {
            return Ok(());
        };
        if Some(m.player_id) != self.player_id {
            return Ok(());
        }
        self.requests.push(
            ResyncAcknowledgedMsg {
                player_id: m.player_id,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
        self.resend_differing_keys(m.motion);
        self.sent_angle = Some(m.motion.angle);
        self.ticks_since_sync_check = 0;
        Ok(())
    }

    fn player_update_state(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.world.apply(msg)?;
        if let Message::PlayerUpdateState(m) = msg {
            if Some(m.player_id) == self.player_id {
                self.resend_differing_keys(m.motion);
            }
        }
        Ok(())
    }

    /// Adopts the server's motion for our player and re-sends every key
    /// the user is holding that the server does not know about.
    fn resend_differing_keys(&mut self, motion: shared::world::player::PlayerMotion) {
        let Some(player_id) = self.player_id else {
            return;
        };
        for (key, value) in self.local.adopt_motion(motion) {
            debug!("Re-sending {:?}={} after resync", key, value);
            self.requests.push(
                UpdatePlayerStateMsg {
                    player_id,
                    key,
                    value,
                    tick_id: self.world.last_tick_id,
                }
                .into(),
            );
        }
    }

    fn shot_fired(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.world.apply(msg)?;
        if let Message::ShotFired(m) = msg {
            if Some(m.player_id) == self.player_id && !self.local.match_shot(m.local_id) {
                debug!("Shot {} matched no local shot", m.local_id);
            }
        }
        Ok(())
    }

    fn remove_player(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.world.apply(msg)?;
        if let Message::RemovePlayer(m) = msg {
            if Some(m.player_id) == self.player_id {
                self.player_id = None;
                self.local.clear();
                self.notices.push(AgentNotice::Removed);
            }
        }
        Ok(())
    }

    fn delay_updated(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if let Message::DelayUpdated(m) = msg {
            debug!("Server delay is now {} ticks", m.delay);
            self.local.server_delay = m.delay;
        }
        Ok(())
    }

    fn upgrade_approved(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let (Message::UpgradeApproved(m), Some(player_id)) = (msg, self.player_id) else {
            return Ok(());
        };
        self.local.confirm_upgrade(m.upgrade);
        self.requests.push(
            PlayerHasUpgradeMsg {
                player_id,
                upgrade: m.upgrade,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
        Ok(())
    }

    fn cannot_buy_upgrade(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if let Message::CannotBuyUpgrade(m) = msg {
            self.local.roll_back_upgrade(m.upgrade);
            self.notices.push(AgentNotice::CannotBuyUpgrade(m.upgrade, m.reason));
        }
        Ok(())
    }

    fn cannot_join(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if let Message::CannotJoin(m) = msg {
            warn!("Cannot join: {}", m.reason.message());
            self.notices.push(AgentNotice::CannotJoin(m.reason));
        }
        Ok(())
    }

    fn cannot_respawn(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if let Message::CannotRespawn(m) = msg {
            self.notices.push(AgentNotice::CannotRespawn(m.reason));
        }
        Ok(())
    }

    fn chat_from_server(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if let Message::ChatFromServer(m) = msg {
            info!("Server: {}", m.text);
            self.notices.push(AgentNotice::ServerChat {
                text: m.text.clone(),
                error: m.error,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // User actions

    pub fn join(&mut self, nick: &str, team: Option<TeamId>) {
        if self.player_id.is_some() {
            return;
        }
        self.requests.push(
            JoinRequestMsg {
                nick: nick.to_string(),
                team,
                bot: false,
            }
            .into(),
        );
    }

    pub fn set_key(&mut self, key: PlayerKey, value: bool) {
        let Some(player_id) = self.player_id else {
            return;
        };
        if self.local.keys().get(key) == value {
            return;
        }
        self.local.set_key(key, value);
        self.requests.push(
            UpdatePlayerStateMsg {
                player_id,
                key,
                value,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
    }

    /// Turns our player at once. The server hears about it on the next
    /// tick or before the next shot, whichever comes first.
    pub fn aim_at(&mut self, angle: f32) {
        self.local.set_angle(angle);
    }

    fn flush_aim(&mut self) {
        let (Some(player_id), Some(player)) = (self.player_id, self.local.player()) else {
            return;
        };
        let angle = player.motion.angle;
        if self.sent_angle == Some(angle) {
            return;
        }
        self.sent_angle = Some(angle);
        self.requests.push(
            AimPlayerAtMsg {
                player_id,
                angle,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
    }

    pub fn shoot(&mut self) -> bool {
        let Some(player_id) = self.player_id else {
            return false;
        };
        if !self.world.player(player_id).map_or(false, |p| !p.dead) {
            return false;
        }
        self.flush_aim();
        let Some(local_id) = self.local.fire_shot(&self.world) else {
            return false;
        };
        self.requests.push(
            ShootMsg {
                player_id,
                tick_id: self.world.last_tick_id,
                local_id,
            }
            .into(),
        );
        true
    }

    /// Checks what we can check locally before asking the server.
    pub fn buy_upgrade(&mut self, kind: UpgradeKind) -> Result<(), ReasonCode> {
        let player_id = self.player_id.ok_or(ReasonCode::Unauthorised)?;
        let spec = self.world.upgrades.get(kind).ok_or(ReasonCode::InvalidUpgrade)?;
        if !spec.enabled {
            return Err(ReasonCode::DisabledUpgrade);
        }
        if !self.world.abilities.upgrades {
            return Err(ReasonCode::GameNotStarted);
        }
        let player = self.world.player(player_id).ok_or(ReasonCode::Unauthorised)?;
        if player.dead {
            return Err(ReasonCode::PlayerDead);
        }
        if player.coins < spec.cost {
            return Err(ReasonCode::NotEnoughCoins);
        }
        let predict = spec.do_not_wait_for_server;

        if kind == UpgradeKind::Grenade {
            self.flush_aim();
        }
        if predict {
            self.local.predict_upgrade(kind);
        }
        self.requests.push(
            BuyUpgradeMsg {
                player_id,
                upgrade: kind,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
        Ok(())
    }

    pub fn respawn(&mut self) -> Result<(), ReasonCode> {
        let player_id = self.player_id.ok_or(ReasonCode::Unauthorised)?;
        self.world.check_respawn(player_id)?;
        self.requests.push(
            RespawnRequestMsg {
                player_id,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
        Ok(())
    }

    pub fn throw_trosball(&mut self) {
        let Some(player_id) = self.player_id else {
            return;
        };
        let holding = self.world.trosball.as_ref().and_then(|ball| ball.holder()) == Some(player_id);
        if !holding {
            return;
        }
        self.flush_aim();
        self.requests.push(
            ThrowTrosballMsg {
                player_id,
                tick_id: self.world.last_tick_id,
            }
            .into(),
        );
    }

    pub fn chat(&mut self, text: &str, team_only: bool) {
        let Some(player_id) = self.player_id else {
            return;
        };
        self.requests.push(
            ChatMsg {
                player_id,
                team_only,
                text: text.to_string(),
            }
            .into(),
        );
    }
}
