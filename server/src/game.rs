//! The authoritative game.
//!
//! [`LocalGame`] owns the server's copy of the world. Agents (network
//! clients and in-process bots) feed it requests; it validates them and
//! produces server commands. Every command is applied to the server world
//! and queued in the outbox for broadcast in exactly the order it was
//! applied, so every client that replays the outbox reaches the same state.

use crate::agent_info::{AgentAction, AgentId, AgentInfo};
use crate::bots::Bot;
use crate::collisions::find_shot_hits;
use crate::error::GameError;
use crate::id_pool::{IdPool, WrappingIds};
use crate::level::regions::{Region, RegionId, RegionSet};
use crate::level::{self, Level};
use crate::triggers::find_zone_tags;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::constants::*;
use shared::delayed::{DelayedCallId, DelayedCalls};
use shared::messages::*;
use shared::world::items::UpgradeKind;
use shared::world::layout::{LayoutDatabase, MapLayout};
use shared::world::physics::Vector2;
use shared::world::player::{Player, PlayerMotion};
use shared::world::snapshot::WorldSnapshot;
use shared::world::team::TeamId;
use shared::world::units::ShotKind;
use shared::world::zone::ZoneRecord;
use shared::world::WorldEffect;
use shared::{GameConfig, World, WorldRole};
use std::collections::{BTreeMap, BTreeSet};
use std::collections::VecDeque;

pub type DelayedCall = Box<dyn FnOnce(&mut LocalGame) -> Result<(), GameError> + Send>;

pub const TARDY_MESSAGE: &str = "You have been removed from the game because your connection is too slow!";

const MAX_DROPPED_COINS: u32 = 5;
const TURRET_EDGE_MARGIN: f32 = 100.0;
const TURRET_ORB_MARGIN: f32 = ORB_RADIUS + 2.0 * PLAYER_RADIUS;
const TROSBALL_CATCH_RADIUS: f32 = 2.0 * PLAYER_RADIUS;
const MAX_NICK_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Agent(AgentId),
}

/// A message waiting to be written to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub message: Message,
}

pub struct LocalGame {
    pub world: World,
    config: GameConfig,
    agents: BTreeMap<AgentId, AgentInfo>,
    next_agent_id: AgentId,
    player_ids: IdPool,
    shot_ids: WrappingIds,
    coin_ids: WrappingIds,
    pending_commands: VecDeque<Message>,
    delivering: bool,
    outbox: Vec<Outgoing>,
    delayed_calls: DelayedCalls<DelayedCall>,
    /// Monotonic tick by which each resyncing player must acknowledge
    resync_deadlines: BTreeMap<PlayerId, u64>,
    approved_upgrades: BTreeSet<(PlayerId, UpgradeKind)>,
    regions: RegionSet,
    level: Option<Box<dyn Level>>,
    bots: BTreeMap<AgentId, Bot>,
    rng: StdRng,
}

impl LocalGame {
    pub fn new(config: GameConfig, layout: MapLayout) -> Self {
        Self::with_rng(config, layout, StdRng::from_entropy())
    }

    /// A game whose random choices are reproducible.
    pub fn with_seed(config: GameConfig, layout: MapLayout, seed: u64) -> Self {
        Self::with_rng(config, layout, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, layout: MapLayout, rng: StdRng) -> Self {
        let mut world = World::new(WorldRole::Server, layout, LayoutDatabase::default());
        set_initial_darkness(&mut world);
        Self {
            world,
            config,
            agents: BTreeMap::new(),
            next_agent_id: 1,
            player_ids: IdPool::new(PLAYER_ID_MIN, PLAYER_ID_MAX),
            shot_ids: WrappingIds::default(),
            coin_ids: WrappingIds::default(),
            pending_commands: VecDeque::new(),
            delivering: false,
            outbox: Vec::new(),
            delayed_calls: DelayedCalls::new(),
            resync_deadlines: BTreeMap::new(),
            approved_upgrades: BTreeSet::new(),
            regions: RegionSet::default(),
            level: None,
            bots: BTreeMap::new(),
            rng,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn agent(&self, agent_id: AgentId) -> Option<&AgentInfo> {
        self.agents.get(&agent_id)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn player_for_agent(&self, agent_id: AgentId) -> Option<PlayerId> {
        self.agents.get(&agent_id).and_then(|info| info.player_id)
    }

    pub fn agent_for_player(&self, player_id: PlayerId) -> Option<AgentId> {
        self.agents
            .values()
            .find(|info| info.player_id == Some(player_id))
            .map(|info| info.agent_id)
    }

    pub fn is_resyncing(&self, player_id: PlayerId) -> bool {
        self.resync_deadlines.contains_key(&player_id)
    }

    pub fn human_player_count(&self) -> usize {
        self.world.players.values().filter(|p| !p.bot).count()
    }

    pub fn level_name(&self) -> Option<&'static str> {
        self.level.as_ref().map(|level| level.name())
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn add_region(&mut self, region: Region) -> RegionId {
        self.regions.add(region)
    }

    pub fn remove_region(&mut self, id: RegionId) -> Option<Region> {
        self.regions.remove(id)
    }

    /// Everything queued for the network since the last call, in order.
    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    // ---------------------------------------------------------------------
    // Command delivery

    /// Applies a command to the server world and queues it for every agent.
    ///
    /// Commands sent while another is being delivered (from effects or
    /// server hooks) wait until the current one is fully processed, so the
    /// broadcast order always matches the order the server applied them in.
    pub fn send_server_command(&mut self, msg: Message) {
        if !msg.role().is_command() {
            warn!("Refusing to broadcast {} as a command", msg.kind().name());
            return;
        }
        self.pending_commands.push_back(msg);
        if self.delivering {
            return;
        }

        self.delivering = true;
        while let Some(msg) = self.pending_commands.pop_front() {
            if let Err(e) = self.world.apply(&msg) {
                error!("Server world rejected {}: {}", msg.kind().name(), e);
                continue;
            }
            self.outbox.push(Outgoing {
                recipient: Recipient::All,
                message: msg.clone(),
            });
            self.after_command(&msg);
        }
        self.delivering = false;
    }

    /// Sends a notice to a single agent.
    pub fn send_to_agent(&mut self, agent_id: AgentId, msg: Message) {
        if let Some(bot) = self.bots.get_mut(&agent_id) {
            bot.notify(msg);
            return;
        }
        self.outbox.push(Outgoing {
            recipient: Recipient::Agent(agent_id),
            message: msg,
        });
    }

    fn after_command(&mut self, msg: &Message) {
        for effect in self.world.take_effects() {
            self.handle_effect(effect);
        }
        match msg {
            Message::Tick(_) => self.after_world_advanced(),
            Message::RemovePlayer(m) => self.player_removed(m.player_id),
            _ => {}
        }
    }

    fn handle_effect(&mut self, effect: WorldEffect) {
        match effect {
            WorldEffect::PlayerDied { victim, killer, pos } => {
                if let Some(killer) = killer.filter(|killer| *killer != victim) {
                    self.send_server_command(
                        AwardPlayerCoinMsg {
                            player_id: killer,
                            count: KILL_REWARD,
                        }
                        .into(),
                    );
                }
                if self.world.elephant == Some(victim) {
                    self.send_server_command(PlayerHasElephantMsg { player_id: killer }.into());
                }
                self.drop_coins(victim, pos);
            }
            WorldEffect::ZoneTagged { zone_id, player_id, .. } => {
                if let Some(player_id) = player_id {
                    self.send_server_command(
                        AwardPlayerCoinMsg {
                            player_id,
                            count: TAG_REWARD,
                        }
                        .into(),
                    );
                }
                self.update_darkness(zone_id);
            }
            WorldEffect::GrenadeExploded { owner, pos } => {
                let team = self.world.player(owner).and_then(|p| p.team);
                let victims: Vec<PlayerId> = self
                    .world
                    .players
                    .values()
                    .filter(|p| {
                        !p.dead && p.id != owner && p.is_enemy_of(team) && p.pos().distance(&pos) <= GRENADE_BLAST_RADIUS
                    })
                    .map(|p| p.id)
                    .collect();
                for player_id in victims {
                    self.send_server_command(
                        GrenadeHitPlayerMsg {
                            thrower_id: owner,
                            player_id,
                        }
                        .into(),
                    );
                }
            }
        }
    }

    /// A dead player spills half its coins as collectables.
    fn drop_coins(&mut self, victim: PlayerId, pos: Vector2) {
        let coins = self.world.player(victim).map(|p| p.coins).unwrap_or(0);
        let count = (coins / 2 / COLLECTABLE_COIN_VALUE).min(MAX_DROPPED_COINS);
        if count == 0 {
            return;
        }
        self.send_server_command(
            PlayerCoinsSpentMsg {
                player_id: victim,
                count: count * COLLECTABLE_COIN_VALUE,
            }
            .into(),
        );
        for i in 0..count {
            let taken = &self.world.coins;
            let Some(coin_id) = self.coin_ids.next_free(|id| taken.contains_key(&id)) else {
                warn!("No free collectable coin ids");
                return;
            };
            let spread = i as f32 - (count - 1) as f32 / 2.0;
            self.send_server_command(
                CreateCollectableCoinMsg {
                    coin_id,
                    pos,
                    vel: Vector2::new(spread * 150.0, -400.0),
                }
                .into(),
            );
        }
    }

    /// Re-evaluates the dark flag of a zone and its neighbours.
    fn update_darkness(&mut self, zone_id: ZoneId) {
        let Some(zone) = self.world.zone(zone_id) else {
            return;
        };
        let mut ids = vec![zone_id];
        ids.extend(zone.neighbours.iter().copied());

        let changes: Vec<Message> = ids
            .into_iter()
            .filter_map(|id| self.world.zone(id))
            .filter_map(|zone| {
                let dark = self.world.should_be_dark(zone.id);
                (zone.dark != dark).then(|| {
                    ZoneStateMsg {
                        zone_id: zone.id,
                        owner: zone.owner,
                        dark,
                        frozen: zone.frozen,
                    }
                    .into()
                })
            })
            .collect();
        for msg in changes {
            self.send_server_command(msg);
        }
    }

    /// Server-only work done right after the world advanced for a tick.
    fn after_world_advanced(&mut self) {
        self.check_shot_collisions();
        self.expire_collectable_coins();
        for (zone_id, player_id) in find_zone_tags(&self.world) {
            self.send_server_command(TaggingZoneMsg { zone_id, player_id }.into());
        }
        self.world.fire_units_advanced();
        self.boot_tardy_players();
    }

    fn check_shot_collisions(&mut self) {
        for (shot_id, hits) in find_shot_hits(&self.world, self.config.shot_bucket_resolution) {
            // One shot can only hit one player
            let Some(&player_id) = hits.choose(&mut self.rng) else {
                continue;
            };
            self.send_server_command(ShotHitPlayerMsg { shot_id, player_id }.into());
        }
    }

    fn expire_collectable_coins(&mut self) {
        let now = self.world.monotonic_ticks;
        let expired: Vec<CoinId> = self
            .world
            .coins
            .values()
            .filter(|coin| coin.created_ago(now) >= COLLECTABLE_COIN_LIFETIME)
            .map(|coin| coin.id)
            .collect();
        for coin_id in expired {
            self.send_server_command(RemoveCollectableCoinMsg { coin_id }.into());
        }
    }

    /// Removes every player whose resync went unacknowledged for too long.
    /// Each player is booted exactly once.
    fn boot_tardy_players(&mut self) {
        let now = self.world.monotonic_ticks;
        let tardy: Vec<PlayerId> = self
            .resync_deadlines
            .iter()
            .filter(|(_, deadline)| now > **deadline)
            .map(|(player_id, _)| *player_id)
            .collect();
        for player_id in tardy {
            self.resync_deadlines.remove(&player_id);
            warn!("Player {} never acknowledged its resync; removing", player_id);
            if let Some(agent_id) = self.agent_for_player(player_id) {
                self.send_to_agent(
                    agent_id,
                    ChatFromServerMsg {
                        text: TARDY_MESSAGE.to_string(),
                        error: true,
                    }
                    .into(),
                );
            }
            self.send_server_command(RemovePlayerMsg { player_id }.into());
        }
    }

    fn player_removed(&mut self, player_id: PlayerId) {
        self.player_ids.release(player_id);
        self.resync_deadlines.remove(&player_id);
        self.approved_upgrades.retain(|(owner, _)| *owner != player_id);
        if let Some(agent_id) = self.agent_for_player(player_id) {
            if let Some(info) = self.agents.get_mut(&agent_id) {
                info.take_player();
            }
            self.send_to_agent(agent_id, SetAgentPlayerMsg { player_id: None }.into());
        }
        info!("Player {} left the game", player_id);
    }

    // ---------------------------------------------------------------------
    // Ticking

    /// Runs one server tick. Returns false when the tick was skipped
    /// because the world is loading, paused or empty; the caller keeps
    /// scheduling ticks either way.
    pub fn tick(&mut self) -> bool {
        if self.world.loading || self.world.paused || self.world.players.is_empty() {
            return false;
        }

        let tick_id = self.world.last_tick_id.wrapping_add(1);
        self.send_server_command(TickMsg { tick_id }.into());
        self.run_delayed_calls();
        self.regions.tick(&self.world);
        self.world_tick_done();
        self.tick_bots();
        self.tick_level();

        if self.world.monotonic_ticks % self.config.delay_update_interval.max(1) == 0 {
            for info in self.agents.values_mut() {
                info.update_delays();
            }
        }
        true
    }

    fn run_delayed_calls(&mut self) {
        for call in self.delayed_calls.take_due(self.world.monotonic_ticks) {
            if let Err(e) = call(self) {
                error!("Delayed call failed: {}", e);
            }
        }
    }

    /// Schedules `call` to run after `ticks` more ticks.
    pub fn call_later(&mut self, ticks: u64, call: DelayedCall) -> DelayedCallId {
        self.delayed_calls.schedule(self.world.monotonic_ticks + ticks, call)
    }

    pub fn cancel_call(&mut self, id: DelayedCallId) -> bool {
        self.delayed_calls.cancel(id)
    }

    /// Collectable pickups, then each agent's delayed requests.
    fn world_tick_done(&mut self) {
        self.collect_coins();
        self.catch_trosball();

        let agent_ids: Vec<AgentId> = self.agents.keys().copied().collect();
        for agent_id in agent_ids {
            let Some(info) = self.agents.get_mut(&agent_id) else {
                continue;
            };
            let player_static = info
                .player_id
                .and_then(|id| self.world.players.get(&id))
                .map_or(false, Player::is_static);
            let actions = info.tick(player_static);
            self.run_agent_actions(agent_id, actions);
        }
    }

    fn collect_coins(&mut self) {
        let reach = PLAYER_RADIUS + COIN_RADIUS;
        let mut collected = Vec::new();
        for coin in self.world.coins.values() {
            let collector = self
                .world
                .players
                .values()
                .find(|p| !p.dead && p.pos().distance(&coin.pos) <= reach);
            if let Some(player) = collector {
                collected.push((coin.id, player.id));
            }
        }
        for (coin_id, player_id) in collected {
            self.send_server_command(
                AwardPlayerCoinMsg {
                    player_id,
                    count: COLLECTABLE_COIN_VALUE,
                }
                .into(),
            );
            self.send_server_command(RemoveCollectableCoinMsg { coin_id }.into());
        }
    }

    fn catch_trosball(&mut self) {
        let Some(ball) = self.world.trosball.as_ref() else {
            return;
        };
        let shared::world::units::TrosballState::Free { pos, .. } = ball.state else {
            return;
        };
        let catcher = self
            .world
            .players
            .values()
            .find(|p| !p.dead && p.throw_cooldown == 0 && p.pos().distance(&pos) <= TROSBALL_CATCH_RADIUS)
            .map(|p| p.id);
        if let Some(player_id) = catcher {
            debug!("Player {} caught the trosball", player_id);
            self.send_server_command(PlayerHasTrosballMsg { player_id: Some(player_id) }.into());
        }
    }

    fn tick_bots(&mut self) {
        let bot_ids: Vec<AgentId> = self.bots.keys().copied().collect();
        for agent_id in bot_ids {
            let resyncing = self
                .player_for_agent(agent_id)
                .map_or(false, |player_id| self.is_resyncing(player_id));
            let requests = match self.bots.get_mut(&agent_id) {
                Some(bot) => bot.tick(&self.world, resyncing),
                None => continue,
            };
            for request in requests {
                self.receive_from_agent(agent_id, request);
            }
        }
    }

    fn tick_level(&mut self) {
        let Some(mut level) = self.level.take() else {
            return;
        };
        let change = level.tick(self);
        self.level = Some(level);
        if let Some(change) = change {
            self.start_level(change.into_level());
        }
    }

    /// Tears down the running level, if any, and starts `level`.
    pub fn start_level(&mut self, mut level: Box<dyn Level>) {
        if let Some(mut old) = self.level.take() {
            info!("Ending level {}", old.name());
            old.tear_down(self);
            self.regions.clear();
        }
        info!("Starting level {}", level.name());
        level.setup_map(self);
        level.start(self);
        self.level = Some(level);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.send_server_command(PauseGameMsg { paused }.into());
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.send_server_command(WorldLoadingMsg { loading }.into());
    }

    // ---------------------------------------------------------------------
    // Agents

    /// Registers a newly connected agent and sends it the world snapshot.
    pub fn add_agent(&mut self) -> AgentId {
        let agent_id = self.allocate_agent_id();
        self.agents.insert(agent_id, AgentInfo::new(agent_id, &self.config));
        match self.world.dump_everything().to_blob() {
            Ok(settings) => self.send_to_agent(
                agent_id,
                InitClientMsg {
                    server_version: SERVER_VERSION.to_string(),
                    settings,
                }
                .into(),
            ),
            Err(e) => error!("Could not encode world for agent {}: {}", agent_id, e),
        }
        info!("Agent {} connected", agent_id);
        agent_id
    }

    /// Adds an in-process bot and asks for it to join.
    pub fn add_bot(&mut self, nick: &str, team: Option<TeamId>) -> AgentId {
        let agent_id = self.allocate_agent_id();
        self.agents.insert(agent_id, AgentInfo::for_bot(agent_id, &self.config));
        self.bots.insert(agent_id, Bot::new(agent_id));
        self.receive_from_agent(
            agent_id,
            JoinRequestMsg {
                nick: nick.to_string(),
                team,
                bot: true,
            }
            .into(),
        );
        agent_id
    }

    fn allocate_agent_id(&mut self) -> AgentId {
        let agent_id = self.next_agent_id;
        self.next_agent_id = self.next_agent_id.wrapping_add(1).max(1);
        agent_id
    }

    /// Forgets an agent and removes its player from the world.
    pub fn detach_agent(&mut self, agent_id: AgentId) {
        let Some(mut info) = self.agents.remove(&agent_id) else {
            return;
        };
        self.bots.remove(&agent_id);
        if let Some(player_id) = info.take_player() {
            self.send_server_command(RemovePlayerMsg { player_id }.into());
        }
        info!("Agent {} detached", agent_id);
    }

    /// Entry point for everything an agent sends. Timestamped requests are
    /// held back according to the agent's adopted delay.
    pub fn receive_from_agent(&mut self, agent_id: AgentId, msg: Message) {
        if !msg.role().is_request() {
            warn!("Agent {} sent {}, which is not a request", agent_id, msg.kind().name());
            return;
        }
        let last_tick_id = self.world.last_tick_id;
        let Some(info) = self.agents.get_mut(&agent_id) else {
            debug!("Dropping {} from unknown agent {}", msg.kind().name(), agent_id);
            return;
        };
        let actions = info.request_from_agent(msg, last_tick_id);
        self.run_agent_actions(agent_id, actions);
    }

    fn run_agent_actions(&mut self, agent_id: AgentId, actions: Vec<AgentAction>) {
        for action in actions {
            match action {
                AgentAction::Dispatch(msg) => {
                    if let Err(e) = self.handle_request(agent_id, msg) {
                        warn!("Request from agent {} failed: {}", agent_id, e);
                    }
                }
                AgentAction::Resync { measured_delay } => {
                    if let Some(player_id) = self.player_for_agent(agent_id) {
                        self.send_to_agent(
                            agent_id,
                            ChatFromServerMsg {
                                text: format!("Your latency rose to {} ticks; resyncing.", measured_delay),
                                error: false,
                            }
                            .into(),
                        );
                        self.begin_resync(player_id);
                    }
                }
                AgentAction::DelayUpdated(delay) => self.send_to_agent(agent_id, DelayUpdatedMsg { delay }.into()),
            }
        }
    }

    /// Validates and acts on one request once its delay has elapsed.
    pub fn handle_request(&mut self, agent_id: AgentId, msg: Message) -> Result<(), GameError> {
        if !self.agents.contains_key(&agent_id) {
            return Err(GameError::UnknownAgent(agent_id));
        }
        if let Some(claimed) = msg.acting_player() {
            if self.player_for_agent(agent_id) != Some(claimed) {
                debug!(
                    "Agent {} sent {} for player {} it does not control",
                    agent_id,
                    msg.kind().name(),
                    claimed
                );
                if let Message::BuyUpgrade(m) = &msg {
                    self.send_to_agent(
                        agent_id,
                        CannotBuyUpgradeMsg {
                            upgrade: m.upgrade,
                            reason: ReasonCode::Unauthorised,
                        }
                        .into(),
                    );
                }
                return Ok(());
            }
        }

        match msg {
            Message::JoinRequest(m) => self.join_request(agent_id, m),
            Message::ConnectionLost(_) => self.detach_agent(agent_id),
            Message::RespawnRequest(m) => match self.world.check_respawn(m.player_id) {
                Ok(zone_id) => self.send_server_command(
                    RespawnMsg {
                        player_id: m.player_id,
                        zone_id,
                    }
                    .into(),
                ),
                Err(reason) => self.send_to_agent(agent_id, CannotRespawnMsg { reason }.into()),
            },
            Message::UpdatePlayerState(_) | Message::AimPlayerAt(_) | Message::Chat(_) => {
                self.send_server_command(msg)
            }
            Message::Shoot(m) => self.shoot(m)?,
            Message::ResyncAcknowledged(m) => {
                if self.resync_deadlines.remove(&m.player_id).is_some() {
                    debug!("Player {} acknowledged resync", m.player_id);
                }
            }
            Message::CheckSync(m) => self.check_sync(m)?,
            Message::BuyUpgrade(m) => self.buy_upgrade(agent_id, m),
            Message::PlayerHasUpgrade(m) => {
                if self.approved_upgrades.remove(&(m.player_id, m.upgrade)) {
                    self.send_server_command(m.into());
                } else {
                    debug!("Player {} used {:?} without approval", m.player_id, m.upgrade);
                }
            }
            Message::ThrowTrosball(m) => self.throw_trosball(m.player_id)?,
            other => debug!("Ignoring {} from agent {}", other.kind().name(), agent_id),
        }
        Ok(())
    }

    fn join_request(&mut self, agent_id: AgentId, msg: JoinRequestMsg) {
        if let Some(player_id) = self.player_for_agent(agent_id) {
            debug!("Agent {} already controls player {}", agent_id, player_id);
            return;
        }

        let level = self.level.take();
        let team = match &level {
            Some(level) => level.team_to_join(self, msg.team, msg.bot),
            None => level::preferred_team_otherwise_smallest(self, msg.team),
        };
        let refusal = match &level {
            Some(level) => level.find_reason_player_cannot_join(self, team, msg.bot),
            None => level::default_reason_player_cannot_join(self, team),
        };
        self.level = level;

        if let Some(reason) = refusal {
            info!("Agent {} cannot join: {}", agent_id, reason.message());
            self.send_to_agent(agent_id, CannotJoinMsg { reason }.into());
            return;
        }
        let Some(player_id) = self.player_ids.allocate() else {
            self.send_to_agent(
                agent_id,
                CannotJoinMsg {
                    reason: ReasonCode::GameFull,
                }
                .into(),
            );
            return;
        };

        // An empty map has no zones; the world then places players centrally
        let zone_id = self.world.select_zone_for_team(team).unwrap_or_default();
        let nick = clean_nick(&msg.nick);
        info!("{} joined as player {} on team {:?}", nick, player_id, team);
        self.send_server_command(
            AddPlayerMsg {
                player_id,
                nick,
                team,
                zone_id,
                dead: false,
                bot: msg.bot,
            }
            .into(),
        );
        if let Some(info) = self.agents.get_mut(&agent_id) {
            info.give_player(player_id);
        }
        self.send_to_agent(
            agent_id,
            SetAgentPlayerMsg {
                player_id: Some(player_id),
            }
            .into(),
        );
        self.begin_resync(player_id);
    }

    fn shoot(&mut self, msg: ShootMsg) -> Result<(), GameError> {
        let player = self.world.player(msg.player_id).ok_or(GameError::UnknownPlayer(msg.player_id))?;
        if player.dead {
            debug!("Dead player {} tried to shoot", msg.player_id);
            return Ok(());
        }
        let kind = if player.is_turret() {
            ShotKind::Turret
        } else if player.items.has(UpgradeKind::Ricochet) {
            ShotKind::Ricochet
        } else {
            ShotKind::Normal
        };
        let pos = player.pos();
        let vel = Vector2::from_angle(player.motion.angle).scale(self.world.physics.shot_speed);

        let taken = &self.world.shots;
        let Some(shot_id) = self.shot_ids.next_free(|id| taken.contains_key(&id)) else {
            warn!("No free shot ids");
            return Ok(());
        };
        self.send_server_command(
            ShotFiredMsg {
                player_id: msg.player_id,
                shot_id,
                local_id: msg.local_id,
                pos,
                vel,
                kind,
            }
            .into(),
        );
        Ok(())
    }

    fn check_sync(&mut self, msg: CheckSyncMsg) -> Result<(), GameError> {
        let player = self.world.player(msg.player_id).ok_or(GameError::UnknownPlayer(msg.player_id))?;
        if self.is_resyncing(msg.player_id) {
            return Ok(());
        }
        let error = player.pos().distance(&msg.pos);
        if error > SYNC_TOLERANCE {
            debug!("Player {} is {:.1} units out of sync", msg.player_id, error);
            self.begin_resync(msg.player_id);
        }
        Ok(())
    }

    fn buy_upgrade(&mut self, agent_id: AgentId, msg: BuyUpgradeMsg) {
        match self.validate_purchase(msg.player_id, msg.upgrade) {
            Ok(cost) => {
                self.send_server_command(
                    PlayerCoinsSpentMsg {
                        player_id: msg.player_id,
                        count: cost,
                    }
                    .into(),
                );
                self.approved_upgrades.insert((msg.player_id, msg.upgrade));
                self.send_to_agent(agent_id, UpgradeApprovedMsg { upgrade: msg.upgrade }.into());
            }
            Err(reason) => {
                debug!("Player {} cannot buy {:?}: {:?}", msg.player_id, msg.upgrade, reason);
                self.send_to_agent(
                    agent_id,
                    CannotBuyUpgradeMsg {
                        upgrade: msg.upgrade,
                        reason,
                    }
                    .into(),
                );
            }
        }
    }

    /// The cost to charge for the purchase, or why it is refused.
    pub fn validate_purchase(&self, player_id: PlayerId, kind: UpgradeKind) -> Result<u32, ReasonCode> {
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
        if kind == UpgradeKind::Turret {
            self.check_turret_placement(player)?;
        }
        Ok(spec.cost)
    }

    fn check_turret_placement(&self, player: &Player) -> Result<(), ReasonCode> {
        let zone = self
            .world
            .player_zone(player.id)
            .and_then(|id| self.world.zone(id))
            .ok_or(ReasonCode::NotInDarkZone)?;
        if zone.owner != player.team || !zone.dark {
            return Err(ReasonCode::NotInDarkZone);
        }
        let occupied = zone
            .players
            .iter()
            .filter_map(|id| self.world.player(*id))
            .any(|other| !other.dead && other.is_turret());
        if occupied {
            return Err(ReasonCode::AlreadyTurret);
        }
        let pos = player.pos();
        let side_distance = (pos.x - zone.rect.left).min(zone.rect.right() - pos.x);
        if side_distance < TURRET_EDGE_MARGIN {
            return Err(ReasonCode::TooCloseToEdge);
        }
        if zone.orb_pos().distance(&pos) < TURRET_ORB_MARGIN {
            return Err(ReasonCode::TooCloseToOrb);
        }
        Ok(())
    }

    fn throw_trosball(&mut self, player_id: PlayerId) -> Result<(), GameError> {
        let holder = self.world.trosball.as_ref().and_then(|ball| ball.holder());
        if holder != Some(player_id) {
            debug!("Player {} tried to throw a ball it is not holding", player_id);
            return Ok(());
        }
        let player = self.world.player(player_id).ok_or(GameError::UnknownPlayer(player_id))?;
        let pos = player.pos();
        let vel = Vector2::from_angle(player.motion.angle)
            .scale(TROSBALL_THROW_SPEED)
            .add(&player.motion.vel);
        self.send_server_command(PlayerHasTrosballMsg { player_id: None }.into());
        self.send_server_command(TrosballPositionMsg { pos, vel }.into());
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Resyncing

    /// Pushes the server's view of a player to everyone and waits for the
    /// owning agent to acknowledge it.
    pub fn begin_resync(&mut self, player_id: PlayerId) {
        let Some(motion) = self.world.player(player_id).map(|p| p.motion) else {
            return;
        };
        self.resync_deadlines
            .insert(player_id, self.world.monotonic_ticks + self.config.resync_expiry);
        self.send_server_command(ResyncPlayerMsg { player_id, motion }.into());
    }

    fn mark_all_resyncing(&mut self) {
        let deadline = self.world.monotonic_ticks + self.config.resync_expiry;
        let players: Vec<PlayerId> = self.world.players.keys().copied().collect();
        for player_id in players {
            self.resync_deadlines.insert(player_id, deadline);
        }
    }

    /// Resends the whole world to everyone, e.g. after a bulk change. Every
    /// player must acknowledge as after a resync.
    pub fn sync_everything(&mut self) -> Result<(), GameError> {
        let msg = self.world.reset_message()?;
        self.mark_all_resyncing();
        self.send_server_command(msg);
        Ok(())
    }

    /// Swaps in a new map, returning every player alive to its team's best
    /// spawn zone, and resets everyone.
    pub fn reset_map(&mut self, layout: MapLayout) -> Result<(), GameError> {
        let mut fresh = World::new(WorldRole::Server, layout.clone(), self.world.layouts.clone());
        set_initial_darkness(&mut fresh);

        let mut snapshot: WorldSnapshot = self.world.dump_everything();
        snapshot.world_map = layout;
        snapshot.zones = fresh.zones.values().map(ZoneRecord::from).collect();
        snapshot.shots.clear();
        snapshot.coins.clear();
        snapshot.grenades.clear();
        snapshot.trosball = None;
        for team in snapshot.teams.iter_mut() {
            team.score = 0;
        }
        let centre = fresh.map_size().scale(0.5);
        for player in snapshot.players.iter_mut() {
            let pos = fresh
                .select_zone_for_team(player.team)
                .and_then(|id| fresh.zone(id))
                .map_or(centre, |zone| zone.orb_pos());
            player.respawn(pos);
            player.items.clear();
            player.motion = PlayerMotion {
                pos,
                ..PlayerMotion::default()
            };
        }

        let msg = WorldResetMsg {
            settings: snapshot.to_blob()?,
        }
        .into();
        self.mark_all_resyncing();
        self.send_server_command(msg);
        Ok(())
    }
}

/// Darkness is normally maintained as zones change hands; a freshly built
/// map needs it computed once.
fn set_initial_darkness(world: &mut World) {
    let dark: Vec<(ZoneId, bool)> = world.zones.keys().map(|id| (*id, world.should_be_dark(*id))).collect();
    for (zone_id, dark) in dark {
        if let Some(zone) = world.zones.get_mut(&zone_id) {
            zone.dark = dark;
        }
    }
}

fn clean_nick(nick: &str) -> String {
    let nick: String = nick.trim().chars().filter(|c| !c.is_control()).take(MAX_NICK_LEN).collect();
    if nick.is_empty() {
        "Player".to_string()
    } else {
        nick
    }
}
