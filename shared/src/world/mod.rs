//! The world model shared by the server and every client mirror.
//!
//! A [`World`] only changes through [`World::apply`], which consumes server
//! commands. Applying the same command sequence to two worlds restored from
//! the same snapshot always produces the same state: every collection is
//! ordered and nothing reads wall-clock time. Server-only follow-ups (coins
//! to drop, zones whose darkness must be recomputed) are queued as
//! [`WorldEffect`]s for the server game to act on.

pub mod clock;
pub mod items;
pub mod layout;
pub mod options;
pub mod physics;
pub mod player;
pub mod snapshot;
pub mod team;
pub mod units;
pub mod zone;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::event::Event;
use crate::messages::*;
use clock::Clock;
use items::{UpgradeKind, UpgradeTable};
use layout::{LayoutDatabase, MapLayout};
use log::{debug, warn};
use options::{Abilities, ScoreBoard, UiOptions};
use physics::{GameMode, PhysicsParams, Vector2};
use player::Player;
use std::collections::BTreeMap;
use team::{Team, TeamId};
use units::{CollectableCoin, Grenade, Shot, Trosball, TrosballState};
use zone::{capture_eligible, Zone, ZoneCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldRole {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTagged {
    pub zone_id: ZoneId,
    pub player_id: Option<PlayerId>,
    pub previous_owner: Option<TeamId>,
    pub new_owner: Option<TeamId>,
}

/// Fired after a player has left the world. The player's own id has
/// already been cleared, so listeners must use `old_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRemoved {
    pub old_id: PlayerId,
    pub player: Player,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerKilled {
    pub target: PlayerId,
    pub killer: Option<PlayerId>,
}

/// Follow-up work the authoritative game must turn into commands.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEffect {
    PlayerDied {
        victim: PlayerId,
        killer: Option<PlayerId>,
        pos: Vector2,
    },
    ZoneTagged {
        zone_id: ZoneId,
        player_id: Option<PlayerId>,
        team: Option<TeamId>,
    },
    GrenadeExploded {
        owner: PlayerId,
        pos: Vector2,
    },
}

#[derive(Debug, Default)]
pub struct WorldEvents {
    pub on_reset: Event<()>,
    pub on_tick: Event<TickId>,
    pub on_units_advanced: Event<()>,
    pub on_player_added: Event<PlayerId>,
    pub on_player_removed: Event<PlayerRemoved>,
    pub on_player_killed: Event<PlayerKilled>,
    pub on_player_respawned: Event<PlayerId>,
    pub on_zone_tagged: Event<ZoneTagged>,
    pub on_team_score_changed: Event<()>,
    pub on_shot_removed: Event<ShotId>,
    pub on_upgrade_used: Event<(PlayerId, UpgradeKind)>,
    pub on_chat: Event<ChatMsg>,
    pub on_achievement: Event<AchievementUnlockedMsg>,
    pub on_sound: Event<String>,
}

#[derive(Debug)]
pub struct World {
    pub role: WorldRole,
    pub loading: bool,
    pub paused: bool,
    pub teams: [Team; 2],
    pub layout: MapLayout,
    pub layouts: LayoutDatabase,
    pub zones: BTreeMap<ZoneId, Zone>,
    pub players: BTreeMap<PlayerId, Player>,
    pub shots: BTreeMap<ShotId, Shot>,
    pub grenades: Vec<Grenade>,
    pub coins: BTreeMap<CoinId, CollectableCoin>,
    pub trosball: Option<Trosball>,
    pub elephant: Option<PlayerId>,
    pub upgrades: UpgradeTable,
    pub mode: GameMode,
    pub speed: f32,
    pub physics: PhysicsParams,
    pub clock: Clock,
    pub scoreboard: ScoreBoard,
    pub ui_options: UiOptions,
    pub abilities: Abilities,
    pub last_tick_id: TickId,
    /// Strictly increasing count of ticks received; never wraps
    pub monotonic_ticks: u64,
    pub events: WorldEvents,
    effects: Vec<WorldEffect>,
}

impl World {
    pub fn new(role: WorldRole, layout: MapLayout, layouts: LayoutDatabase) -> Self {
        let mut world = Self {
            role,
            loading: false,
            paused: false,
            teams: [Team::new(TeamId::A), Team::new(TeamId::B)],
            layout: layout.clone(),
            layouts,
            zones: BTreeMap::new(),
            players: BTreeMap::new(),
            shots: BTreeMap::new(),
            grenades: Vec::new(),
            coins: BTreeMap::new(),
            trosball: None,
            elephant: None,
            upgrades: UpgradeTable::default(),
            mode: GameMode::Normal,
            speed: 1.0,
            physics: PhysicsParams::default(),
            clock: Clock::default(),
            scoreboard: ScoreBoard::default(),
            ui_options: UiOptions::default(),
            abilities: Abilities::default(),
            last_tick_id: 0,
            monotonic_ticks: 0,
            events: WorldEvents::default(),
            effects: Vec::new(),
        };
        world.load_layout(layout);
        world
    }

    /// An empty world on the default lobby map.
    pub fn lobby(role: WorldRole) -> Self {
        Self::new(role, MapLayout::lobby(3), LayoutDatabase::default())
    }

    pub(crate) fn load_layout(&mut self, layout: MapLayout) {
        self.zones = layout
            .build_zones()
            .into_iter()
            .map(|zone| (zone.id, zone))
            .collect();
        self.layout = layout;
        self.recount_team_zones();
    }

    fn recount_team_zones(&mut self) {
        for team in self.teams.iter_mut() {
            team.num_zones_owned = 0;
        }
        for zone in self.zones.values() {
            if let Some(owner) = zone.owner {
                self.teams[owner.index()].num_zones_owned += 1;
            }
        }
    }

    pub fn is_server(&self) -> bool {
        self.role == WorldRole::Server
    }

    pub fn map_size(&self) -> Vector2 {
        self.layout.size()
    }

    pub fn team(&self, id: TeamId) -> &Team {
        &self.teams[id.index()]
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn player_zone(&self, id: PlayerId) -> Option<ZoneId> {
        self.players.get(&id).and_then(|p| self.layout.zone_at(&p.pos()))
    }

    pub fn team_player_count(&self, team: TeamId) -> usize {
        self.players.values().filter(|p| p.team == Some(team)).count()
    }

    /// Drains the server follow-ups queued since the last call.
    pub fn take_effects(&mut self) -> Vec<WorldEffect> {
        std::mem::take(&mut self.effects)
    }

    fn push_effect(&mut self, effect: WorldEffect) {
        if self.is_server() {
            self.effects.push(effect);
        }
    }

    /// Applies one message. Requests and agent notices are ignored; only
    /// commands change the world.
    pub fn apply(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        match msg {
            Message::Tick(m) => self.tick_received(m.tick_id),
            Message::WorldReset(m) => {
                let snapshot = snapshot::WorldSnapshot::from_blob(&m.settings)?;
                self.restore_everything(snapshot)?;
            }
            Message::WorldLoading(m) => self.loading = m.loading,
            Message::PauseGame(m) => self.paused = m.paused,
            Message::SetGameMode(m) => {
                self.mode = m.mode;
                self.physics = m.mode.physics();
            }
            Message::SetGameSpeed(m) => self.speed = m.speed,
            Message::AddPlayer(m) => self.add_player(m),
            Message::RemovePlayer(m) => {
                self.del_player(m.player_id);
            }
            Message::Respawn(m) => self.respawn_player(m.player_id, m.zone_id),
            Message::TaggingZone(m) => self.zone_tagged(m.zone_id, m.player_id),
            Message::ZoneState(m) => self.set_zone_state(m),
            Message::PlayerUpdateState(m) => self.set_motion(m.player_id, m.motion),
            Message::ResyncPlayer(m) => self.set_motion(m.player_id, m.motion),
            Message::UpdatePlayerState(m) => {
                if let Some(player) = self.players.get_mut(&m.player_id) {
                    player.motion.keys.set(m.key, m.value);
                }
            }
            Message::AimPlayerAt(m) => {
                if let Some(player) = self.players.get_mut(&m.player_id) {
                    player.motion.angle = m.angle;
                }
            }
            Message::ShotFired(m) => self.shot_fired(m),
            Message::ShotHitPlayer(m) => self.shot_hit_player(m.shot_id, m.player_id),
            Message::GrenadeHitPlayer(m) => self.damage_player(m.player_id, Some(m.thrower_id)),
            Message::PlayerKilled(m) => self.kill_player(m.target_id, m.killer_id),
            Message::SetWorldAbilities(m) => self.abilities.apply(&m.patch),
            Message::SetUiOptions(m) => self.ui_options.apply(&m.patch),
            Message::UpdateClockState(m) => self.clock.set_state(m.clock),
            Message::UpdateScoreBoardMode(m) => self.scoreboard.set_mode(m.teams, m.players),
            Message::SetTeamScore(m) => {
                self.scoreboard.team_scores.insert(m.team, m.score);
            }
            Message::SetPlayerScore(m) => {
                self.scoreboard.player_scores.insert(m.player_id, m.score);
            }
            Message::PlayerHasUpgrade(m) => self.activate_upgrade(m.player_id, m.upgrade),
            Message::UpgradeChanged(m) => self.upgrades.update(m.upgrade, m.cost, m.time_limit, m.enabled),
            Message::PlayerCoinsSpent(m) => {
                if let Some(player) = self.players.get_mut(&m.player_id) {
                    player.coins = player.coins.saturating_sub(m.count);
                }
            }
            Message::AwardPlayerCoin(m) => {
                if let Some(player) = self.players.get_mut(&m.player_id) {
                    player.coins = player.coins.saturating_add(m.count);
                }
            }
            Message::SetPlayerCoins(m) => {
                if let Some(player) = self.players.get_mut(&m.player_id) {
                    player.coins = m.value;
                }
            }
            Message::CreateCollectableCoin(m) => {
                self.coins.insert(
                    m.coin_id,
                    CollectableCoin {
                        id: m.coin_id,
                        created_tick: self.monotonic_ticks as i64,
                        pos: m.pos,
                        vel: m.vel,
                    },
                );
            }
            Message::RemoveCollectableCoin(m) => {
                self.coins.remove(&m.coin_id);
            }
            Message::SetTrosballEnabled(m) => {
                self.trosball = m.enabled.then(|| Trosball {
                    state: TrosballState::Free {
                        pos: m.pos,
                        vel: Vector2::ZERO,
                    },
                });
            }
            Message::PlayerHasTrosball(m) => self.give_trosball(m.player_id),
            Message::TrosballPosition(m) => {
                if let Some(ball) = self.trosball.as_mut() {
                    ball.state = TrosballState::Free { pos: m.pos, vel: m.vel };
                }
            }
            Message::PlayerHasElephant(m) => self.elephant = m.player_id,
            Message::Chat(m) => self.events.on_chat.fire(m),
            Message::AchievementUnlocked(m) => self.events.on_achievement.fire(m),
            Message::PlaySound(m) => self.events.on_sound.fire(&m.filename),
            Message::UpdateGameInfo(m) => {
                self.ui_options.user_title = m.title.clone();
                self.ui_options.user_info = m.info.clone();
            }
            other => {
                debug!("World ignoring {}", other.kind().name());
            }
        }
        Ok(())
    }

    /// One tick of simulation, in the fixed order every consumer follows.
    pub fn tick_received(&mut self, tick_id: TickId) {
        self.monotonic_ticks += 1;
        self.clock.tick();
        self.advance_everything();
        self.last_tick_id = tick_id;
        if !self.is_server() {
            // The server fires this itself once collisions are resolved
            self.events.on_units_advanced.fire(&());
        }
        self.events.on_tick.fire(&tick_id);
    }

    fn advance_everything(&mut self) {
        let expired: Vec<ShotId> = self.shots.values().filter(|s| s.expired).map(|s| s.id).collect();
        for shot_id in expired {
            self.shots.remove(&shot_id);
            self.events.on_shot_removed.fire(&shot_id);
        }

        let map_size = self.map_size();
        let (physics, speed) = (self.physics, self.speed);

        for shot in self.shots.values_mut() {
            shot.advance(speed, map_size);
        }
        for player in self.players.values_mut() {
            player.advance(&physics, speed, map_size);
            player.items.tick();
        }

        let mut exploded = Vec::new();
        self.grenades.retain_mut(|grenade| {
            if grenade.advance(&physics, speed, map_size) {
                exploded.push((grenade.player, grenade.pos));
                false
            } else {
                true
            }
        });
        for (owner, pos) in exploded {
            self.push_effect(WorldEffect::GrenadeExploded { owner, pos });
        }

        for coin in self.coins.values_mut() {
            coin.advance(&physics, speed, map_size);
        }
        if let Some(ball) = self.trosball.as_mut() {
            ball.advance(&physics, speed, map_size);
        }

        self.update_zone_inhabitants();
    }

    /// Recomputes which players are in which zone from scratch.
    pub fn update_zone_inhabitants(&mut self) {
        for zone in self.zones.values_mut() {
            zone.players.clear();
        }
        for player in self.players.values() {
            if let Some(zone_id) = self.layout.zone_at(&player.pos()) {
                if let Some(zone) = self.zones.get_mut(&zone_id) {
                    zone.players.insert(player.id);
                }
            }
        }
    }

    /// Fires the advancement-complete event on the server once collisions
    /// for the tick are resolved.
    pub fn fire_units_advanced(&self) {
        self.events.on_units_advanced.fire(&());
    }

    pub fn zone_counts(&self, zone_id: ZoneId) -> ZoneCounts {
        let mut counts = ZoneCounts::default();
        if let Some(zone) = self.zones.get(&zone_id) {
            for player_id in &zone.players {
                if let Some(player) = self.players.get(player_id) {
                    if let (false, Some(team)) = (player.dead, player.team) {
                        counts.add(team);
                    }
                }
            }
        }
        counts
    }

    pub fn adjacent_to_team(&self, zone_id: ZoneId, team: TeamId) -> bool {
        self.zones
            .get(&zone_id)
            .map(|zone| {
                zone.neighbours
                    .iter()
                    .filter_map(|id| self.zones.get(id))
                    .any(|neighbour| neighbour.owner == Some(team))
            })
            .unwrap_or(false)
    }

    /// Whether `team` satisfies the capture rule for `zone_id` right now.
    pub fn can_capture(&self, zone_id: ZoneId, team: TeamId) -> bool {
        match self.zones.get(&zone_id) {
            Some(zone) => capture_eligible(
                zone,
                team,
                &self.zone_counts(zone_id),
                self.adjacent_to_team(zone_id, team),
            ),
            None => false,
        }
    }

    /// A zone is dark when it and every neighbour belong to the same team.
    pub fn should_be_dark(&self, zone_id: ZoneId) -> bool {
        let Some(zone) = self.zones.get(&zone_id) else {
            return false;
        };
        let Some(owner) = zone.owner else {
            return false;
        };
        zone.neighbours
            .iter()
            .filter_map(|id| self.zones.get(id))
            .all(|neighbour| neighbour.owner == Some(owner))
    }

    /// Candidate zones for placing a player of `team`, best tier first:
    /// owned zones bordering the enemy, then owned zones bordering neutral
    /// ground, then any owned zone, then anywhere.
    pub fn spawn_zone_candidates(&self, team: Option<TeamId>) -> Vec<ZoneId> {
        let all: Vec<ZoneId> = self.zones.keys().copied().collect();
        let Some(team) = team else {
            return all;
        };
        let owned: Vec<&Zone> = self.zones.values().filter(|z| z.owner == Some(team)).collect();
        let borders = |zone: &Zone, owner: Option<TeamId>| {
            zone.neighbours
                .iter()
                .filter_map(|id| self.zones.get(id))
                .any(|n| n.owner == owner)
        };
        let tiers = [
            owned.iter().filter(|z| borders(z, Some(team.opponent()))).map(|z| z.id).collect::<Vec<_>>(),
            owned.iter().filter(|z| borders(z, None)).map(|z| z.id).collect(),
            owned.iter().map(|z| z.id).collect(),
        ];
        tiers.into_iter().find(|tier| !tier.is_empty()).unwrap_or(all)
    }

    pub fn select_zone_for_team(&self, team: Option<TeamId>) -> Option<ZoneId> {
        self.spawn_zone_candidates(team).first().copied()
    }

    /// Why `player_id` may not respawn where it is, or the zone it would
    /// respawn in.
    pub fn check_respawn(&self, player_id: PlayerId) -> Result<ZoneId, ReasonCode> {
        let player = self.players.get(&player_id).ok_or(ReasonCode::Unauthorised)?;
        if !player.dead {
            return Err(ReasonCode::AlreadyAlive);
        }
        if !self.abilities.respawn {
            return Err(ReasonCode::GameNotStarted);
        }
        if player.respawn_ticks > 0 {
            return Err(ReasonCode::BePatient);
        }
        let zone_id = self.layout.zone_at(&player.pos()).ok_or(ReasonCode::EnemyZone)?;
        let zone = self.zones.get(&zone_id).ok_or(ReasonCode::EnemyZone)?;
        if zone.frozen {
            return Err(ReasonCode::FrozenZone);
        }
        if player.team.is_some() && zone.owner != player.team {
            return Err(ReasonCode::EnemyZone);
        }
        Ok(zone_id)
    }

    /// Round outcome once a team holds no zones: the other team, or `None`
    /// for a draw when both are empty.
    pub fn winner(&self) -> Option<Option<TeamId>> {
        let a_lost = self.team(TeamId::A).is_loser();
        let b_lost = self.team(TeamId::B).is_loser();
        match (a_lost, b_lost) {
            (true, true) => Some(None),
            (true, false) => Some(Some(TeamId::B)),
            (false, true) => Some(Some(TeamId::A)),
            (false, false) => None,
        }
    }

    fn add_player(&mut self, msg: &AddPlayerMsg) {
        if self.players.contains_key(&msg.player_id) {
            warn!("Player id {} added twice; replacing", msg.player_id);
        }
        let pos = self
            .zones
            .get(&msg.zone_id)
            .map(|zone| zone.orb_pos())
            .unwrap_or_else(|| self.map_size().scale(0.5));
        let mut player = Player::new(msg.player_id, &msg.nick, msg.team, msg.bot, pos);
        if msg.dead {
            player.die();
            player.respawn_ticks = 0;
        }
        self.players.insert(msg.player_id, player);
        self.update_zone_inhabitants();
        self.events.on_player_added.fire(&msg.player_id);
    }

    /// Removes a player, clearing its id before anyone hears about it.
    pub(crate) fn del_player(&mut self, player_id: PlayerId) -> Option<PlayerId> {
        let mut player = self.players.remove(&player_id)?;
        let old_id = player.id;
        player.id = NO_PLAYER;

        for zone in self.zones.values_mut() {
            zone.players.remove(&old_id);
        }
        self.scoreboard.forget_player(old_id);
        if self.elephant == Some(old_id) {
            self.elephant = None;
        }
        if let Some(ball) = self.trosball.as_mut() {
            if ball.holder() == Some(old_id) {
                ball.state = TrosballState::Free {
                    pos: player.pos(),
                    vel: Vector2::ZERO,
                };
            }
        }
        self.events.on_player_removed.fire(&PlayerRemoved { old_id, player });
        Some(old_id)
    }

    fn respawn_player(&mut self, player_id: PlayerId, zone_id: ZoneId) {
        let Some(pos) = self.zones.get(&zone_id).map(|zone| zone.orb_pos()) else {
            warn!("Respawn into unknown zone {}", zone_id);
            return;
        };
        if let Some(player) = self.players.get_mut(&player_id) {
            player.respawn(pos);
            self.events.on_player_respawned.fire(&player_id);
        }
    }

    fn set_motion(&mut self, player_id: PlayerId, motion: player::PlayerMotion) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.motion = motion;
        }
    }

    fn zone_tagged(&mut self, zone_id: ZoneId, player_id: Option<PlayerId>) {
        let team = player_id.and_then(|id| self.players.get(&id)).and_then(|p| p.team);
        let Some(zone) = self.zones.get_mut(&zone_id) else {
            warn!("Tag of unknown zone {}", zone_id);
            return;
        };
        if zone.owner == team {
            return;
        }
        let previous_owner = zone.tag(team);
        let occupants: Vec<PlayerId> = zone.players.iter().copied().collect();

        let turrets: Vec<PlayerId> = occupants
            .into_iter()
            .filter(|id| {
                self.players
                    .get(id)
                    .map(|p| p.is_turret() && !p.dead && p.team != team)
                    .unwrap_or(false)
            })
            .collect();
        for turret in turrets {
            self.kill_player(turret, player_id);
        }

        if let Some(previous) = previous_owner {
            self.teams[previous.index()].num_zones_owned -= 1;
            self.teams[previous.opponent().index()].score += 1;
        }
        if let Some(gainer) = team {
            self.teams[gainer.index()].num_zones_owned += 1;
            self.teams[gainer.index()].score += 1;
        }
        self.events.on_team_score_changed.fire(&());

        self.push_effect(WorldEffect::ZoneTagged {
            zone_id,
            player_id,
            team,
        });
        self.events.on_zone_tagged.fire(&ZoneTagged {
            zone_id,
            player_id,
            previous_owner,
            new_owner: team,
        });
    }

    fn set_zone_state(&mut self, msg: &ZoneStateMsg) {
        let Some(zone) = self.zones.get_mut(&msg.zone_id) else {
            return;
        };
        zone.owner = msg.owner;
        zone.dark = msg.dark;
        zone.frozen = msg.frozen;
        self.recount_team_zones();
    }

    fn shot_fired(&mut self, msg: &ShotFiredMsg) {
        let team = self.players.get(&msg.player_id).and_then(|p| p.team);
        self.shots.insert(
            msg.shot_id,
            Shot {
                id: msg.shot_id,
                team,
                shooter: msg.player_id,
                pos: msg.pos,
                vel: msg.vel,
                time_left: SHOT_LIFETIME,
                kind: msg.kind,
                expired: false,
            },
        );
    }

    fn shot_hit_player(&mut self, shot_id: ShotId, target: PlayerId) {
        let shooter = self.shots.remove(&shot_id).map(|shot| shot.shooter);
        if shooter.is_some() {
            self.events.on_shot_removed.fire(&shot_id);
        }
        self.damage_player(target, shooter);
    }

    /// A shield soaks up one hit; otherwise the hit costs health.
    fn damage_player(&mut self, target: PlayerId, attacker: Option<PlayerId>) {
        let Some(player) = self.players.get_mut(&target) else {
            return;
        };
        if let Some(shield) = player.items.get_mut(UpgradeKind::Shield) {
            shield.charges = shield.charges.saturating_sub(1);
            if shield.charges == 0 {
                player.items.remove(UpgradeKind::Shield);
            }
            return;
        }
        player.health = player.health.saturating_sub(1);
        if player.health == 0 {
            self.kill_player(target, attacker);
        }
    }

    fn kill_player(&mut self, target: PlayerId, killer: Option<PlayerId>) {
        let Some(player) = self.players.get_mut(&target) else {
            return;
        };
        if player.dead {
            return;
        }
        player.die();
        let pos = player.pos();
        if let Some(ball) = self.trosball.as_mut() {
            if ball.holder() == Some(target) {
                ball.state = TrosballState::Free { pos, vel: Vector2::ZERO };
            }
        }
        self.push_effect(WorldEffect::PlayerDied {
            victim: target,
            killer,
            pos,
        });
        self.events.on_player_killed.fire(&PlayerKilled { target, killer });
    }

    fn activate_upgrade(&mut self, player_id: PlayerId, kind: UpgradeKind) {
        let Some(spec) = self.upgrades.get(kind).cloned() else {
            return;
        };
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if kind == UpgradeKind::Grenade {
            let vel = Vector2::from_angle(player.motion.angle).scale(600.0);
            self.grenades.push(Grenade {
                player: player_id,
                pos: player.pos(),
                vel,
                time_left: GRENADE_FUSE,
            });
        } else {
            player.items.activate(&spec);
        }
        self.events.on_upgrade_used.fire(&(player_id, kind));
    }

    fn give_trosball(&mut self, player_id: Option<PlayerId>) {
        let holder = self.trosball.as_ref().and_then(|ball| ball.holder());
        let holder_pos = holder.and_then(|id| self.players.get(&id)).map(|p| p.pos());
        let Some(ball) = self.trosball.as_mut() else {
            return;
        };
        match player_id {
            Some(player) => {
                ball.state = TrosballState::Held {
                    player,
                    catch_ticks_ago: 0,
                }
            }
            None => {
                let pos = match (&ball.state, holder_pos) {
                    (TrosballState::Free { pos, .. }, _) => *pos,
                    (_, Some(pos)) => pos,
                    _ => Vector2::ZERO,
                };
                ball.state = TrosballState::Free { pos, vel: Vector2::ZERO };
            }
        }
        // Whoever just let go may not catch it again straight away
        if player_id.is_none() {
            if let Some(player) = holder.and_then(|id| self.players.get_mut(&id)) {
                player.throw_cooldown = TROSBALL_THROW_COOLDOWN;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use player::PlayerKey;
    use std::sync::{Arc, Mutex};

    fn add(world: &mut World, id: PlayerId, team: TeamId, zone_id: ZoneId) {
        world
            .apply(
                &AddPlayerMsg {
                    player_id: id,
                    nick: format!("p{}", id),
                    team: Some(team),
                    zone_id,
                    dead: false,
                    bot: false,
                }
                .into(),
            )
            .unwrap();
    }

    fn tag(zone_id: ZoneId, player_id: Option<PlayerId>) -> Message {
        TaggingZoneMsg { zone_id, player_id }.into()
    }

    #[test]
    fn test_basic_tag_of_neutral_zone() {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(3, 1), LayoutDatabase::default());
        assert_eq!(world.zone(2).unwrap().owner, None);
        add(&mut world, 1, TeamId::A, 2);
        add(&mut world, 2, TeamId::A, 2);
        assert!(world.can_capture(2, TeamId::A));

        let tagged = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&tagged);
        world.events.on_zone_tagged.add_listener(move |e| sink.lock().unwrap().push(e.clone()));

        world.apply(&tag(2, Some(1))).unwrap();

        let zone = world.zone(2).unwrap();
        assert_eq!(zone.owner, Some(TeamId::A));
        assert!(!zone.dark);
        let tagged = tagged.lock().unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].previous_owner, None);
        assert_eq!(tagged[0].player_id, Some(1));
    }

    #[test]
    fn test_repeated_tag_changes_state_once() {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(3, 1), LayoutDatabase::default());
        add(&mut world, 1, TeamId::A, 2);

        world.apply(&tag(2, Some(1))).unwrap();
        let score = world.team(TeamId::A).score;
        let zones = world.team(TeamId::A).num_zones_owned;
        world.apply(&tag(2, Some(1))).unwrap();

        assert_eq!(world.team(TeamId::A).score, score);
        assert_eq!(world.team(TeamId::A).num_zones_owned, zones);
        assert_eq!(world.take_effects().len(), 1);
    }

    #[test]
    fn test_taking_enemy_zone_scores_for_both_sides_of_the_swap() {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(2, 1), LayoutDatabase::default());
        add(&mut world, 1, TeamId::A, 1);
        assert_eq!(world.team(TeamId::B).num_zones_owned, 1);

        world.apply(&tag(2, Some(1))).unwrap();

        assert_eq!(world.team(TeamId::A).num_zones_owned, 2);
        assert_eq!(world.team(TeamId::B).num_zones_owned, 0);
        assert_eq!(world.team(TeamId::A).score, 2);
        assert_eq!(world.winner(), Some(Some(TeamId::A)));
    }

    #[test]
    fn test_tag_kills_defending_turret() {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(2, 1), LayoutDatabase::default());
        add(&mut world, 1, TeamId::A, 1);
        add(&mut world, 2, TeamId::B, 2);
        world
            .apply(
                &PlayerHasUpgradeMsg {
                    player_id: 2,
                    upgrade: UpgradeKind::Turret,
                    tick_id: 0,
                }
                .into(),
            )
            .unwrap();
        assert!(world.player(2).unwrap().is_turret());

        world.apply(&tag(2, None)).unwrap();

        assert!(world.player(2).unwrap().dead);
        assert_eq!(world.zone(2).unwrap().owner, None);
    }

    #[test]
    fn test_removed_player_reports_old_id() {
        let mut world = World::lobby(WorldRole::Client);
        add(&mut world, 9, TeamId::B, 1);
        let removed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&removed);
        world
            .events
            .on_player_removed
            .add_listener(move |e| *sink.lock().unwrap() = Some((e.old_id, e.player.id)));

        world.apply(&RemovePlayerMsg { player_id: 9 }.into()).unwrap();

        assert_eq!(*removed.lock().unwrap(), Some((9, NO_PLAYER)));
        assert!(world.player(9).is_none());
    }

    #[test]
    fn test_identical_command_streams_reach_identical_state() {
        let script: Vec<Message> = vec![
            AddPlayerMsg {
                player_id: 1,
                nick: "a".into(),
                team: Some(TeamId::A),
                zone_id: 1,
                dead: false,
                bot: false,
            }
            .into(),
            AddPlayerMsg {
                player_id: 2,
                nick: "b".into(),
                team: Some(TeamId::B),
                zone_id: 3,
                dead: false,
                bot: true,
            }
            .into(),
            UpdatePlayerStateMsg {
                player_id: 1,
                key: PlayerKey::Right,
                value: true,
                tick_id: 0,
            }
            .into(),
            TickMsg { tick_id: 1 }.into(),
            ShotFiredMsg {
                player_id: 2,
                shot_id: 1,
                local_id: 0,
                pos: Vector2::new(2500.0, 300.0),
                vel: Vector2::new(-1200.0, 0.0),
                kind: units::ShotKind::Normal,
            }
            .into(),
            TickMsg { tick_id: 2 }.into(),
            tag(2, Some(1)),
            TickMsg { tick_id: 3 }.into(),
        ];

        let run = |role| {
            let mut world = World::lobby(role);
            for msg in &script {
                world.apply(msg).unwrap();
            }
            world.dump_everything()
        };

        assert_eq!(run(WorldRole::Server), run(WorldRole::Client));
    }

    #[test]
    fn test_expired_shots_are_removed_at_start_of_next_tick() {
        let mut world = World::lobby(WorldRole::Client);
        world
            .apply(
                &ShotFiredMsg {
                    player_id: 1,
                    shot_id: 5,
                    local_id: 0,
                    pos: Vector2::new(5.0, 100.0),
                    vel: Vector2::new(-1200.0, 0.0),
                    kind: units::ShotKind::Normal,
                }
                .into(),
            )
            .unwrap();

        world.apply(&TickMsg { tick_id: 1 }.into()).unwrap();
        assert!(world.shots[&5].expired);
        world.apply(&TickMsg { tick_id: 2 }.into()).unwrap();
        assert!(world.shots.is_empty());
    }

    #[test]
    fn test_spawn_zone_prefers_front_line() {
        let world = World::new(WorldRole::Server, MapLayout::standard(4, 1), LayoutDatabase::default());
        assert_eq!(world.spawn_zone_candidates(Some(TeamId::A)), vec![2]);
        assert_eq!(world.spawn_zone_candidates(Some(TeamId::B)), vec![3]);

        let world = World::new(WorldRole::Server, MapLayout::standard(5, 1), LayoutDatabase::default());
        assert_eq!(world.spawn_zone_candidates(Some(TeamId::A)), vec![2]);
        assert_eq!(world.spawn_zone_candidates(None).len(), 5);
    }

    #[test]
    fn test_respawn_rules() {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(2, 1), LayoutDatabase::default());
        add(&mut world, 1, TeamId::A, 1);
        assert_eq!(world.check_respawn(1), Err(ReasonCode::AlreadyAlive));

        world
            .apply(
                &PlayerKilledMsg {
                    target_id: 1,
                    killer_id: None,
                }
                .into(),
            )
            .unwrap();
        assert_eq!(world.check_respawn(1), Err(ReasonCode::BePatient));

        world.players.get_mut(&1).unwrap().respawn_ticks = 0;
        assert_eq!(world.check_respawn(1), Ok(1));

        world.players.get_mut(&1).unwrap().motion.pos = world.zone(2).unwrap().orb_pos();
        assert_eq!(world.check_respawn(1), Err(ReasonCode::EnemyZone));
        assert_eq!(world.check_respawn(42), Err(ReasonCode::Unauthorised));
    }

    #[test]
    fn test_shield_absorbs_one_hit() {
        let mut world = World::lobby(WorldRole::Server);
        add(&mut world, 1, TeamId::A, 1);
        world
            .apply(
                &PlayerHasUpgradeMsg {
                    player_id: 1,
                    upgrade: UpgradeKind::Shield,
                    tick_id: 0,
                }
                .into(),
            )
            .unwrap();

        let hit: Message = ShotHitPlayerMsg {
            shot_id: 77,
            player_id: 1,
        }
        .into();
        world.apply(&hit).unwrap();
        assert!(!world.player(1).unwrap().dead);
        world.apply(&hit).unwrap();
        assert!(world.player(1).unwrap().dead);
        assert!(matches!(
            world.take_effects().as_slice(),
            [WorldEffect::PlayerDied { victim: 1, killer: None, .. }]
        ));
    }

    #[test]
    fn test_client_world_queues_no_effects() {
        let mut world = World::lobby(WorldRole::Client);
        add(&mut world, 1, TeamId::A, 2);
        world.apply(&tag(2, Some(1))).unwrap();
        assert!(world.take_effects().is_empty());
    }
}
