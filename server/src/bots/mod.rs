//! In-process bot agents.
//!
//! A bot is an agent like any other: it receives notices through
//! [`Bot::notify`] and produces the same requests a network client would.
//! Its decisions come from a goal tree whose root tries to capture zones.

pub mod goals;

use crate::agent_info::AgentId;
use goals::{BotContext, Goal, GoalArena, GoalStatus};
use log::{debug, warn};
use shared::constants::*;
use shared::messages::*;
use shared::world::player::{KeyState, Player};
use shared::world::team::TeamId;
use shared::world::World;
use std::collections::{BTreeSet, VecDeque};

const SHOT_RANGE: f32 = 600.0;
const SHOT_COOLDOWN: u32 = 12;
/// Ticks to wait for an answer before asking to respawn again
const RESPAWN_RETRY: u32 = 20;
const STEER_DEADBAND: f32 = 10.0;
/// Scales a zone's score down per zone of distance from the bot
const DISTANCE_FALLOFF: f64 = 0.7;
const LAST_ZONE_BONUS: f64 = 5.0;

/// How much it helps for this player to be in `zone_id`: 1 when its
/// presence decides the zone, shrinking by the pity base for every player
/// of margin either way, and 0 when it cannot matter.
pub fn zone_utility(world: &World, player: &Player, zone_id: ZoneId) -> f64 {
    let Some(zone) = world.zone(zone_id) else {
        return 0.0;
    };
    let Some(team) = player.team else {
        return 0.0;
    };
    let already_here = !player.dead && world.player_zone(player.id) == Some(zone_id);
    let counts = world.zone_counts(zone_id);
    let mut friendly = counts.get(team) as i32;
    let enemy = counts.get(team.opponent()) as i32;
    let pity = |margin: i32| PITY_BASE.powi(margin);

    if zone.owner == Some(team) {
        let mut defence = friendly.min(DEFENCE_CAP as i32);
        if !already_here {
            defence += 1;
        }
        if enemy == 0 {
            0.0
        } else if enemy > defence {
            pity(enemy - defence)
        } else if enemy == defence {
            1.0
        } else {
            pity(friendly - enemy)
        }
    } else if !world.adjacent_to_team(zone_id, team) {
        0.0
    } else {
        let defence = enemy.min(DEFENCE_CAP as i32);
        if already_here {
            friendly -= 1;
        }
        if friendly > defence {
            pity(friendly - defence)
        } else if friendly == defence {
            1.0
        } else {
            pity(friendly - enemy)
        }
    }
}

/// The zone most worth heading for, searching outwards from the bot's own
/// zone. Nearer zones are preferred, and taking a team's last zone wins
/// the round so it counts for more.
pub fn choose_zone(world: &World, player: &Player) -> Option<ZoneId> {
    let start = world.player_zone(player.id)?;
    let mut seen = BTreeSet::from([start]);
    let mut pending = VecDeque::from([(start, 1.0)]);
    let mut best: Option<(ZoneId, f64)> = None;

    while let Some((zone_id, likelihood)) = pending.pop_front() {
        let Some(zone) = world.zone(zone_id) else {
            continue;
        };
        if reachable(player, zone.rect.bottom()) {
            let last_zone = zone.owner.is_some()
                && !zone
                    .neighbours
                    .iter()
                    .filter_map(|id| world.zone(*id))
                    .any(|n| n.owner == zone.owner);
            let bonus = if last_zone { LAST_ZONE_BONUS } else { 1.0 };
            let score = likelihood * zone_utility(world, player, zone_id) * bonus;
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((zone_id, score));
            }
        }
        for neighbour in &zone.neighbours {
            if seen.insert(*neighbour) {
                pending.push_back((*neighbour, likelihood * DISTANCE_FALLOFF));
            }
        }
    }
    best.map(|(zone_id, _)| zone_id)
}

/// Living players can drop to lower rows but never climb to higher ones.
fn reachable(player: &Player, floor_y: f32) -> bool {
    player.dead || floor_y >= player.pos().y
}

/// Keys that walk a living player towards `target`.
fn walk_towards(player: &Player, target_x: f32, target_floor: f32) -> KeyState {
    let dx = target_x - player.pos().x;
    KeyState {
        left: dx < -STEER_DEADBAND,
        right: dx > STEER_DEADBAND,
        jump: false,
        down: target_floor > player.pos().y + ZONE_HEIGHT / 2.0 && player.motion.on_ground,
    }
}

/// Keys that fly a ghost towards `target`.
fn fly_towards(player: &Player, target: shared::world::physics::Vector2) -> KeyState {
    let delta = target.sub(&player.pos());
    KeyState {
        left: delta.x < -STEER_DEADBAND,
        right: delta.x > STEER_DEADBAND,
        jump: delta.y < -STEER_DEADBAND,
        down: delta.y > STEER_DEADBAND,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Respawn,
    Capture(ZoneId),
}

/// Root goal: respawn when dead, otherwise go wherever the bot is most
/// useful.
#[derive(Default)]
pub struct CaptureZones {
    plan: Option<Plan>,
}

impl Goal for CaptureZones {
    fn name(&self) -> &'static str {
        "capture zones"
    }

    fn reevaluate(&mut self, ctx: &mut BotContext) -> GoalStatus {
        let plan = if ctx.player.dead {
            Some(Plan::Respawn)
        } else {
            choose_zone(ctx.world, ctx.player).map(Plan::Capture)
        };
        if plan == self.plan {
            return GoalStatus::Continue;
        }
        self.plan = plan;
        match plan {
            Some(Plan::Respawn) => GoalStatus::Spawn(Box::new(RespawnGoal::default())),
            Some(Plan::Capture(zone_id)) => GoalStatus::Spawn(Box::new(MoveToOrb { zone_id })),
            None => {
                ctx.release_keys();
                GoalStatus::Spawn(Box::new(Idle))
            }
        }
    }

    fn child_done(&mut self) {
        self.plan = None;
    }
}

/// Stands still until the parent finds something better to do.
pub struct Idle;

impl Goal for Idle {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn reevaluate(&mut self, _ctx: &mut BotContext) -> GoalStatus {
        GoalStatus::Continue
    }
}

pub struct MoveToOrb {
    pub zone_id: ZoneId,
}

impl Goal for MoveToOrb {
    fn name(&self) -> &'static str {
        "move to orb"
    }

    fn reevaluate(&mut self, ctx: &mut BotContext) -> GoalStatus {
        let Some(zone) = ctx.world.zone(self.zone_id) else {
            return GoalStatus::Done;
        };
        if ctx.player.dead || !reachable(ctx.player, zone.rect.bottom()) {
            return GoalStatus::Done;
        }
        if ctx.player.team.is_some() && zone.owner == ctx.player.team {
            // Defending: stay on the orb but stop walking once there
            if zone.is_touching_orb(&ctx.player.pos()) {
                ctx.release_keys();
                return GoalStatus::Continue;
            }
        }
        let orb = zone.orb_pos();
        let keys = walk_towards(ctx.player, orb.x, zone.rect.bottom());
        ctx.set_keys(keys);
        GoalStatus::Continue
    }

    fn stop(&mut self, ctx: &mut BotContext) {
        ctx.release_keys();
    }
}

#[derive(Default)]
pub struct RespawnGoal {
    wait: u32,
}

impl Goal for RespawnGoal {
    fn name(&self) -> &'static str {
        "respawn"
    }

    fn reevaluate(&mut self, ctx: &mut BotContext) -> GoalStatus {
        if !ctx.player.dead {
            return GoalStatus::Done;
        }
        self.wait = self.wait.saturating_sub(1);
        if ctx.world.check_respawn(ctx.player.id).is_ok() {
            ctx.release_keys();
            if self.wait == 0 {
                ctx.request(
                    RespawnRequestMsg {
                        player_id: ctx.player_id(),
                        tick_id: ctx.tick_id(),
                    }
                    .into(),
                );
                self.wait = RESPAWN_RETRY;
            }
            return GoalStatus::Continue;
        }

        let target = ctx
            .world
            .spawn_zone_candidates(ctx.player.team)
            .into_iter()
            .filter_map(|id| ctx.world.zone(id))
            .map(|zone| zone.rect.centre())
            .min_by(|a, b| {
                let pos = ctx.player.pos();
                a.distance(&pos).total_cmp(&b.distance(&pos))
            });
        match target {
            Some(target) => {
                let keys = fly_towards(ctx.player, target);
                ctx.set_keys(keys);
            }
            None => ctx.release_keys(),
        }
        GoalStatus::Continue
    }

    fn stop(&mut self, ctx: &mut BotContext) {
        ctx.release_keys();
    }
}

/// Server-side agent that plays like a simple human.
pub struct Bot {
    agent_id: AgentId,
    player_id: Option<PlayerId>,
    inbox: VecDeque<Message>,
    goals: GoalArena,
    needs_root: bool,
    resync_acked: bool,
    shot_cooldown: u32,
    next_local_shot: ShotId,
}

impl Bot {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            player_id: None,
            inbox: VecDeque::new(),
            goals: GoalArena::default(),
            needs_root: false,
            resync_acked: false,
            shot_cooldown: 0,
            next_local_shot: 0,
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn goal_stack(&self) -> Vec<&'static str> {
        self.goals.stack()
    }

    /// Queues a notice for the next tick.
    pub fn notify(&mut self, msg: Message) {
        self.inbox.push_back(msg);
    }

    fn read_inbox(&mut self) {
        while let Some(msg) = self.inbox.pop_front() {
            match msg {
                Message::SetAgentPlayer(m) => {
                    self.player_id = m.player_id;
                    self.goals = GoalArena::default();
                    self.needs_root = m.player_id.is_some();
                    self.resync_acked = false;
                }
                Message::CannotJoin(m) => warn!("Bot {} cannot join: {}", self.agent_id, m.reason.message()),
                Message::CannotRespawn(m) => debug!("Bot {} cannot respawn: {:?}", self.agent_id, m.reason),
                _ => {}
            }
        }
    }

    /// Runs the bot for one tick and returns the requests it makes.
    /// `resyncing` says whether the server is waiting for this bot to
    /// acknowledge a resync.
    pub fn tick(&mut self, world: &World, resyncing: bool) -> Vec<Message> {
        self.read_inbox();
        let Some(player) = self.player_id.and_then(|id| world.player(id)) else {
            return Vec::new();
        };
        let mut ctx = BotContext::new(world, player);

        if !resyncing {
            self.resync_acked = false;
        } else if !self.resync_acked {
            ctx.request(
                ResyncAcknowledgedMsg {
                    player_id: player.id,
                    tick_id: world.last_tick_id,
                }
                .into(),
            );
            self.resync_acked = true;
        }

        if self.needs_root {
            self.needs_root = false;
            self.goals.set_root(Box::new(CaptureZones::default()), &mut ctx);
        } else {
            self.goals.tick(&mut ctx);
        }

        self.shoot_at_enemies(&mut ctx);
        ctx.into_requests()
    }

    fn shoot_at_enemies(&mut self, ctx: &mut BotContext) {
        self.shot_cooldown = self.shot_cooldown.saturating_sub(1);
        if self.shot_cooldown > 0 || ctx.player.dead {
            return;
        }
        let pos = ctx.player.pos();
        let team: Option<TeamId> = ctx.player.team;
        let target = ctx
            .world
            .players
            .values()
            .filter(|p| !p.dead && p.id != ctx.player.id && p.is_enemy_of(team))
            .map(|p| (p.pos(), p.pos().distance(&pos)))
            .filter(|(_, distance)| *distance <= SHOT_RANGE)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((target, _)) = target else {
            return;
        };

        let delta = target.sub(&pos);
        ctx.request(
            AimPlayerAtMsg {
                player_id: ctx.player_id(),
                angle: delta.y.atan2(delta.x),
                tick_id: ctx.tick_id(),
            }
            .into(),
        );
        self.next_local_shot = self.next_local_shot.wrapping_add(1);
        ctx.request(
            ShootMsg {
                player_id: ctx.player_id(),
                tick_id: ctx.tick_id(),
                local_id: self.next_local_shot,
            }
            .into(),
        );
        self.shot_cooldown = SHOT_COOLDOWN;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::world::layout::{LayoutDatabase, MapLayout};
    use shared::world::WorldRole;

    fn world_with(columns: u16, players: &[(PlayerId, TeamId, ZoneId)]) -> World {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(columns, 1), LayoutDatabase::default());
        for (id, team, zone_id) in players {
            world
                .apply(
                    &AddPlayerMsg {
                        player_id: *id,
                        nick: format!("p{}", id),
                        team: Some(*team),
                        zone_id: *zone_id,
                        dead: false,
                        bot: true,
                    }
                    .into(),
                )
                .unwrap();
        }
        world
    }

    #[test]
    fn test_utility_of_attacking() {
        // Alone next to a neutral zone: going there decides it
        let world = world_with(3, &[(1, TeamId::A, 1)]);
        let me = world.player(1).unwrap();
        assert_eq!(zone_utility(&world, me, 2), 1.0);
        // Not adjacent to anything of ours
        assert_eq!(zone_utility(&world, me, 3), 0.0);

        // Two teammates already outnumber the empty defence
        let world = world_with(3, &[(1, TeamId::A, 1), (2, TeamId::A, 2), (3, TeamId::A, 2)]);
        let me = world.player(1).unwrap();
        assert_approx_eq!(zone_utility(&world, me, 2), 0.04);
    }

    #[test]
    fn test_utility_of_defending() {
        // Nobody attacking: no point defending
        let world = world_with(2, &[(1, TeamId::A, 1)]);
        let me = world.player(1).unwrap();
        assert_eq!(zone_utility(&world, me, 1), 0.0);

        // One attacker against nobody: arriving evens it out
        let world = world_with(2, &[(1, TeamId::A, 2), (2, TeamId::B, 1)]);
        let me = world.player(1).unwrap();
        assert_eq!(zone_utility(&world, me, 1), 1.0);

        // Three attackers: slim chance
        let world = world_with(2, &[(1, TeamId::A, 2), (2, TeamId::B, 1), (3, TeamId::B, 1), (4, TeamId::B, 1)]);
        let me = world.player(1).unwrap();
        assert_approx_eq!(zone_utility(&world, me, 1), 0.04);
    }

    #[test]
    fn test_chooses_adjacent_neutral_zone() {
        let world = world_with(3, &[(1, TeamId::A, 1)]);
        assert_eq!(choose_zone(&world, world.player(1).unwrap()), Some(2));
    }

    #[test]
    fn test_bot_acknowledges_resync_once_and_heads_for_orb() {
        let world = world_with(3, &[(1, TeamId::A, 1)]);
        let mut bot = Bot::new(9);
        bot.notify(SetAgentPlayerMsg { player_id: Some(1) }.into());

        let requests = bot.tick(&world, true);
        let acks = |requests: &[Message]| {
            requests
                .iter()
                .filter(|m| matches!(m, Message::ResyncAcknowledged(_)))
                .count()
        };
        assert_eq!(acks(&requests), 1);
        assert_eq!(bot.goal_stack(), vec!["capture zones", "move to orb"]);
        assert!(requests.iter().any(|m| matches!(
            m,
            Message::UpdatePlayerState(u) if u.key == shared::world::player::PlayerKey::Right && u.value
        )));

        assert_eq!(acks(&bot.tick(&world, true)), 0);
    }

    #[test]
    fn test_bot_shoots_nearby_enemy() {
        let world = world_with(2, &[(1, TeamId::A, 1), (2, TeamId::B, 1)]);
        let mut bot = Bot::new(9);
        bot.notify(SetAgentPlayerMsg { player_id: Some(1) }.into());
        let requests = bot.tick(&world, false);
        let aim = requests.iter().position(|m| matches!(m, Message::AimPlayerAt(_))).unwrap();
        let shot = requests.iter().position(|m| matches!(m, Message::Shoot(_))).unwrap();
        assert!(aim < shot);

        // Cooling down
        assert!(!bot.tick(&world, false).iter().any(|m| matches!(m, Message::Shoot(_))));
    }

    #[test]
    fn test_dead_bot_plans_respawn() {
        let mut world = world_with(2, &[(1, TeamId::A, 1)]);
        world
            .apply(
                &PlayerKilledMsg {
                    target_id: 1,
                    killer_id: None,
                }
                .into(),
            )
            .unwrap();
        world.players.get_mut(&1).unwrap().respawn_ticks = 0;
        let mut bot = Bot::new(9);
        bot.notify(SetAgentPlayerMsg { player_id: Some(1) }.into());

        let requests = bot.tick(&world, false);
        assert_eq!(bot.goal_stack(), vec!["capture zones", "respawn"]);
        assert!(requests.iter().any(|m| matches!(m, Message::RespawnRequest(_))));
    }
}
