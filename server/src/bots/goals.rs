//! Goal trees for bots.
//!
//! Goals live in an arena and refer to each other by [`GoalId`]. Each goal
//! has at most one active child; the chain from the root down to the leaf is
//! reevaluated every tick, and a goal can replace its child or finish.

use shared::constants::{PlayerId, TickId};
use shared::messages::{Message, UpdatePlayerStateMsg};
use shared::world::player::{KeyState, Player};
use shared::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GoalId(usize);

pub enum GoalStatus {
    Continue,
    /// Replace the current child with this goal
    Spawn(Box<dyn Goal>),
    Done,
}

/// What a goal can see and do on one tick.
pub struct BotContext<'a> {
    pub world: &'a World,
    pub player: &'a Player,
    keys: KeyState,
    requests: Vec<Message>,
}

impl<'a> BotContext<'a> {
    pub fn new(world: &'a World, player: &'a Player) -> Self {
        Self {
            world,
            player,
            keys: player.motion.keys,
            requests: Vec::new(),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player.id
    }

    pub fn tick_id(&self) -> TickId {
        self.world.last_tick_id
    }

    pub fn request(&mut self, msg: Message) {
        self.requests.push(msg);
    }

    /// Sends key presses and releases for every key that differs from what
    /// the bot is already holding.
    pub fn set_keys(&mut self, desired: KeyState) {
        for (key, value) in desired.diff(&self.keys) {
            self.requests.push(
                UpdatePlayerStateMsg {
                    player_id: self.player.id,
                    key,
                    value,
                    tick_id: self.world.last_tick_id,
                }
                .into(),
            );
        }
        self.keys = desired;
    }

    pub fn release_keys(&mut self) {
        self.set_keys(KeyState::default());
    }

    pub fn into_requests(self) -> Vec<Message> {
        self.requests
    }
}

pub trait Goal: Send {
    fn name(&self) -> &'static str;

    fn start(&mut self, ctx: &mut BotContext) -> GoalStatus {
        self.reevaluate(ctx)
    }

    fn reevaluate(&mut self, ctx: &mut BotContext) -> GoalStatus;

    fn stop(&mut self, _ctx: &mut BotContext) {}

    /// The child this goal spawned has finished.
    fn child_done(&mut self) {}
}

struct GoalNode {
    goal: Box<dyn Goal>,
    parent: Option<GoalId>,
    child: Option<GoalId>,
}

#[derive(Default)]
pub struct GoalArena {
    nodes: Vec<Option<GoalNode>>,
    free: Vec<usize>,
    root: Option<GoalId>,
}

impl GoalArena {
    pub fn root(&self) -> Option<GoalId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Names of the active goals from the root down.
    pub fn stack(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut current = self.root;
        while let Some(node) = current.and_then(|id| self.node(id)) {
            names.push(node.goal.name());
            current = node.child;
        }
        names
    }

    /// Stops everything and starts `goal` as the new root.
    pub fn set_root(&mut self, goal: Box<dyn Goal>, ctx: &mut BotContext) {
        self.clear(ctx);
        let id = self.insert(goal, None);
        self.root = Some(id);
        if let Some(status) = self.node_mut(id).map(|node| node.goal.start(ctx)) {
            self.apply(id, status, ctx);
        }
    }

    pub fn clear(&mut self, ctx: &mut BotContext) {
        if let Some(root) = self.root.take() {
            self.remove_subtree(root, ctx);
        }
    }

    /// Reevaluates the active chain from the root down. Descent stops at a
    /// goal that spawned a new child or finished.
    pub fn tick(&mut self, ctx: &mut BotContext) {
        let mut current = self.root;
        while let Some(id) = current {
            let Some(status) = self.node_mut(id).map(|node| node.goal.reevaluate(ctx)) else {
                break;
            };
            if !self.apply(id, status, ctx) {
                break;
            }
            current = self.node(id).and_then(|node| node.child);
        }
    }

    /// Returns whether to keep descending below `id`.
    fn apply(&mut self, id: GoalId, status: GoalStatus, ctx: &mut BotContext) -> bool {
        match status {
            GoalStatus::Continue => true,
            GoalStatus::Spawn(goal) => {
                self.replace_child(id, goal, ctx);
                false
            }
            GoalStatus::Done => {
                self.finish(id, ctx);
                false
            }
        }
    }

    fn replace_child(&mut self, parent: GoalId, goal: Box<dyn Goal>, ctx: &mut BotContext) {
        if let Some(old) = self.node(parent).and_then(|node| node.child) {
            self.remove_subtree(old, ctx);
        }
        let child = self.insert(goal, Some(parent));
        if let Some(node) = self.node_mut(parent) {
            node.child = Some(child);
        }
        if let Some(status) = self.node_mut(child).map(|node| node.goal.start(ctx)) {
            self.apply(child, status, ctx);
        }
    }

    fn finish(&mut self, id: GoalId, ctx: &mut BotContext) {
        let parent = self.node(id).and_then(|node| node.parent);
        self.remove_subtree(id, ctx);
        match parent.and_then(|parent| self.node_mut(parent)) {
            Some(node) => {
                node.child = None;
                node.goal.child_done();
            }
            None => self.root = None,
        }
    }

    fn remove_subtree(&mut self, id: GoalId, ctx: &mut BotContext) {
        let Some(mut node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        if let Some(child) = node.child {
            self.remove_subtree(child, ctx);
        }
        node.goal.stop(ctx);
        self.free.push(id.0);
    }

    fn insert(&mut self, goal: Box<dyn Goal>, parent: Option<GoalId>) -> GoalId {
        let node = GoalNode {
            goal,
            parent,
            child: None,
        };
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                GoalId(index)
            }
            None => {
                self.nodes.push(Some(node));
                GoalId(self.nodes.len() - 1)
            }
        }
    }

    fn node(&self, id: GoalId) -> Option<&GoalNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: GoalId) -> Option<&mut GoalNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::messages::AddPlayerMsg;
    use shared::world::team::TeamId;
    use shared::world::WorldRole;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Spawns a counting child until it has seen `rounds` children finish.
    struct Parent {
        log: Log,
        finished: u32,
        rounds: u32,
        waiting: bool,
    }

    impl Goal for Parent {
        fn name(&self) -> &'static str {
            "parent"
        }

        fn reevaluate(&mut self, _ctx: &mut BotContext) -> GoalStatus {
            if self.finished >= self.rounds {
                return GoalStatus::Done;
            }
            if self.waiting {
                return GoalStatus::Continue;
            }
            self.waiting = true;
            GoalStatus::Spawn(Box::new(Countdown {
                log: Arc::clone(&self.log),
                left: 2,
            }))
        }

        fn stop(&mut self, _ctx: &mut BotContext) {
            self.log.lock().unwrap().push("stop parent".into());
        }

        fn child_done(&mut self) {
            self.finished += 1;
            self.waiting = false;
        }
    }

    struct Countdown {
        log: Log,
        left: u32,
    }

    impl Goal for Countdown {
        fn name(&self) -> &'static str {
            "countdown"
        }

        fn reevaluate(&mut self, _ctx: &mut BotContext) -> GoalStatus {
            if self.left == 0 {
                return GoalStatus::Done;
            }
            self.left -= 1;
            GoalStatus::Continue
        }

        fn stop(&mut self, ctx: &mut BotContext) {
            self.log.lock().unwrap().push("stop countdown".into());
            ctx.release_keys();
        }
    }

    fn world() -> World {
        let mut world = World::lobby(WorldRole::Server);
        world
            .apply(
                &AddPlayerMsg {
                    player_id: 1,
                    nick: "bot".into(),
                    team: Some(TeamId::A),
                    zone_id: 1,
                    dead: false,
                    bot: true,
                }
                .into(),
            )
            .unwrap();
        world
    }

    #[test]
    fn test_children_finish_and_parent_respawns_them() {
        let world = world();
        let player = world.player(1).unwrap();
        let log: Log = Arc::default();
        let mut arena = GoalArena::default();
        let mut ctx = BotContext::new(&world, player);

        arena.set_root(
            Box::new(Parent {
                log: Arc::clone(&log),
                finished: 0,
                rounds: 2,
                waiting: false,
            }),
            &mut ctx,
        );
        assert_eq!(arena.stack(), vec!["parent", "countdown"]);

        for _ in 0..20 {
            arena.tick(&mut ctx);
        }

        assert!(arena.is_empty());
        assert_eq!(arena.len(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["stop countdown", "stop countdown", "stop parent"]
        );
    }

    #[test]
    fn test_clear_stops_leaf_before_root() {
        let world = world();
        let player = world.player(1).unwrap();
        let log: Log = Arc::default();
        let mut arena = GoalArena::default();
        let mut ctx = BotContext::new(&world, player);
        arena.set_root(
            Box::new(Parent {
                log: Arc::clone(&log),
                finished: 0,
                rounds: 5,
                waiting: false,
            }),
            &mut ctx,
        );
        ctx.set_keys(KeyState {
            right: true,
            ..KeyState::default()
        });

        arena.clear(&mut ctx);

        assert_eq!(*log.lock().unwrap(), vec!["stop countdown", "stop parent"]);
        // Pressing and then releasing the key
        assert_eq!(ctx.into_requests().len(), 2);
    }
}
