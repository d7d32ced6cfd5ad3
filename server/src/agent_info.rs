//! Per-agent latency compensation.
//!
//! Every timestamped request an agent sends says which tick it was made on.
//! The server holds such requests back so that each agent's input lands a
//! consistent number of ticks after it was generated, whatever that agent's
//! round trip time is. The adopted delay jumps up at once when the agent's
//! lag grows, and creeps back down one tick at a time while its player is
//! standing still.

use log::debug;
use shared::constants::{tick_distance, PlayerId, TickId};
use shared::messages::Message;
use shared::GameConfig;
use std::collections::VecDeque;

pub type AgentId = u32;

/// What the game must do as a result of feeding an [`AgentInfo`].
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    /// Hand the request to the game's request handler now
    Dispatch(Message),
    /// The agent's lag jumped, so its player must be resynced
    Resync { measured_delay: i32 },
    /// Tell the agent the delay it is now being held to
    DelayUpdated(i32),
}

/// Tracks one connected agent: the player it controls and the requests it
/// has sent that are waiting for their tick.
#[derive(Debug)]
pub struct AgentInfo {
    pub agent_id: AgentId,
    pub player_id: Option<PlayerId>,
    /// Bots live inside the server process and never lag
    pub bot: bool,
    current_delay: i32,
    recent_delay: i32,
    ideal_delay: i32,
    /// Bucket `i` is dispatched `i + 1` ticks from now
    request_queue: VecDeque<Vec<Message>>,
    lag_threshold: i32,
    lag_buffer: i32,
    force_delay: Option<i32>,
}

impl AgentInfo {
    pub fn new(agent_id: AgentId, config: &GameConfig) -> Self {
        Self {
            agent_id,
            player_id: None,
            bot: false,
            current_delay: config.initial_assumed_latency,
            recent_delay: -1,
            ideal_delay: config.initial_assumed_latency / 2,
            request_queue: VecDeque::new(),
            lag_threshold: config.lag_threshold,
            lag_buffer: config.lag_buffer,
            force_delay: config.debug.force_delay,
        }
    }

    /// Bots stamp requests with the tick they see, so they start with no
    /// delay at all.
    pub fn for_bot(agent_id: AgentId, config: &GameConfig) -> Self {
        Self {
            bot: true,
            current_delay: 0,
            ideal_delay: 0,
            ..Self::new(agent_id, config)
        }
    }

    pub fn current_delay(&self) -> i32 {
        self.current_delay
    }

    pub fn queued_requests(&self) -> usize {
        self.request_queue.iter().map(Vec::len).sum()
    }

    /// Decides when a request from this agent should reach the game.
    ///
    /// `last_tick_id` is the id of the most recent tick the server sent.
    pub fn request_from_agent(&mut self, msg: Message, last_tick_id: TickId) -> Vec<AgentAction> {
        let mut actions = Vec::new();
        let Some(stamp) = msg.tick_id() else {
            actions.push(AgentAction::Dispatch(msg));
            return actions;
        };

        let mut measured = tick_distance(last_tick_id, stamp);
        if measured < 0 {
            debug!("Agent {} stamped a request {} ticks ahead", self.agent_id, -measured);
            measured = 0;
        }
        let mut adjusted = if measured > self.lag_threshold {
            measured + self.lag_buffer
        } else {
            measured
        };

        let mut force_update = false;
        if let Some(force) = self.force_delay {
            adjusted = adjusted.max(force);
            force_update = force > self.current_delay;
        }
        self.recent_delay = self.recent_delay.max(adjusted);

        if measured > self.current_delay || force_update {
            self.current_delay = adjusted;
            if matches!(msg, Message::ResyncAcknowledged(_)) {
                self.pass_request(msg, adjusted - measured, &mut actions);
            } else if self.player_id.is_some() {
                debug!(
                    "Agent {} latency spiked to {} ticks; dropping {}",
                    self.agent_id,
                    measured,
                    msg.kind().name()
                );
                actions.push(AgentAction::Resync {
                    measured_delay: measured,
                });
            }
            actions.push(AgentAction::DelayUpdated(self.current_delay));
        } else {
            self.pass_request(msg, self.current_delay - measured, &mut actions);
        }
        actions
    }

    fn pass_request(&mut self, msg: Message, delay: i32, actions: &mut Vec<AgentAction>) {
        if delay <= 0 {
            actions.push(AgentAction::Dispatch(msg));
            return;
        }
        let delay = delay as usize;
        while self.request_queue.len() < delay {
            self.request_queue.push_back(Vec::new());
        }
        self.request_queue[delay - 1].push(msg);
    }

    /// Starts a new measurement window. The largest delay seen in the
    /// window that just closed becomes the target to shrink towards.
    pub fn update_delays(&mut self) {
        self.ideal_delay = self.recent_delay;
        self.recent_delay = -1;
    }

    /// Runs once per server tick. `player_static` says whether this agent's
    /// player would look the same if its input timing shifted.
    pub fn tick(&mut self, player_static: bool) -> Vec<AgentAction> {
        let mut actions = Vec::new();

        let measured_recently = self.ideal_delay >= 0 || self.recent_delay >= 0;
        if measured_recently && player_static {
            let ideal = self.ideal_delay.max(self.recent_delay).max(0);
            let front_empty = self.request_queue.front().map_or(true, Vec::is_empty);
            if ideal < self.current_delay && front_empty {
                debug!("Catching up one tick of lag for agent {}", self.agent_id);
                self.request_queue.pop_front();
                self.current_delay -= 1;
                actions.push(AgentAction::DelayUpdated(self.current_delay));
            }
        }

        if let Some(bucket) = self.request_queue.pop_front() {
            actions.extend(bucket.into_iter().map(AgentAction::Dispatch));
        }
        actions
    }

    pub fn give_player(&mut self, player_id: PlayerId) {
        self.player_id = Some(player_id);
    }

    pub fn take_player(&mut self) -> Option<PlayerId> {
        self.player_id.take()
    }
}
