//! Integration tests across the shared, server and client crates

use assert_approx_eq::assert_approx_eq;
use client::network::RemoteGame;
use client::{AgentNotice, ConcreteAgent};
use server::agent_info::AgentId;
use server::game::{LocalGame, Recipient};
use server::network::Server;
use shared::messages::Message;
use shared::world::layout::MapLayout;
use shared::world::player::PlayerKey;
use shared::world::team::TeamId;
use shared::{GameConfig, PlayerId, SYNC_CHECK_PERIOD};
use std::time::Duration;
use tokio::time::timeout;

/// Runs a server game and any number of client agents in one process,
/// passing messages between them without a network in the way.
struct Harness {
    game: LocalGame,
    agents: Vec<(AgentId, ConcreteAgent)>,
    /// Every command the server broadcast, in order
    commands: Vec<Message>,
}

impl Harness {
    fn new(columns: u16) -> Self {
        Self {
            game: LocalGame::with_seed(GameConfig::default(), MapLayout::standard(columns, 1), 5),
            agents: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn connect(&mut self) -> usize {
        let agent_id = self.game.add_agent();
        self.agents.push((agent_id, ConcreteAgent::new()));
        self.pump();
        self.agents.len() - 1
    }

    fn join(&mut self, nick: &str, team: Option<TeamId>) -> (usize, PlayerId) {
        let index = self.connect();
        self.agent_mut(index).join(nick, team);
        self.pump();
        let player_id = self.agent(index).player_id().expect("agent should have joined");
        (index, player_id)
    }

    fn agent(&self, index: usize) -> &ConcreteAgent {
        &self.agents[index].1
    }

    fn agent_mut(&mut self, index: usize) -> &mut ConcreteAgent {
        &mut self.agents[index].1
    }

    /// Delivers until neither side has anything left to say.
    fn pump(&mut self) {
        loop {
            let outbox = self.game.drain_outbox();
            for out in &outbox {
                if out.recipient == Recipient::All {
                    self.commands.push(out.message.clone());
                }
                for (agent_id, agent) in self.agents.iter_mut() {
                    if out.recipient == Recipient::All || out.recipient == Recipient::Agent(*agent_id) {
                        agent.receive(&out.message).unwrap();
                    }
                }
            }

            let mut sent = false;
            for (agent_id, agent) in self.agents.iter_mut() {
                for request in agent.take_requests() {
                    sent = true;
                    self.game.receive_from_agent(*agent_id, request);
                }
            }
            if outbox.is_empty() && !sent {
                break;
            }
        }
    }

    fn step(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.game.tick();
            self.pump();
        }
    }

    fn resyncs_of(&self, player_id: PlayerId) -> usize {
        self.commands
            .iter()
            .filter(|m| matches!(m, Message::ResyncPlayer(r) if r.player_id == player_id))
            .count()
    }

    fn assert_mirrors_match(&self, index: usize) {
        let mirror = &self.agent(index).world;
        assert_eq!(mirror.last_tick_id, self.game.world.last_tick_id);
        assert_eq!(mirror.players.len(), self.game.world.players.len());
        for (id, truth) in &self.game.world.players {
            let copy = mirror.player(*id).expect("mirror is missing a player");
            assert_approx_eq!(copy.pos().x, truth.pos().x);
            assert_approx_eq!(copy.pos().y, truth.pos().y);
            assert_eq!(copy.dead, truth.dead);
            assert_eq!(copy.coins, truth.coins);
        }
        for (id, zone) in &self.game.world.zones {
            let copy = mirror.zone(*id).expect("mirror is missing a zone");
            assert_eq!(copy.owner, zone.owner);
            assert_eq!(copy.dark, zone.dark);
        }
    }
}

/// JOIN AND RESYNC TESTS
mod session_tests {
    use super::*;

    /// Tests that joining hands the agent a player and a resync it answers
    #[test]
    fn join_resync_and_acknowledge() {
        let mut harness = Harness::new(3);
        let (index, player_id) = harness.join("alice", Some(TeamId::A));

        assert!(harness
            .agent_mut(index)
            .take_notices()
            .contains(&AgentNotice::Joined(player_id)));
        assert_eq!(harness.resyncs_of(player_id), 1);
        // The acknowledgement waits behind the assumed latency
        assert!(harness.game.is_resyncing(player_id));

        harness.step(shared::INITIAL_ASSUMED_LATENCY as usize + 2);
        assert!(!harness.game.is_resyncing(player_id));
        assert!(harness.game.world.player(player_id).is_some());
    }

    /// Tests that a late joiner's mirror starts from the live world
    #[test]
    fn late_joiner_receives_current_world() {
        let mut harness = Harness::new(3);
        let (_, first) = harness.join("first", Some(TeamId::A));
        harness.step(15);

        let late = harness.connect();
        harness.assert_mirrors_match(late);
        assert!(harness.agent(late).world.player(first).is_some());
    }

    /// Tests that a client which never acknowledges is removed exactly once
    #[test]
    fn silent_client_is_removed_after_resync_expiry() {
        let mut harness = Harness::new(3);
        let (_, keeper) = harness.join("keeper", Some(TeamId::B));

        // Joins by hand and then never answers anything
        let silent = harness.game.add_agent();
        harness.game.receive_from_agent(
            silent,
            shared::messages::JoinRequestMsg {
                nick: "silent".into(),
                team: Some(TeamId::A),
                bot: false,
            }
            .into(),
        );
        let silent_player = harness.game.player_for_agent(silent).unwrap();
        harness.pump();

        harness.step(shared::RESYNC_EXPIRY as usize + 10);

        let removals = harness
            .commands
            .iter()
            .filter(|m| matches!(m, Message::RemovePlayer(r) if r.player_id == silent_player))
            .count();
        assert_eq!(removals, 1);
        assert!(harness.game.world.player(silent_player).is_none());
        assert!(harness.game.world.player(keeper).is_some());
        assert!(harness.agent(0).world.player(silent_player).is_none());
    }

    /// Tests that a full game turns joiners away with a reason
    #[test]
    fn capacity_is_enforced_end_to_end() {
        let mut harness = Harness {
            game: LocalGame::with_seed(GameConfig::default().with_capacity(1, 2), MapLayout::standard(3, 1), 5),
            agents: Vec::new(),
            commands: Vec::new(),
        };
        harness.join("a", Some(TeamId::A));
        harness.join("b", Some(TeamId::B));

        let third = harness.connect();
        harness.agent_mut(third).join("c", None);
        harness.pump();

        assert_eq!(harness.agent(third).player_id(), None);
        assert!(harness
            .agent_mut(third)
            .take_notices()
            .contains(&AgentNotice::CannotJoin(shared::ReasonCode::GameFull)));
        assert_eq!(harness.game.world.players.len(), 2);
    }
}

/// MIRROR AND PREDICTION TESTS
mod prediction_tests {
    use super::*;

    /// Tests that every client mirror matches the server after each tick
    #[test]
    fn mirrors_stay_in_step_with_server() {
        let mut harness = Harness::new(3);
        let (runner, _) = harness.join("runner", Some(TeamId::A));
        let (watcher, _) = harness.join("watcher", Some(TeamId::B));
        harness.step(20);

        harness.agent_mut(runner).set_key(PlayerKey::Right, true);
        harness.agent_mut(watcher).set_key(PlayerKey::Left, true);
        for _ in 0..60 {
            harness.step(1);
            harness.assert_mirrors_match(runner);
            harness.assert_mirrors_match(watcher);
        }
    }

    /// Tests that our own input moves the predicted player before the mirror
    #[test]
    fn predicted_player_leads_the_mirror() {
        let mut harness = Harness::new(3);
        let (index, player_id) = harness.join("quick", Some(TeamId::A));
        harness.step(40);
        let start = harness.game.world.player(player_id).unwrap().pos().x;

        harness.agent_mut(index).set_key(PlayerKey::Right, true);
        harness.step(2);

        let agent = harness.agent(index);
        let predicted = agent.local.player().unwrap().pos().x;
        let mirrored = agent.world.player(player_id).unwrap().pos().x;
        assert!(predicted > start);
        assert_approx_eq!(mirrored, start);

        // Once the delay has elapsed the server moves the player too
        harness.step(shared::INITIAL_ASSUMED_LATENCY as usize + 2);
        assert!(harness.game.world.player(player_id).unwrap().pos().x > start);
    }

    /// Tests that sync checks from a faithful client never force a resync
    #[test]
    fn faithful_client_passes_sync_checks() {
        let mut harness = Harness::new(3);
        let (index, player_id) = harness.join("steady", Some(TeamId::A));
        harness.step(40);

        harness.agent_mut(index).set_key(PlayerKey::Right, true);
        harness.step(2 * SYNC_CHECK_PERIOD as usize + 5);

        assert_eq!(harness.resyncs_of(player_id), 1);
        assert!(!harness.game.is_resyncing(player_id));
    }

    /// Tests that shots fired locally are claimed by the server's shot
    #[test]
    fn local_shot_is_matched_by_server() {
        let mut harness = Harness::new(3);
        let (index, player_id) = harness.join("gunner", Some(TeamId::A));
        harness.step(20);

        assert!(harness.agent_mut(index).shoot());
        assert_eq!(harness.agent(index).local.shots().count(), 1);

        harness.step(shared::INITIAL_ASSUMED_LATENCY as usize + 2);
        assert_eq!(harness.agent(index).local.shots().count(), 0);
        assert!(harness
            .commands
            .iter()
            .any(|m| matches!(m, Message::ShotFired(s) if s.player_id == player_id)));
    }
}

/// WIRE PROTOCOL TESTS
mod wire_tests {
    use super::*;
    use shared::codec::FrameBuffer;
    use shared::ProtocolError;

    /// A frame carrying a tick tag whose payload is too short for a tick
    pub(super) fn malformed_tick_frame() -> Vec<u8> {
        let payload = bincode::serialize(&1u8).unwrap();
        let mut frame = ((4 + payload.len()) as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(b"tick");
        frame.extend_from_slice(&payload);
        frame
    }

    /// Tests that a payload which does not fit its tag is refused
    #[test]
    fn payload_mismatching_tag_is_rejected() {
        let mut frames = FrameBuffer::new();
        frames.push(&malformed_tick_frame());
        assert!(matches!(frames.next_message(), Err(ProtocolError::Codec(_))));
    }

    /// Tests that frames split across reads come out whole and in order
    #[test]
    fn frames_survive_arbitrary_splits() {
        let messages: Vec<Message> = (0..5)
            .map(|tick_id| shared::messages::TickMsg { tick_id }.into())
            .collect();
        let bytes: Vec<u8> = messages
            .iter()
            .flat_map(|m| shared::codec::encode_frame(m).unwrap())
            .collect();

        let mut frames = FrameBuffer::new();
        let mut decoded = Vec::new();
        for chunk in bytes.chunks(3) {
            frames.push(chunk);
            while let Some(msg) = frames.next_message().unwrap() {
                decoded.push(msg);
            }
        }
        assert_eq!(decoded, messages);
    }
}

/// NETWORK INTEGRATION TESTS
mod network_tests {
    use super::*;
    use shared::codec::FrameBuffer;
    use shared::PROTOCOL_GREETING;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_server(max_clients: usize) -> String {
        let game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(3, 1), 21);
        let mut server = Server::new("127.0.0.1:0", game, max_clients).await.unwrap();
        let addr = server.local_addr().to_string();
        tokio::spawn(async move { server.run().await });
        addr
    }

    /// Feeds server messages to the agent and sends its requests back
    /// until `done` says to stop.
    async fn drive(
        remote: &mut RemoteGame,
        agent: &mut ConcreteAgent,
        mut done: impl FnMut(&ConcreteAgent) -> bool,
    ) {
        loop {
            for request in agent.take_requests() {
                remote.send(&request).await.unwrap();
            }
            if done(agent) {
                return;
            }
            let msg = remote.recv().await.unwrap().expect("server hung up");
            agent.receive(&msg).unwrap();
        }
    }

    /// Tests a client joining and ticking along over real TCP
    #[tokio::test]
    async fn client_joins_over_tcp() {
        let addr = start_server(4).await;
        let mut remote = RemoteGame::connect(&addr).await.unwrap();
        let mut agent = ConcreteAgent::new();
        agent.join("wire", Some(TeamId::B));

        timeout(Duration::from_secs(10), drive(&mut remote, &mut agent, |a| {
            a.player_id().is_some() && a.world.monotonic_ticks >= 20
        }))
        .await
        .unwrap();

        let player_id = agent.player_id().unwrap();
        let player = agent.world.player(player_id).unwrap();
        assert_eq!(player.team, Some(TeamId::B));
        assert_eq!(player.nick, "wire");
    }

    /// Tests that a departed client's player disappears for everyone else
    #[tokio::test]
    async fn disconnect_removes_player_for_others() {
        let addr = start_server(4).await;

        let mut watcher_remote = RemoteGame::connect(&addr).await.unwrap();
        let mut watcher = ConcreteAgent::new();
        watcher.join("watcher", Some(TeamId::A));

        let mut leaver_remote = RemoteGame::connect(&addr).await.unwrap();
        let mut leaver = ConcreteAgent::new();
        leaver.join("leaver", Some(TeamId::B));
        timeout(Duration::from_secs(10), drive(&mut leaver_remote, &mut leaver, |a| {
            a.player_id().is_some()
        }))
        .await
        .unwrap();
        let leaver_id = leaver.player_id().unwrap();

        timeout(Duration::from_secs(10), drive(&mut watcher_remote, &mut watcher, |a| {
            a.world.player(leaver_id).is_some()
        }))
        .await
        .unwrap();

        drop(leaver_remote);

        timeout(Duration::from_secs(10), drive(&mut watcher_remote, &mut watcher, |a| {
            a.world.player(leaver_id).is_none()
        }))
        .await
        .unwrap();
        assert!(watcher.player_id().is_some());
    }

    /// Tests that connections beyond capacity are closed straight away
    #[tokio::test]
    async fn connections_beyond_capacity_are_closed() {
        let addr = start_server(1).await;

        let mut first = RemoteGame::connect(&addr).await.unwrap();
        let greeting = timeout(Duration::from_secs(5), first.recv()).await.unwrap().unwrap();
        assert!(matches!(greeting, Some(Message::InitClient(_))));

        let mut second = RemoteGame::connect(&addr).await.unwrap();
        let refused = timeout(Duration::from_secs(5), second.recv()).await.unwrap().unwrap();
        assert_eq!(refused, None);
    }

    /// Tests that a malformed frame costs the sender its connection
    #[tokio::test]
    async fn malformed_frame_closes_connection() {
        let addr = start_server(4).await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream.write_all(PROTOCOL_GREETING).await.unwrap();
        stream.write_all(&super::wire_tests::malformed_tick_frame()).await.unwrap();

        let mut received = Vec::new();
        let read = timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
            .await
            .expect("server kept the connection open");
        assert!(read.is_ok());

        // Anything sent before the close is still well formed
        let mut frames = FrameBuffer::new();
        frames.push(&received);
        while let Some(msg) = frames.next_message().unwrap() {
            assert!(msg.role().is_command() || matches!(msg, Message::InitClient(_)));
        }
    }
}
