//! Server network layer: TCP connections feeding the authoritative game
//!
//! Socket work happens in spawned tasks (an acceptor, plus a reader and a
//! writer per connection) that talk to the main loop over channels. The
//! main loop owns the [`LocalGame`] outright, so every request and every
//! tick is applied from a single task in arrival order.

use crate::agent_info::AgentId;
use crate::client_manager::{Client, ClientManager, ConnectionId, Frame};
use crate::error::GameError;
use crate::game::{LocalGame, Outgoing, Recipient};
use crate::scheduler::TickScheduler;
use log::{debug, error, info, warn};
use shared::codec::{check_greeting, encode_frame, FrameBuffer};
use shared::messages::{ConnectionLostMsg, Message};
use shared::PROTOCOL_GREETING;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

/// Connections silent for this long are dropped
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const READ_BUFFER_LEN: usize = 4096;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        conn_id: ConnectionId,
        addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<Frame>,
    },
    MessageReceived {
        conn_id: ConnectionId,
        message: Message,
    },
    Disconnected {
        conn_id: ConnectionId,
    },
    ClientTimeout {
        conn_id: ConnectionId,
        agent_id: AgentId,
    },
    Shutdown,
}

/// Main server coordinating networking and game simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    game: LocalGame,
    scheduler: TickScheduler,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(addr: &str, game: LocalGame, max_clients: usize) -> Result<Self, GameError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let scheduler = TickScheduler::new(game.config());

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients, CONNECTION_TIMEOUT))),
            game,
            scheduler,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn game(&self) -> &LocalGame {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut LocalGame {
        &mut self.game
    }

    /// A handle that can stop [`Server::run`] from another task.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns the task accepting new connections
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut next_conn_id: ConnectionId = 1;
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id += 1;
                        debug!("Accepted connection {} from {}", conn_id, addr);
                        tokio::spawn(handle_connection(conn_id, stream, addr, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
                if server_tx.is_closed() {
                    break;
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for (conn_id, agent_id) in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { conn_id, agent_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn handle_server_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected {
                conn_id,
                addr,
                outgoing,
            } => {
                let mut clients = self.clients.write().await;
                if clients.is_full() {
                    warn!("Refusing connection {} from {}: server full", conn_id, addr);
                    return true;
                }
                let agent_id = self.game.add_agent();
                clients.add_client(Client::new(conn_id, agent_id, addr, outgoing));
            }
            ServerMessage::MessageReceived { conn_id, message } => {
                let agent_id = self.clients.write().await.touch(conn_id);
                match agent_id {
                    Some(agent_id) => self.game.receive_from_agent(agent_id, message),
                    None => debug!("Dropping {} from unattached connection {}", message.kind().name(), conn_id),
                }
            }
            ServerMessage::Disconnected { conn_id } => {
                let agent_id = self.clients.write().await.remove_client(conn_id);
                if let Some(agent_id) = agent_id {
                    self.connection_lost(agent_id);
                }
            }
            ServerMessage::ClientTimeout { conn_id, agent_id } => {
                info!("Connection {} timed out", conn_id);
                self.connection_lost(agent_id);
            }
            ServerMessage::Shutdown => {
                info!("Server shutting down");
                return false;
            }
        }
        true
    }

    fn connection_lost(&mut self, agent_id: AgentId) {
        self.game.receive_from_agent(agent_id, ConnectionLostMsg.into());
    }

    /// Encodes everything the game queued and hands it to the writers
    async fn flush_outbox(&mut self) {
        let outgoing = self.game.drain_outbox();
        if outgoing.is_empty() {
            return;
        }

        let mut dead = Vec::new();
        {
            let clients = self.clients.read().await;
            for Outgoing { recipient, message } in outgoing {
                let frame: Frame = match encode_frame(&message) {
                    Ok(frame) => Arc::new(frame),
                    Err(e) => {
                        error!("Could not encode {}: {}", message.kind().name(), e);
                        continue;
                    }
                };
                match recipient {
                    Recipient::All => dead.extend(clients.broadcast(&frame)),
                    Recipient::Agent(agent_id) => dead.extend(clients.send_to_agent(agent_id, frame)),
                }
            }
        }

        dead.sort_unstable();
        dead.dedup();
        for conn_id in dead {
            let agent_id = self.clients.write().await.remove_client(conn_id);
            if let Some(agent_id) = agent_id {
                self.connection_lost(agent_id);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), GameError> {
        self.spawn_acceptor();
        self.spawn_timeout_checker();

        let sleep = tokio::time::sleep(self.scheduler.period());
        tokio::pin!(sleep);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_server_message(message).await,
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                },

                () = &mut sleep => {
                    let now = Instant::now();
                    self.game.tick();
                    let delay = self.scheduler.next_delay(now);
                    sleep.as_mut().reset(tokio::time::Instant::from_std(now + delay));

                    if self.game.world.monotonic_ticks % 200 == 0 && self.game.agent_count() > 0 {
                        debug!(
                            "Tick {}: {} agents, {} players",
                            self.game.world.last_tick_id,
                            self.game.agent_count(),
                            self.game.world.players.len()
                        );
                    }
                },
            }

            self.flush_outbox().await;
        }

        Ok(())
    }
}

/// Checks the greeting, then pumps the connection until either side closes
async fn handle_connection(
    conn_id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (mut reader, writer) = stream.into_split();

    let mut greeting = vec![0u8; PROTOCOL_GREETING.len()];
    if let Err(e) = reader.read_exact(&mut greeting).await {
        debug!("Connection {} closed before greeting: {}", conn_id, e);
        return;
    }
    if let Err(e) = check_greeting(&greeting) {
        warn!("Closing connection {} from {}: {}", conn_id, addr, e);
        return;
    }

    let (outgoing, frames) = mpsc::unbounded_channel();
    tokio::spawn(write_frames(conn_id, writer, frames));
    if server_tx
        .send(ServerMessage::Connected {
            conn_id,
            addr,
            outgoing,
        })
        .is_err()
    {
        return;
    }

    read_messages(conn_id, reader, &server_tx).await;
    // The main loop may already be gone during shutdown
    let _ = server_tx.send(ServerMessage::Disconnected { conn_id });
}

async fn read_messages(
    conn_id: ConnectionId,
    mut reader: OwnedReadHalf,
    server_tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    let mut frames = FrameBuffer::new();
    let mut buffer = [0u8; READ_BUFFER_LEN];

    loop {
        let len = match reader.read(&mut buffer).await {
            Ok(0) => return,
            Ok(len) => len,
            Err(e) => {
                debug!("Read error on connection {}: {}", conn_id, e);
                return;
            }
        };
        frames.push(&buffer[..len]);

        loop {
            match frames.next_message() {
                Ok(Some(message)) => {
                    if server_tx.send(ServerMessage::MessageReceived { conn_id, message }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Closing connection {}: {}", conn_id, e);
                    return;
                }
            }
        }
    }
}

/// Writes queued frames until the registry drops the sender
async fn write_frames(conn_id: ConnectionId, mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!("Write error on connection {}: {}", conn_id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::codec::encode_frame;
    use shared::messages::{JoinRequestMsg, TickMsg};
    use shared::world::layout::MapLayout;
    use shared::world::team::TeamId;
    use shared::GameConfig;
    use tokio::time::timeout;

    async fn start_server() -> SocketAddr {
        let game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(3, 1), 9);
        let mut server = Server::new("127.0.0.1:0", game, 4).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });
        addr
    }

    async fn read_one(stream: &mut TcpStream, frames: &mut FrameBuffer) -> Message {
        let mut buffer = [0u8; 1024];
        loop {
            if let Some(message) = frames.next_message().unwrap() {
                return message;
            }
            let len = stream.read(&mut buffer).await.unwrap();
            assert!(len > 0, "server closed the connection");
            frames.push(&buffer[..len]);
        }
    }

    #[tokio::test]
    async fn test_greeted_connection_receives_world() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(PROTOCOL_GREETING).await.unwrap();

        let mut frames = FrameBuffer::new();
        let first = timeout(Duration::from_secs(5), read_one(&mut stream, &mut frames))
            .await
            .unwrap();
        assert!(matches!(first, Message::InitClient(_)));
    }

    #[tokio::test]
    async fn test_join_over_tcp() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(PROTOCOL_GREETING).await.unwrap();
        let join: Message = JoinRequestMsg {
            nick: "tcp".into(),
            team: Some(TeamId::B),
            bot: false,
        }
        .into();
        stream.write_all(&encode_frame(&join).unwrap()).await.unwrap();

        let mut frames = FrameBuffer::new();
        let joined = timeout(Duration::from_secs(5), async {
            loop {
                if let Message::SetAgentPlayer(msg) = read_one(&mut stream, &mut frames).await {
                    return msg;
                }
            }
        })
        .await
        .unwrap();
        assert!(joined.player_id.is_some());
    }

    #[tokio::test]
    async fn test_bad_greeting_is_closed() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"Nonsense").await.unwrap();
        let sync: Message = TickMsg { tick_id: 0 }.into();
        // The server may already have closed its side
        let _ = stream.write_all(&encode_frame(&sync).unwrap()).await;

        let mut buffer = [0u8; 64];
        let read = timeout(Duration::from_secs(5), stream.read(&mut buffer)).await.unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(3, 1), 9);
        let mut server = Server::new("127.0.0.1:0", game, 4).await.unwrap();
        server.shutdown_handle().send(ServerMessage::Shutdown).unwrap();
        let result = timeout(Duration::from_secs(5), server.run()).await.unwrap();
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = start_server().await;
        let game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(3, 1), 9);
        let second = Server::new(&first.to_string(), game, 4).await;
        assert!(second.is_err());
    }
}
