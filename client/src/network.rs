//! TCP connection to an arena server and the headless client loop.

use crate::agent::{AgentNotice, ConcreteAgent};
use log::{debug, error, info, warn};
use shared::codec::{encode_frame, FrameBuffer};
use shared::messages::Message;
use shared::world::team::TeamId;
use shared::{ProtocolError, PROTOCOL_GREETING};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep};

const READ_BUFFER_LEN: usize = 4096;

/// The server as seen from a client: a framed message stream.
pub struct RemoteGame {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    frames: FrameBuffer,
    buffer: Vec<u8>,
}

impl RemoteGame {
    /// Connects and sends the protocol greeting.
    pub async fn connect(addr: &str) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(PROTOCOL_GREETING).await?;
        Ok(Self {
            reader,
            writer,
            frames: FrameBuffer::new(),
            buffer: vec![0u8; READ_BUFFER_LEN],
        })
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let frame = encode_frame(msg)?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    /// The next message from the server, or `None` once it hangs up.
    ///
    /// Safe to use as a `select!` branch: bytes already read are kept in
    /// the frame buffer if the future is dropped.
    pub async fn recv(&mut self) -> Result<Option<Message>, ProtocolError> {
        loop {
            if let Some(msg) = self.frames.next_message()? {
                return Ok(Some(msg));
            }
            let len = self.reader.read(&mut self.buffer).await?;
            if len == 0 {
                return Ok(None);
            }
            self.frames.push(&self.buffer[..len]);
        }
    }
}

/// A headless player: joins, respawns when it can and logs what happens.
pub struct Client {
    remote: RemoteGame,
    agent: ConcreteAgent,
    nick: String,
    team: Option<TeamId>,
    fake_ping_ms: u64,
    auto_respawn: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        nick: &str,
        team: Option<TeamId>,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let remote = RemoteGame::connect(server_addr).await?;
        info!("Connected to {}", server_addr);
        Ok(Client {
            remote,
            agent: ConcreteAgent::new(),
            nick: nick.to_string(),
            team,
            fake_ping_ms,
            auto_respawn: true,
        })
    }

    pub fn agent(&self) -> &ConcreteAgent {
        &self.agent
    }

    async fn send_requests(&mut self) -> Result<(), ProtocolError> {
        let requests = self.agent.take_requests();
        if requests.is_empty() {
            return Ok(());
        }
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }
        for request in &requests {
            self.remote.send(request).await?;
        }
        Ok(())
    }

    fn handle_notices(&mut self) {
        for notice in self.agent.take_notices() {
            match notice {
                AgentNotice::Joined(player_id) => info!("Joined the game as player {}", player_id),
                AgentNotice::CannotJoin(reason) => warn!("Could not join: {}", reason.message()),
                AgentNotice::CannotRespawn(reason) => debug!("Cannot respawn: {}", reason.message()),
                AgentNotice::CannotBuyUpgrade(kind, reason) => {
                    info!("Could not buy {:?}: {}", kind, reason.message())
                }
                AgentNotice::ServerChat { text, error: true } => warn!("{}", text),
                AgentNotice::ServerChat { text, error: false } => info!("{}", text),
                AgentNotice::Removed => {
                    info!("Removed from the game");
                    self.auto_respawn = false;
                }
            }
        }
    }

    fn try_respawn(&mut self) {
        if !self.auto_respawn {
            return;
        }
        let dead = self
            .agent
            .player_id()
            .and_then(|id| self.agent.world.player(id))
            .map_or(false, |player| player.dead && player.respawn_ticks == 0);
        if dead {
            // Refusals are expected until a friendly zone is reachable
            let _ = self.agent.respawn();
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.agent.join(&self.nick, self.team);
        self.send_requests().await?;

        let mut housekeeping = interval(Duration::from_millis(500));

        loop {
            tokio::select! {
                result = self.remote.recv() => {
                    match result {
                        Ok(Some(msg)) => {
                            if let Err(e) = self.agent.receive(&msg) {
                                error!("Cannot stay in step with the server: {}", e);
                                return Err(e.into());
                            }
                        }
                        Ok(None) => {
                            info!("Server closed the connection");
                            break;
                        }
                        Err(e) => {
                            error!("Error receiving message: {}", e);
                            return Err(e.into());
                        }
                    }
                },

                _ = housekeeping.tick() => {
                    self.handle_notices();
                    self.try_respawn();
                },
            }

            self.send_requests().await?;
        }

        Ok(())
    }
}
