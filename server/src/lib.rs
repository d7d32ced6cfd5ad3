//! # Arena Server Library
//!
//! This library provides the authoritative side of the arena: the one copy
//! of the world every client mirrors. Clients send requests; the server
//! validates them, turns them into server commands, applies each command to
//! its own world and broadcasts it in the same order.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! [`game::LocalGame`] owns the server world. It runs the tick, detects shot
//! hits and zone tags, and is the only place where ids (players, shots,
//! coins) are handed out.
//!
//! ### Latency Compensation
//! Each connected agent has an [`agent_info::AgentInfo`] that measures how
//! far behind the agent's requests arrive and holds timestamped requests
//! back by a stable delay, so that every player's actions land on the
//! server the same number of ticks after they were made.
//!
//! ### Resynchronisation
//! When a player's position may have diverged (a spawn, a latency jump or a
//! failed sync check) the server pushes the authoritative position and waits
//! for an acknowledgement. Clients that never acknowledge are removed.
//!
//! ## Module Organization
//!
//! - `game`: the authoritative game and request validation
//! - `agent_info`: per-agent delay measurement and request queueing
//! - `scheduler`: wall-clock pacing of ticks
//! - `collisions` and `triggers`: per-tick shot hits and zone tags
//! - `level`: the lobby and the standard round, plus trigger regions
//! - `bots`: in-process players driven by goal trees
//! - `network` and `client_manager`: TCP transport and connection registry
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::LocalGame;
//! use server::level::LobbyLevel;
//! use server::network::Server;
//! use shared::world::layout::MapLayout;
//! use shared::GameConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut game = LocalGame::new(GameConfig::default(), MapLayout::lobby(3));
//!     game.start_level(Box::new(LobbyLevel::default()));
//!     game.add_bot("Ranger", None);
//!
//!     let mut server = Server::new("127.0.0.1:6789", game, 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod agent_info;
pub mod bots;
pub mod client_manager;
pub mod collisions;
pub mod error;
pub mod game;
pub mod id_pool;
pub mod level;
pub mod network;
pub mod scheduler;
pub mod triggers;

pub use error::GameError;
pub use game::LocalGame;
