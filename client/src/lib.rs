//! # Arena Client Library
//!
//! The client keeps a mirror of the server's world and a predicted copy of
//! the player it controls, and turns user intent into requests.
//!
//! ## Architecture Overview
//!
//! ### World Mirror
//! Every server command is applied to a local [`shared::World`] in the
//! order it arrives. Because the world is deterministic, the mirror stays
//! identical to the server's copy without the server ever sending positions
//! of moving players each tick.
//!
//! ### Local Prediction
//! Input reaches the mirror only after the server has applied it, a round
//! trip plus the server's latency-compensation delay later. The
//! [`local_state::LocalState`] copy of our own player takes input
//! immediately so movement feels responsive. Shots get local ids until the
//! server's copy arrives; grenades are thrown on a guess and rolled back if
//! the purchase is refused.
//!
//! ### Resync
//! When the server pushes an authoritative position for our player, the
//! agent acknowledges it and re-sends any held keys the server has not
//! seen, so that intent survives the correction.
//!
//! ## Module Organization
//!
//! - `agent`: message handling and request sending
//! - `local_state`: the predicted player, local shots and guessed grenades
//! - `network`: the TCP connection and the headless client loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:6789", "Ranger", None, 0).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod local_state;
pub mod network;

pub use agent::{AgentNotice, ConcreteAgent};
pub use local_state::LocalState;
