//! Types and logic shared by the arena server and its clients.
//!
//! Both sides run the same [`world::World`] and feed it the same ordered
//! stream of [`messages::Message`] commands; that shared determinism is what
//! keeps every client mirror in step with the authoritative copy.

pub mod codec;
pub mod config;
pub mod constants;
pub mod delayed;
pub mod error;
pub mod event;
pub mod messages;
pub mod world;

pub use config::{DebugContext, GameConfig};
pub use constants::*;
pub use error::ProtocolError;
pub use event::{Event, ListenerId};
pub use messages::{Message, MessageKind, ReasonCode, Role};
pub use world::{World, WorldRole};
