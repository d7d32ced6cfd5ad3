use shared::constants::{PlayerId, ZoneId};
use shared::ProtocolError;
use thiserror::Error;

/// Failures inside server-side game logic. Request validation failures are
/// not errors; they go back to the agent as reason codes.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("no player with id {0}")]
    UnknownPlayer(PlayerId),

    #[error("no zone with id {0}")]
    UnknownZone(ZoneId),

    #[error("no agent with id {0}")]
    UnknownAgent(u32),

    #[error("delayed call failed: {0}")]
    DelayedCall(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
