use thiserror::Error;

/// Failures that mean a consumer cannot stay in step with the server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown map layouts: {}", .keys.join(", "))]
    UnknownMapLayouts { keys: Vec<String> },

    #[error("server version {server} is not compatible with {local}")]
    VersionMismatch { server: String, local: String },

    #[error("bad protocol greeting")]
    BadGreeting,

    #[error("unknown message tag {0:?}")]
    UnknownTag([u8; 4]),

    #[error("frame of {0} bytes is too short to hold a message tag")]
    TruncatedFrame(usize),

    #[error("frame of {0} bytes exceeds the size limit")]
    OversizedFrame(usize),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
