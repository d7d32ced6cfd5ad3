//! Stream framing: a big-endian `u32` body length, then the four-byte
//! message tag, then the bincode payload.

use crate::constants::PROTOCOL_GREETING;
use crate::error::ProtocolError;
use crate::messages::{Message, MessageKind};

pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let payload = msg.encode_payload()?;
    let body_len = 4 + payload.len();
    if body_len > MAX_FRAME_LEN {
        return Err(ProtocolError::OversizedFrame(body_len));
    }
    let mut frame = Vec::with_capacity(4 + body_len);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.extend_from_slice(&msg.kind().tag());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes a frame body (everything after the length prefix).
pub fn decode_body(body: &[u8]) -> Result<Message, ProtocolError> {
    if body.len() < 4 {
        return Err(ProtocolError::TruncatedFrame(body.len()));
    }
    let tag = [body[0], body[1], body[2], body[3]];
    let kind = MessageKind::from_tag(tag).ok_or(ProtocolError::UnknownTag(tag))?;
    Ok(Message::decode_payload(kind, &body[4..])?)
}

pub fn check_greeting(received: &[u8]) -> Result<(), ProtocolError> {
    if received == PROTOCOL_GREETING {
        Ok(())
    } else {
        Err(ProtocolError::BadGreeting)
    }
}

/// Accumulates bytes read from a stream and yields whole messages.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns `Ok(None)` until a complete frame has arrived.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let body_len = u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]]) as usize;
        if body_len > MAX_FRAME_LEN {
            return Err(ProtocolError::OversizedFrame(body_len));
        }
        if self.buffer.len() < 4 + body_len {
            return Ok(None);
        }
        let frame: Vec<u8> = self.buffer.drain(..4 + body_len).collect();
        decode_body(&frame[4..]).map(Some)
    }
}
