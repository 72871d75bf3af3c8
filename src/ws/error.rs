use std::io;

use thiserror::Error;

/// Status codes carried by close frames (RFC 6455 section 7.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    TooBig,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::TooBig => 1009,
        }
    }
}

/// A peer violated the framing rules; the connection must be closed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("reserved opcode {0:#X}")]
    ReservedOpcode(u8),
    #[error("non-zero RSV bits {0:#05b} without a negotiated extension")]
    ReservedBits(u8),
    #[error("most significant bit of a 64-bit payload length is set")]
    LengthOverflow,
    #[error("fragmented {0} frame")]
    FragmentedControlFrame(super::opcode::Opcode),
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLong(u64),
    #[error("frame payload of {length} bytes exceeds limit of {max}")]
    FrameTooLarge { length: u64, max: u64 },
    #[error("message of {length} bytes exceeds limit of {max}")]
    MessageTooLarge { length: usize, max: usize },
}

impl ProtocolError {
    pub fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::FrameTooLarge { .. } | ProtocolError::MessageTooLarge { .. } => {
                CloseCode::TooBig
            }
            _ => CloseCode::ProtocolError,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

#[derive(Debug, Error)]
pub enum WsError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("connection {0} is closed")]
    ConnectionClosed(u128),
    #[error(transparent)]
    Io(#[from] io::Error),
}
