use std::convert::TryFrom;
use std::fmt;

use super::consts::OPCODE_MASK;
use super::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    // create a new opcode from unchanged input byte, rejecting reserved values
    pub fn decode(byte: u8) -> Result<Self, ProtocolError> {
        use Opcode::*;
        match byte & OPCODE_MASK {
            0x0 => Ok(Continuation),
            0x1 => Ok(Text),
            0x2 => Ok(Binary),
            0x8 => Ok(Close),
            0x9 => Ok(Ping),
            0xA => Ok(Pong),
            value => Err(ProtocolError::ReservedOpcode(value)),
        }
    }

    pub fn encode(self) -> u8 {
        use Opcode::*;
        match self {
            Continuation => 0x0,
            Text => 0x1,
            Binary => 0x2,
            Close => 0x8,
            Ping => 0x9,
            Pong => 0xA,
        }
    }

    /// Maps a caller-supplied raw opcode to a valid one.
    ///
    /// Every value of the 4-bit space is checked explicitly: the six defined
    /// opcodes (continuation included) map to themselves, while reserved
    /// values and anything wider than 4 bits fall back to [`Opcode::Text`].
    pub fn from_u8_lossy(value: u8) -> Self {
        if value > OPCODE_MASK {
            return Opcode::Text;
        }
        Opcode::decode(value).unwrap_or(Opcode::Text)
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    pub fn is_data(self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary)
    }
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::Text
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > OPCODE_MASK {
            return Err(ProtocolError::ReservedOpcode(value));
        }
        Opcode::decode(value)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Continuation => "continuation",
            Opcode::Text => "text",
            Opcode::Binary => "binary",
            Opcode::Close => "close",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
        };
        f.write_str(name)
    }
}
