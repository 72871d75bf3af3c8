pub mod connection;
pub mod consts;
mod encoding;
pub mod error;
pub mod event;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod read;
pub mod registry;
pub mod server;
pub mod write;

pub use connection::ConnectionHandle;
pub use error::{CloseCode, HandshakeError, ProtocolError, WsError};
pub use event::{ConnectionEvent, EventBus, ListenerId, ServerEvent};
pub use frame::{decode_frame, parse_header, Frame, FrameHeader};
pub use handshake::{accept_key, handshake_response};
pub use mask::apply_mask;
pub use opcode::Opcode;
pub use read::{FrameReassembler, Incoming, Message};
pub use registry::Registry;
pub use server::Server;
pub use write::*;
