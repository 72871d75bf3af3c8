//! WebSocket (RFC 6455) framing, reassembly and connection handling on top
//! of tokio transports.
//!
//! A [`Server`](ws::Server) takes transports that finished the HTTP upgrade,
//! keeps them in its registry and turns their byte streams into
//! [`ConnectionEvent`](ws::ConnectionEvent)s.

pub mod config;
pub mod endpoints;
pub mod shared;
pub mod utils;
pub mod ws;

pub use config::{AppConfig, ServerConfig};
pub use ws::{ConnectionEvent, ConnectionHandle, Message, Opcode, Server, ServerEvent};
