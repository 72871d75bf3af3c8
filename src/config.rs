use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8081";
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Limits applied to every connection accepted by a [`Server`](crate::ws::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Largest payload a single inbound frame may announce.
    pub max_frame_size: u64,
    /// Largest inbound message after defragmentation.
    pub max_message_size: usize,
    /// Size of the buffer each transport read fills.
    pub read_buffer_size: usize,
    /// How long a closing connection may spend flushing queued frames and
    /// the close frame before its transport is dropped.
    pub close_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn max_frame_size(mut self, size: u64) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        let config = ServerConfig::default();
        let max_frame_size = var_or("WS_MAX_FRAME_SIZE", config.max_frame_size)?;
        let max_message_size = var_or("WS_MAX_MESSAGE_SIZE", config.max_message_size)?;
        let read_buffer_size = var_or("WS_READ_BUFFER_SIZE", config.read_buffer_size)?;
        let close_timeout_ms = var_or("WS_CLOSE_TIMEOUT_MS", config.close_timeout.as_millis() as u64)?;
        Ok(config
            .max_frame_size(max_frame_size)
            .max_message_size(max_message_size)
            .read_buffer_size(read_buffer_size)
            .close_timeout(Duration::from_millis(close_timeout_ms)))
    }
}

/// Settings of the chat binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let addr = env::var("WS_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .with_context(|| format!("invalid WS_ADDR {:?}", addr))?;
        Ok(AppConfig {
            addr,
            server: ServerConfig::from_env()?,
        })
    }
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid {} {:?}", name, value)),
        Err(_) => Ok(default),
    }
}
