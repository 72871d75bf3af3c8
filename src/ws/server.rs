use std::sync::Arc;

use hyper::HeaderMap;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{drive, ConnectionHandle};
use super::error::WsError;
use super::event::{EventBus, ListenerId, ServerEvent};
use super::handshake::{handshake_response, sec_websocket_key};
use super::opcode::Opcode;
use super::registry::Registry;
use crate::config::ServerConfig;
use crate::shared::types::ConnectionId;

struct Inner {
    config: ServerConfig,
    registry: Arc<Registry>,
    events: EventBus<ServerEvent>,
}

/// Accepts upgraded transports and tracks the live connections.
///
/// Cloning is cheap; clones share the registry and listeners.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Server {
            inner: Arc::new(Inner {
                config,
                registry: Arc::new(Registry::new()),
                events: EventBus::new(),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn on_connect<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Answers the upgrade request on a raw transport, then accepts it.
    pub async fn upgrade<T>(&self, headers: &HeaderMap, mut transport: T) -> Result<ConnectionHandle, WsError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let key = sec_websocket_key(headers)?;
        transport.write_all(&handshake_response(key.as_bytes())).await?;
        Ok(self.accept(transport))
    }

    /// Starts serving a transport whose handshake is already answered.
    ///
    /// The connection is registered and announced before its first byte is
    /// read, so `connect` listeners can subscribe without missing messages.
    /// Must be called from within a tokio runtime.
    pub fn accept<T>(&self, transport: T) -> ConnectionHandle
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(transport);
        let (sender, receiver) = unbounded_channel();
        let id = Uuid::new_v4().as_u128();
        let connection = ConnectionHandle::new(id, Arc::downgrade(&self.inner.registry), sender);
        self.inner.registry.insert(connection.clone());
        info!(conn_id = %id, clients = self.inner.registry.len(), "client connected");
        self.inner.events.emit(&ServerEvent::Connect(connection.clone()));

        tokio::spawn(drive(
            connection.clone(),
            reader,
            writer,
            receiver,
            self.inner.config.clone(),
        ));
        connection
    }

    /// Sends a text message to every connection; returns how many accepted it.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        self.broadcast_with(payload, Opcode::Text)
    }

    pub fn broadcast_with(&self, payload: &[u8], opcode: Opcode) -> usize {
        let connections = self.inner.registry.snapshot();
        debug!(clients = connections.len(), %opcode, "broadcasting");
        connections
            .iter()
            .filter(|connection| match connection.send(payload, opcode, true) {
                Ok(()) => true,
                Err(e) => {
                    warn!(conn_id = %connection.id(), error = %e, "broadcast skipped client");
                    false
                }
            })
            .count()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.inner.registry.get(id)
    }

    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.inner.registry.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::new(ServerConfig::default())
    }
}
