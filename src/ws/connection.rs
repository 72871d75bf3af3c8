use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use super::error::{CloseCode, ProtocolError, WsError};
use super::event::{ConnectionEvent, EventBus, ListenerId};
use super::opcode::Opcode;
use super::read::{FrameReassembler, Incoming};
use super::registry::Registry;
use super::write::{encode_close_frame, encode_frame};
use crate::config::ServerConfig;
use crate::shared::types::ConnectionId;

/// Encoded frames on their way to the writer half of a transport.
pub type OutboundSender = UnboundedSender<Vec<u8>>;
pub type OutboundReceiver = UnboundedReceiver<Vec<u8>>;

struct Inner {
    id: ConnectionId,
    outbound: OutboundSender,
    closed: AtomicBool,
    // `Some(code)` once closed; wakes both transport loops
    closing: watch::Sender<Option<CloseCode>>,
    closing_rx: watch::Receiver<Option<CloseCode>>,
    registry: Weak<Registry>,
    events: EventBus<ConnectionEvent>,
}

/// Handle to one client; clones refer to the same connection.
///
/// Writes are queued to the transport writer and never wait for it. The
/// queue is unbounded, so a peer that stops reading makes it grow without
/// limit until the connection is closed.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, registry: Weak<Registry>, outbound: OutboundSender) -> Self {
        let (closing, closing_rx) = watch::channel(None);
        ConnectionHandle {
            inner: Arc::new(Inner {
                id,
                outbound,
                closed: AtomicBool::new(false),
                closing,
                closing_rx,
                registry,
                events: EventBus::new(),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The code sent in the close frame; `None` while the connection is open.
    pub fn close_code(&self) -> Option<CloseCode> {
        *self.inner.closing_rx.borrow()
    }

    pub fn send(&self, payload: &[u8], opcode: Opcode, fin: bool) -> Result<(), WsError> {
        if self.is_closed() {
            return Err(WsError::ConnectionClosed(self.id()));
        }
        self.inner
            .outbound
            .send(encode_frame(payload, opcode, fin))
            .map_err(|_| WsError::ConnectionClosed(self.id()))
    }

    pub fn send_text(&self, text: &str) -> Result<(), WsError> {
        self.send(text.as_bytes(), Opcode::Text, true)
    }

    pub fn send_binary(&self, data: &[u8]) -> Result<(), WsError> {
        self.send(data, Opcode::Binary, true)
    }

    pub fn ping(&self) -> Result<(), WsError> {
        self.send(&[], Opcode::Ping, true)
    }

    pub fn pong(&self) -> Result<(), WsError> {
        self.send(&[], Opcode::Pong, true)
    }

    pub fn close(&self) {
        self.close_with(CloseCode::Normal)
    }

    /// Closes the connection once; later calls do nothing.
    ///
    /// Reading stops at once. The writer gets the server's close timeout to
    /// flush frames already queued and the close frame, then the transport
    /// is dropped whether or not the peer kept up.
    pub fn close_with(&self, code: CloseCode) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(conn_id = %self.id(), code = code.as_u16(), "closing connection");
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.remove(self.id());
        }
        // `closing_rx` lives in `inner`, so the channel is never closed here
        let _ = self.inner.closing.send(Some(code));
        self.inner.events.emit(&ConnectionEvent::Close);
        // listeners often capture a handle to this connection
        self.inner.events.clear();
    }

    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Feeds one transport chunk through `reassembler` and acts on every
    /// complete frame, stopping as soon as the connection closes.
    pub fn receive(&self, reassembler: &mut FrameReassembler, chunk: &[u8]) {
        if self.is_closed() {
            return;
        }
        reassembler.extend(chunk);
        while !self.is_closed() {
            match reassembler.next_incoming() {
                Ok(Some(incoming)) => self.handle_incoming(incoming),
                Ok(None) => break,
                Err(e) => {
                    self.protocol_violation(e);
                    break;
                }
            }
        }
        if self.is_closed() {
            reassembler.reset();
        }
    }

    fn handle_incoming(&self, incoming: Incoming) {
        match incoming {
            Incoming::Message(message) => {
                trace!(conn_id = %self.id(), kind = %message.kind, length = message.payload.len(), "message");
                self.inner.events.emit(&ConnectionEvent::Message(message));
            }
            Incoming::Ping(payload) => {
                if let Err(e) = self.send(&payload, Opcode::Pong, true) {
                    debug!(conn_id = %self.id(), error = %e, "pong not sent");
                }
            }
            Incoming::Pong(_) => trace!(conn_id = %self.id(), "pong received"),
            Incoming::Close(payload) => {
                let code = payload
                    .get(..2)
                    .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]));
                debug!(conn_id = %self.id(), ?code, "peer requested close");
                self.close();
            }
        }
    }

    fn protocol_violation(&self, err: ProtocolError) {
        warn!(conn_id = %self.id(), error = %err, "protocol violation");
        self.close_with(err.close_code());
    }

    /// Reports a transport failure, then forces the connection closed.
    pub(crate) fn fail(&self, err: io::Error) {
        warn!(conn_id = %self.id(), error = %err, "transport error");
        self.inner.events.emit(&ConnectionEvent::Error(err));
        self.close_with(CloseCode::GoingAway);
    }

    fn closing(&self) -> watch::Receiver<Option<CloseCode>> {
        self.inner.closing_rx.clone()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) async fn read_messages<R>(
    connection: ConnectionHandle,
    mut reader: R,
    mut reassembler: FrameReassembler,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    // an empty buffer would read as end of stream
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut closing = connection.closing();
    while !connection.is_closed() {
        let read = tokio::select! {
            _ = closing.changed() => break,
            read = reader.read(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!(conn_id = %connection.id(), "peer closed the stream");
                connection.close();
            }
            Ok(n) => connection.receive(&mut reassembler, &buf[..n]),
            Err(e) => connection.fail(e),
        }
    }
    trace!(conn_id = %connection.id(), "stopping reading messages");
}

pub(crate) async fn write_messages<W>(
    connection: ConnectionHandle,
    mut writer: W,
    mut receiver: OutboundReceiver,
    close_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut closing = connection.closing();
    let mut deadline = None;
    while deadline.is_none() {
        if connection.is_closed() {
            deadline = Some(Instant::now() + close_timeout);
            break;
        }
        let bytes = tokio::select! {
            _ = closing.changed() => continue,
            bytes = receiver.recv() => match bytes {
                Some(bytes) => bytes,
                None => break,
            },
        };
        let write = writer.write_all(&bytes);
        tokio::pin!(write);
        let result = tokio::select! {
            result = &mut write => result,
            _ = closing.changed() => {
                // the frame in flight may finish, but only within the grace period
                let at = Instant::now() + close_timeout;
                deadline = Some(at);
                match timeout_at(at, &mut write).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(conn_id = %connection.id(), "close timed out mid-frame, dropping transport");
                        return;
                    }
                }
            }
        };
        if let Err(e) = result {
            connection.fail(e);
            return;
        }
    }

    let at = deadline.unwrap_or_else(|| Instant::now() + close_timeout);
    let code = connection.close_code().unwrap_or(CloseCode::Normal);
    let flush = async {
        while let Ok(bytes) = receiver.try_recv() {
            writer.write_all(&bytes).await?;
        }
        writer.write_all(&encode_close_frame(code)).await?;
        writer.shutdown().await?;
        Ok::<_, io::Error>(())
    };
    match timeout_at(at, flush).await {
        Ok(Ok(())) => trace!(conn_id = %connection.id(), "stopping writing messages"),
        Ok(Err(e)) => debug!(conn_id = %connection.id(), error = %e, "close not delivered"),
        Err(_) => debug!(conn_id = %connection.id(), "close timed out, dropping transport"),
    }
}

/// Runs both halves of a connection until it is closed.
///
/// Both halves of the transport are dropped when this returns.
pub(crate) async fn drive<R, W>(
    connection: ConnectionHandle,
    reader: R,
    writer: W,
    receiver: OutboundReceiver,
    config: ServerConfig,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let id = connection.id();
    join(
        read_messages(
            connection.clone(),
            reader,
            FrameReassembler::from_config(&config),
            config.read_buffer_size,
        ),
        write_messages(connection, writer, receiver, config.close_timeout),
    )
    .await;
    debug!(conn_id = %id, "connection finished");
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;
    use std::task::{Context, Poll};

    use tokio::io::{duplex, split, ReadBuf};
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::timeout;

    use super::*;
    use crate::ws::frame::{decode_frame, Frame};
    use crate::ws::read::Message;
    use crate::ws::write::encode_masked_frame;

    const KEY: [u8; 4] = [9, 8, 7, 6];

    fn connection() -> (Arc<Registry>, ConnectionHandle, OutboundReceiver) {
        let registry = Arc::new(Registry::new());
        let (sender, receiver) = unbounded_channel();
        let connection = ConnectionHandle::new(42, Arc::downgrade(&registry), sender);
        registry.insert(connection.clone());
        (registry, connection, receiver)
    }

    fn sent_frames(receiver: &mut OutboundReceiver) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(bytes) = receiver.try_recv() {
            let (frame, _) = decode_frame(&bytes).unwrap().unwrap();
            frames.push(frame);
        }
        frames
    }

    fn collect_messages(connection: &ConnectionHandle) -> Arc<parking_lot::Mutex<Vec<Message>>> {
        let messages = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        connection.on(move |event| {
            if let ConnectionEvent::Message(message) = event {
                sink.lock().push(message.clone());
            }
            Ok(())
        });
        messages
    }

    fn record_events(connection: &ConnectionHandle) -> Arc<parking_lot::Mutex<Vec<&'static str>>> {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connection.on(move |event| {
            let name = match event {
                ConnectionEvent::Message(_) => "message",
                ConnectionEvent::Close => "close",
                ConnectionEvent::Error(_) => "error",
            };
            sink.lock().push(name);
            Ok(())
        });
        seen
    }

    /// A transport writer whose peer has gone away.
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// A transport reader that never yields data.
    struct IdleReader;

    impl AsyncRead for IdleReader {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[test]
    fn send_writes_unmasked_frame() {
        let (_registry, connection, mut receiver) = connection();
        connection.send(b"hi", Opcode::Binary, false).unwrap();
        connection.send_text("there").unwrap();
        let frames = sent_frames(&mut receiver);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].opcode, Opcode::Binary);
        assert!(!frames[0].fin);
        assert_eq!(frames[1].payload, b"there");
    }

    #[test]
    fn ping_and_pong_are_empty_control_frames() {
        let (_registry, connection, mut receiver) = connection();
        connection.ping().unwrap();
        connection.pong().unwrap();
        let frames = sent_frames(&mut receiver);
        assert_eq!(frames[0].opcode, Opcode::Ping);
        assert_eq!(frames[1].opcode, Opcode::Pong);
        assert!(frames.iter().all(|f| f.payload.is_empty()));
    }

    #[test]
    fn inbound_ping_is_answered_with_pong() {
        let (_registry, connection, mut receiver) = connection();
        let messages = collect_messages(&connection);
        let mut reassembler = FrameReassembler::default();
        connection.receive(
            &mut reassembler,
            &encode_masked_frame(b"tick", Opcode::Ping, true, KEY),
        );
        let frames = sent_frames(&mut receiver);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Pong);
        assert_eq!(frames[0].payload, b"tick");
        assert!(messages.lock().is_empty());
    }

    #[test]
    fn inbound_close_deregisters_and_fires_once() {
        let (registry, connection, mut receiver) = connection();
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        connection.on(move |event| {
            if let ConnectionEvent::Close = event {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });
        assert_eq!(connection.close_code(), None);
        let mut reassembler = FrameReassembler::default();
        connection.receive(
            &mut reassembler,
            &encode_masked_frame(&[], Opcode::Close, true, KEY),
        );
        connection.close_with(CloseCode::GoingAway);

        assert!(connection.is_closed());
        assert!(!registry.contains(42));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        // the close frame is written by the transport loop, not queued
        assert_eq!(connection.close_code(), Some(CloseCode::Normal));
        assert!(sent_frames(&mut receiver).is_empty());
    }

    #[test]
    fn send_after_close_fails() {
        let (_registry, connection, _receiver) = connection();
        connection.close();
        assert!(matches!(
            connection.send_text("late"),
            Err(WsError::ConnectionClosed(42))
        ));
    }

    #[test]
    fn messages_are_emitted_in_order() {
        let (_registry, connection, _receiver) = connection();
        let messages = collect_messages(&connection);
        let mut chunk = encode_masked_frame(b"1", Opcode::Text, true, KEY);
        chunk.extend(encode_masked_frame(b"2", Opcode::Text, true, KEY));
        chunk.extend(encode_masked_frame(b"3", Opcode::Binary, true, KEY));
        let mut reassembler = FrameReassembler::default();
        connection.receive(&mut reassembler, &chunk);

        let messages = messages.lock();
        let payloads: Vec<&[u8]> = messages.iter().map(|m| &m.payload[..]).collect();
        assert_eq!(payloads, vec![&b"1"[..], &b"2"[..], &b"3"[..]]);
        assert_eq!(messages[2].kind, Opcode::Binary);
    }

    #[test]
    fn frames_after_close_in_same_chunk_are_ignored() {
        let (_registry, connection, _receiver) = connection();
        let messages = collect_messages(&connection);
        let mut chunk = encode_masked_frame(b"before", Opcode::Text, true, KEY);
        chunk.extend(encode_masked_frame(&[], Opcode::Close, true, KEY));
        chunk.extend(encode_masked_frame(b"after", Opcode::Text, true, KEY));
        let mut reassembler = FrameReassembler::default();
        connection.receive(&mut reassembler, &chunk);
        assert_eq!(messages.lock().len(), 1);
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn protocol_error_closes_with_1002() {
        let (registry, connection, _receiver) = connection();
        let mut reassembler = FrameReassembler::default();
        connection.receive(&mut reassembler, &[0x8B, 0x80, 0, 0, 0, 0]);
        assert!(connection.is_closed());
        assert!(registry.is_empty());
        assert_eq!(connection.close_code(), Some(CloseCode::ProtocolError));
    }

    #[test]
    fn oversized_message_closes_with_1009() {
        let (_registry, connection, _receiver) = connection();
        let mut reassembler = FrameReassembler::new(8, 8);
        connection.receive(
            &mut reassembler,
            &encode_masked_frame(&[0; 9], Opcode::Binary, true, KEY),
        );
        assert_eq!(connection.close_code(), Some(CloseCode::TooBig));
    }

    #[test]
    fn transport_error_is_reported_then_closes() {
        let (_registry, connection, _receiver) = connection();
        let seen = record_events(&connection);
        connection.fail(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(*seen.lock(), vec!["error", "close"]);
        assert!(connection.is_closed());
        assert_eq!(connection.close_code(), Some(CloseCode::GoingAway));
    }

    #[tokio::test]
    async fn loops_stop_on_peer_close() {
        let (registry, connection, receiver) = connection();
        let (client, server) = duplex(1024);
        let (reader, writer) = split(server);
        let config = ServerConfig::default().read_buffer_size(64);
        let task = tokio::spawn(drive(connection.clone(), reader, writer, receiver, config));

        let (mut client_reader, mut client_writer) = split(client);
        client_writer
            .write_all(&encode_masked_frame(&[], Opcode::Close, true, KEY))
            .await
            .unwrap();
        let mut echoed = Vec::new();
        client_reader.read_to_end(&mut echoed).await.unwrap();
        task.await.unwrap();

        let (frame, _) = decode_frame(&echoed).unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Close);
        assert_eq!(frame.payload, 1000u16.to_be_bytes());
        assert!(connection.is_closed());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn queued_frames_precede_close_frame() {
        let (_registry, connection, receiver) = connection();
        let (mut client, server) = duplex(1024);
        let (reader, writer) = split(server);
        connection.send_text("last words").unwrap();
        connection.close();
        let task = tokio::spawn(drive(connection, reader, writer, receiver, ServerConfig::default()));

        let mut written = Vec::new();
        client.read_to_end(&mut written).await.unwrap();
        task.await.unwrap();

        let (first, used) = decode_frame(&written).unwrap().unwrap();
        assert_eq!(first.payload, b"last words");
        let (second, _) = decode_frame(&written[used..]).unwrap().unwrap();
        assert_eq!(second.opcode, Opcode::Close);
    }

    #[tokio::test]
    async fn zero_read_buffer_still_reads() {
        let (_registry, connection, receiver) = connection();
        let (tx, mut rx) = unbounded_channel();
        connection.on(move |event| {
            if let ConnectionEvent::Message(message) = event {
                let _ = tx.send(message.payload.clone());
            }
            Ok(())
        });
        let (mut client, server) = duplex(1024);
        let (reader, writer) = split(server);
        // struct update skips the clamp in the builder setter
        let config = ServerConfig {
            read_buffer_size: 0,
            ..ServerConfig::default()
        };
        let task = tokio::spawn(drive(connection.clone(), reader, writer, receiver, config));

        client
            .write_all(&encode_masked_frame(b"byte by byte", Opcode::Text, true, KEY))
            .await
            .unwrap();
        let payload = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(payload.unwrap(), b"byte by byte");
        assert!(!connection.is_closed());

        connection.close();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn write_failure_is_reported_then_closes() {
        let (registry, connection, receiver) = connection();
        let seen = record_events(&connection);
        let task = tokio::spawn(drive(
            connection.clone(),
            IdleReader,
            BrokenWriter,
            receiver,
            ServerConfig::default(),
        ));

        connection.send_text("lost").unwrap();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert_eq!(*seen.lock(), vec!["error", "close"]);
        assert!(connection.is_closed());
        assert!(registry.is_empty());
        assert_eq!(connection.close_code(), Some(CloseCode::GoingAway));
    }
}
