use bytes::{Buf, BytesMut};
use tracing::trace;

use super::consts::MAX_CONTROL_PAYLOAD;
use super::error::ProtocolError;
use super::frame::{parse_header, FrameHeader};
use super::mask::apply_mask;
use super::opcode::Opcode;
use crate::config::ServerConfig;

/// A complete, defragmented and unmasked application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Either [`Opcode::Text`] or [`Opcode::Binary`].
    pub kind: Opcode,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// What a connection has to act on after a frame is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Message(Message),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    AwaitingHeader,
    AwaitingPayload(FrameHeader),
}

/// Turns arbitrarily chunked bytes into frames and frames into messages.
///
/// The reassembler never blocks and never reads ahead of what it was fed:
/// a header or payload that is only partially buffered is left in place
/// until the next chunk arrives.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: BytesMut,
    state: ReadState,
    // kind and bytes of the message being assembled
    message: Option<(Opcode, Vec<u8>)>,
    max_frame_size: u64,
    max_message_size: usize,
    closed: bool,
}

impl FrameReassembler {
    pub fn new(max_frame_size: u64, max_message_size: usize) -> Self {
        FrameReassembler {
            buffer: BytesMut::new(),
            state: ReadState::AwaitingHeader,
            message: None,
            max_frame_size,
            max_message_size,
            closed: false,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.max_frame_size, config.max_message_size)
    }

    /// Buffers `chunk` and drains every item it completes.
    ///
    /// Parsing stops after a close frame; bytes that follow it are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Incoming>, ProtocolError> {
        self.extend(chunk);
        let mut items = Vec::new();
        while let Some(item) = self.next_incoming()? {
            items.push(item);
        }
        Ok(items)
    }

    /// Buffers `chunk` without parsing it.
    pub fn extend(&mut self, chunk: &[u8]) {
        if !self.closed {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Advances the state machine until one item is complete or the
    /// buffered bytes run out.
    pub fn next_incoming(&mut self) -> Result<Option<Incoming>, ProtocolError> {
        while !self.closed {
            match self.state {
                ReadState::AwaitingHeader => {
                    let header = match parse_header(&self.buffer) {
                        Ok(Some(header)) => header,
                        Ok(None) => return Ok(None),
                        Err(e) => return Err(self.fail(e)),
                    };
                    if let Err(e) = self.check_header(&header) {
                        return Err(self.fail(e));
                    }
                    self.buffer.advance(header.header_length);
                    self.state = ReadState::AwaitingPayload(header);
                }
                ReadState::AwaitingPayload(header) => {
                    if (self.buffer.len() as u64) < header.payload_length {
                        return Ok(None);
                    }
                    let mut payload = self.buffer.split_to(header.payload_length as usize).to_vec();
                    apply_mask(&mut payload, header.mask_key);
                    self.state = ReadState::AwaitingHeader;
                    match self.complete_frame(header, payload) {
                        Ok(Some(item)) => return Ok(Some(item)),
                        Ok(None) => continue,
                        Err(e) => return Err(self.fail(e)),
                    }
                }
            }
        }
        Ok(None)
    }

    /// Drops buffered bytes, the partial message and the current state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.message = None;
        self.state = ReadState::AwaitingHeader;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes buffered but not consumed yet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn check_header(&self, header: &FrameHeader) -> Result<(), ProtocolError> {
        if header.opcode.is_control() {
            if !header.fin {
                return Err(ProtocolError::FragmentedControlFrame(header.opcode));
            }
            if header.payload_length > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolError::ControlFrameTooLong(header.payload_length));
            }
        }
        if header.payload_length > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                length: header.payload_length,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    fn complete_frame(
        &mut self,
        header: FrameHeader,
        payload: Vec<u8>,
    ) -> Result<Option<Incoming>, ProtocolError> {
        trace!(
            opcode = %header.opcode,
            fin = header.fin,
            length = payload.len(),
            "frame complete"
        );
        match header.opcode {
            Opcode::Close => {
                // a close wins over any fragmented message in progress
                self.reset();
                self.closed = true;
                Ok(Some(Incoming::Close(payload)))
            }
            Opcode::Ping => Ok(Some(Incoming::Ping(payload))),
            Opcode::Pong => Ok(Some(Incoming::Pong(payload))),
            Opcode::Continuation | Opcode::Text | Opcode::Binary => {
                let (kind, mut data) = match self.message.take() {
                    Some(message) => message,
                    None if header.opcode.is_data() => (header.opcode, Vec::new()),
                    // a continuation with no opening frame starts a text message
                    None => (Opcode::Text, Vec::new()),
                };
                let length = data.len() + payload.len();
                if length > self.max_message_size {
                    return Err(ProtocolError::MessageTooLarge {
                        length,
                        max: self.max_message_size,
                    });
                }
                data.extend_from_slice(&payload);
                if header.fin {
                    Ok(Some(Incoming::Message(Message {
                        kind,
                        payload: data,
                    })))
                } else {
                    self.message = Some((kind, data));
                    Ok(None)
                }
            }
        }
    }

    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        self.reset();
        self.closed = true;
        err
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}
