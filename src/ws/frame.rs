use std::convert::TryInto;

use super::consts::*;
use super::error::ProtocolError;
use super::mask::apply_mask;
use super::opcode::Opcode;

/// Everything that precedes the payload of a frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub payload_length: u64,
    pub mask_key: Option<[u8; 4]>,
    /// Bytes consumed before the payload begins, mask key included.
    pub header_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

/// Parses a frame header from the start of `buf`.
///
/// Returns `Ok(None)` while `buf` is shorter than the header it describes,
/// so a caller can wait for more bytes. An `Err` is only returned for a
/// header that can never become valid.
pub fn parse_header(buf: &[u8]) -> Result<Option<FrameHeader>, ProtocolError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let rsv = rsv_bits(buf[0]);
    if rsv != 0 {
        return Err(ProtocolError::ReservedBits(rsv));
    }
    let fin = is_fin(buf[0]);
    let opcode = Opcode::decode(buf[0])?;
    let masked = is_mask(buf[1]);

    let (payload_length, length_end) = match buf[1] & LENGTH_MASK {
        LENGTH_U16 => match buf.get(2..4) {
            Some(bytes) => (u16::from_be_bytes([bytes[0], bytes[1]]) as u64, 4),
            None => return Ok(None),
        },
        LENGTH_U64 => match buf.get(2..10) {
            Some(bytes) => {
                let length = u64::from_be_bytes(read_array(bytes));
                if length >> 63 != 0 {
                    return Err(ProtocolError::LengthOverflow);
                }
                (length, 10)
            }
            None => return Ok(None),
        },
        value => (value as u64, 2),
    };

    let (mask_key, header_length) = if masked {
        match buf.get(length_end..length_end + MASK_KEY_LENGTH) {
            Some(bytes) => (Some(read_array(bytes)), length_end + MASK_KEY_LENGTH),
            None => return Ok(None),
        }
    } else {
        (None, length_end)
    };

    Ok(Some(FrameHeader {
        fin,
        opcode,
        masked,
        payload_length,
        mask_key,
        header_length,
    }))
}

/// Decodes one complete frame from the start of `buf`.
///
/// On success returns the frame with its payload unmasked and the number of
/// bytes it occupied.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    let header = match parse_header(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };
    let available = (buf.len() - header.header_length) as u64;
    if available < header.payload_length {
        return Ok(None);
    }
    let end = header.header_length + header.payload_length as usize;
    let mut payload = buf[header.header_length..end].to_vec();
    apply_mask(&mut payload, header.mask_key);
    let frame = Frame {
        fin: header.fin,
        opcode: header.opcode,
        payload,
    };
    Ok(Some((frame, end)))
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    // callers slice exactly N bytes
    bytes.try_into().unwrap_or([0; N])
}
