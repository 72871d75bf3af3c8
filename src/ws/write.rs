use super::consts::FIN_MASK;
use super::encoding::encode_length;
use super::error::CloseCode;
use super::mask::apply_mask;
use super::opcode::Opcode;

fn encode_first_byte(opcode: Opcode, fin: bool) -> u8 {
    let fin_bit = if fin { FIN_MASK } else { 0 };
    fin_bit | opcode.encode()
}

/// Builds an unmasked server-to-client frame.
pub fn encode_frame(payload: &[u8], opcode: Opcode, fin: bool) -> Vec<u8> {
    let first_byte: &[u8] = &[encode_first_byte(opcode, fin)];
    let length = encode_length(payload.len(), false);
    [first_byte, &length[..], payload].concat()
}

/// Builds a masked frame, as a client would send it.
pub fn encode_masked_frame(payload: &[u8], opcode: Opcode, fin: bool, key: [u8; 4]) -> Vec<u8> {
    let first_byte: &[u8] = &[encode_first_byte(opcode, fin)];
    let length = encode_length(payload.len(), true);
    let mut masked = payload.to_vec();
    apply_mask(&mut masked, Some(key));
    [first_byte, &length[..], &key[..], &masked[..]].concat()
}

pub fn encode_text(msg: &[u8]) -> Vec<u8> {
    encode_frame(msg, Opcode::Text, true)
}

pub fn encode_binary(msg: &[u8]) -> Vec<u8> {
    encode_frame(msg, Opcode::Binary, true)
}

pub fn encode_ping(payload: &[u8]) -> Vec<u8> {
    encode_frame(payload, Opcode::Ping, true)
}

pub fn encode_pong(payload: &[u8]) -> Vec<u8> {
    encode_frame(payload, Opcode::Pong, true)
}

/// Close frame whose body is the big-endian status code.
pub fn encode_close_frame(code: CloseCode) -> Vec<u8> {
    encode_frame(&code.as_u16().to_be_bytes(), Opcode::Close, true)
}
