pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV_MASK: u8 = 0b0111_0000;
pub const OPCODE_MASK: u8 = 0b0000_1111;
pub const LENGTH_MASK: u8 = 0b0111_1111;
pub const MASKED_MASK: u8 = 0b1000_0000;

// values of the 7-bit length field announcing an extended length
pub const LENGTH_U16: u8 = 126;
pub const LENGTH_U64: u8 = 127;

pub const MAX_LENGTH_U7: usize = 125;
pub const MAX_LENGTH_U16: usize = 65535;

/// Control frames may not carry more than this many payload bytes.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

pub const MASK_KEY_LENGTH: usize = 4;

pub const WS_MAGIC_CONST: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const fn is_fin(byte: u8) -> bool {
    (byte & FIN_MASK) == FIN_MASK
}
pub const fn rsv_bits(byte: u8) -> u8 {
    (byte & RSV_MASK) >> 4
}
pub const fn is_mask(byte: u8) -> bool {
    (byte & MASKED_MASK) == MASKED_MASK
}
