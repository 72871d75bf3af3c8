use super::consts::*;

/// Encodes the payload length using the smallest tier that fits, with the
/// mask bit set on the first byte when `masked` is true.
pub fn encode_length(length: usize, masked: bool) -> Vec<u8> {
    let mask_bit = if masked { MASKED_MASK } else { 0 };
    if length <= MAX_LENGTH_U7 {
        // the first byte is the length
        vec![length as u8 | mask_bit]
    } else if length <= MAX_LENGTH_U16 {
        // the first byte is 126, read the next 2 bytes as u16 for a length
        [&[LENGTH_U16 | mask_bit][..], &(length as u16).to_be_bytes()].concat()
    } else {
        // the first byte is 127, read the next 8 bytes as u64 for a length
        [&[LENGTH_U64 | mask_bit][..], &(length as u64).to_be_bytes()].concat()
    }
}
