/// Applies the 4-byte XOR mask in place; `None` leaves the payload unchanged.
///
/// Masking is an involution, so the same call both masks and unmasks.
pub fn apply_mask(payload: &mut [u8], key: Option<[u8; 4]>) {
    if let Some(key) = key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }
}
