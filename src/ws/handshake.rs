use hyper::header::{HeaderMap, HeaderValue, SEC_WEBSOCKET_KEY};
use sha1::{Digest, Sha1};

use super::consts::WS_MAGIC_CONST;
use super::error::HandshakeError;

fn sha1(msg: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(msg);
    hasher.finalize().into()
}

/// Computes the `Sec-WebSocket-Accept` token for a client key.
pub fn accept_key(key: &[u8]) -> String {
    let concatenated = [key, WS_MAGIC_CONST].concat();
    let hash = sha1(&concatenated);
    base64::encode(&hash)
}

pub fn sec_websocket_key(headers: &HeaderMap) -> Result<&HeaderValue, HandshakeError> {
    headers
        .get(SEC_WEBSOCKET_KEY)
        .ok_or(HandshakeError::MissingKey)
}

/// The raw `101 Switching Protocols` response for a client key.
pub fn handshake_response(key: &[u8]) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    )
    .into_bytes()
}
