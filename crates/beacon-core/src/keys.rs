//! Key and value encodings at the DHT boundary.
//!
//! Service keys are opaque strings above the DHT adapter and travel as the
//! hex encoding of their UTF-8 bytes. Immutable items are addressed by a
//! 20-byte id, written as 40 hex characters on the wire.

/// Byte length of a DHT item id.
pub const ITEM_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("item id must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("key is not valid UTF-8")]
    InvalidUtf8,
}

/// Hex-encode a service key.
pub fn encode_key(key: &str) -> String {
    hex::encode(key.as_bytes())
}

/// Reverse of [`encode_key`].
pub fn decode_key(hashed: &str) -> Result<String, KeyError> {
    let bytes = hex::decode(hashed).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| KeyError::InvalidUtf8)
}

/// Parse a hex item id into its raw bytes.
pub fn parse_item_id(hashed: &str) -> Result<[u8; ITEM_ID_LEN], KeyError> {
    let bytes = hex::decode(hashed).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
    if bytes.len() != ITEM_ID_LEN {
        return Err(KeyError::InvalidLength {
            expected: ITEM_ID_LEN,
            actual: bytes.len(),
        });
    }
    let mut id = [0u8; ITEM_ID_LEN];
    id.copy_from_slice(&bytes);
    Ok(id)
}

/// Raw DHT value to a string. Invalid sequences become U+FFFD.
pub fn decode_value(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
