use std::fmt;

/// BLAKE3 digest of one part's exact bytes.
///
/// Digests are persisted in the manifest as 64-character lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartDigest([u8; 32]);

impl PartDigest {
    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex digest. Returns `None` for anything else.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != Self::HEX_LEN || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl fmt::Debug for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartDigest({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
