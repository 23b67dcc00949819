//! Cache entry metadata and the on-disk entry format
//!
//! Entry file layout:
//!
//! ```text
//! [32 bytes] SHA-256 of everything that follows
//! [8 bytes]  created_at, ms since epoch (LE)
//! [8 bytes]  ttl in ms, 0 = none (LE)
//! [4 bytes]  key length (LE)
//! [n bytes]  key (UTF-8)
//! [rest]     payload
//! ```
//!
//! The key travels with the payload so the index can be rebuilt by scanning
//! the directory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the checksum header
pub const CHECKSUM_LEN: usize = 32;

const FIXED_HEADER_LEN: usize = 8 + 8 + 4;

/// Extension of entry files
pub const ENTRY_EXTENSION: &str = "entry";

/// Stable, collision-resistant file name for a key
pub fn file_name_for(key: &str) -> String {
    format!("{}.{}", hex::encode(Sha256::digest(key.as_bytes())), ENTRY_EXTENSION)
}

/// Index record for one live entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller's key
    pub key: String,
    /// Backing file name inside the cache directory
    pub file_name: String,
    /// Size of the backing file in bytes
    pub size: u64,
    /// Creation time, ms since epoch
    pub created_at: u64,
    /// Last successful read (or write), ms since epoch
    pub last_accessed: u64,
    /// Successful reads
    pub access_count: u64,
    /// Time to live in ms
    pub ttl_ms: Option<u64>,
    /// Hex SHA-256 of the file body
    pub checksum: String,
}

impl CacheEntry {
    /// Whether the TTL has elapsed at `now_ms`
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms >= self.created_at.saturating_add(ttl),
            None => false,
        }
    }
}

/// An entry file, encoded
pub(crate) struct Encoded {
    pub(crate) bytes: Vec<u8>,
    pub(crate) checksum: String,
}

/// An entry file, decoded and verified
#[derive(Debug)]
pub(crate) struct Decoded {
    pub(crate) key: String,
    pub(crate) created_at: u64,
    pub(crate) ttl_ms: Option<u64>,
    pub(crate) payload: Vec<u8>,
    pub(crate) checksum: String,
}

/// Why an entry file was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Corruption {
    Truncated,
    ChecksumMismatch,
    BadKey,
}

pub(crate) fn encode(key: &str, created_at: u64, ttl_ms: Option<u64>, payload: &[u8]) -> Encoded {
    let key_bytes = key.as_bytes();
    let mut body = Vec::with_capacity(FIXED_HEADER_LEN + key_bytes.len() + payload.len());
    body.extend_from_slice(&created_at.to_le_bytes());
    body.extend_from_slice(&ttl_ms.unwrap_or(0).to_le_bytes());
    body.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
    body.extend_from_slice(key_bytes);
    body.extend_from_slice(payload);

    let digest = Sha256::digest(&body);
    let mut bytes = Vec::with_capacity(CHECKSUM_LEN + body.len());
    bytes.extend_from_slice(&digest);
    bytes.extend_from_slice(&body);

    Encoded {
        bytes,
        checksum: hex::encode(digest),
    }
}

/// Size of the encoded file for a key and payload
pub(crate) fn encoded_len(key: &str, payload_len: usize) -> u64 {
    (CHECKSUM_LEN + FIXED_HEADER_LEN + key.len() + payload_len) as u64
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded, Corruption> {
    if bytes.len() < CHECKSUM_LEN + FIXED_HEADER_LEN {
        return Err(Corruption::Truncated);
    }
    let (stored, body) = bytes.split_at(CHECKSUM_LEN);
    let digest = Sha256::digest(body);
    if digest.as_slice() != stored {
        return Err(Corruption::ChecksumMismatch);
    }

    let read_u64 = |at: usize| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&body[at..at + 8]);
        u64::from_le_bytes(buf)
    };
    let created_at = read_u64(0);
    let ttl = read_u64(8);
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&body[16..20]);
    let key_len = u32::from_le_bytes(len_buf) as usize;

    let key_end = FIXED_HEADER_LEN
        .checked_add(key_len)
        .filter(|end| *end <= body.len())
        .ok_or(Corruption::Truncated)?;
    let key = std::str::from_utf8(&body[FIXED_HEADER_LEN..key_end])
        .map_err(|_| Corruption::BadKey)?
        .to_string();

    Ok(Decoded {
        key,
        created_at,
        ttl_ms: if ttl == 0 { None } else { Some(ttl) },
        payload: body[key_end..].to_vec(),
        checksum: hex::encode(digest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let encoded = encode("classify:abc", 1_000, Some(60_000), b"payload");
        assert_eq!(encoded.bytes.len() as u64, encoded_len("classify:abc", 7));

        let decoded = decode(&encoded.bytes).unwrap();
        assert_eq!(decoded.key, "classify:abc");
        assert_eq!(decoded.created_at, 1_000);
        assert_eq!(decoded.ttl_ms, Some(60_000));
        assert_eq!(decoded.payload, b"payload");
        assert_eq!(decoded.checksum, encoded.checksum);
    }

    #[test]
    fn test_flipped_byte_detected() {
        let mut bytes = encode("k", 1, None, b"value").bytes;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(decode(&bytes).unwrap_err(), Corruption::ChecksumMismatch);
    }

    #[test]
    fn test_truncated_detected() {
        let bytes = encode("k", 1, None, b"value").bytes;
        assert_eq!(decode(&bytes[..10]).unwrap_err(), Corruption::Truncated);
    }

    #[test]
    fn test_file_names_stable_and_distinct() {
        assert_eq!(file_name_for("a"), file_name_for("a"));
        assert_ne!(file_name_for("a"), file_name_for("b"));
        assert!(file_name_for("a").ends_with(".entry"));
        assert_eq!(file_name_for("a").len(), 64 + 6);
    }

    #[test]
    fn test_expiry() {
        let entry = CacheEntry {
            key: "k".into(),
            file_name: file_name_for("k"),
            size: 10,
            created_at: 1_000,
            last_accessed: 1_000,
            access_count: 0,
            ttl_ms: Some(500),
            checksum: String::new(),
        };
        assert!(!entry.is_expired_at(1_499));
        assert!(entry.is_expired_at(1_500));
    }
}
