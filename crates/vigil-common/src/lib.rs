// SPDX-License-Identifier: MIT

//! Small shared primitives used by every vigil crate: the 32-byte hash type,
//! hex helpers, wall-clock timestamps and the copy-on-write [`SnapshotMap`]
//! the audit engine iterates over.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use sha2::Digest;

pub mod macros;
pub mod serde_hex;
pub mod snapshot_map;

pub use snapshot_map::MapSnapshot;
pub use snapshot_map::SnapshotMap;

/// A 32-byte hash. Equality and ordering are by byte content.
pub type Hash = [u8; 32];

/// Size in bytes of a [Hash]
pub const HASH_SIZE: usize = 32;

/// Computes the SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> Hash {
    let digest = sha2::Sha256::new().chain_update(data).finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest);
    out
}

/// Lowercase hex rendering of arbitrary bytes
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parses a 64-digit hex string into a [Hash]. A leading `0x` is accepted.
pub fn parse_hash(input: &str) -> Option<Hash> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() != 2 * HASH_SIZE {
        return None;
    }

    let bytes = hex::decode(digits).ok()?;
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&bytes);
    Some(out)
}

/// Milliseconds since the unix epoch, from the system clock
pub fn millis_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sha256() {
        // RFC 6234 test vector for "abc"
        let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(encode_hex(&sha256(b"abc")), expected);
    }

    #[test]
    fn test_parse_hash() {
        let hex = "00".repeat(32);
        assert_eq!(parse_hash(&hex), Some([0u8; 32]));
        assert_eq!(parse_hash(&format!("0x{hex}")), Some([0u8; 32]));

        assert_eq!(parse_hash("beef"), None);
        assert_eq!(parse_hash(&"zz".repeat(32)), None);
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = sha256(b"roundtrip");
        assert_eq!(parse_hash(&encode_hex(&hash)), Some(hash));
    }
}
