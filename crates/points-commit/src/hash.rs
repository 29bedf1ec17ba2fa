//! Keccak-256 hashing in the packed layout an on-chain verifier expects.
//!
//! Leaf encoding is `abi.encodePacked(address, uint256, uint256)`:
//! - address: 20 bytes
//! - points: 32 bytes (uint256 BE)
//! - snapshot_id: 32 bytes (uint256 BE)
//!
//! Total: 84 bytes (fixed)

use sha3::{Digest, Keccak256};

use crate::address::Address;

/// Keccak-256 output (32 bytes).
pub type Hash = [u8; 32];

/// Root of an empty leaf set, and the placeholder used to pad leaf layers.
pub const ZERO_HASH: Hash = [0u8; 32];

const LEAF_ENCODING_SIZE: usize = 20 + 32 + 32;

#[inline]
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Left-pad an unsigned integer into a 32-byte big-endian word.
fn uint256_be(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Hash one participant's committed `(address, points, snapshot_id)` tuple.
pub fn leaf_hash(address: &Address, points: u128, snapshot_id: u64) -> Hash {
    let mut buf = [0u8; LEAF_ENCODING_SIZE];
    buf[..20].copy_from_slice(address.as_bytes());
    buf[20..52].copy_from_slice(&uint256_be(points));
    buf[52..].copy_from_slice(&uint256_be(u128::from(snapshot_id)));
    keccak256(&buf)
}

/// Internal node hash: `keccak256(min(a, b) ‖ max(a, b))`.
///
/// Ordering is bytewise over the hash values, so the result is commutative.
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256::new();
    hasher.update(lo);
    hasher.update(hi);
    hasher.finalize().into()
}
