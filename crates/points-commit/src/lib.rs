//! Commitment primitives for the points ledger.
//!
//! Everything here has to agree byte-for-byte with a Solidity verifier:
//!
//! * [`hash`]: Keccak-256, packed `(address, uint256, uint256)` leaves and
//!   sorted-pair internal nodes.
//! * [`merkle`]: power-of-two padded tree construction, proof extraction and
//!   replay verification.
//! * [`address`]: 20-byte participant addresses with a canonical lowercase
//!   text form used for ordering.

pub mod address;
pub mod hash;
pub mod merkle;

mod error;

pub use address::Address;
pub use error::CommitError;
pub use hash::{hash_pair, keccak256, leaf_hash, Hash, ZERO_HASH};
pub use merkle::{verify, MerkleTree};

/// Render a hash as `0x`-prefixed lowercase hex.
pub fn to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a 32-byte hash from hex, with or without a `0x` prefix.
pub fn parse_hash(s: &str) -> Result<Hash, CommitError> {
    let s = s.trim();
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| CommitError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| CommitError::InvalidHex(format!("expected 32 bytes, got {}", b.len())))
}
