use thiserror::Error;

/// Validation failures for commitment inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// Participant address is not 20 bytes of hex.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Hash or other hex payload could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Proof requested for a leaf the tree does not hold.
    #[error("leaf index {index} out of range for {len} leaves")]
    ProofIndexOutOfRange { index: usize, len: usize },
}
