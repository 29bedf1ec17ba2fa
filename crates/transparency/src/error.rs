use points_commit::CommitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransparencyError {
    #[error("snapshot id {id} must be between 1 and {max}")]
    InvalidSnapshotId { id: u64, max: u64 },

    #[error("invalid snapshot input: {0}")]
    Validation(String),

    /// Path escaped the output root, or persisted artefacts disagree.
    #[error("transparency integrity violation: {0}")]
    Integrity(String),

    #[error("snapshot {0} is already published with different contents")]
    SnapshotConflict(u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl TransparencyError {
    pub fn code(&self) -> &'static str {
        match self {
            TransparencyError::InvalidSnapshotId { .. } => "INVALID_SNAPSHOT_ID",
            TransparencyError::Validation(_) | TransparencyError::Commit(_) => "VALIDATION",
            TransparencyError::Integrity(_) => "INTEGRITY",
            TransparencyError::SnapshotConflict(_) => "SNAPSHOT_CONFLICT",
            TransparencyError::NotFound(_) => "NOT_FOUND",
            TransparencyError::Io(_) | TransparencyError::Serialization(_) => "STORAGE",
        }
    }
}
