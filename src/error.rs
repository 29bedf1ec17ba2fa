use points_commit::CommitError;
use points_ledger::LedgerError;
use referral_module::ReferralError;
use thiserror::Error;
use transparency::TransparencyError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or inconsistent configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("admin token missing or invalid")]
    Unauthorized,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Referral(#[from] ReferralError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transparency(#[from] TransparencyError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CommitError> for AppError {
    fn from(e: CommitError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl AppError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Validation(_) => "VALIDATION",
            AppError::Referral(e) => e.code(),
            AppError::Ledger(LedgerError::UnknownSeason(_)) => "UNKNOWN_SEASON",
            AppError::Ledger(LedgerError::InvalidInput(_) | LedgerError::InvalidFact(_)) => {
                "VALIDATION"
            }
            AppError::Ledger(_) => "LEDGER",
            AppError::Transparency(e) => e.code(),
            AppError::Io(_) => "IO",
            AppError::Json(_) => "JSON",
        }
    }

    /// Whether the caller, not the service, is at fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized
                | AppError::Validation(_)
                | AppError::Referral(_)
                | AppError::Ledger(
                    LedgerError::UnknownSeason(_)
                        | LedgerError::InvalidInput(_)
                        | LedgerError::InvalidFact(_)
                )
                | AppError::Transparency(
                    TransparencyError::InvalidSnapshotId { .. }
                        | TransparencyError::Validation(_)
                        | TransparencyError::Commit(_)
                        | TransparencyError::NotFound(_)
                        | TransparencyError::SnapshotConflict(_)
                )
        )
    }
}
