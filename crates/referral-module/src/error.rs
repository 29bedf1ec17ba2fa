use points_commit::Address;
use thiserror::Error;

/// Referral failures. All are recoverable and safe to show to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferralError {
    #[error("referral code {0:?} does not exist")]
    InvalidCode(String),

    #[error("referral code {0:?} is malformed")]
    MalformedCode(String),

    #[error("{0} cannot use their own referral code")]
    SelfReferral(Address),

    #[error("{0} already has a referrer")]
    AlreadyReferred(Address),

    #[error("referral code {code:?} reached its limit of {limit} referees")]
    CodeExhausted { code: String, limit: u32 },

    #[error("linking {referee} under {referrer} would create a referral cycle")]
    CircularReferral { referee: Address, referrer: Address },

    #[error("{owner} already owns the maximum of {limit} codes")]
    CodeLimitReached { owner: Address, limit: u32 },

    #[error("could not generate a unique code after {0} attempts")]
    CodeGenerationExhausted(u32),

    #[error("invalid participant: {0}")]
    InvalidParticipant(String),

    #[error("referral state persistence failed: {0}")]
    Persistence(String),
}

impl ReferralError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ReferralError::InvalidCode(_) => "INVALID_CODE",
            ReferralError::MalformedCode(_) => "MALFORMED_CODE",
            ReferralError::SelfReferral(_) => "SELF_REFERRAL",
            ReferralError::AlreadyReferred(_) => "ALREADY_REFERRED",
            ReferralError::CodeExhausted { .. } => "CODE_EXHAUSTED",
            ReferralError::CircularReferral { .. } => "CIRCULAR_REFERRAL",
            ReferralError::CodeLimitReached { .. } => "CODE_LIMIT_REACHED",
            ReferralError::CodeGenerationExhausted(_) => "CODE_GENERATION_EXHAUSTED",
            ReferralError::InvalidParticipant(_) => "INVALID_PARTICIPANT",
            ReferralError::Persistence(_) => "PERSISTENCE",
        }
    }
}

impl From<std::io::Error> for ReferralError {
    fn from(e: std::io::Error) -> Self {
        ReferralError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ReferralError {
    fn from(e: serde_json::Error) -> Self {
        ReferralError::Persistence(e.to_string())
    }
}
