use std::fmt;

use chrono::{DateTime, Utc};
use points_commit::Address;

use crate::types::SeasonId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown season {0}")]
    UnknownSeason(SeasonId),
    #[error("invalid season configuration: {0}")]
    InvalidSeason(String),
    #[error("invalid balance fact: {0}")]
    InvalidFact(String),
    #[error("duplicate balance fact for {participant} at {timestamp}")]
    DuplicateFact {
        participant: Address,
        timestamp: DateTime<Utc>,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("ledger persistence failed: {0}")]
    Persistence(String),
    #[error("ledger encoding failed: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

/// Reasons an otherwise valid fact earns nothing. Not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualSkip {
    /// Season has no positive multiplier for the fact's action.
    NoMultiplier,
    /// `usd_value × multiplier × hours` rounded to zero or below.
    NonPositivePoints,
}

impl fmt::Display for AccrualSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccrualSkip::NoMultiplier => f.write_str("no multiplier"),
            AccrualSkip::NonPositivePoints => f.write_str("non-positive points"),
        }
    }
}
