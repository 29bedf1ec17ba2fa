//! Loyalty points service: wires the ledger, referral graph and transparency
//! publisher behind one read-mostly façade.

pub mod api;
pub mod config;
pub mod error;

mod kickbacks;

pub use api::{LeaderboardEntry, ParticipantSummary, PointsApi, SeasonView};
pub use config::AppConfig;
pub use error::AppError;
