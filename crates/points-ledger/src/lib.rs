//! Off-chain points ledger.
//!
//! Balance facts come in from an external observer, accrue dollar-hour points
//! under per-season action multipliers, and land additively in the ledger.
//! Leaderboards are derived wholesale after each accrual cycle. Readers work
//! from an immutable [`LedgerState`] snapshot handed out by the
//! [`PointsStore`], so they never wait on a running cycle.

pub mod accrual;
pub mod leaderboard;
pub mod projection;
pub mod season;
pub mod store;
pub mod types;

mod error;

pub use accrual::{
    AccrualCalculator, AccrualConfig, AccrualReport, Award, KickbackAward, KickbackPolicy,
    NoKickbacks,
};
pub use error::{AccrualSkip, LedgerError};
pub use leaderboard::{LeaderboardRow, LeaderboardScope, Tier};
pub use projection::{implied_apy, project, ApyRow, ApyTable, Projection};
pub use season::{Season, SeasonSchedule};
pub use store::{FileStore, LedgerState, MemoryStore, PointsStore};
pub use types::{
    units_to_points, whole_points, Action, Amount, BalanceFact, Chain, EntryKey, PointsLedgerEntry,
    SeasonId, POINTS_SCALE,
};
