use std::fmt;

use chrono::{DateTime, Utc};
use points_commit::Address;
use serde::{Deserialize, Serialize};

/// Integer point units held by the ledger.
pub type Amount = u128;
pub type SeasonId = u32;

/// 1 point = 1e6 ledger units.
pub const POINTS_SCALE: Amount = 1_000_000;

/// Whole points committed in snapshots (floor).
pub fn whole_points(units: Amount) -> Amount {
    units / POINTS_SCALE
}

pub fn units_to_points(units: Amount) -> f64 {
    units as f64 / POINTS_SCALE as f64
}

/// The two networks the protocol runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Ethereum,
    Canton,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Ethereum, Chain::Canton];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Canton => "canton",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Hold,
    Stake,
    Supply,
    Borrow,
    BridgeBoost,
    Liquidity,
    /// Points credited to upstream referrers. Never observed directly.
    ReferralKickback,
}

impl Action {
    /// Actions a balance observer may report.
    pub const EARNING: [Action; 6] = [
        Action::Hold,
        Action::Stake,
        Action::Supply,
        Action::Borrow,
        Action::BridgeBoost,
        Action::Liquidity,
    ];

    pub const ALL: [Action; 7] = [
        Action::Hold,
        Action::Stake,
        Action::Supply,
        Action::Borrow,
        Action::BridgeBoost,
        Action::Liquidity,
        Action::ReferralKickback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hold => "hold",
            Action::Stake => "stake",
            Action::Supply => "supply",
            Action::Borrow => "borrow",
            Action::BridgeBoost => "bridge_boost",
            Action::Liquidity => "liquidity",
            Action::ReferralKickback => "referral_kickback",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a participant's position. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceFact {
    pub timestamp: DateTime<Utc>,
    pub chain: Chain,
    pub participant: Address,
    pub action: Action,
    /// Token amount as reported by the observer, kept verbatim.
    pub raw_balance: String,
    pub usd_value: f64,
    pub season_id: SeasonId,
}

/// Key of one additive ledger row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub participant: Address,
    pub chain: Chain,
    pub season_id: SeasonId,
    pub action: Action,
}

/// Accumulated points for one (participant, chain, season, action).
/// Only ever grows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsLedgerEntry {
    pub participant: Address,
    pub chain: Chain,
    pub season_id: SeasonId,
    pub action: Action,
    pub accumulated: Amount,
    pub last_fact_timestamp: DateTime<Utc>,
}

impl PointsLedgerEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            participant: self.participant,
            chain: self.chain,
            season_id: self.season_id,
            action: self.action,
        }
    }
}
