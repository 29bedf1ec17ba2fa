use std::fmt;

use points_commit::Address;
use serde::{Deserialize, Serialize};

use crate::{
    store::LedgerState,
    types::{whole_points, Amount, SeasonId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "season_id", rename_all = "snake_case")]
pub enum LeaderboardScope {
    Global,
    Season(SeasonId),
}

impl LeaderboardScope {
    pub fn includes(&self, season_id: SeasonId) -> bool {
        match self {
            LeaderboardScope::Global => true,
            LeaderboardScope::Season(id) => *id == season_id,
        }
    }
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderboardScope::Global => f.write_str("global"),
            LeaderboardScope::Season(id) => write!(f, "season-{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub participant: Address,
    pub scope: LeaderboardScope,
    pub total_points: Amount,
    pub rank: u32,
}

/// Rebuild the rows for `scope` from scratch.
///
/// Highest total first; equal totals order by participant address.
pub fn rebuild(state: &LedgerState, scope: LeaderboardScope) -> Vec<LeaderboardRow> {
    let mut totals: Vec<(Address, Amount)> = state
        .totals(scope)
        .into_iter()
        .filter(|(_, total)| *total > 0)
        .collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    totals
        .into_iter()
        .enumerate()
        .map(|(idx, (participant, total_points))| LeaderboardRow {
            participant,
            scope,
            total_points,
            rank: (idx + 1) as u32,
        })
        .collect()
}

/// Status tier by whole points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    pub fn for_units(units: Amount) -> Tier {
        match whole_points(units) {
            p if p >= 1_000_000 => Tier::Diamond,
            p if p >= 100_000 => Tier::Platinum,
            p if p >= 10_000 => Tier::Gold,
            p if p >= 1_000 => Tier::Silver,
            _ => Tier::Bronze,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
            Tier::Diamond => "diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Chain, EntryKey, POINTS_SCALE};
    use chrono::Utc;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn ranks_by_total_then_address() {
        let mut state = LedgerState::new();
        let now = Utc::now();
        for (who, season, amount) in [(3u8, 1, 50u128), (1, 1, 50), (2, 1, 80), (2, 2, 1), (4, 2, 500)] {
            state.credit(
                EntryKey {
                    participant: addr(who),
                    chain: Chain::Ethereum,
                    season_id: season,
                    action: Action::Hold,
                },
                amount,
                now,
            );
        }

        let season1 = rebuild(&state, LeaderboardScope::Season(1));
        let order: Vec<_> = season1.iter().map(|r| (r.participant, r.rank)).collect();
        assert_eq!(order, vec![(addr(2), 1), (addr(1), 2), (addr(3), 3)]);

        let global = rebuild(&state, LeaderboardScope::Global);
        assert_eq!(global[0].participant, addr(4));
        assert_eq!(global[1].total_points, 81);
        assert!(global.iter().all(|r| r.scope == LeaderboardScope::Global));
    }

    #[test]
    fn tiers_follow_whole_points() {
        assert_eq!(Tier::for_units(999 * POINTS_SCALE), Tier::Bronze);
        assert_eq!(Tier::for_units(1_000 * POINTS_SCALE), Tier::Silver);
        assert_eq!(Tier::for_units(250_000 * POINTS_SCALE), Tier::Platinum);
        assert_eq!(Tier::for_units(5_000_000 * POINTS_SCALE), Tier::Diamond);
    }

    #[test]
    fn scope_serializes_with_tag() {
        let json = serde_json::to_string(&LeaderboardScope::Season(3)).unwrap();
        assert_eq!(json, r#"{"type":"season","season_id":3}"#);
        let json = serde_json::to_string(&LeaderboardScope::Global).unwrap();
        assert_eq!(json, r#"{"type":"global"}"#);
    }
}
