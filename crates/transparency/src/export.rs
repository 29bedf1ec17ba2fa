use std::{collections::BTreeMap, fmt::Write as _};

use points_commit::Address;
use points_ledger::{whole_points, Action, LeaderboardScope, LedgerState, Tier};
use serde::{Deserialize, Serialize};

/// One participant's committed balance, in whole points.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBalance {
    pub participant: Address,
    pub total_points: u128,
    #[serde(default)]
    pub breakdown: BTreeMap<Action, u128>,
    pub tier: Tier,
}

/// Every participant with a non-zero whole-point total across all seasons.
///
/// The committed total is the floor of the exact unit total; per-action
/// breakdowns are floored individually.
pub fn balances_from_ledger(state: &LedgerState) -> Vec<SnapshotBalance> {
    let mut per_action: BTreeMap<Address, BTreeMap<Action, u128>> = BTreeMap::new();
    for entry in state.entries() {
        let slot = per_action
            .entry(entry.participant)
            .or_default()
            .entry(entry.action)
            .or_default();
        *slot = slot.saturating_add(entry.accumulated);
    }
    state
        .totals(LeaderboardScope::Global)
        .into_iter()
        .filter(|(_, units)| whole_points(*units) > 0)
        .map(|(participant, units)| SnapshotBalance {
            participant,
            total_points: whole_points(units),
            breakdown: per_action
                .remove(&participant)
                .unwrap_or_default()
                .into_iter()
                .map(|(action, units)| (action, whole_points(units)))
                .collect(),
            tier: Tier::for_units(units),
        })
        .collect()
}

/// CSV export of sorted balances. Breakdown columns follow [`Action::ALL`].
pub fn render_csv(snapshot_id: u64, block_number: u64, balances: &[SnapshotBalance]) -> String {
    let mut out = String::from("snapshot_id,block_number,address,total_points");
    for action in Action::ALL {
        out.push(',');
        out.push_str(action.as_str());
    }
    out.push_str(",tier\n");

    for balance in balances {
        // Infallible: fmt::Write for String never errors.
        let _ = write!(
            out,
            "{snapshot_id},{block_number},{},{}",
            balance.participant, balance.total_points
        );
        for action in Action::ALL {
            let _ = write!(out, ",{}", balance.breakdown.get(&action).copied().unwrap_or(0));
        }
        let _ = writeln!(out, ",{}", balance.tier);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use points_ledger::{Chain, EntryKey, POINTS_SCALE};

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn csv_has_header_and_breakdown_columns() {
        let balances = vec![SnapshotBalance {
            participant: addr(0xab),
            total_points: 1_500,
            breakdown: BTreeMap::from([(Action::Stake, 1_200), (Action::ReferralKickback, 300)]),
            tier: Tier::Silver,
        }];
        let csv = render_csv(4, 19_000_000, &balances);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "snapshot_id,block_number,address,total_points,hold,stake,supply,borrow,bridge_boost,liquidity,referral_kickback,tier"
        );
        assert_eq!(
            lines.next().unwrap(),
            "4,19000000,0xabababababababababababababababababababab,1500,0,1200,0,0,0,0,300,silver"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn ledger_balances_floor_and_drop_dust() {
        let mut state = LedgerState::new();
        let now = Utc::now();
        let key = |who, action, season_id| EntryKey {
            participant: addr(who),
            chain: Chain::Ethereum,
            season_id,
            action,
        };
        state.credit(key(1, Action::Hold, 1), 2 * POINTS_SCALE + 600_000, now);
        state.credit(key(1, Action::Hold, 2), 600_000, now);
        state.credit(key(1, Action::Stake, 1), POINTS_SCALE, now);
        state.credit(key(2, Action::Hold, 1), 999_999, now);

        let balances = balances_from_ledger(&state);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].participant, addr(1));
        assert_eq!(balances[0].total_points, 4);
        assert_eq!(balances[0].breakdown[&Action::Hold], 3);
        assert_eq!(balances[0].breakdown[&Action::Stake], 1);
        assert_eq!(balances[0].tier, Tier::Bronze);
    }
}
