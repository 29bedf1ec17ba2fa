//! Dollar-hour accrual over incoming balance facts.
//!
//! For each fact: points = usd_value × multiplier × hours, where hours is the
//! gap since the previous fact of the same (chain, participant, action)
//! stream, 1h for a stream's first fact, and never more than the configured
//! ceiling. Awards post additively; kickbacks for referrers post in the same
//! cycle under [`Action::ReferralKickback`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use points_commit::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{AccrualSkip, LedgerError},
    leaderboard::{self, LeaderboardScope},
    season::SeasonSchedule,
    store::{LedgerState, PointsStore},
    types::{Action, Amount, BalanceFact, Chain, EntryKey, SeasonId, POINTS_SCALE},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccrualConfig {
    /// Ceiling on credited hours between two observations.
    pub max_elapsed_hours: f64,
    /// Hours credited for a stream's first observation.
    pub bootstrap_hours: f64,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            max_elapsed_hours: 24.0,
            bootstrap_hours: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickbackAward {
    pub referrer: Address,
    pub depth: u32,
    pub amount: Amount,
}

/// Source of referrer kickbacks for newly earned points.
///
/// Implementations only compute; the calculator does the crediting.
pub trait KickbackPolicy {
    fn kickbacks(&self, referee: &Address, earned: Amount) -> Vec<KickbackAward>;
}

/// Policy for deployments without referrals.
pub struct NoKickbacks;

impl KickbackPolicy for NoKickbacks {
    fn kickbacks(&self, _referee: &Address, _earned: Amount) -> Vec<KickbackAward> {
        Vec::new()
    }
}

/// Points credited for one fact.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Award {
    pub participant: Address,
    pub chain: Chain,
    pub season_id: SeasonId,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub hours: f64,
    pub points: Amount,
    pub kickbacks: Vec<KickbackAward>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedFact {
    pub participant: Address,
    pub timestamp: DateTime<Utc>,
    pub reason: AccrualSkip,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RejectedFact {
    pub participant: Address,
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

/// Outcome of one accrual cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AccrualReport {
    pub awards: Vec<Award>,
    pub skipped: Vec<SkippedFact>,
    pub rejected: Vec<RejectedFact>,
    pub rebuilt: Vec<LeaderboardScope>,
}

impl AccrualReport {
    pub fn total_awarded(&self) -> Amount {
        self.awards.iter().map(|a| a.points).sum()
    }

    pub fn total_kickbacks(&self) -> Amount {
        self.awards
            .iter()
            .flat_map(|a| a.kickbacks.iter())
            .map(|k| k.amount)
            .sum()
    }
}

enum Applied {
    Awarded(Award),
    Skipped(AccrualSkip),
}

pub struct AccrualCalculator<S> {
    store: Arc<S>,
    seasons: SeasonSchedule,
    config: AccrualConfig,
    cycle: Mutex<()>,
}

impl<S: PointsStore> AccrualCalculator<S> {
    pub fn new(store: Arc<S>, seasons: SeasonSchedule, config: AccrualConfig) -> Self {
        Self {
            store,
            seasons,
            config,
            cycle: Mutex::new(()),
        }
    }

    pub fn seasons(&self) -> &SeasonSchedule {
        &self.seasons
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one accrual cycle over `facts` and commit it.
    ///
    /// Cycles are serialized. A bad row is logged and left out; the rest of
    /// the batch still commits.
    pub fn process_batch(
        &self,
        mut facts: Vec<BalanceFact>,
        kickbacks: &dyn KickbackPolicy,
    ) -> Result<AccrualReport, LedgerError> {
        let _cycle = self.cycle.lock();
        let mut state: LedgerState = (*self.store.load()).clone();
        let mut report = AccrualReport::default();
        let mut touched: Vec<SeasonId> = Vec::new();

        // Earlier facts in the batch must be visible as priors of later ones.
        facts.sort_by_key(|f| f.timestamp);

        for fact in facts {
            let participant = fact.participant;
            let timestamp = fact.timestamp;
            match self.apply_fact(&mut state, fact, kickbacks) {
                Ok(Applied::Awarded(award)) => {
                    if !touched.contains(&award.season_id) {
                        touched.push(award.season_id);
                    }
                    report.awards.push(award);
                }
                Ok(Applied::Skipped(reason)) => {
                    debug!(%participant, %timestamp, %reason, "fact earned no points");
                    report.skipped.push(SkippedFact {
                        participant,
                        timestamp,
                        reason,
                    });
                }
                Err(error) => {
                    warn!(%participant, %timestamp, %error, "skipping bad balance fact");
                    report.rejected.push(RejectedFact {
                        participant,
                        timestamp,
                        error: error.to_string(),
                    });
                }
            }
        }

        if !touched.is_empty() {
            touched.sort_unstable();
            for season_id in touched {
                report.rebuilt.push(LeaderboardScope::Season(season_id));
            }
            report.rebuilt.push(LeaderboardScope::Global);
            for scope in &report.rebuilt {
                let rows = leaderboard::rebuild(&state, *scope);
                state.set_leaderboard(*scope, rows);
            }
        }

        self.store.commit(state)?;
        info!(
            awards = report.awards.len(),
            skipped = report.skipped.len(),
            rejected = report.rejected.len(),
            points = report.total_awarded(),
            kickbacks = report.total_kickbacks(),
            "accrual cycle committed"
        );
        Ok(report)
    }

    fn apply_fact(
        &self,
        state: &mut LedgerState,
        fact: BalanceFact,
        kickbacks: &dyn KickbackPolicy,
    ) -> Result<Applied, LedgerError> {
        if fact.action == Action::ReferralKickback {
            return Err(LedgerError::InvalidFact(
                "referral kickbacks cannot be observed".into(),
            ));
        }
        if !fact.usd_value.is_finite() {
            return Err(LedgerError::InvalidFact(format!(
                "usd_value {} is not finite",
                fact.usd_value
            )));
        }
        let season = self.seasons.get(fact.season_id)?;

        let prior_at = state
            .latest_fact_before(fact.chain, fact.participant, fact.action, fact.timestamp)
            .map(|prior| prior.timestamp);
        let (chain, participant, action, timestamp, usd_value) = (
            fact.chain,
            fact.participant,
            fact.action,
            fact.timestamp,
            fact.usd_value,
        );
        state.insert_fact(fact)?;

        let Some(multiplier) = season.multiplier(action) else {
            return Ok(Applied::Skipped(AccrualSkip::NoMultiplier));
        };

        let hours = self.credited_hours(prior_at, timestamp);
        let Some(points) = points_for(usd_value, multiplier, hours) else {
            return Ok(Applied::Skipped(AccrualSkip::NonPositivePoints));
        };

        let key = EntryKey {
            participant,
            chain,
            season_id: season.id,
            action,
        };
        state.credit(key, points, timestamp);

        let kicks: Vec<KickbackAward> = kickbacks
            .kickbacks(&participant, points)
            .into_iter()
            .filter(|k| k.amount > 0 && k.referrer != participant)
            .collect();
        for kick in &kicks {
            state.credit(
                EntryKey {
                    participant: kick.referrer,
                    action: Action::ReferralKickback,
                    ..key
                },
                kick.amount,
                timestamp,
            );
        }

        Ok(Applied::Awarded(Award {
            participant,
            chain,
            season_id: season.id,
            action,
            timestamp,
            hours,
            points,
            kickbacks: kicks,
        }))
    }

    fn credited_hours(&self, prior: Option<DateTime<Utc>>, at: DateTime<Utc>) -> f64 {
        let hours = match prior {
            Some(prior) => (at - prior).num_milliseconds() as f64 / 3_600_000.0,
            None => self.config.bootstrap_hours,
        };
        hours.min(self.config.max_elapsed_hours)
    }
}

/// `usd × multiplier × hours` in ledger units, or `None` when not positive.
fn points_for(usd_value: f64, multiplier: f64, hours: f64) -> Option<Amount> {
    let units = (usd_value * multiplier * hours * POINTS_SCALE as f64).round();
    if units.is_finite() && units > 0.0 {
        Some(units as Amount)
    } else {
        None
    }
}
