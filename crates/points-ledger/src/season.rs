use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::LedgerError,
    types::{Action, SeasonId},
};

/// A fixed calendar window with its own per-action multipliers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub multipliers: BTreeMap<Action, f64>,
}

impl Season {
    /// Positive, finite multiplier for `action`, if any.
    pub fn multiplier(&self, action: Action) -> Option<f64> {
        self.multipliers
            .get(&action)
            .copied()
            .filter(|m| m.is_finite() && *m > 0.0)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }

    pub fn duration_hours(&self) -> f64 {
        (self.ends_at - self.starts_at).num_seconds() as f64 / 3_600.0
    }

    pub fn duration_days(&self) -> f64 {
        self.duration_hours() / 24.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SeasonSchedule {
    seasons: Vec<Season>,
}

impl SeasonSchedule {
    pub fn new(mut seasons: Vec<Season>) -> Result<Self, LedgerError> {
        let mut ids = BTreeSet::new();
        for season in &seasons {
            if !ids.insert(season.id) {
                return Err(LedgerError::InvalidSeason(format!(
                    "duplicate season id {}",
                    season.id
                )));
            }
            if season.starts_at >= season.ends_at {
                return Err(LedgerError::InvalidSeason(format!(
                    "season {} ends before it starts",
                    season.id
                )));
            }
            if let Some((action, m)) = season
                .multipliers
                .iter()
                .find(|(a, m)| **a == Action::ReferralKickback || !m.is_finite())
            {
                return Err(LedgerError::InvalidSeason(format!(
                    "season {} has unusable multiplier {m} for {action}",
                    season.id
                )));
            }
        }
        seasons.sort_by_key(|s| s.starts_at);
        Ok(Self { seasons })
    }

    pub fn get(&self, id: SeasonId) -> Result<&Season, LedgerError> {
        self.seasons
            .iter()
            .find(|s| s.id == id)
            .ok_or(LedgerError::UnknownSeason(id))
    }

    pub fn active_at(&self, at: DateTime<Utc>) -> Option<&Season> {
        self.seasons.iter().find(|s| s.contains(at))
    }

    pub fn all(&self) -> &[Season] {
        &self.seasons
    }
}
