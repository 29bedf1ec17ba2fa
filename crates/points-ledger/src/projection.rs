//! Side-effect free forecasting: linear point projections and implied APY.

use serde::Serialize;

use crate::{error::LedgerError, season::Season, types::Action};

/// Points a position would earn if held unchanged.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Projection {
    pub season_id: u32,
    pub action: Action,
    pub usd_value: f64,
    pub multiplier: f64,
    pub per_hour: f64,
    pub per_day: f64,
    pub per_week: f64,
    pub per_season: f64,
}

pub fn project(season: &Season, action: Action, usd_value: f64) -> Result<Projection, LedgerError> {
    if !usd_value.is_finite() || usd_value < 0.0 {
        return Err(LedgerError::InvalidInput(format!(
            "usd_value must be a non-negative number, got {usd_value}"
        )));
    }
    let multiplier = season.multiplier(action).unwrap_or(0.0);
    let per_hour = usd_value * multiplier;
    Ok(Projection {
        season_id: season.id,
        action,
        usd_value,
        multiplier,
        per_hour,
        per_day: per_hour * 24.0,
        per_week: per_hour * 24.0 * 7.0,
        per_season: per_hour * season.duration_hours(),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApyRow {
    pub action: Action,
    pub multiplier: f64,
    pub apy_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApyTable {
    pub season_id: u32,
    pub total_incentive_usd: f64,
    pub weighted_participation_usd: f64,
    /// APY for one multiplier-weighted dollar.
    pub base_apy_pct: f64,
    pub rows: Vec<ApyRow>,
}

/// Implied APY of the season's incentive pool.
///
/// `weighted_participation_usd` is Σ usd × multiplier over the season, as
/// supplied by the caller. Each action's APY scales the base by its
/// multiplier.
pub fn implied_apy(
    season: &Season,
    total_incentive_usd: f64,
    weighted_participation_usd: f64,
) -> Result<ApyTable, LedgerError> {
    if !weighted_participation_usd.is_finite() || weighted_participation_usd <= 0.0 {
        return Err(LedgerError::InvalidInput(
            "weighted participation must be positive".into(),
        ));
    }
    if !total_incentive_usd.is_finite() || total_incentive_usd < 0.0 {
        return Err(LedgerError::InvalidInput(
            "total incentive must be non-negative".into(),
        ));
    }
    let annualize = 365.0 / season.duration_days();
    let base_apy_pct = total_incentive_usd / weighted_participation_usd * annualize * 100.0;
    let rows = Action::EARNING
        .into_iter()
        .filter_map(|action| {
            season.multiplier(action).map(|multiplier| ApyRow {
                action,
                multiplier,
                apy_pct: base_apy_pct * multiplier,
            })
        })
        .collect();
    Ok(ApyTable {
        season_id: season.id,
        total_incentive_usd,
        weighted_participation_usd,
        base_apy_pct,
        rows,
    })
}
