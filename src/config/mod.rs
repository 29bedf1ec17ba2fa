use std::{
    fs,
    path::{Path, PathBuf},
};

use points_ledger::{AccrualConfig, Season, SeasonSchedule};
use referral_module::ReferralConfig;
use serde::Deserialize;
use transparency::PublisherConfig;

use crate::error::AppError;

pub const DATA_DIR_ENV: &str = "POINTS_DATA_DIR";
pub const ADMIN_TOKEN_ENV: &str = "POINTS_ADMIN_TOKEN";

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub admin_token: Option<String>,
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub accrual: AccrualConfig,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub transparency: PublisherConfig,
    #[serde(default)]
    pub incentives: IncentivesConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IncentivesConfig {
    /// USD value of the whole incentive pool, for implied APY.
    pub total_incentive_usd: f64,
}

impl AppConfig {
    /// Read a JSON config file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: AppConfig = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Configuration(format!("{}: {e}", path.display())))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(token) = lookup(ADMIN_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.admin_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(AppError::Configuration("data_dir must be set".into()));
        }
        if self.seasons.is_empty() {
            return Err(AppError::Configuration("at least one season is required".into()));
        }
        self.season_schedule()?;
        if !(self.accrual.max_elapsed_hours > 0.0 && self.accrual.bootstrap_hours > 0.0) {
            return Err(AppError::Configuration(
                "accrual hours must be positive".into(),
            ));
        }
        if self.referral.depth_decay_bps > 10_000 || self.referral.kickback_bps > 10_000 {
            return Err(AppError::Configuration(
                "referral basis points cannot exceed 10000".into(),
            ));
        }
        Ok(())
    }

    pub fn season_schedule(&self) -> Result<SeasonSchedule, AppError> {
        SeasonSchedule::new(self.seasons.clone())
            .map_err(|e| AppError::Configuration(e.to_string()))
    }

    /// Admin token, required only by admin actions.
    pub fn require_admin_token(&self) -> Result<&str, AppError> {
        self.admin_token.as_deref().ok_or_else(|| {
            AppError::Configuration(format!("admin token not configured (set {ADMIN_TOKEN_ENV})"))
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }

    pub fn referrals_path(&self) -> PathBuf {
        self.data_dir.join("referrals.json")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "data_dir": "/var/lib/points",
        "seasons": [{
            "id": 1,
            "name": "Genesis",
            "starts_at": "2026-01-01T00:00:00Z",
            "ends_at": "2026-04-01T00:00:00Z",
            "multipliers": { "hold": 1.0, "stake": 3.0, "bridge_boost": 5.0 }
        }],
        "referral": { "max_referees_per_code": 25 },
        "incentives": { "total_incentive_usd": 250000.0 }
    }"#;

    #[test]
    fn parses_with_defaults() {
        let config: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.referral.max_referees_per_code, 25);
        assert_eq!(config.referral.max_depth, 2);
        assert_eq!(config.accrual.max_elapsed_hours, 24.0);
        assert_eq!(config.transparency.max_snapshot_id, 1_000_000_000);
        assert_eq!(config.snapshots_dir(), PathBuf::from("/var/lib/points/snapshots"));
        assert!(config.require_admin_token().is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        config.apply_overrides(|key| match key {
            DATA_DIR_ENV => Some("/tmp/points".into()),
            ADMIN_TOKEN_ENV => Some("s3cret".into()),
            _ => None,
        });
        assert_eq!(config.data_dir, PathBuf::from("/tmp/points"));
        assert_eq!(config.require_admin_token().unwrap(), "s3cret");
    }

    #[test]
    fn missing_seasons_is_a_configuration_error() {
        let mut config: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        config.seasons.clear();
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn unreadable_file_is_a_configuration_error() {
        let err = AppConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION");
    }
}
