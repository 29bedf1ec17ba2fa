//! Read-mostly façade over the ledger, referral graph and snapshot archive.
//!
//! Reads serve committed state only. The single admin action,
//! [`PointsApi::trigger_snapshot`], requires the configured bearer token.

use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use points_commit::{parse_hash, Address, Hash};
use points_ledger::{
    implied_apy, project, units_to_points, AccrualCalculator, AccrualReport, Action, ApyTable,
    BalanceFact, Chain, FileStore, LeaderboardScope, PointsStore, Projection, SeasonId, Tier,
};
use referral_module::{
    CodeValidation, Kickback, ReferralCode, ReferralLink, ReferralMetrics, ReferralService,
    ReferralStats, ReferralTreeNode,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use transparency::{balances_from_ledger, SnapshotManifest, SnapshotProof, TransparencyPublisher};

use crate::{config::AppConfig, error::AppError, kickbacks::ReferralKickbacks};

/// Leaderboard page size when the caller gives none.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 100;
const MAX_LEADERBOARD_LIMIT: usize = 1_000;
const MAX_TREE_DEPTH: u32 = 8;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParticipantSummary {
    pub participant: Address,
    pub total_points: f64,
    pub by_action: BTreeMap<Action, f64>,
    pub by_chain: BTreeMap<Chain, f64>,
    pub by_season: BTreeMap<SeasonId, f64>,
    /// Global rank; `None` until the participant has points.
    pub rank: Option<u32>,
    pub tier: Tier,
    pub referrer: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub participant: Address,
    pub total_points: f64,
    pub tier: Tier,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeasonView {
    pub id: SeasonId,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub multipliers: BTreeMap<Action, f64>,
}

pub struct PointsApi<S = FileStore> {
    config: AppConfig,
    calculator: AccrualCalculator<S>,
    referrals: ReferralService,
    publisher: TransparencyPublisher,
}

impl PointsApi<FileStore> {
    /// Open every durable component under `config.data_dir`.
    pub fn open(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let store = Arc::new(FileStore::open(config.ledger_path())?);
        let referrals = ReferralService::open(config.referrals_path(), config.referral.clone())?;
        let publisher =
            TransparencyPublisher::new(config.snapshots_dir(), config.transparency.clone())?;
        info!(data_dir = %config.data_dir.display(), "points api opened");
        Self::with_parts(config, store, referrals, publisher)
    }
}

impl<S: PointsStore> PointsApi<S> {
    pub fn with_parts(
        config: AppConfig,
        store: Arc<S>,
        referrals: ReferralService,
        publisher: TransparencyPublisher,
    ) -> Result<Self, AppError> {
        let seasons = config.season_schedule()?;
        let calculator = AccrualCalculator::new(store, seasons, config.accrual.clone());
        Ok(Self {
            config,
            calculator,
            referrals,
            publisher,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn referrals(&self) -> &ReferralService {
        &self.referrals
    }

    //==================== Начисление ====================//

    /// Run one accrual cycle, crediting referrer kickbacks alongside.
    pub fn ingest(&self, facts: Vec<BalanceFact>) -> Result<AccrualReport, AppError> {
        let report = self
            .calculator
            .process_batch(facts, &ReferralKickbacks(&self.referrals))?;

        let credited: Vec<Kickback> = report
            .awards
            .iter()
            .flat_map(|a| a.kickbacks.iter())
            .map(|k| Kickback {
                referrer: k.referrer,
                depth: k.depth,
                amount: k.amount,
            })
            .collect();
        // The ledger already holds these points; only the per-referrer
        // statistics lag if this fails.
        if let Err(e) = self.referrals.record_kickbacks(&credited) {
            error!(error = %e, count = credited.len(), "kickback bookkeeping failed");
        }
        Ok(report)
    }

    /// Read newline-delimited facts. Unparseable lines are logged and skipped.
    pub fn ingest_file(&self, path: &Path) -> Result<AccrualReport, AppError> {
        let text = fs::read_to_string(path)?;
        let mut facts = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<BalanceFact>(line) {
                Ok(fact) => facts.push(fact),
                Err(e) => warn!(line = n + 1, error = %e, "skipping unparseable fact"),
            }
        }
        self.ingest(facts)
    }

    //==================== Чтение ====================//

    pub fn participant_summary(&self, participant: &str) -> Result<ParticipantSummary, AppError> {
        let participant: Address = participant.parse()?;
        let state = self.calculator.store().load();

        let mut units = 0u128;
        let mut by_action: BTreeMap<Action, u128> = BTreeMap::new();
        let mut by_chain: BTreeMap<Chain, u128> = BTreeMap::new();
        let mut by_season: BTreeMap<SeasonId, u128> = BTreeMap::new();
        for entry in state.entries_for(&participant) {
            units = units.saturating_add(entry.accumulated);
            for slot in [
                by_action.entry(entry.action).or_default(),
                by_chain.entry(entry.chain).or_default(),
                by_season.entry(entry.season_id).or_default(),
            ] {
                *slot = slot.saturating_add(entry.accumulated);
            }
        }
        let rank = state
            .leaderboard(LeaderboardScope::Global)
            .iter()
            .find(|row| row.participant == participant)
            .map(|row| row.rank);

        Ok(ParticipantSummary {
            participant,
            total_points: units_to_points(units),
            by_action: to_points(by_action),
            by_chain: to_points(by_chain),
            by_season: to_points(by_season),
            rank,
            tier: Tier::for_units(units),
            referrer: self.referrals.referrer_of(&participant),
        })
    }

    /// Top rows of the last rebuilt leaderboard for `season`, or the global one.
    pub fn leaderboard(
        &self,
        season: Option<SeasonId>,
        limit: Option<usize>,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let scope = match season {
            Some(id) => {
                self.calculator.seasons().get(id)?;
                LeaderboardScope::Season(id)
            }
            None => LeaderboardScope::Global,
        };
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .min(MAX_LEADERBOARD_LIMIT);
        let state = self.calculator.store().load();
        Ok(state
            .leaderboard(scope)
            .iter()
            .take(limit)
            .map(|row| LeaderboardEntry {
                rank: row.rank,
                participant: row.participant,
                total_points: units_to_points(row.total_points),
                tier: Tier::for_units(row.total_points),
            })
            .collect())
    }

    pub fn seasons(&self, now: DateTime<Utc>) -> Vec<SeasonView> {
        self.calculator
            .seasons()
            .all()
            .iter()
            .map(|s| SeasonView {
                id: s.id,
                name: s.name.clone(),
                starts_at: s.starts_at,
                ends_at: s.ends_at,
                active: s.contains(now),
                multipliers: s.multipliers.clone(),
            })
            .collect()
    }

    pub fn projection(
        &self,
        usd_value: f64,
        action: Action,
        season_id: SeasonId,
    ) -> Result<Projection, AppError> {
        let season = self.calculator.seasons().get(season_id)?;
        Ok(project(season, action, usd_value)?)
    }

    pub fn implied_apy(
        &self,
        season_id: SeasonId,
        weighted_participation_usd: f64,
    ) -> Result<ApyTable, AppError> {
        let season = self.calculator.seasons().get(season_id)?;
        Ok(implied_apy(
            season,
            self.config.incentives.total_incentive_usd,
            weighted_participation_usd,
        )?)
    }

    //==================== Рефералы ====================//

    pub fn create_referral_code(&self, owner: &str) -> Result<ReferralCode, AppError> {
        Ok(self.referrals.create_code(owner)?)
    }

    pub fn link_referral(&self, referee: &str, code: &str) -> Result<ReferralLink, AppError> {
        Ok(self.referrals.link_referral(referee, code)?)
    }

    pub fn referral_stats(&self, participant: &str) -> Result<ReferralStats, AppError> {
        Ok(self.referrals.stats(&participant.parse()?))
    }

    pub fn referral_tree(&self, root: &str, depth: u32) -> Result<ReferralTreeNode, AppError> {
        Ok(self.referrals.tree(&root.parse()?, depth.min(MAX_TREE_DEPTH)))
    }

    pub fn referral_chain(&self, referee: &str) -> Result<Vec<Address>, AppError> {
        Ok(self.referrals.chain(&referee.parse()?))
    }

    pub fn validate_referral_code(&self, code: &str) -> CodeValidation {
        self.referrals.validate_code(code)
    }

    pub fn referral_metrics(&self) -> ReferralMetrics {
        self.referrals.global_metrics()
    }

    //==================== Снапшоты ====================//

    /// Publish the committed ledger as snapshot `snapshot_id`. Admin only.
    pub fn trigger_snapshot(
        &self,
        bearer: &str,
        snapshot_id: u64,
        block_number: u64,
    ) -> Result<SnapshotManifest, AppError> {
        self.authorize(bearer)?;
        let state = self.calculator.store().load();
        let balances = balances_from_ledger(&state);
        let manifest =
            self.publisher
                .generate_snapshot(snapshot_id, block_number, balances, Utc::now())?;
        info!(
            snapshot_id,
            ledger_version = state.version(),
            "snapshot triggered"
        );
        Ok(manifest)
    }

    pub fn proof(&self, snapshot_id: u64, participant: &str) -> Result<SnapshotProof, AppError> {
        Ok(self
            .publisher
            .generate_proof_from_disk(snapshot_id, participant)?)
    }

    pub fn manifest(&self, snapshot_id: u64) -> Result<SnapshotManifest, AppError> {
        Ok(self.publisher.load_manifest(snapshot_id)?)
    }

    pub fn latest_manifest(&self) -> Result<Option<SnapshotManifest>, AppError> {
        Ok(self.publisher.latest_manifest()?)
    }

    fn authorize(&self, bearer: &str) -> Result<(), AppError> {
        let expected = self.config.require_admin_token()?;
        let presented = bearer.strip_prefix("Bearer ").unwrap_or(bearer).trim();
        if presented.is_empty() || !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            warn!("snapshot trigger rejected: bad admin token");
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }
}

/// Offline check of a proof against a root, all hex-encoded.
pub fn verify_proof(leaf: &str, proof: &[String], root: &str) -> Result<bool, AppError> {
    let leaf = parse_hash(leaf)?;
    let root = parse_hash(root)?;
    let proof = proof
        .iter()
        .map(|p| parse_hash(p))
        .collect::<Result<Vec<Hash>, _>>()?;
    Ok(points_commit::verify(&leaf, &proof, &root))
}

fn to_points<K: Ord>(units: BTreeMap<K, u128>) -> BTreeMap<K, f64> {
    units
        .into_iter()
        .map(|(k, v)| (k, units_to_points(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use points_ledger::{MemoryStore, Season};
    use referral_module::ReferralConfig;
    use tempfile::TempDir;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    fn config(dir: &Path) -> AppConfig {
        let season = Season {
            id: 1,
            name: "Genesis".into(),
            starts_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap(),
            multipliers: [(Action::Hold, 1.0), (Action::Stake, 3.0)].into_iter().collect(),
        };
        AppConfig {
            data_dir: dir.to_path_buf(),
            admin_token: Some("letmein".into()),
            seasons: vec![season],
            accrual: Default::default(),
            referral: ReferralConfig::default(),
            transparency: Default::default(),
            incentives: crate::config::IncentivesConfig {
                total_incentive_usd: 100_000.0,
            },
        }
    }

    fn api(dir: &TempDir) -> PointsApi<MemoryStore> {
        let config = config(dir.path());
        let publisher =
            TransparencyPublisher::new(dir.path().join("snapshots"), Default::default()).unwrap();
        PointsApi::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            ReferralService::new(ReferralConfig::default()),
            publisher,
        )
        .unwrap()
    }

    fn fact(who: &str, hour: u32, usd: f64) -> BalanceFact {
        BalanceFact {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, hour, 0, 0).unwrap(),
            chain: Chain::Ethereum,
            participant: who.parse().unwrap(),
            action: Action::Stake,
            raw_balance: "1".into(),
            usd_value: usd,
            season_id: 1,
        }
    }

    #[test]
    fn summary_breaks_down_totals() {
        let dir = TempDir::new().unwrap();
        let api = api(&dir);
        api.ingest(vec![fact(ALICE, 0, 100.0), fact(ALICE, 2, 100.0)])
            .unwrap();

        let summary = api.participant_summary(ALICE).unwrap();
        // 1h bootstrap + 2h gap at 100 usd × 3.
        assert_eq!(summary.total_points, 900.0);
        assert_eq!(summary.by_action[&Action::Stake], 900.0);
        assert_eq!(summary.by_chain[&Chain::Ethereum], 900.0);
        assert_eq!(summary.by_season[&1], 900.0);
        assert_eq!(summary.rank, Some(1));
        assert_eq!(summary.tier, Tier::Bronze);
        assert_eq!(summary.referrer, None);

        let unknown = api.participant_summary(BOB).unwrap();
        assert_eq!(unknown.total_points, 0.0);
        assert_eq!(unknown.rank, None);
    }

    #[test]
    fn kickbacks_flow_into_ledger_and_stats() {
        let dir = TempDir::new().unwrap();
        let api = api(&dir);
        let code = api.create_referral_code(ALICE).unwrap();
        api.link_referral(BOB, &code.code).unwrap();

        let report = api.ingest(vec![fact(BOB, 0, 1_000.0)]).unwrap();
        assert_eq!(report.total_kickbacks(), report.total_awarded() / 10);

        let alice = api.participant_summary(ALICE).unwrap();
        assert_eq!(alice.by_action[&Action::ReferralKickback], 300.0);
        assert_eq!(api.participant_summary(BOB).unwrap().referrer, Some(alice.participant));
        assert_eq!(
            api.referral_stats(ALICE).unwrap().kickback_points,
            report.total_kickbacks()
        );
    }

    #[test]
    fn leaderboard_respects_limit_and_unknown_season() {
        let dir = TempDir::new().unwrap();
        let api = api(&dir);
        api.ingest(vec![fact(ALICE, 0, 10.0), fact(BOB, 0, 20.0)])
            .unwrap();

        let top = api.leaderboard(None, Some(1)).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].participant, BOB.parse::<Address>().unwrap());
        assert_eq!(api.leaderboard(Some(1), None).unwrap().len(), 2);
        assert_eq!(api.leaderboard(Some(9), None).unwrap_err().code(), "UNKNOWN_SEASON");
    }

    #[test]
    fn snapshot_requires_admin_token() {
        let dir = TempDir::new().unwrap();
        let api = api(&dir);
        api.ingest(vec![fact(ALICE, 0, 1_000.0)]).unwrap();

        assert!(matches!(
            api.trigger_snapshot("wrong", 1, 100),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            api.trigger_snapshot("", 1, 100),
            Err(AppError::Unauthorized)
        ));
        let manifest = api.trigger_snapshot("Bearer letmein", 1, 100).unwrap();
        assert_eq!(manifest.total_participants, 1);
        assert_eq!(manifest.total_points, 3_000);
        assert!(api.proof(1, ALICE).unwrap().verify());
        assert_eq!(api.latest_manifest().unwrap(), Some(manifest));
    }

    #[test]
    fn projection_and_apy_use_configured_seasons() {
        let dir = TempDir::new().unwrap();
        let api = api(&dir);
        let p = api.projection(1_000.0, Action::Stake, 1).unwrap();
        assert_eq!(p.per_day, 72_000.0);
        // 73-day season, 100k pool over 1M weighted usd.
        let apy = api.implied_apy(1, 1_000_000.0).unwrap();
        assert!((apy.base_apy_pct - 50.0).abs() < 1e-9);
        assert_eq!(api.projection(1.0, Action::Stake, 2).unwrap_err().code(), "UNKNOWN_SEASON");
    }

    #[test]
    fn offline_verify_rejects_bad_hex() {
        let zero = format!("0x{}", "00".repeat(32));
        assert!(verify_proof(&zero, &[], &zero).unwrap());
        assert_eq!(
            verify_proof("0x1234", &[], &zero).unwrap_err().code(),
            "VALIDATION"
        );
    }
}
