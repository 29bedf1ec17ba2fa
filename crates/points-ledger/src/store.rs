//! Ledger state and the pluggable stores that hold it.
//!
//! A store hands readers an `Arc<LedgerState>`; a writer clones it, applies a
//! whole cycle, and commits the result in one swap.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use points_commit::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::LedgerError,
    leaderboard::{LeaderboardRow, LeaderboardScope},
    types::{Action, Amount, BalanceFact, Chain, EntryKey, PointsLedgerEntry, SeasonId},
};

type FactKey = (Chain, Address, Action, DateTime<Utc>);

/// Everything the ledger knows at one committed point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerState {
    facts: BTreeMap<FactKey, BalanceFact>,
    entries: BTreeMap<EntryKey, PointsLedgerEntry>,
    leaderboards: BTreeMap<LeaderboardScope, Vec<LeaderboardRow>>,
    version: u64,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed cycles that produced this state.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Append a fact. Facts are unique per (timestamp, chain, participant, action).
    pub fn insert_fact(&mut self, fact: BalanceFact) -> Result<(), LedgerError> {
        let key = (fact.chain, fact.participant, fact.action, fact.timestamp);
        if self.facts.contains_key(&key) {
            return Err(LedgerError::DuplicateFact {
                participant: fact.participant,
                timestamp: fact.timestamp,
            });
        }
        self.facts.insert(key, fact);
        Ok(())
    }

    /// Most recent fact for the same stream strictly before `before`.
    pub fn latest_fact_before(
        &self,
        chain: Chain,
        participant: Address,
        action: Action,
        before: DateTime<Utc>,
    ) -> Option<&BalanceFact> {
        self.facts
            .range((chain, participant, action, DateTime::<Utc>::MIN_UTC)..(chain, participant, action, before))
            .next_back()
            .map(|(_, fact)| fact)
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Add `amount` to a ledger row, creating it on first credit.
    pub fn credit(&mut self, key: EntryKey, amount: Amount, at: DateTime<Utc>) {
        let entry = self.entries.entry(key).or_insert_with(|| PointsLedgerEntry {
            participant: key.participant,
            chain: key.chain,
            season_id: key.season_id,
            action: key.action,
            accumulated: 0,
            last_fact_timestamp: at,
        });
        entry.accumulated = entry.accumulated.saturating_add(amount);
        entry.last_fact_timestamp = entry.last_fact_timestamp.max(at);
    }

    pub fn entries(&self) -> impl Iterator<Item = &PointsLedgerEntry> {
        self.entries.values()
    }

    pub fn entries_for(&self, participant: &Address) -> Vec<&PointsLedgerEntry> {
        self.entries
            .values()
            .filter(|e| &e.participant == participant)
            .collect()
    }

    /// Per-participant totals within `scope`.
    pub fn totals(&self, scope: LeaderboardScope) -> BTreeMap<Address, Amount> {
        let mut totals = BTreeMap::new();
        for entry in self.entries.values().filter(|e| scope.includes(e.season_id)) {
            let total: &mut Amount = totals.entry(entry.participant).or_default();
            *total = total.saturating_add(entry.accumulated);
        }
        totals
    }

    pub fn total_for(&self, participant: &Address, scope: LeaderboardScope) -> Amount {
        self.entries
            .values()
            .filter(|e| &e.participant == participant && scope.includes(e.season_id))
            .map(|e| e.accumulated)
            .sum()
    }

    pub fn leaderboard(&self, scope: LeaderboardScope) -> &[LeaderboardRow] {
        self.leaderboards.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_leaderboard(&mut self, scope: LeaderboardScope, rows: Vec<LeaderboardRow>) {
        self.leaderboards.insert(scope, rows);
    }

    /// Season ids that have at least one ledger row.
    pub fn seasons_with_entries(&self) -> Vec<SeasonId> {
        let mut ids: Vec<SeasonId> = self.entries.keys().map(|k| k.season_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn to_persisted(&self) -> PersistedLedger {
        PersistedLedger {
            version: self.version,
            facts: self.facts.values().cloned().collect(),
            entries: self.entries.values().cloned().collect(),
            leaderboards: self
                .leaderboards
                .iter()
                .map(|(scope, rows)| PersistedLeaderboard {
                    scope: *scope,
                    rows: rows.clone(),
                })
                .collect(),
        }
    }

    fn from_persisted(persisted: PersistedLedger) -> Result<Self, LedgerError> {
        let mut state = LedgerState {
            version: persisted.version,
            ..Default::default()
        };
        for fact in persisted.facts {
            state.insert_fact(fact)?;
        }
        for entry in persisted.entries {
            state.entries.insert(entry.key(), entry);
        }
        for board in persisted.leaderboards {
            state.leaderboards.insert(board.scope, board.rows);
        }
        Ok(state)
    }
}

/// JSON layout of a ledger file. Maps with tuple keys are flattened to lists.
#[derive(Serialize, Deserialize)]
struct PersistedLedger {
    version: u64,
    facts: Vec<BalanceFact>,
    entries: Vec<PointsLedgerEntry>,
    leaderboards: Vec<PersistedLeaderboard>,
}

#[derive(Serialize, Deserialize)]
struct PersistedLeaderboard {
    scope: LeaderboardScope,
    rows: Vec<LeaderboardRow>,
}

/// Persistent home of the ledger.
///
/// Implementations must make `commit` all-or-nothing: readers see either the
/// previous state or the new one.
pub trait PointsStore: Send + Sync {
    /// Last fully committed state.
    fn load(&self) -> Arc<LedgerState>;

    /// Replace the committed state.
    fn commit(&self, next: LedgerState) -> Result<(), LedgerError>;
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<Arc<LedgerState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PointsStore for MemoryStore {
    fn load(&self) -> Arc<LedgerState> {
        Arc::clone(&self.state.read())
    }

    fn commit(&self, mut next: LedgerState) -> Result<(), LedgerError> {
        next.version += 1;
        *self.state.write() = Arc::new(next);
        Ok(())
    }
}

/// JSON-file store; every commit rewrites the file via temp-file + rename.
pub struct FileStore {
    path: PathBuf,
    state: RwLock<Arc<LedgerState>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            let persisted: PersistedLedger = serde_json::from_slice(&bytes)?;
            let state = LedgerState::from_persisted(persisted)?;
            info!(path = %path.display(), version = state.version(), "loaded points ledger");
            state
        } else {
            LedgerState::new()
        };
        Ok(Self {
            path,
            state: RwLock::new(Arc::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PointsStore for FileStore {
    fn load(&self) -> Arc<LedgerState> {
        Arc::clone(&self.state.read())
    }

    fn commit(&self, mut next: LedgerState) -> Result<(), LedgerError> {
        next.version += 1;
        let bytes = serde_json::to_vec(&next.to_persisted())?;
        atomic_write(&self.path, &bytes)?;
        debug!(path = %self.path.display(), version = next.version, "committed points ledger");
        *self.state.write() = Arc::new(next);
        Ok(())
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}
