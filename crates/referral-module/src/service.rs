use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use points_commit::Address;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    code::{normalize_code, CodeGenerator, RandomCodeGenerator},
    error::ReferralError,
    graph::{
        CodeValidation, Kickback, ReferralCode, ReferralGraph, ReferralLink, ReferralMetrics,
        ReferralStats, ReferralTreeNode,
    },
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    pub max_codes_per_owner: u32,
    pub max_referees_per_code: u32,
    /// Number of ancestor levels that receive kickbacks.
    pub max_depth: u32,
    /// Direct referrer's share, in basis points.
    pub kickback_bps: u32,
    /// Per-level decay applied beyond the direct referrer, in basis points.
    pub depth_decay_bps: u32,
    pub code_length: usize,
    pub max_generation_attempts: u32,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            max_codes_per_owner: 5,
            max_referees_per_code: 100,
            max_depth: 2,
            kickback_bps: 1_000,
            depth_decay_bps: 5_000,
            code_length: 8,
            max_generation_attempts: 10,
        }
    }
}

/// Single-writer referral service.
///
/// Mutations are serialized by `writer`, so a code's cap check and its usage
/// increment cannot interleave with another caller. With a state path, each
/// mutation is applied to a copy and persisted before it becomes visible;
/// readers keep seeing the previous graph during the disk write.
pub struct ReferralService {
    config: ReferralConfig,
    graph: RwLock<ReferralGraph>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
    generator: Box<dyn CodeGenerator>,
}

impl ReferralService {
    /// In-memory service.
    pub fn new(config: ReferralConfig) -> Self {
        let generator = Box::new(RandomCodeGenerator::new(config.code_length));
        Self {
            config,
            graph: RwLock::new(ReferralGraph::new()),
            writer: Mutex::new(()),
            path: None,
            generator,
        }
    }

    /// Service backed by a JSON state file, loading it if present.
    pub fn open(path: impl Into<PathBuf>, config: ReferralConfig) -> Result<Self, ReferralError> {
        let path = path.into();
        let graph = if path.exists() {
            let bytes = fs::read(&path)?;
            let mut graph: ReferralGraph = serde_json::from_slice(&bytes)?;
            graph.reindex();
            info!(path = %path.display(), "loaded referral state");
            graph
        } else {
            ReferralGraph::new()
        };
        let mut service = Self::new(config);
        service.graph = RwLock::new(graph);
        service.path = Some(path);
        Ok(service)
    }

    pub fn with_generator(mut self, generator: Box<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &ReferralConfig {
        &self.config
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut ReferralGraph) -> Result<T, ReferralError>,
    ) -> Result<T, ReferralError> {
        let _writer = self.writer.lock();
        match &self.path {
            None => op(&mut self.graph.write()),
            Some(path) => {
                let mut next = self.graph.read().clone();
                let out = op(&mut next)?;
                persist(path, &next)?;
                *self.graph.write() = next;
                Ok(out)
            }
        }
    }

    pub fn create_code(&self, owner: &str) -> Result<ReferralCode, ReferralError> {
        let owner = parse_participant(owner)?;
        let attempts = self.config.max_generation_attempts;
        let record = self.mutate(|graph| {
            for _ in 0..attempts {
                let Ok(candidate) = normalize_code(&self.generator.generate()) else {
                    continue;
                };
                if !graph.contains_code(&candidate) {
                    return graph.insert_code(owner, candidate, Utc::now(), &self.config);
                }
            }
            Err(ReferralError::CodeGenerationExhausted(attempts))
        });
        match &record {
            Ok(code) => info!(%owner, code = %code.code, "referral code created"),
            Err(ReferralError::CodeGenerationExhausted(n)) => {
                warn!(%owner, attempts = n, "referral code generation exhausted")
            }
            Err(_) => {}
        }
        record
    }

    pub fn link_referral(&self, referee: &str, code: &str) -> Result<ReferralLink, ReferralError> {
        let referee = parse_participant(referee)?;
        let code = normalize_code(code)?;
        let link = self.mutate(|graph| graph.link(referee, &code, Utc::now(), &self.config))?;
        info!(referee = %link.referee, referrer = %link.referrer, code = %link.code, "referral linked");
        Ok(link)
    }

    /// Kickbacks owed up the chain for `earned` points of `referee`.
    pub fn calculate_kickbacks(&self, referee: &Address, earned: u128) -> Vec<Kickback> {
        self.graph
            .read()
            .calculate_kickbacks(referee, earned, &self.config)
    }

    /// Bookkeeping after the caller has credited kickbacks to the ledger.
    pub fn record_kickbacks(&self, kickbacks: &[Kickback]) -> Result<(), ReferralError> {
        if kickbacks.is_empty() {
            return Ok(());
        }
        self.mutate(|graph| {
            graph.record_kickbacks(kickbacks);
            Ok(())
        })
    }

    pub fn referrer_of(&self, referee: &Address) -> Option<Address> {
        self.graph.read().link_of(referee).map(|l| l.referrer)
    }

    pub fn chain(&self, referee: &Address) -> Vec<Address> {
        let graph = self.graph.read();
        graph.ancestors(referee, usize::MAX)
    }

    pub fn stats(&self, participant: &Address) -> ReferralStats {
        self.graph.read().stats(participant, &self.config)
    }

    pub fn tree(&self, root: &Address, depth: u32) -> ReferralTreeNode {
        self.graph.read().tree(root, depth)
    }

    pub fn validate_code(&self, code: &str) -> CodeValidation {
        match normalize_code(code) {
            Ok(code) => self.graph.read().validate_code(&code, &self.config),
            Err(_) => CodeValidation {
                code: code.to_string(),
                valid: false,
                owner: None,
                remaining_uses: None,
                reason: Some("MALFORMED_CODE"),
            },
        }
    }

    pub fn global_metrics(&self) -> ReferralMetrics {
        self.graph.read().metrics(&self.config)
    }
}

fn parse_participant(raw: &str) -> Result<Address, ReferralError> {
    raw.parse()
        .map_err(|e: points_commit::CommitError| ReferralError::InvalidParticipant(e.to_string()))
}

fn persist(path: &Path, graph: &ReferralGraph) -> Result<(), ReferralError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(graph)?;
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
