use std::{
    collections::BTreeSet,
    fs,
    io::Write,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, Utc};
use points_commit::{leaf_hash, to_hex, Address, MerkleTree};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::{
    error::TransparencyError,
    export::{render_csv, SnapshotBalance},
    records::{MerkleLeafRecord, SnapshotManifest, SnapshotProof},
};

const CSV_FILE: &str = "points.csv";
const LEAVES_FILE: &str = "leaves.json";
const MANIFEST_FILE: &str = "manifest.json";
const LATEST_FILE: &str = "latest.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub max_snapshot_id: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_snapshot_id: 1_000_000_000,
        }
    }
}

/// Writes snapshots under a fixed output root and serves proofs from them.
pub struct TransparencyPublisher {
    root: PathBuf,
    config: PublisherConfig,
}

impl TransparencyPublisher {
    pub fn new(root: impl AsRef<Path>, config: PublisherConfig) -> Result<Self, TransparencyError> {
        fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_id(&self, snapshot_id: u64) -> Result<(), TransparencyError> {
        if snapshot_id == 0 || snapshot_id > self.config.max_snapshot_id {
            return Err(TransparencyError::InvalidSnapshotId {
                id: snapshot_id,
                max: self.config.max_snapshot_id,
            });
        }
        Ok(())
    }

    fn snapshot_dir_name(snapshot_id: u64) -> String {
        format!("snapshot-{snapshot_id}")
    }

    /// Join `relative` onto the output root, refusing anything that could
    /// land outside it.
    fn resolve(&self, relative: &Path) -> Result<PathBuf, TransparencyError> {
        let plain = relative.components().count() > 0
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(self.integrity(format!(
                "path {} is not a plain relative path",
                relative.display()
            )));
        }
        let joined = self.root.join(relative);
        // Symlinks inside the root could still point elsewhere.
        let effective = if joined.exists() {
            joined.canonicalize()?
        } else {
            joined.clone()
        };
        if !effective.starts_with(&self.root) || effective == self.root {
            return Err(self.integrity(format!(
                "path {} resolves outside {}",
                relative.display(),
                self.root.display()
            )));
        }
        Ok(joined)
    }

    fn integrity(&self, message: String) -> TransparencyError {
        error!(root = %self.root.display(), %message, "transparency integrity violation");
        TransparencyError::Integrity(message)
    }

    fn snapshot_file(&self, snapshot_id: u64, file: &str) -> Result<PathBuf, TransparencyError> {
        self.resolve(&Path::new(&Self::snapshot_dir_name(snapshot_id)).join(file))
    }

    /// Build and publish snapshot `snapshot_id` from `balances`.
    ///
    /// Balances are ordered by participant address before leaves are built,
    /// so the caller's order never matters. Re-publishing identical content
    /// returns the existing manifest.
    pub fn generate_snapshot(
        &self,
        snapshot_id: u64,
        block_number: u64,
        mut balances: Vec<SnapshotBalance>,
        timestamp: DateTime<Utc>,
    ) -> Result<SnapshotManifest, TransparencyError> {
        self.check_id(snapshot_id)?;
        let dir_name = Self::snapshot_dir_name(snapshot_id);
        let final_dir = self.resolve(Path::new(&dir_name))?;

        balances.sort_by(|a, b| a.participant.cmp(&b.participant));
        let mut seen = BTreeSet::new();
        if let Some(dup) = balances.iter().find(|b| !seen.insert(b.participant)) {
            return Err(TransparencyError::Validation(format!(
                "participant {} appears more than once",
                dup.participant
            )));
        }

        let records: Vec<MerkleLeafRecord> = balances
            .iter()
            .enumerate()
            .map(|(index, b)| MerkleLeafRecord {
                snapshot_id,
                index,
                address: b.participant,
                points: b.total_points,
                leaf: leaf_hash(&b.participant, b.total_points, snapshot_id),
            })
            .collect();
        let tree = MerkleTree::from_leaves(records.iter().map(|r| r.leaf).collect());

        let csv = render_csv(snapshot_id, block_number, &balances);
        let csv_hash = hex::encode(Sha256::digest(csv.as_bytes()));
        let manifest = SnapshotManifest {
            snapshot_id,
            timestamp,
            block_number,
            total_participants: records.len(),
            total_points: balances
                .iter()
                .fold(0u128, |acc, b| acc.saturating_add(b.total_points)),
            merkle_root: tree.root(),
            csv_path: format!("{dir_name}/{CSV_FILE}"),
            csv_hash,
        };

        if final_dir.exists() {
            return self.existing_or_conflict(snapshot_id, &manifest);
        }

        let staging_name = format!(".staging-{dir_name}-{:016x}", rand::thread_rng().next_u64());
        let staging = self.resolve(Path::new(&staging_name))?;
        let written = self.write_staged(&staging, &csv, &records, &manifest);
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        if let Err(e) = fs::rename(&staging, &final_dir) {
            let _ = fs::remove_dir_all(&staging);
            // Lost a race with another publisher of the same id.
            if final_dir.exists() {
                return self.existing_or_conflict(snapshot_id, &manifest);
            }
            return Err(e.into());
        }
        sync_dir(&self.root);

        self.update_latest(&manifest)?;
        info!(
            snapshot_id,
            block_number,
            participants = manifest.total_participants,
            total_points = %manifest.total_points,
            root = %to_hex(&manifest.merkle_root),
            "snapshot published"
        );
        Ok(manifest)
    }

    fn existing_or_conflict(
        &self,
        snapshot_id: u64,
        candidate: &SnapshotManifest,
    ) -> Result<SnapshotManifest, TransparencyError> {
        let existing = self.load_manifest(snapshot_id)?;
        if existing.merkle_root == candidate.merkle_root && existing.csv_hash == candidate.csv_hash {
            info!(snapshot_id, "snapshot already published with identical contents");
            // A failed pointer write after the rename is repaired on retry.
            self.update_latest(&existing)?;
            Ok(existing)
        } else {
            warn!(snapshot_id, "refusing to overwrite published snapshot");
            Err(TransparencyError::SnapshotConflict(snapshot_id))
        }
    }

    fn write_staged(
        &self,
        staging: &Path,
        csv: &str,
        records: &[MerkleLeafRecord],
        manifest: &SnapshotManifest,
    ) -> Result<(), TransparencyError> {
        fs::create_dir_all(staging)?;
        write_synced(&staging.join(CSV_FILE), csv.as_bytes())?;
        write_synced(&staging.join(LEAVES_FILE), &serde_json::to_vec_pretty(records)?)?;
        // Manifest last: its presence means the rest is complete.
        write_synced(&staging.join(MANIFEST_FILE), &serde_json::to_vec_pretty(manifest)?)?;
        sync_dir(staging);
        Ok(())
    }

    fn update_latest(&self, manifest: &SnapshotManifest) -> Result<(), TransparencyError> {
        if let Some(current) = self.latest_manifest()? {
            if current.snapshot_id > manifest.snapshot_id {
                return Ok(());
            }
        }
        let latest = self.resolve(Path::new(LATEST_FILE))?;
        let tmp = self.resolve(Path::new(&format!("{LATEST_FILE}.tmp")))?;
        write_synced(&tmp, &serde_json::to_vec_pretty(manifest)?)?;
        fs::rename(&tmp, &latest)?;
        Ok(())
    }

    pub fn load_manifest(&self, snapshot_id: u64) -> Result<SnapshotManifest, TransparencyError> {
        self.check_id(snapshot_id)?;
        let path = self.snapshot_file(snapshot_id, MANIFEST_FILE)?;
        if !path.exists() {
            return Err(TransparencyError::NotFound(format!("snapshot {snapshot_id}")));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    pub fn latest_manifest(&self) -> Result<Option<SnapshotManifest>, TransparencyError> {
        let path = self.resolve(Path::new(LATEST_FILE))?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
    }

    /// Ids of every published snapshot, ascending.
    pub fn snapshot_ids(&self) -> Result<Vec<u64>, TransparencyError> {
        let mut ids: Vec<u64> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("snapshot-"))
                    .and_then(|id| id.parse().ok())
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Proof for `participant` in snapshot `snapshot_id`, built only from
    /// the leaf records persisted at publish time.
    pub fn generate_proof_from_disk(
        &self,
        snapshot_id: u64,
        participant: &str,
    ) -> Result<SnapshotProof, TransparencyError> {
        let address: Address = participant.parse()?;
        let manifest = self.load_manifest(snapshot_id)?;
        let leaves_path = self.snapshot_file(snapshot_id, LEAVES_FILE)?;
        let records: Vec<MerkleLeafRecord> = serde_json::from_slice(&fs::read(leaves_path)?)?;

        for (i, record) in records.iter().enumerate() {
            if record.index != i || record.snapshot_id != snapshot_id {
                return Err(self.integrity(format!(
                    "leaf record {i} of snapshot {snapshot_id} is out of place"
                )));
            }
            if leaf_hash(&record.address, record.points, snapshot_id) != record.leaf {
                return Err(self.integrity(format!(
                    "leaf record {i} of snapshot {snapshot_id} does not match its contents"
                )));
            }
        }

        let tree = MerkleTree::from_leaves(records.iter().map(|r| r.leaf).collect());
        if tree.root() != manifest.merkle_root {
            return Err(self.integrity(format!(
                "leaf records of snapshot {snapshot_id} do not reproduce the published root"
            )));
        }

        let record = records
            .iter()
            .find(|r| r.address == address)
            .ok_or_else(|| {
                TransparencyError::NotFound(format!("{address} in snapshot {snapshot_id}"))
            })?;
        Ok(SnapshotProof {
            snapshot_id,
            index: record.index,
            address: record.address,
            points: record.points,
            leaf: record.leaf,
            proof: tree.proof(record.index)?,
            root: manifest.merkle_root,
        })
    }
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(data)?;
    f.sync_all()
}

fn sync_dir(dir: &Path) {
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
}
