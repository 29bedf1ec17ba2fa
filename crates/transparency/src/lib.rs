//! Transparency snapshots of the points ledger.
//!
//! A snapshot freezes every participant's whole-point balance into a merkle
//! root any participant can check their total against on-chain. Publication
//! writes, as one unit, under `<root>/snapshot-<id>/`:
//!
//! * `points.csv`: the full export, hashed into the manifest,
//! * `leaves.json`: the leaf records proofs are served from,
//! * `manifest.json`: id, timestamp, block, totals, root and CSV hash,
//!
//! and then points `<root>/latest.json` at the newest manifest.

mod error;
mod export;
mod publisher;
mod records;

pub use error::TransparencyError;
pub use export::{balances_from_ledger, render_csv, SnapshotBalance};
pub use publisher::{PublisherConfig, TransparencyPublisher};
pub use records::{MerkleLeafRecord, SnapshotManifest, SnapshotProof};
