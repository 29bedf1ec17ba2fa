//! Referral graph accounting.
//!
//! Participants own invite codes; a referee links to exactly one referrer,
//! once, forever. Links form a single-parent forest, so every ancestor walk
//! terminates. Kickbacks for a referee's newly earned points decay by depth
//! and are only *computed* here. Crediting them is the caller's business.

mod code;
mod error;
mod graph;
mod service;

pub use code::{normalize_code, CodeGenerator, RandomCodeGenerator};
pub use error::ReferralError;
pub use graph::{
    CodeValidation, Kickback, ReferralCode, ReferralGraph, ReferralLink, ReferralMetrics,
    ReferralStats, ReferralTreeNode,
};
pub use service::{ReferralConfig, ReferralService};
