use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use points_commit::Address;
use serde::{Deserialize, Serialize};

use crate::{error::ReferralError, service::ReferralConfig};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCode {
    pub code: String,
    pub owner: Address,
    pub created_at: DateTime<Utc>,
    pub usage_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub referee: Address,
    pub referrer: Address,
    pub code: String,
    pub linked_at: DateTime<Utc>,
}

/// Points owed to one ancestor for a referee's earnings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kickback {
    pub referrer: Address,
    /// 1 = direct referrer.
    pub depth: u32,
    pub amount: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferralStats {
    pub participant: Address,
    pub referrer: Option<Address>,
    pub codes: Vec<ReferralCode>,
    pub direct_referees: usize,
    /// Referees below the direct level, down to the kickback depth.
    pub indirect_referees: usize,
    pub kickback_points: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferralTreeNode {
    pub participant: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_at: Option<DateTime<Utc>>,
    pub children: Vec<ReferralTreeNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CodeValidation {
    pub code: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_uses: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReferralMetrics {
    pub total_codes: usize,
    pub total_links: usize,
    pub active_referrers: usize,
    pub exhausted_codes: usize,
    pub longest_chain: usize,
    pub total_kickback_points: u128,
}

/// Codes, links and kickback bookkeeping. Lock-free; the service serializes
/// writers around it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralGraph {
    codes: BTreeMap<String, ReferralCode>,
    owner_codes: BTreeMap<Address, Vec<String>>,
    links: BTreeMap<Address, ReferralLink>,
    #[serde(default)]
    kickback_totals: BTreeMap<Address, u128>,
    /// referrer → referees; derived from `links`.
    #[serde(skip)]
    referees: BTreeMap<Address, Vec<Address>>,
}

impl ReferralGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore derived indices after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.referees.clear();
        for link in self.links.values() {
            self.referees.entry(link.referrer).or_default().push(link.referee);
        }
    }

    pub fn code(&self, code: &str) -> Option<&ReferralCode> {
        self.codes.get(code)
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    pub fn codes_of(&self, owner: &Address) -> Vec<&ReferralCode> {
        self.owner_codes
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|c| self.codes.get(c))
            .collect()
    }

    pub fn link_of(&self, referee: &Address) -> Option<&ReferralLink> {
        self.links.get(referee)
    }

    pub(crate) fn insert_code(
        &mut self,
        owner: Address,
        code: String,
        now: DateTime<Utc>,
        config: &ReferralConfig,
    ) -> Result<ReferralCode, ReferralError> {
        let owned = self.owner_codes.get(&owner).map_or(0, Vec::len);
        if owned >= config.max_codes_per_owner as usize {
            return Err(ReferralError::CodeLimitReached {
                owner,
                limit: config.max_codes_per_owner,
            });
        }
        let record = ReferralCode {
            code: code.clone(),
            owner,
            created_at: now,
            usage_count: 0,
        };
        self.codes.insert(code.clone(), record.clone());
        self.owner_codes.entry(owner).or_default().push(code);
        Ok(record)
    }

    /// Check every link precondition and, if all hold, record the link and
    /// bump the code's usage in the same step.
    pub(crate) fn link(
        &mut self,
        referee: Address,
        code: &str,
        now: DateTime<Utc>,
        config: &ReferralConfig,
    ) -> Result<ReferralLink, ReferralError> {
        let record = self
            .codes
            .get(code)
            .ok_or_else(|| ReferralError::InvalidCode(code.to_string()))?;
        let referrer = record.owner;
        if referrer == referee {
            return Err(ReferralError::SelfReferral(referee));
        }
        if self.links.contains_key(&referee) {
            return Err(ReferralError::AlreadyReferred(referee));
        }
        if record.usage_count >= config.max_referees_per_code {
            return Err(ReferralError::CodeExhausted {
                code: code.to_string(),
                limit: config.max_referees_per_code,
            });
        }
        if self.reaches(referrer, referee) {
            return Err(ReferralError::CircularReferral { referee, referrer });
        }

        if let Some(record) = self.codes.get_mut(code) {
            record.usage_count += 1;
        }
        let link = ReferralLink {
            referee,
            referrer,
            code: code.to_string(),
            linked_at: now,
        };
        self.links.insert(referee, link.clone());
        self.referees.entry(referrer).or_default().push(referee);
        Ok(link)
    }

    /// Whether walking referrer pointers up from `start` reaches `target`.
    fn reaches(&self, start: Address, target: Address) -> bool {
        let mut visited = BTreeSet::new();
        let mut node = start;
        loop {
            if node == target {
                return true;
            }
            if !visited.insert(node) {
                return false;
            }
            match self.links.get(&node) {
                Some(link) => node = link.referrer,
                None => return false,
            }
        }
    }

    /// Referrer chain above `referee`, nearest first, at most `limit` long.
    pub fn ancestors(&self, referee: &Address, limit: usize) -> Vec<Address> {
        let mut chain = Vec::new();
        let mut visited = BTreeSet::from([*referee]);
        let mut node = *referee;
        while chain.len() < limit {
            let Some(link) = self.links.get(&node) else {
                break;
            };
            if !visited.insert(link.referrer) {
                break;
            }
            chain.push(link.referrer);
            node = link.referrer;
        }
        chain
    }

    /// Decayed kickbacks for `earned` points of `referee`.
    ///
    /// Depth 1 receives `earned × kickback_bps / 10_000`; each further level
    /// receives the previous level's amount × `depth_decay_bps / 10_000`.
    pub fn calculate_kickbacks(
        &self,
        referee: &Address,
        earned: u128,
        config: &ReferralConfig,
    ) -> Vec<Kickback> {
        if earned == 0 || config.kickback_bps == 0 {
            return Vec::new();
        }
        let mut level_amount = earned.saturating_mul(u128::from(config.kickback_bps)) / 10_000;
        let mut out = Vec::new();
        for (idx, referrer) in self
            .ancestors(referee, config.max_depth as usize)
            .into_iter()
            .enumerate()
        {
            if idx > 0 {
                level_amount =
                    level_amount.saturating_mul(u128::from(config.depth_decay_bps)) / 10_000;
            }
            if level_amount == 0 {
                break;
            }
            out.push(Kickback {
                referrer,
                depth: idx as u32 + 1,
                amount: level_amount,
            });
        }
        out
    }

    pub(crate) fn record_kickbacks(&mut self, kickbacks: &[Kickback]) {
        for k in kickbacks {
            let total = self.kickback_totals.entry(k.referrer).or_default();
            *total = total.saturating_add(k.amount);
        }
    }

    pub fn direct_referees(&self, referrer: &Address) -> &[Address] {
        self.referees.get(referrer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stats(&self, participant: &Address, config: &ReferralConfig) -> ReferralStats {
        let direct = self.direct_referees(participant);
        let mut indirect = 0usize;
        let mut frontier: Vec<Address> = direct.to_vec();
        for _ in 1..config.max_depth {
            frontier = frontier
                .iter()
                .flat_map(|p| self.direct_referees(p).iter().copied())
                .collect();
            indirect += frontier.len();
        }
        ReferralStats {
            participant: *participant,
            referrer: self.links.get(participant).map(|l| l.referrer),
            codes: self.codes_of(participant).into_iter().cloned().collect(),
            direct_referees: direct.len(),
            indirect_referees: indirect,
            kickback_points: self.kickback_totals.get(participant).copied().unwrap_or(0),
        }
    }

    pub fn tree(&self, root: &Address, depth: u32) -> ReferralTreeNode {
        let link = self.links.get(root);
        ReferralTreeNode {
            participant: *root,
            code: link.map(|l| l.code.clone()),
            linked_at: link.map(|l| l.linked_at),
            children: if depth == 0 {
                Vec::new()
            } else {
                self.direct_referees(root)
                    .iter()
                    .map(|child| self.tree(child, depth - 1))
                    .collect()
            },
        }
    }

    pub fn validate_code(&self, code: &str, config: &ReferralConfig) -> CodeValidation {
        match self.codes.get(code) {
            None => CodeValidation {
                code: code.to_string(),
                valid: false,
                owner: None,
                remaining_uses: None,
                reason: Some("INVALID_CODE"),
            },
            Some(record) => {
                let remaining = config.max_referees_per_code.saturating_sub(record.usage_count);
                CodeValidation {
                    code: code.to_string(),
                    valid: remaining > 0,
                    owner: Some(record.owner),
                    remaining_uses: Some(remaining),
                    reason: (remaining == 0).then_some("CODE_EXHAUSTED"),
                }
            }
        }
    }

    pub fn metrics(&self, config: &ReferralConfig) -> ReferralMetrics {
        let longest_chain = self
            .links
            .keys()
            .map(|referee| self.ancestors(referee, self.links.len()).len())
            .max()
            .unwrap_or(0);
        ReferralMetrics {
            total_codes: self.codes.len(),
            total_links: self.links.len(),
            active_referrers: self.referees.len(),
            exhausted_codes: self
                .codes
                .values()
                .filter(|c| c.usage_count >= config.max_referees_per_code)
                .count(),
            longest_chain,
            total_kickback_points: self.kickback_totals.values().sum(),
        }
    }
}
