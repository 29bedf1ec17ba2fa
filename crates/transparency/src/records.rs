use chrono::{DateTime, Utc};
use points_commit::{Address, Hash};
use serde::{Deserialize, Serialize};

/// Immutable description of one published snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub snapshot_id: u64,
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
    pub total_participants: usize,
    #[serde(with = "u128_string")]
    pub total_points: u128,
    #[serde(with = "hash_hex")]
    pub merkle_root: Hash,
    /// Relative to the output root.
    pub csv_path: String,
    pub csv_hash: String,
}

/// One committed leaf, stored verbatim at publish time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleLeafRecord {
    pub snapshot_id: u64,
    pub index: usize,
    pub address: Address,
    #[serde(with = "u128_string")]
    pub points: u128,
    #[serde(with = "hash_hex")]
    pub leaf: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotProof {
    pub snapshot_id: u64,
    pub index: usize,
    pub address: Address,
    #[serde(with = "u128_string")]
    pub points: u128,
    #[serde(with = "hash_hex")]
    pub leaf: Hash,
    #[serde(with = "hash_hex_vec")]
    pub proof: Vec<Hash>,
    #[serde(with = "hash_hex")]
    pub root: Hash,
}

impl SnapshotProof {
    pub fn verify(&self) -> bool {
        points_commit::verify(&self.leaf, &self.proof, &self.root)
    }
}

// uint256-sized values are strings so JavaScript consumers don't lose precision.
pub(crate) mod u128_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        String::deserialize(d)?.parse().map_err(D::Error::custom)
    }
}

pub(crate) mod hash_hex {
    use points_commit::{parse_hash, to_hex, Hash};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Hash, D::Error> {
        parse_hash(&String::deserialize(d)?).map_err(D::Error::custom)
    }
}

pub(crate) mod hash_hex_vec {
    use points_commit::{parse_hash, to_hex, Hash};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hashes: &[Hash], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(hashes.iter().map(to_hex))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Hash>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|h| parse_hash(h).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use points_commit::keccak256;

    #[test]
    fn leaf_record_json_shape() {
        let record = MerkleLeafRecord {
            snapshot_id: 3,
            index: 0,
            address: "0x1111111111111111111111111111111111111111".parse().unwrap(),
            points: u128::MAX,
            leaf: keccak256(b"x"),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["points"], u128::MAX.to_string());
        assert!(value["leaf"].as_str().unwrap().starts_with("0x"));
        let back: MerkleLeafRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
