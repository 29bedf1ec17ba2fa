use crate::{
    error::CommitError,
    hash::{hash_pair, Hash, ZERO_HASH},
};

/// Sorted-pair Keccak merkle tree.
///
/// The leaf layer is padded with [`ZERO_HASH`] up to the next power of two,
/// never by repeating the last real leaf. Any unmatched node above the leaf
/// layer folds with itself through [`hash_pair`].
#[derive(Clone, Debug)]
pub struct MerkleTree {
    layers: Vec<Vec<Hash>>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from leaf hashes in their committed order.
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        let leaf_count = leaves.len();
        if leaves.is_empty() {
            return Self {
                layers: vec![vec![ZERO_HASH]],
                leaf_count,
            };
        }

        let mut layer = leaves;
        layer.resize(leaf_count.next_power_of_two(), ZERO_HASH);

        let mut layers = Vec::new();
        while layer.len() > 1 {
            let next = layer
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            layers.push(std::mem::replace(&mut layer, next));
        }
        layers.push(layer);

        Self { layers, leaf_count }
    }

    /// Merkle root; [`ZERO_HASH`] when no leaves were supplied.
    pub fn root(&self) -> Hash {
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    /// Number of real (unpadded) leaves.
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Every layer from the padded leaves up to the root.
    pub fn layers(&self) -> &[Vec<Hash>] {
        &self.layers
    }

    /// Sibling hashes for the leaf at `index`, bottom-up.
    ///
    /// A layer with no sibling for the walked node contributes nothing.
    pub fn proof(&self, index: usize) -> Result<Vec<Hash>, CommitError> {
        if index >= self.leaf_count {
            return Err(CommitError::ProofIndexOutOfRange {
                index,
                len: self.leaf_count,
            });
        }
        let mut proof = Vec::with_capacity(self.layers.len().saturating_sub(1));
        let mut idx = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            if let Some(sibling) = layer.get(idx ^ 1) {
                proof.push(*sibling);
            }
            idx /= 2;
        }
        Ok(proof)
    }
}

/// Replay sorted-pair hashing along `proof` and compare with `root`.
pub fn verify(leaf: &Hash, proof: &[Hash], root: &Hash) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    &computed == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{address::Address, hash::leaf_hash, keccak256, parse_hash, to_hex};
    use proptest::prelude::*;

    fn vector_leaves() -> Vec<Hash> {
        [
            ("0x1111111111111111111111111111111111111111", 1000u128),
            ("0x2222222222222222222222222222222222222222", 2500),
            ("0x3333333333333333333333333333333333333333", 42),
        ]
        .iter()
        .map(|(a, p)| leaf_hash(&a.parse::<Address>().unwrap(), *p, 1))
        .collect()
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let tree = MerkleTree::from_leaves(vec![]);
        assert_eq!(tree.root(), ZERO_HASH);
        assert!(tree.is_empty());
        assert!(tree.proof(0).is_err());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let leaf = keccak256(b"solo");
        let tree = MerkleTree::from_leaves(vec![leaf]);
        assert_eq!(tree.root(), leaf);
        let proof = tree.proof(0).unwrap();
        assert!(proof.is_empty());
        assert!(verify(&leaf, &proof, &tree.root()));
    }

    #[test]
    fn three_leaves_pad_with_zero_hash() {
        let leaves = vector_leaves();
        let tree = MerkleTree::from_leaves(leaves.clone());

        assert_eq!(tree.layers()[0].len(), 4);
        assert_eq!(tree.layers()[0][3], ZERO_HASH);
        assert_eq!(
            to_hex(&tree.layers()[1][1]),
            "0x3d27b461574f55e3dbed2a53ce7ab15cbe704e03d8dae5d3085e4e34669fff8f"
        );
        // Cross-checked against an independent keccak implementation.
        assert_eq!(
            to_hex(&tree.root()),
            "0x4a550b16cfecb96b4d9c2cc3e54be946fac53d9bf5a7f915539307a5e07f79e8"
        );

        let proof = tree.proof(2).unwrap();
        assert_eq!(proof[0], ZERO_HASH);
        for (i, leaf) in leaves.iter().enumerate() {
            assert!(verify(leaf, &tree.proof(i).unwrap(), &tree.root()), "leaf {i}");
        }
    }

    #[test]
    fn two_leaf_root_is_pair_hash() {
        let leaves = vector_leaves();
        let tree = MerkleTree::from_leaves(leaves[..2].to_vec());
        assert_eq!(
            tree.root(),
            parse_hash("0x24c7248d8be6e608d782a0e7644b1e92de07e10a826b36406550d4c5024eb1b4").unwrap()
        );
    }

    #[test]
    fn tampered_proof_or_root_fails() {
        let leaves = vector_leaves();
        let tree = MerkleTree::from_leaves(leaves.clone());
        let mut proof = tree.proof(0).unwrap();
        let root = tree.root();

        let mut bad_root = root;
        bad_root[0] ^= 0xff;
        assert!(!verify(&leaves[0], &proof, &bad_root));

        proof[0][31] ^= 0x01;
        assert!(!verify(&leaves[0], &proof, &root));
    }

    proptest! {
        #[test]
        fn every_proof_verifies(seeds in proptest::collection::vec(any::<u64>(), 1..40)) {
            let leaves: Vec<Hash> = seeds.iter().map(|s| keccak256(&s.to_be_bytes())).collect();
            let tree = MerkleTree::from_leaves(leaves.clone());
            let root = tree.root();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                prop_assert!(verify(leaf, &proof, &root));
            }
        }
    }
}
