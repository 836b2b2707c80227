//! Merkle Tree
//!
//! Binary Merkle tree over atom proofs, kept as bottom-up layers so a
//! sealed block can persist them and serve inclusion proofs later.
//! Parents hash the string concatenation of their children's hex
//! digests; an odd trailing node is paired with itself.

use serde::{Deserialize, Serialize};

use crate::hash::hash;

/// Sentinel hashed as the root of a tree with no leaves.
const EMPTY_SENTINEL: &str = "empty";

/// Tree layers, bottom-up. `layers[0]` is the leaf sequence; the last
/// layer holds the single root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleTree {
    pub root: String,
    pub layers: Vec<Vec<String>>,
}

/// Which side a proof-step sibling sits on relative to the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofStep {
    pub hash: String,
    pub direction: Direction,
}

/// Build a tree over `leaves`, halving each layer by pairwise hashing
/// until one node remains. An empty input yields `hash("empty")` over a
/// single empty layer; a single leaf is its own root.
pub fn build_tree(leaves: &[String]) -> MerkleTree {
    if leaves.is_empty() {
        return MerkleTree {
            root: hash(EMPTY_SENTINEL),
            layers: vec![Vec::new()],
        };
    }

    let mut layers: Vec<Vec<String>> = vec![leaves.to_vec()];
    let mut current = leaves.to_vec();

    while current.len() > 1 {
        let mut next = Vec::with_capacity((current.len() + 1) / 2);
        for pair in current.chunks(2) {
            let left = &pair[0];
            // An odd node pairs with itself.
            let right = pair.get(1).unwrap_or(left);
            next.push(hash(&format!("{}{}", left, right)));
        }
        layers.push(next.clone());
        current = next;
    }

    MerkleTree {
        root: current[0].clone(),
        layers,
    }
}

/// Inclusion proof for `leaf_index` against bottom-up `layers`.
///
/// For each non-root layer the sibling node is emitted: the left
/// neighbour when the index is odd, the right neighbour otherwise, and
/// the node itself when it has no sibling (mirroring the self-pair rule
/// used during the build). Returns `None` for an out-of-range index.
pub fn merkle_proof(layers: &[Vec<String>], leaf_index: usize) -> Option<Vec<ProofStep>> {
    let leaves = layers.first()?;
    if leaf_index >= leaves.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut index = leaf_index;

    for layer in &layers[..layers.len() - 1] {
        let step = if index % 2 == 1 {
            ProofStep {
                hash: layer[index - 1].clone(),
                direction: Direction::Left,
            }
        } else {
            let sibling = layer.get(index + 1).unwrap_or(&layer[index]);
            ProofStep {
                hash: sibling.clone(),
                direction: Direction::Right,
            }
        };
        proof.push(step);
        index /= 2;
    }

    Some(proof)
}

/// Fold a proof up from `leaf_hash` and compare against `expected_root`.
pub fn verify_merkle_proof(leaf_hash: &str, proof: &[ProofStep], expected_root: &str) -> bool {
    let mut current = leaf_hash.to_string();

    for step in proof {
        current = match step.direction {
            Direction::Left => hash(&format!("{}{}", step.hash, current)),
            Direction::Right => hash(&format!("{}{}", current, step.hash)),
        };
    }

    current == expected_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| hash(&format!("leaf-{}", i))).collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = build_tree(&[]);
        assert_eq!(tree.root, hash("empty"));
        assert_eq!(tree.layers, vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let l = leaves(1);
        let tree = build_tree(&l);
        assert_eq!(tree.root, l[0]);
        assert_eq!(tree.layers.len(), 1);

        let proof = merkle_proof(&tree.layers, 0).unwrap();
        assert!(proof.is_empty());
        assert!(verify_merkle_proof(&l[0], &proof, &tree.root));
    }

    #[test]
    fn test_pair_hashing() {
        let l = leaves(2);
        let tree = build_tree(&l);
        assert_eq!(tree.root, hash(&format!("{}{}", l[0], l[1])));
    }

    #[test]
    fn test_eight_leaves_proof_depth() {
        let l = leaves(8);
        let tree = build_tree(&l);
        assert_eq!(tree.layers.len(), 4);

        let proof = merkle_proof(&tree.layers, 3).unwrap();
        assert_eq!(proof.len(), 3);
        assert!(verify_merkle_proof(&l[3], &proof, &tree.root));
    }

    #[test]
    fn test_all_leaves_verify() {
        for n in 1..=9 {
            let l = leaves(n);
            let tree = build_tree(&l);
            for (i, leaf) in l.iter().enumerate() {
                let proof = merkle_proof(&tree.layers, i).unwrap();
                assert!(
                    verify_merkle_proof(leaf, &proof, &tree.root),
                    "leaf {} of {} failed",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_odd_tree_self_pair_rule() {
        // Leaves 0 and 4 of a 5-leaf tree: 4 is the odd node at two
        // consecutive levels and must self-pair both times.
        let l = leaves(5);
        let tree = build_tree(&l);

        let proof = merkle_proof(&tree.layers, 0).unwrap();
        assert!(verify_merkle_proof(&l[0], &proof, &tree.root));

        let proof = merkle_proof(&tree.layers, 4).unwrap();
        assert!(verify_merkle_proof(&l[4], &proof, &tree.root));
        assert_eq!(proof[0].hash, l[4]);
        assert_eq!(proof[0].direction, Direction::Right);
    }

    #[test]
    fn test_wrong_leaf_fails() {
        let l = leaves(8);
        let tree = build_tree(&l);
        let proof = merkle_proof(&tree.layers, 3).unwrap();

        assert!(!verify_merkle_proof(&hash("not a leaf"), &proof, &tree.root));
        assert!(!verify_merkle_proof(&l[2], &proof, &tree.root));
    }

    #[test]
    fn test_wrong_root_fails() {
        let l = leaves(4);
        let tree = build_tree(&l);
        let proof = merkle_proof(&tree.layers, 1).unwrap();
        assert!(!verify_merkle_proof(&l[1], &proof, &hash("wrong root")));
    }

    #[test]
    fn test_out_of_range_index() {
        let l = leaves(3);
        let tree = build_tree(&l);
        assert!(merkle_proof(&tree.layers, 3).is_none());
    }

    #[test]
    fn test_changing_a_leaf_changes_the_root() {
        let mut l = leaves(6);
        let before = build_tree(&l).root;
        l[2] = hash("tampered");
        assert_ne!(before, build_tree(&l).root);
    }
}
