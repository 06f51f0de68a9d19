//! Domain-separated hashing and Merkle inclusion paths.
//! SECURITY: Uses BLAKE3 (256-bit).
//!
//! Leaves and interior nodes are hashed under distinct prefixes so that a
//! leaf can never be reinterpreted as an interior node. An odd node at the
//! end of a level is promoted unchanged to the next level.
//!
//! Ledger leaves carry their position ([`hash_position_leaf`]) and published
//! roots carry the leaf count ([`commit_root`]), so a path can only fold to a
//! published root from the position and tree size it was built for.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// 32-byte BLAKE3 digest
pub type Hash = [u8; 32];

/// Prefix for Merkle leaves
pub const LEAF_DOMAIN: &[u8] = b"4MIK-LEAF-V1";
/// Prefix for Merkle interior nodes
pub const NODE_DOMAIN: &[u8] = b"4MIK-NODE-V1";
/// Prefix for a root bound to its leaf count
pub const ROOT_DOMAIN: &[u8] = b"4MIK-ROOT-V1";

/// Which side of the running hash a sibling sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Sibling is the left operand
    Left,
    /// Sibling is the right operand
    Right,
}

/// One level of an inclusion path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash at this level
    pub sibling: Hash,
    /// Position of the sibling relative to the running hash
    pub side: Side,
}

/// Hash a leaf value
pub fn hash_leaf(data: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash a leaf value together with its position in the tree
pub fn hash_position_leaf(index: u64, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(&index.to_le_bytes());
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Bind a tree root to the number of leaves under it
pub fn commit_root(tree_root: &Hash, leaf_count: u64) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(ROOT_DOMAIN);
    hasher.update(&leaf_count.to_le_bytes());
    hasher.update(tree_root);
    *hasher.finalize().as_bytes()
}

/// Hash two children into their parent
pub fn hash_parent(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(NODE_DOMAIN);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .filter_map(|pair| match pair {
            [left, right] => Some(hash_parent(left, right)),
            [single] => Some(*single),
            _ => None,
        })
        .collect()
}

/// Compute the root over already leaf-hashed values
pub fn merkle_root(leaves: &[Hash]) -> Option<Hash> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied()
}

/// Build the inclusion path for the leaf at `index`
pub fn merkle_path(leaves: &[Hash], index: usize) -> Option<Vec<ProofStep>> {
    if index >= leaves.len() {
        return None;
    }

    let mut steps = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;

    while level.len() > 1 {
        if position % 2 == 1 {
            steps.push(ProofStep {
                sibling: level[position - 1],
                side: Side::Left,
            });
        } else if position + 1 < level.len() {
            steps.push(ProofStep {
                sibling: level[position + 1],
                side: Side::Right,
            });
        }
        level = next_level(&level);
        position /= 2;
    }

    Some(steps)
}

/// Fold an inclusion path back up to a root.
///
/// Sibling sides are derived from `index` and `leaf_count`; a path whose
/// recorded sides or length disagree with the claimed position is rejected.
pub fn fold_path(leaf: Hash, index: u64, leaf_count: u64, steps: &[ProofStep]) -> Option<Hash> {
    if index >= leaf_count {
        return None;
    }

    let mut running = leaf;
    let mut position = index;
    let mut width = leaf_count;
    let mut remaining = steps.iter();

    while width > 1 {
        if position % 2 == 1 {
            let step = remaining.next()?;
            if step.side != Side::Left {
                return None;
            }
            running = hash_parent(&step.sibling, &running);
        } else if position + 1 < width {
            let step = remaining.next()?;
            if step.side != Side::Right {
                return None;
            }
            running = hash_parent(&running, &step.sibling);
        }
        position /= 2;
        width = width.div_ceil(2);
    }

    if remaining.next().is_some() {
        return None;
    }
    Some(running)
}
