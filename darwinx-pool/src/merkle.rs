//! Merkle branch computation and folding.
//!
//! All hashes here are in internal (natural double-SHA-256 output) byte
//! order — the order pairwise hashing actually happens in. Callers reverse
//! to big-endian only at the wire boundary (hex for `mining.notify`'s
//! `merkle_branch`, or `txid` display).

use crate::codec::double_sha256;

/// Build the merkle branch anchored on the coinbase (index 0) leaf.
///
/// `leaves` is `[coinbase_txid] || [tx_txid, ...]`, all in internal byte
/// order. Returns the sibling at each layer needed to climb from the
/// coinbase leaf to the root — exactly what `mining.notify`'s
/// `merkle_branch` carries (reverse each to BE hex at the wire boundary).
pub fn compute_branch(leaves: &[[u8; 32]]) -> Vec<[u8; 32]> {
    if leaves.is_empty() {
        return Vec::new();
    }

    let mut branch = Vec::new();
    let mut layer: Vec<[u8; 32]> = leaves.to_vec();
    let mut index = 0usize;

    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            let last = *layer.last().unwrap();
            layer.push(last);
        }

        let sibling_index = index ^ 1;
        branch.push(layer[sibling_index]);

        layer = layer
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        index >>= 1;
    }

    branch
}

/// Fold a branch back into a root, starting from `leaf` (the coinbase
/// txid once extranonce2 is known).
pub fn fold_branch(leaf: [u8; 32], branch: &[[u8; 32]]) -> [u8; 32] {
    branch
        .iter()
        .fold(leaf, |acc, sibling| hash_pair(&acc, sibling))
}

fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(a);
    buf[32..].copy_from_slice(b);
    double_sha256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn single_leaf_has_empty_branch() {
        let branch = compute_branch(&[leaf(1)]);
        assert!(branch.is_empty());
        assert_eq!(fold_branch(leaf(1), &branch), leaf(1));
    }

    #[test]
    fn two_leaves_branch_folds_to_root() {
        let leaves = [leaf(1), leaf(2)];
        let branch = compute_branch(&leaves);
        assert_eq!(branch.len(), 1);
        assert_eq!(branch[0], leaf(2));

        let expected_root = hash_pair(&leaf(1), &leaf(2));
        assert_eq!(fold_branch(leaves[0], &branch), expected_root);
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        let leaves = [leaf(1), leaf(2), leaf(3)];
        let branch = compute_branch(&leaves);

        // Independently build the tree with end-duplication and compare roots.
        let padded = [leaf(1), leaf(2), leaf(3), leaf(3)];
        let layer1 = [hash_pair(&padded[0], &padded[1]), hash_pair(&padded[2], &padded[3])];
        let root_from_scratch = hash_pair(&layer1[0], &layer1[1]);

        assert_eq!(fold_branch(leaves[0], &branch), root_from_scratch);
    }

    #[test]
    fn branch_matches_from_scratch_construction_for_larger_set() {
        let leaves: Vec<[u8; 32]> = (0..7u8).map(leaf).collect();
        let branch = compute_branch(&leaves);
        let root_via_branch = fold_branch(leaves[0], &branch);

        // Recompute the whole tree from scratch and compare the root.
        let mut layer = leaves.clone();
        while layer.len() > 1 {
            if layer.len() % 2 == 1 {
                let last = *layer.last().unwrap();
                layer.push(last);
            }
            layer = layer.chunks(2).map(|p| hash_pair(&p[0], &p[1])).collect();
        }

        assert_eq!(root_via_branch, layer[0]);
    }
}
