//! A full in-memory MS-SMT. Only non-empty branches are stored; empty
//! subtrees are answered from the precomputed empty tree.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use taproot_assets_types::mssmt::{bit_index, empty_tree, MssmtNode, MssmtProof, MAX_TREE_LEVELS};
use thiserror::Error;

/// Errors returned by tree updates.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Inserting the leaf would overflow the root sum.
    #[error("MS-SMT sum overflow")]
    SumOverflow,
}

/// Value and sum of a stored leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafValue {
    pub value: Vec<u8>,
    pub sum: u64,
}

impl LeafValue {
    pub fn node(&self) -> MssmtNode {
        MssmtNode::leaf(&self.value, self.sum)
    }
}

/// Branches are addressed by their depth (0 is the root) and the key prefix
/// leading to them, with every bit at or below the depth cleared.
type BranchKey = (u16, [u8; 32]);

#[derive(Debug, Clone)]
pub struct MssmtTree {
    branches: BTreeMap<BranchKey, MssmtNode>,
    leaves: BTreeMap<[u8; 32], LeafValue>,
    empty: Vec<MssmtNode>,
}

impl Default for MssmtTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the first `depth` bits of `key`.
fn prefix(key: &[u8; 32], depth: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    let full_bytes = depth / 8;
    out[..full_bytes].copy_from_slice(&key[..full_bytes]);
    let rem = depth % 8;
    if rem > 0 {
        out[full_bytes] = key[full_bytes] & ((1u8 << rem) - 1);
    }
    out
}

/// Prefix of the node next to the one at `depth` on the path of `key`.
fn sibling_prefix(key: &[u8; 32], depth: usize) -> [u8; 32] {
    let mut out = prefix(key, depth);
    let bit = depth - 1;
    out[bit / 8] ^= 1 << (bit % 8);
    out
}

impl MssmtTree {
    pub fn new() -> Self {
        MssmtTree {
            branches: BTreeMap::new(),
            leaves: BTreeMap::new(),
            empty: empty_tree(),
        }
    }

    fn node_at(&self, depth: usize, prefix: &[u8; 32]) -> MssmtNode {
        if depth == MAX_TREE_LEVELS {
            return self
                .leaves
                .get(prefix)
                .map_or(self.empty[MAX_TREE_LEVELS], LeafValue::node);
        }
        self.branches
            .get(&(depth as u16, *prefix))
            .copied()
            .unwrap_or(self.empty[depth])
    }

    /// Recomputes the branches above `leaf` without touching the tree.
    fn path_to_root(&self, key: &[u8; 32], leaf: MssmtNode) -> Result<Vec<MssmtNode>, Error> {
        let mut path = Vec::with_capacity(MAX_TREE_LEVELS);
        let mut current = leaf;
        for depth in (0..MAX_TREE_LEVELS).rev() {
            let sibling = self.node_at(depth + 1, &sibling_prefix(key, depth + 1));
            let (left, right) = if bit_index(depth, key) == 0 {
                (current, sibling)
            } else {
                (sibling, current)
            };
            current = MssmtNode::branch(&left, &right).map_err(|_| Error::SumOverflow)?;
            path.push(current);
        }
        Ok(path)
    }

    /// Writes a path computed by `path_to_root`, dropping empty subtrees.
    fn commit_path(&mut self, key: &[u8; 32], path: Vec<MssmtNode>) {
        for (idx, node) in path.into_iter().enumerate() {
            let depth = MAX_TREE_LEVELS - 1 - idx;
            let branch_key = (depth as u16, prefix(key, depth));
            if node == self.empty[depth] {
                self.branches.remove(&branch_key);
            } else {
                self.branches.insert(branch_key, node);
            }
        }
    }

    /// Inserts or replaces the leaf at `key`. The tree is unchanged on error.
    pub fn insert(&mut self, key: [u8; 32], value: Vec<u8>, sum: u64) -> Result<(), Error> {
        let leaf = LeafValue { value, sum };
        let path = self.path_to_root(&key, leaf.node())?;
        self.leaves.insert(key, leaf);
        self.commit_path(&key, path);
        Ok(())
    }

    /// Removes the leaf at `key`, returning it if it existed.
    pub fn delete(&mut self, key: &[u8; 32]) -> Result<Option<LeafValue>, Error> {
        if !self.leaves.contains_key(key) {
            return Ok(None);
        }
        let path = self.path_to_root(key, self.empty[MAX_TREE_LEVELS])?;
        let removed = self.leaves.remove(key);
        self.commit_path(key, path);
        Ok(removed)
    }

    pub fn get(&self, key: &[u8; 32]) -> Option<&LeafValue> {
        self.leaves.get(key)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaves in key order.
    pub fn leaves(&self) -> impl Iterator<Item = (&[u8; 32], &LeafValue)> {
        self.leaves.iter()
    }

    pub fn root(&self) -> MssmtNode {
        self.node_at(0, &[0u8; 32])
    }

    /// The two children of the root, left first.
    pub fn root_children(&self) -> (MssmtNode, MssmtNode) {
        let mut right = [0u8; 32];
        right[0] = 1;
        (self.node_at(1, &[0u8; 32]), self.node_at(1, &right))
    }

    /// Siblings along the path of `key`, leaf level first. Works for absent
    /// keys too, which makes it a non-inclusion proof for the empty leaf.
    pub fn merkle_proof(&self, key: &[u8; 32]) -> MssmtProof {
        let nodes = (0..MAX_TREE_LEVELS)
            .map(|idx| {
                let depth = MAX_TREE_LEVELS - idx;
                self.node_at(depth, &sibling_prefix(key, depth))
            })
            .collect();
        MssmtProof { nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash};

    fn key(seed: u8) -> [u8; 32] {
        Sha256Hash::hash(&[seed]).to_byte_array()
    }

    #[test]
    fn empty_tree_root() {
        let tree = MssmtTree::new();
        assert_eq!(tree.root(), empty_tree()[0]);
        assert!(tree.is_empty());
    }

    #[test]
    fn root_sum_tracks_leaves() {
        let mut tree = MssmtTree::new();
        tree.insert(key(1), b"one".to_vec(), 10).unwrap();
        tree.insert(key(2), b"two".to_vec(), 32).unwrap();
        assert_eq!(tree.root().sum, 42);
        assert_eq!(tree.len(), 2);

        tree.insert(key(1), b"one again".to_vec(), 5).unwrap();
        assert_eq!(tree.root().sum, 37);
        assert_eq!(tree.get(&key(1)).unwrap().value, b"one again".to_vec());
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = MssmtTree::new();
        let mut b = MssmtTree::new();
        for seed in 0..16u8 {
            a.insert(key(seed), vec![seed], seed as u64).unwrap();
        }
        for seed in (0..16u8).rev() {
            b.insert(key(seed), vec![seed], seed as u64).unwrap();
        }
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn delete_restores_previous_root() {
        let mut tree = MssmtTree::new();
        tree.insert(key(1), b"a".to_vec(), 1).unwrap();
        let root = tree.root();
        tree.insert(key(2), b"b".to_vec(), 2).unwrap();
        assert_ne!(tree.root(), root);

        assert!(tree.delete(&key(2)).unwrap().is_some());
        assert_eq!(tree.root(), root);
        assert!(tree.delete(&key(2)).unwrap().is_none());

        tree.delete(&key(1)).unwrap();
        assert_eq!(tree.root(), empty_tree()[0]);
        assert!(tree.branches.is_empty());
    }

    #[test]
    fn overflow_leaves_tree_untouched() {
        let mut tree = MssmtTree::new();
        tree.insert(key(1), b"a".to_vec(), u64::MAX).unwrap();
        let root = tree.root();
        assert_eq!(
            tree.insert(key(2), b"b".to_vec(), 1),
            Err(Error::SumOverflow)
        );
        assert_eq!(tree.root(), root);
        assert!(tree.get(&key(2)).is_none());
    }

    #[test]
    fn proofs_verify_against_root() {
        let mut tree = MssmtTree::new();
        for seed in 0..8u8 {
            tree.insert(key(seed), vec![seed; 3], 100 + seed as u64)
                .unwrap();
        }
        let root = tree.root();

        let leaf = tree.get(&key(3)).unwrap().node();
        let proof = tree.merkle_proof(&key(3));
        assert_eq!(proof.root(&key(3), leaf).unwrap(), root);

        let children = proof.root_children(&key(3), leaf).unwrap();
        assert_eq!(children, tree.root_children());

        // Non-inclusion: the empty leaf at an absent key hashes to the root.
        let absent = key(200);
        let proof = tree.merkle_proof(&absent);
        assert_eq!(
            proof.root(&absent, MssmtNode::empty_leaf()).unwrap(),
            root
        );

        // The compressed encoding keeps the proof intact.
        let decoded = MssmtProof::from_bytes(&proof.encode()).unwrap();
        assert_eq!(
            decoded.root(&absent, MssmtNode::empty_leaf()).unwrap(),
            root
        );
    }
}
