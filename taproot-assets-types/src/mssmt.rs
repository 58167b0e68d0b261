use crate::error::Error;
use crate::tlv::{pack_bits, read_array, unpack_bits};
use alloc::{format, string::ToString, vec::Vec};
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use bitcoin::io::Read;
use serde::{Deserialize, Serialize};

/// Depth of the tree; every key is 256 bits long.
pub const MAX_TREE_LEVELS: usize = 256;

/// Represents a node in an MS-SMT (Merkle Sum Sparse Merkle Tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MssmtNode {
    /// The hash of the node.
    pub hash: Sha256Hash,
    /// The sum of the node.
    pub sum: u64,
}

impl MssmtNode {
    /// Hash of a leaf: `sha256(value || sum)`.
    pub fn leaf(value: &[u8], sum: u64) -> Self {
        let mut engine = Sha256Hash::engine();
        engine.input(value);
        engine.input(&sum.to_be_bytes());
        MssmtNode {
            hash: Sha256Hash::from_engine(engine),
            sum,
        }
    }

    /// Hash of a branch: `sha256(left.hash || right.hash || left.sum + right.sum)`.
    pub fn branch(left: &MssmtNode, right: &MssmtNode) -> Result<Self, Error> {
        let sum = left
            .sum
            .checked_add(right.sum)
            .ok_or(Error::InvalidTlvValue(0, "MS-SMT sum overflow".to_string()))?;
        let mut engine = Sha256Hash::engine();
        engine.input(left.hash.as_byte_array());
        engine.input(right.hash.as_byte_array());
        engine.input(&sum.to_be_bytes());
        Ok(MssmtNode {
            hash: Sha256Hash::from_engine(engine),
            sum,
        })
    }

    pub fn empty_leaf() -> Self {
        MssmtNode::leaf(&[], 0)
    }

    /// Nodes with an all-zero hash and zero sum are placeholders for empty
    /// siblings.
    pub fn is_placeholder(&self) -> bool {
        self.sum == 0 && self.hash == Sha256Hash::all_zeros()
    }
}

/// Returns the hash of an empty subtree at every depth: index 0 is the empty
/// root, index `MAX_TREE_LEVELS` is the empty leaf.
pub fn empty_tree() -> Vec<MssmtNode> {
    let mut nodes = alloc::vec![MssmtNode::empty_leaf(); MAX_TREE_LEVELS + 1];
    for depth in (0..MAX_TREE_LEVELS).rev() {
        let child = nodes[depth + 1];
        // Child sums are zero, this cannot overflow.
        nodes[depth] = MssmtNode::branch(&child, &child).unwrap_or(child);
    }
    nodes
}

/// Returns the bit of `key` that selects the child at `depth` (0 is the root).
pub fn bit_index(depth: usize, key: &[u8; 32]) -> u8 {
    (key[depth / 8] >> (depth % 8)) & 1
}

/// Represents a merkle proof for a MS-SMT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MssmtProof {
    /// Siblings that should be hashed with the leaf and its parents to arrive
    /// at the root. `nodes[0]` is the sibling of the leaf, the last entry is a
    /// child of the root.
    pub nodes: Vec<MssmtNode>,
}

impl MssmtProof {
    /// Walks the proof from `leaf` up to the root for `key`.
    pub fn root(&self, key: &[u8; 32], leaf: MssmtNode) -> Result<MssmtNode, Error> {
        let (left, right) = self.root_children(key, leaf)?;
        MssmtNode::branch(&left, &right)
    }

    /// Like `root`, but returns the two children of the root instead.
    pub fn root_children(
        &self,
        key: &[u8; 32],
        leaf: MssmtNode,
    ) -> Result<(MssmtNode, MssmtNode), Error> {
        if self.nodes.len() != MAX_TREE_LEVELS {
            return Err(Error::InvalidTlvValue(
                0,
                format!("MS-SMT proof has {} nodes", self.nodes.len()),
            ));
        }
        let empty = empty_tree();
        let sibling_at = |idx: usize| {
            let node = self.nodes[idx];
            if node.is_placeholder() {
                empty[MAX_TREE_LEVELS - idx]
            } else {
                node
            }
        };
        let order = |depth: usize, current: MssmtNode, sibling: MssmtNode| {
            if bit_index(depth, key) == 0 {
                (current, sibling)
            } else {
                (sibling, current)
            }
        };

        let mut current = leaf;
        for idx in 0..MAX_TREE_LEVELS - 1 {
            let depth = MAX_TREE_LEVELS - 1 - idx;
            let (left, right) = order(depth, current, sibling_at(idx));
            current = MssmtNode::branch(&left, &right)?;
        }
        Ok(order(0, current, sibling_at(MAX_TREE_LEVELS - 1)))
    }

    /// Encodes the proof in compressed form, omitting empty siblings.
    pub fn encode(&self) -> Vec<u8> {
        let empty = empty_tree();
        let mut explicit = Vec::new();
        let mut bits = Vec::with_capacity(MAX_TREE_LEVELS);
        for (idx, node) in self.nodes.iter().enumerate() {
            let depth = MAX_TREE_LEVELS.saturating_sub(idx);
            let is_empty = node.is_placeholder() || empty.get(depth) == Some(node);
            bits.push(is_empty);
            if !is_empty {
                explicit.push(*node);
            }
        }

        let mut out = Vec::with_capacity(2 + explicit.len() * 40 + 32);
        out.extend_from_slice(&(explicit.len() as u16).to_be_bytes());
        for node in explicit {
            out.extend_from_slice(node.hash.as_byte_array());
            out.extend_from_slice(&node.sum.to_be_bytes());
        }
        let mut packed = pack_bits(&bits);
        packed.resize(MAX_TREE_LEVELS / 8, 0);
        out.extend_from_slice(&packed);
        out
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        // - 2 bytes: number of nodes (uint16, big endian)
        // - For each node: 32 bytes hash + 8 bytes sum (uint64, big endian)
        // - 32 bytes of packed bits, a set bit marks an empty sibling
        let num_nodes = u16::from_be_bytes(read_array(r)?) as usize;
        if num_nodes > MAX_TREE_LEVELS {
            return Err(Error::InvalidTlvValue(
                0,
                format!("too many MS-SMT proof nodes: {}", num_nodes),
            ));
        }

        let mut explicit_nodes = Vec::with_capacity(num_nodes);
        for _ in 0..num_nodes {
            let hash = Sha256Hash::from_byte_array(read_array(r)?);
            let sum = u64::from_be_bytes(read_array(r)?);
            explicit_nodes.push(MssmtNode { hash, sum });
        }

        let packed_bits: [u8; MAX_TREE_LEVELS / 8] = read_array(r)?;
        let bits = unpack_bits(&packed_bits);
        if bits.iter().filter(|&&b| !b).count() != explicit_nodes.len() {
            return Err(Error::InvalidTlvValue(
                0,
                "Bit/node count mismatch: false bits != explicit nodes".to_string(),
            ));
        }

        let empty = empty_tree();
        let mut explicit = explicit_nodes.into_iter();
        let mut nodes = Vec::with_capacity(MAX_TREE_LEVELS);
        for (idx, bit_set) in bits.iter().enumerate() {
            if *bit_set {
                nodes.push(empty[MAX_TREE_LEVELS - idx]);
            } else {
                // Count was checked above.
                let node = explicit.next().ok_or(Error::InvalidTlvValue(
                    0,
                    "Insufficient explicit nodes for compressed proof".to_string(),
                ))?;
                nodes.push(node);
            }
        }

        Ok(MssmtProof { nodes })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = bytes;
        let proof = Self::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::TrailingBytes("MS-SMT proof"));
        }
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn empty_tree_levels_chain_up() {
        let empty = empty_tree();
        assert_eq!(empty.len(), MAX_TREE_LEVELS + 1);
        assert_eq!(empty[MAX_TREE_LEVELS], MssmtNode::empty_leaf());
        assert_eq!(
            empty[0],
            MssmtNode::branch(&empty[1], &empty[1]).unwrap()
        );
    }

    #[test]
    fn branch_sum_overflow_is_error() {
        let a = MssmtNode::leaf(b"a", u64::MAX);
        let b = MssmtNode::leaf(b"b", 1);
        assert!(MssmtNode::branch(&a, &b).is_err());
    }

    #[test]
    fn compressed_proof_keeps_explicit_nodes() {
        let empty = empty_tree();
        let mut nodes: Vec<MssmtNode> = (0..MAX_TREE_LEVELS)
            .map(|idx| empty[MAX_TREE_LEVELS - idx])
            .collect();
        nodes[3] = MssmtNode::leaf(b"sibling", 42);
        let proof = MssmtProof { nodes };

        let bytes = proof.encode();
        assert_eq!(bytes.len(), 2 + 40 + 32);
        assert_eq!(MssmtProof::from_bytes(&bytes).unwrap(), proof);
    }

    #[test]
    fn single_leaf_root_matches_proof_of_empty_siblings() {
        let key = [7u8; 32];
        let leaf = MssmtNode::leaf(b"value", 10);
        let empty = empty_tree();
        let proof = MssmtProof {
            nodes: vec![
                MssmtNode {
                    hash: Sha256Hash::all_zeros(),
                    sum: 0
                };
                MAX_TREE_LEVELS
            ],
        };
        let root = proof.root(&key, leaf).unwrap();
        assert_eq!(root.sum, 10);
        assert_ne!(root, empty[0]);
    }
}
