//! Universe: per asset (or group) MS-SMT accumulators of issuance and
//! transfer proofs, and the protocol for syncing them between peers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};
use taproot_assets_core::mssmt;
use taproot_assets_types::asset::{encode_outpoint, AssetID, Genesis, SerializedKey};
use taproot_assets_types::mssmt::{MssmtNode, MssmtProof};
use taproot_assets_types::proof::Proof;
use thiserror::Error;

pub mod multiverse;
pub mod sync;

pub use multiverse::{Multiverse, UniverseEvent, UniverseStats};
pub use sync::{
    diff_roots, fetch_all_leaf_keys, fetch_all_roots, first_root_mismatch, roots_equal,
    SyncError, SyncReport, UniverseSyncer,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("leaf does not belong to universe {0}")]
    LeafMismatch(Identifier),

    #[error(transparent)]
    Tree(#[from] mssmt::Error),

    #[error("failed to decode universe leaf: {0}")]
    Decode(#[from] taproot_assets_types::error::Error),

    /// Failure reported by a remote universe.
    #[error("remote universe error: {0}")]
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProofType {
    Issuance,
    Transfer,
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofType::Issuance => f.write_str("issuance"),
            ProofType::Transfer => f.write_str("transfer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdentifierKey {
    AssetId(AssetID),
    GroupKey(SerializedKey),
}

/// Names one universe tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub key: IdentifierKey,
    pub proof_type: ProofType,
}

impl Identifier {
    pub fn new(key: IdentifierKey, proof_type: ProofType) -> Self {
        Self { key, proof_type }
    }

    /// The universe `proof` is filed under.
    pub fn for_proof(proof: &Proof) -> Self {
        let key = match proof.asset.group_key {
            Some(group_key) => IdentifierKey::GroupKey(group_key.group_pub_key),
            None => IdentifierKey::AssetId(proof.asset.id()),
        };
        let proof_type = if proof.asset.is_genesis_asset() {
            ProofType::Issuance
        } else {
            ProofType::Transfer
        };
        Self::new(key, proof_type)
    }

    pub fn asset_id(&self) -> Option<AssetID> {
        match self.key {
            IdentifierKey::AssetId(asset_id) => Some(asset_id),
            IdentifierKey::GroupKey(_) => None,
        }
    }

    pub fn group_key(&self) -> Option<SerializedKey> {
        match self.key {
            IdentifierKey::GroupKey(group_key) => Some(group_key),
            IdentifierKey::AssetId(_) => None,
        }
    }

    /// True if `leaf` is an asset this universe tracks.
    pub fn matches(&self, leaf: &Leaf) -> bool {
        match self.key {
            IdentifierKey::AssetId(asset_id) => {
                leaf.group_key.is_none() && leaf.genesis.id() == asset_id
            }
            IdentifierKey::GroupKey(group_key) => leaf.group_key == Some(group_key),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            IdentifierKey::AssetId(asset_id) => write!(f, "{}-{}", self.proof_type, asset_id),
            IdentifierKey::GroupKey(group_key) => {
                write!(f, "{}-{}", self.proof_type, hex::encode(group_key.as_bytes()))
            }
        }
    }
}

/// Position of a leaf: the output holding the asset and its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeafKey {
    pub out_point: OutPoint,
    pub script_key: SerializedKey,
}

impl LeafKey {
    pub fn for_proof(proof: &Proof) -> Self {
        Self {
            out_point: proof.out_point(),
            script_key: proof.asset.script_key,
        }
    }

    /// `sha256(txid || vout (BE) || x-only script key)`, the key of the leaf
    /// in the universe tree.
    pub fn universe_key(&self) -> [u8; 32] {
        let mut out_point = Vec::with_capacity(36);
        encode_outpoint(&self.out_point, &mut out_point);
        let mut engine = Sha256Hash::engine();
        engine.input(&out_point);
        engine.input(&self.script_key.x_only());
        Sha256Hash::from_engine(engine).to_byte_array()
    }
}

impl fmt::Display for LeafKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.out_point, hex::encode(self.script_key.x_only()))
    }
}

/// A single proof filed in a universe, summed by its amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub genesis: Genesis,
    pub group_key: Option<SerializedKey>,
    /// Encoding of a single proof, not a file.
    pub raw_proof: Vec<u8>,
    pub amount: u64,
}

impl Leaf {
    pub fn from_proof(proof: &Proof) -> Self {
        Self {
            genesis: proof.asset.genesis.clone(),
            group_key: proof.asset.group_key.map(|key| key.group_pub_key),
            raw_proof: proof.encode(),
            amount: proof.asset.amount,
        }
    }

    pub fn node(&self) -> MssmtNode {
        MssmtNode::leaf(&self.raw_proof, self.amount)
    }

    pub fn proof(&self) -> Result<Proof, Error> {
        Ok(Proof::from_bytes(&self.raw_proof)?)
    }
}

/// Root of one universe tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseRoot {
    pub id: Identifier,
    pub node: MssmtNode,
    /// Tag of the first asset filed, for display.
    pub asset_name: String,
}

/// A leaf with its inclusion proof against the universe root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseProof {
    pub key: LeafKey,
    pub leaf: Leaf,
    pub root: MssmtNode,
    pub proof: MssmtProof,
}

impl UniverseProof {
    /// Checks that the leaf hashes up to `root`.
    pub fn verify(&self) -> bool {
        self.proof
            .root(&self.key.universe_key(), self.leaf.node())
            .map(|root| root == self.root)
            .unwrap_or(false)
    }
}

/// A (possibly remote) universe. Pages are served in a stable order and an
/// empty page marks the end.
pub trait UniverseClient: Send + Sync {
    fn asset_roots(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<UniverseRoot>, Error>> + Send;

    fn asset_leaf_keys(
        &self,
        id: &Identifier,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeafKey>, Error>> + Send;

    fn asset_leaves(
        &self,
        id: &Identifier,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Leaf>, Error>> + Send;

    /// Returns `None` if the universe has no leaf at `key`.
    fn fetch_proof_leaf(
        &self,
        id: &Identifier,
        key: &LeafKey,
    ) -> impl Future<Output = Result<Option<UniverseProof>, Error>> + Send;

    /// Files `leaf` under `key`. Pushing a leaf that is already present
    /// succeeds.
    fn push_proof(
        &self,
        id: &Identifier,
        key: &LeafKey,
        leaf: Leaf,
    ) -> impl Future<Output = Result<UniverseProof, Error>> + Send;
}

impl<T: UniverseClient + ?Sized> UniverseClient for Arc<T> {
    fn asset_roots(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<UniverseRoot>, Error>> + Send {
        (**self).asset_roots(offset, limit)
    }

    fn asset_leaf_keys(
        &self,
        id: &Identifier,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeafKey>, Error>> + Send {
        (**self).asset_leaf_keys(id, offset, limit)
    }

    fn asset_leaves(
        &self,
        id: &Identifier,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Leaf>, Error>> + Send {
        (**self).asset_leaves(id, offset, limit)
    }

    fn fetch_proof_leaf(
        &self,
        id: &Identifier,
        key: &LeafKey,
    ) -> impl Future<Output = Result<Option<UniverseProof>, Error>> + Send {
        (**self).fetch_proof_leaf(id, key)
    }

    fn push_proof(
        &self,
        id: &Identifier,
        key: &LeafKey,
        leaf: Leaf,
    ) -> impl Future<Output = Result<UniverseProof, Error>> + Send {
        (**self).push_proof(id, key, leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Txid;
    use taproot_assets_types::asset::{AssetType, NUMS_KEY};

    fn genesis(tag: &str) -> Genesis {
        Genesis {
            first_prev_out: OutPoint {
                txid: Txid::from_byte_array([1; 32]),
                vout: 0,
            },
            tag: tag.to_string(),
            meta_hash: Sha256Hash::all_zeros(),
            output_index: 0,
            asset_type: AssetType::Normal,
        }
    }

    #[test]
    fn universe_key_ignores_key_parity() {
        let key = LeafKey {
            out_point: OutPoint::null(),
            script_key: NUMS_KEY,
        };
        let mut odd = NUMS_KEY;
        odd.0[0] = 0x03;
        let flipped = LeafKey {
            script_key: odd,
            ..key
        };
        assert_eq!(key.universe_key(), flipped.universe_key());

        let moved = LeafKey {
            out_point: OutPoint {
                txid: Txid::from_byte_array([9; 32]),
                vout: 0,
            },
            ..key
        };
        assert_ne!(key.universe_key(), moved.universe_key());
    }

    #[test]
    fn identifier_matches_only_its_assets() {
        let leaf = Leaf {
            genesis: genesis("gold"),
            group_key: None,
            raw_proof: vec![1, 2, 3],
            amount: 10,
        };
        let id = Identifier::new(IdentifierKey::AssetId(leaf.genesis.id()), ProofType::Issuance);
        assert!(id.matches(&leaf));

        let other = Identifier::new(
            IdentifierKey::AssetId(genesis("silver").id()),
            ProofType::Issuance,
        );
        assert!(!other.matches(&leaf));

        let grouped = Leaf {
            group_key: Some(NUMS_KEY),
            ..leaf.clone()
        };
        assert!(!id.matches(&grouped));
        assert!(Identifier::new(IdentifierKey::GroupKey(NUMS_KEY), ProofType::Transfer)
            .matches(&grouped));
    }

    #[test]
    fn identifier_display() {
        let id = Identifier::new(IdentifierKey::GroupKey(NUMS_KEY), ProofType::Issuance);
        assert_eq!(
            id.to_string(),
            format!("issuance-{}", hex::encode(NUMS_KEY.as_bytes()))
        );
    }
}
