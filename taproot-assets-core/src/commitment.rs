//! Asset commitments, Taproot Asset commitments and split commitment trees,
//! both for building them and for recomputing their roots from proofs.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use bitcoin::taproot::{LeafVersion, TapNodeHash};
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};
use taproot_assets_types::asset::{Asset, AssetID, AssetVersion, PrevWitness, SerializedKey};
use taproot_assets_types::commitment::{
    AssetProof, Proof, TapCommitmentVersion, TapscriptPreimage, TapscriptPreimageType,
    TaprootAssetProof,
};
use taproot_assets_types::mssmt::{MssmtNode, MssmtProof};
use taproot_assets_types::tlv::UnknownOddTypes;
use thiserror::Error;

use crate::mssmt::{self, MssmtTree};

/// Length in bytes of a Taproot Asset commitment leaf script.
pub const TAPROOT_ASSET_COMMITMENT_SCRIPT_SIZE: usize = 1 + 32 + 32 + 8;
/// Marker tag for legacy Taproot Asset commitment leaves.
const TAPROOT_ASSETS_MARKER_TAG: &str = "taproot-assets";
/// Marker tag for V2 Taproot Asset commitment leaves.
const TAPROOT_ASSETS_V2_TAG: &str = "taproot-assets:194243";
/// Length in bytes of a TapBranch preimage.
const TAP_BRANCH_PREIMAGE_LEN: usize = 64;
/// Maximum tapscript size accepted for leaf preimages.
const MAX_TAPLEAF_SCRIPT_SIZE: usize = 4_000_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("empty tapscript preimage")]
    EmptyTapscriptPreimage,
    #[error("invalid tapscript preimage length {actual}, expected {expected}")]
    InvalidTapscriptPreimageLength { expected: usize, actual: usize },
    #[error("invalid tapleaf script version")]
    InvalidTapLeafScriptVersion,
    #[error("invalid tapleaf script length")]
    InvalidTapLeafScriptLength,
    #[error("tapscript preimage is a taproot asset commitment")]
    TapscriptPreimageIsTapCommitment,
    #[error("assets of an asset commitment must share a tap commitment key")]
    TapKeyMismatch,
    #[error("asset commitment needs at least one asset")]
    EmptyAssetCommitment,
    #[error("asset not found in commitment")]
    AssetNotFound,
    #[error(transparent)]
    Mssmt(#[from] mssmt::Error),
}

/// Root of a Taproot Asset commitment together with the version that decides
/// how it is turned into a tap leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapCommitment {
    pub version: TapCommitmentVersion,
    pub root: MssmtNode,
}

impl TapCommitment {
    /// The leaf script committing to this root.
    pub fn tap_leaf_script(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(TAPROOT_ASSET_COMMITMENT_SCRIPT_SIZE);
        match self.version {
            TapCommitmentVersion::V0 | TapCommitmentVersion::V1 => {
                script.push(self.version as u8);
                script.extend_from_slice(&taproot_assets_marker());
            }
            TapCommitmentVersion::V2 => {
                script.extend_from_slice(&taproot_assets_v2_tag());
                script.push(self.version as u8);
            }
        }
        script.extend_from_slice(self.root.hash.as_byte_array());
        script.extend_from_slice(&self.root.sum.to_be_bytes());
        script
    }

    pub fn tap_leaf_hash(&self) -> TapNodeHash {
        let script = ScriptBuf::from_bytes(self.tap_leaf_script());
        TapNodeHash::from_script(script.as_script(), LeafVersion::TapScript)
    }

    /// Tapscript root of an output holding this commitment and an optional
    /// sibling.
    pub fn tapscript_root(&self, sibling: Option<&TapscriptPreimage>) -> Result<TapNodeHash, Error> {
        let commitment_hash = self.tap_leaf_hash();
        Ok(match sibling {
            Some(preimage) => {
                TapNodeHash::from_node_hashes(commitment_hash, tapscript_preimage_hash(preimage)?)
            }
            None => commitment_hash,
        })
    }

    /// The same root under the legacy leaf format.
    pub fn downgrade(&self) -> TapCommitment {
        TapCommitment {
            version: TapCommitmentVersion::V0,
            root: self.root,
        }
    }
}

/// Computes the tap hash for a tapscript preimage.
pub fn tapscript_preimage_hash(preimage: &TapscriptPreimage) -> Result<TapNodeHash, Error> {
    if preimage.sibling_preimage.is_empty() {
        return Err(Error::EmptyTapscriptPreimage);
    }

    match preimage.sibling_type {
        TapscriptPreimageType::LeafPreimage => {
            let (leaf_version, script) = decode_tapleaf_preimage(&preimage.sibling_preimage)?;
            if is_taproot_asset_commitment_script(script) {
                return Err(Error::TapscriptPreimageIsTapCommitment);
            }
            let script = ScriptBuf::from_bytes(script.to_vec());
            Ok(TapNodeHash::from_script(script.as_script(), leaf_version))
        }
        TapscriptPreimageType::BranchPreimage => {
            let actual = preimage.sibling_preimage.len();
            if actual != TAP_BRANCH_PREIMAGE_LEN {
                return Err(Error::InvalidTapscriptPreimageLength {
                    expected: TAP_BRANCH_PREIMAGE_LEN,
                    actual,
                });
            }
            let (left, right) = preimage.sibling_preimage.split_at(32);
            let left = TapNodeHash::from_slice(left).map_err(|_| Error::InvalidTapLeafScriptLength)?;
            let right =
                TapNodeHash::from_slice(right).map_err(|_| Error::InvalidTapLeafScriptLength)?;
            Ok(TapNodeHash::from_node_hashes(left, right))
        }
    }
}

/// Splits a tapleaf preimage into its leaf version and script.
fn decode_tapleaf_preimage(preimage: &[u8]) -> Result<(LeafVersion, &[u8]), Error> {
    let (&version, rest) = preimage
        .split_first()
        .ok_or(Error::InvalidTapLeafScriptLength)?;
    let leaf_version =
        LeafVersion::from_consensus(version).map_err(|_| Error::InvalidTapLeafScriptVersion)?;
    if leaf_version != LeafVersion::TapScript {
        return Err(Error::InvalidTapLeafScriptVersion);
    }

    let (script_len, len_len) = decode_compact_size(rest)?;
    let script_len = usize::try_from(script_len).map_err(|_| Error::InvalidTapLeafScriptLength)?;
    let script = &rest[len_len..];
    if script.len() != script_len || script.is_empty() || script.len() >= MAX_TAPLEAF_SCRIPT_SIZE {
        return Err(Error::InvalidTapLeafScriptLength);
    }
    Ok((leaf_version, script))
}

/// Decodes a Bitcoin compact size integer, returning it with its length.
fn decode_compact_size(bytes: &[u8]) -> Result<(u64, usize), Error> {
    let first = *bytes.first().ok_or(Error::InvalidTapLeafScriptLength)?;
    let width = match first {
        0..=0xFC => return Ok((first as u64, 1)),
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
    };
    let payload = bytes
        .get(1..1 + width)
        .ok_or(Error::InvalidTapLeafScriptLength)?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(payload);
    Ok((u64::from_le_bytes(buf), 1 + width))
}

/// Returns true if the script matches the Taproot Asset commitment pattern.
pub fn is_taproot_asset_commitment_script(script: &[u8]) -> bool {
    if script.len() != TAPROOT_ASSET_COMMITMENT_SCRIPT_SIZE {
        return false;
    }
    match script[0] {
        v if v == TapCommitmentVersion::V0 as u8 || v == TapCommitmentVersion::V1 as u8 => {
            script[1..33] == taproot_assets_marker()
        }
        _ => script[..32] == taproot_assets_v2_tag(),
    }
}

fn taproot_assets_marker() -> [u8; 32] {
    Sha256Hash::hash(TAPROOT_ASSETS_MARKER_TAG.as_bytes()).to_byte_array()
}

fn taproot_assets_v2_tag() -> [u8; 32] {
    Sha256Hash::hash(TAPROOT_ASSETS_V2_TAG.as_bytes()).to_byte_array()
}

/// `sha256(tap_key || left || right || sum)` over the asset tree root's children.
pub fn asset_commitment_root(
    tap_key: &[u8; 32],
    left: &MssmtNode,
    right: &MssmtNode,
    sum: u64,
) -> [u8; 32] {
    let mut engine = Sha256Hash::engine();
    engine.input(tap_key);
    engine.input(left.hash.as_byte_array());
    engine.input(right.hash.as_byte_array());
    engine.input(&sum.to_be_bytes());
    Sha256Hash::from_engine(engine).to_byte_array()
}

/// Value of an asset commitment's leaf: `version || root || sum`.
fn asset_commitment_leaf_value(version: AssetVersion, root: &[u8; 32], sum: u64) -> Vec<u8> {
    let mut leaf = Vec::with_capacity(1 + 32 + 8);
    leaf.push(version as u8);
    leaf.extend_from_slice(root);
    leaf.extend_from_slice(&sum.to_be_bytes());
    leaf
}

/// Leaf of an asset commitment inside the tap commitment tree.
pub fn asset_commitment_leaf(version: AssetVersion, root: &[u8; 32], sum: u64) -> MssmtNode {
    MssmtNode::leaf(&asset_commitment_leaf_value(version, root, sum), sum)
}

/// Bytes an asset contributes to its asset commitment. Split commitment
/// witnesses are proven separately and are not committed.
fn committed_asset(asset: &Asset) -> Asset {
    asset.without_split_commitment()
}

/// All assets of one asset ID or group under a single tap commitment key.
#[derive(Debug, Clone)]
pub struct AssetCommitment {
    tap_key: [u8; 32],
    version: AssetVersion,
    tree: MssmtTree,
    assets: BTreeMap<[u8; 32], Asset>,
}

impl AssetCommitment {
    pub fn new(assets: &[Asset]) -> Result<Self, Error> {
        let first = assets.first().ok_or(Error::EmptyAssetCommitment)?;
        let mut commitment = AssetCommitment {
            tap_key: first.tap_commitment_key(),
            version: first.version,
            tree: MssmtTree::new(),
            assets: BTreeMap::new(),
        };
        for asset in assets {
            commitment.upsert(asset)?;
        }
        Ok(commitment)
    }

    pub fn upsert(&mut self, asset: &Asset) -> Result<(), Error> {
        if asset.tap_commitment_key() != self.tap_key {
            return Err(Error::TapKeyMismatch);
        }
        let committed = committed_asset(asset);
        let key = committed.commitment_key();
        self.tree
            .insert(key, committed.leaf_encoding(), committed.amount)?;
        self.version = self.version.max(asset.version);
        self.assets.insert(key, asset.clone());
        Ok(())
    }

    pub fn tap_key(&self) -> [u8; 32] {
        self.tap_key
    }

    pub fn version(&self) -> AssetVersion {
        self.version
    }

    pub fn sum(&self) -> u64 {
        self.tree.root().sum
    }

    pub fn root(&self) -> [u8; 32] {
        let (left, right) = self.tree.root_children();
        asset_commitment_root(&self.tap_key, &left, &right, self.sum())
    }

    pub fn leaf(&self) -> MssmtNode {
        asset_commitment_leaf(self.version, &self.root(), self.sum())
    }

    pub fn asset(&self, key: &[u8; 32]) -> Option<&Asset> {
        self.assets.get(key)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    fn asset_proof(&self, asset_key: &[u8; 32]) -> AssetProof {
        AssetProof {
            proof: self.tree.merkle_proof(asset_key),
            version: self.version,
            tap_key: self.tap_key,
            unknown_odd_types: UnknownOddTypes::new(),
        }
    }
}

/// The outermost tree of an output: asset commitments keyed by their tap
/// commitment key.
#[derive(Debug, Clone)]
pub struct TapCommitmentTree {
    version: TapCommitmentVersion,
    tree: MssmtTree,
    commitments: BTreeMap<[u8; 32], AssetCommitment>,
}

impl TapCommitmentTree {
    pub fn new(version: TapCommitmentVersion) -> Self {
        TapCommitmentTree {
            version,
            tree: MssmtTree::new(),
            commitments: BTreeMap::new(),
        }
    }

    pub fn from_assets(version: TapCommitmentVersion, assets: &[Asset]) -> Result<Self, Error> {
        let mut tree = TapCommitmentTree::new(version);
        for asset in assets {
            tree.upsert(asset)?;
        }
        Ok(tree)
    }

    pub fn upsert(&mut self, asset: &Asset) -> Result<(), Error> {
        let tap_key = asset.tap_commitment_key();
        let commitment = match self.commitments.get(&tap_key) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.upsert(asset)?;
                updated
            }
            None => AssetCommitment::new(core::slice::from_ref(asset))?,
        };
        let sum = commitment.sum();
        let value = asset_commitment_leaf_value(commitment.version(), &commitment.root(), sum);
        self.tree.insert(tap_key, value, sum)?;
        self.commitments.insert(tap_key, commitment);
        Ok(())
    }

    pub fn commitment(&self) -> TapCommitment {
        TapCommitment {
            version: self.version,
            root: self.tree.root(),
        }
    }

    pub fn asset_commitment(&self, tap_key: &[u8; 32]) -> Option<&AssetCommitment> {
        self.commitments.get(tap_key)
    }

    fn taproot_asset_proof(&self, tap_key: &[u8; 32]) -> TaprootAssetProof {
        TaprootAssetProof {
            proof: self.tree.merkle_proof(tap_key),
            version: self.version,
            unknown_odd_types: UnknownOddTypes::new(),
        }
    }

    /// Proof that `asset` is committed in this tree.
    pub fn inclusion_proof(&self, asset: &Asset) -> Result<Proof, Error> {
        let tap_key = asset.tap_commitment_key();
        let commitment = self
            .commitments
            .get(&tap_key)
            .ok_or(Error::AssetNotFound)?;
        let asset_key = committed_asset(asset).commitment_key();
        if commitment.asset(&asset_key).is_none() {
            return Err(Error::AssetNotFound);
        }
        Ok(Proof {
            asset_proof: Some(commitment.asset_proof(&asset_key)),
            taproot_asset_proof: self.taproot_asset_proof(&tap_key),
        })
    }

    /// Proof that `asset` is not committed in this tree. When other assets
    /// share its tap key the proof descends into their asset commitment.
    pub fn exclusion_proof(&self, asset: &Asset) -> Proof {
        let tap_key = asset.tap_commitment_key();
        let asset_proof = self
            .commitments
            .get(&tap_key)
            .map(|commitment| commitment.asset_proof(&committed_asset(asset).commitment_key()));
        Proof {
            asset_proof,
            taproot_asset_proof: self.taproot_asset_proof(&tap_key),
        }
    }
}

/// Recomputes the tap commitment from an inclusion proof for `asset`.
pub fn tap_commitment_from_inclusion(proof: &Proof, asset: &Asset) -> Result<Option<TapCommitment>, Error> {
    let Some(asset_proof) = proof.asset_proof.as_ref() else {
        return Ok(None);
    };
    let committed = committed_asset(asset);
    let leaf = committed.leaf();
    from_asset_leaf(proof, asset_proof, &committed.commitment_key(), leaf).map(Some)
}

/// Recomputes the tap commitment from an exclusion proof for `asset`.
pub fn tap_commitment_from_exclusion(proof: &Proof, asset: &Asset) -> Result<TapCommitment, Error> {
    match proof.asset_proof.as_ref() {
        Some(asset_proof) => from_asset_leaf(
            proof,
            asset_proof,
            &committed_asset(asset).commitment_key(),
            MssmtNode::empty_leaf(),
        ),
        None => {
            let root = proof
                .taproot_asset_proof
                .proof
                .root(&asset.tap_commitment_key(), MssmtNode::empty_leaf())
                .map_err(|_| mssmt::Error::SumOverflow)?;
            Ok(TapCommitment {
                version: proof.taproot_asset_proof.version,
                root,
            })
        }
    }
}

fn from_asset_leaf(
    proof: &Proof,
    asset_proof: &AssetProof,
    asset_key: &[u8; 32],
    leaf: MssmtNode,
) -> Result<TapCommitment, Error> {
    let (left, right) = asset_proof
        .proof
        .root_children(asset_key, leaf)
        .map_err(|_| mssmt::Error::SumOverflow)?;
    let sum = left
        .sum
        .checked_add(right.sum)
        .ok_or(mssmt::Error::SumOverflow)?;
    let commitment_root = asset_commitment_root(&asset_proof.tap_key, &left, &right, sum);
    let commitment_leaf = asset_commitment_leaf(asset_proof.version, &commitment_root, sum);
    let root = proof
        .taproot_asset_proof
        .proof
        .root(&asset_proof.tap_key, commitment_leaf)
        .map_err(|_| mssmt::Error::SumOverflow)?;
    Ok(TapCommitment {
        version: proof.taproot_asset_proof.version,
        root,
    })
}

/// `sha256(output_index || asset_id || xonly(script_key))`.
pub fn split_commitment_key(
    output_index: u32,
    asset_id: &AssetID,
    script_key: &SerializedKey,
) -> [u8; 32] {
    let mut engine = Sha256Hash::engine();
    engine.input(&output_index.to_be_bytes());
    engine.input(asset_id.as_byte_array());
    engine.input(&script_key.x_only());
    Sha256Hash::from_engine(engine).to_byte_array()
}

/// Form of an output committed in a split commitment tree. The witnesses and
/// the split root are replaced so the leaf does not depend on the tree.
fn split_leaf_asset(asset: &Asset) -> Asset {
    let mut leaf_asset = asset.clone();
    leaf_asset.prev_witnesses = vec![PrevWitness::genesis()];
    leaf_asset.split_commitment_root = None;
    leaf_asset
}

/// Leaf of an output in a split commitment tree.
pub fn split_leaf(asset: &Asset) -> MssmtNode {
    split_leaf_asset(asset).leaf()
}

/// Tree over every output of a split, the root asset's own output included.
/// Its root sum is the amount of all inputs.
#[derive(Debug, Clone, Default)]
pub struct SplitCommitmentTree {
    tree: MssmtTree,
}

impl SplitCommitmentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, output_index: u32, asset: &Asset) -> Result<(), Error> {
        let key = split_commitment_key(output_index, &asset.id(), &asset.script_key);
        let leaf_asset = split_leaf_asset(asset);
        self.tree
            .insert(key, leaf_asset.leaf_encoding(), leaf_asset.amount)?;
        Ok(())
    }

    pub fn root(&self) -> MssmtNode {
        self.tree.root()
    }

    pub fn proof(&self, output_index: u32, asset: &Asset) -> MssmtProof {
        self.tree
            .merkle_proof(&split_commitment_key(output_index, &asset.id(), &asset.script_key))
    }
}

#[cfg(test)]
mod tests;
