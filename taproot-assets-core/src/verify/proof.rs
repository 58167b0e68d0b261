//! Checks of a single proof step against the state it transitions from.

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash};
use bitcoin::OutPoint;
use taproot_assets_types::asset::Asset;
use taproot_assets_types::commitment::TapCommitmentVersion;
use taproot_assets_types::meta::MetaError;
use taproot_assets_types::proof::Proof;
use thiserror::Error;

use super::ctx::{ChainError, ChainLookup, VerifierCtx};
use super::{file, group_key_reveal, taproot_proof, transition, tx, AssetSnapshot};
use crate::commitment::{split_commitment_key, split_leaf, TapCommitment};
use crate::TaprootOps;

/// Which taproot proof of a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofStage {
    Inclusion,
    Exclusion(u32),
    SplitRoot,
}

impl core::fmt::Display for ProofStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProofStage::Inclusion => write!(f, "inclusion"),
            ProofStage::Exclusion(index) => write!(f, "exclusion (output {})", index),
            ProofStage::SplitRoot => write!(f, "split root"),
        }
    }
}

/// Errors returned by proof step verification.
#[derive(Error, Debug)]
pub enum Error {
    #[error("first proof of a file must be a genesis proof")]
    GenesisRequired,
    #[error("genesis proof after the start of the file")]
    UnexpectedGenesis,
    #[error("prev out {actual} does not continue from {expected}")]
    PrevOutMismatch { expected: OutPoint, actual: OutPoint },
    #[error("block height {height} is below the previous height {prev}")]
    BlockHeightDecreased { prev: u32, height: u32 },
    #[error("block height {height} is above the chain tip {tip}")]
    BlockHeightInFuture { height: u32, tip: u32 },
    #[error("anchor tx does not spend prev out")]
    AnchorTxMissingPrevOut,
    #[error("anchor tx does not spend input {0}")]
    AnchorTxMissingInput(OutPoint),
    #[error("chain check failed: {0}")]
    Chain(#[from] ChainError),
    #[error("anchor tx not in block: {0}")]
    TxMerkleProof(tx::Error),
    #[error("non-genesis asset with genesis reveal")]
    NonGenesisAssetWithGenesisReveal,
    #[error("non-genesis asset with meta reveal")]
    NonGenesisAssetWithMetaReveal,
    #[error("genesis reveal required")]
    GenesisRevealRequired,
    #[error("genesis reveal prev out mismatch")]
    GenesisRevealPrevOutMismatch,
    #[error("genesis reveal output index mismatch")]
    GenesisRevealOutputIndexMismatch,
    #[error("genesis reveal asset id mismatch")]
    GenesisRevealAssetIdMismatch,
    #[error("meta reveal required for non-zero meta hash")]
    MetaRevealRequired,
    #[error("meta reveal hash mismatch")]
    MetaHashMismatch,
    #[error("invalid meta reveal: {0}")]
    Meta(MetaError),
    #[error("genesis proof with additional inputs")]
    GenesisWithAdditionalInputs,
    #[error("grouped genesis asset without group key reveal")]
    MissingGroupKeyReveal,
    #[error("group key reveal: {0}")]
    GroupKeyReveal(group_key_reveal::Error),
    #[error("group rejected: {0}")]
    UnknownGroup(ChainError),
    #[error("taproot proof {stage} error: {source}")]
    TaprootProof {
        stage: ProofStage,
        source: taproot_proof::Error,
    },
    #[error("inclusion proof does not reveal a commitment")]
    MissingCommitmentProof,
    #[error("missing split root proof")]
    MissingSplitRootProof,
    #[error("split root asset has no split commitment root")]
    MissingSplitCommitmentRoot,
    #[error("split commitment proof does not match the split root")]
    InvalidSplitCommitment,
    #[error("no exclusion proof for output {0}")]
    MissingExclusionProof(u32),
    #[error("mixed commitment versions")]
    MixedCommitmentVersions,
    #[error("additional input {index} invalid: {source}")]
    AdditionalInput {
        index: usize,
        source: Box<super::Error>,
    },
    #[error("invalid transition: {0}")]
    Transition(#[from] transition::Error),
    #[error("burn key derivation failed: {0}")]
    BurnKey(crate::OpsError),
}

/// Verifies one proof. `prev` is the snapshot of the previous proof in the
/// file, `None` for the first one. `depth` is the nesting level of the file
/// the proof belongs to.
pub fn verify_proof<O: TaprootOps>(
    ops: &O,
    proof: &Proof,
    prev: Option<&AssetSnapshot>,
    ctx: &VerifierCtx<'_>,
    lookup: &dyn ChainLookup,
    depth: u32,
) -> Result<AssetSnapshot, Error> {
    let is_genesis = proof.asset.is_genesis_asset();
    match prev {
        None if !is_genesis => return Err(Error::GenesisRequired),
        Some(_) if is_genesis => return Err(Error::UnexpectedGenesis),
        _ => {}
    }

    verify_chain_position(proof, prev, lookup)?;
    verify_anchor(proof, ctx)?;
    verify_genesis_reveal(proof)?;
    verify_group(ops, proof, ctx, is_genesis)?;

    let commitment = verify_inclusion(ops, proof)?;
    verify_exclusion(ops, proof, &commitment)?;
    verify_split(ops, proof)?;

    if is_genesis {
        if !proof.additional_inputs.is_empty() {
            return Err(Error::GenesisWithAdditionalInputs);
        }
        transition::verify_amount(&proof.asset)?;
    } else {
        let mut inputs = Vec::with_capacity(1 + proof.additional_inputs.len());
        inputs.extend(prev.cloned());
        for (index, input_file) in proof.additional_inputs.iter().enumerate() {
            let snapshot = file::verify_file_at_depth(ops, input_file, ctx, depth + 1)
                .map_err(|source| Error::AdditionalInput {
                    index,
                    source: Box::new(source),
                })?;
            if !tx::tx_spends_prev_out(&proof.anchor_tx, &snapshot.out_point) {
                return Err(Error::AnchorTxMissingInput(snapshot.out_point));
            }
            inputs.push(snapshot);
        }
        transition::verify_transition(&proof.asset, proof.block_height, &inputs, lookup)?;
    }

    let is_burn = transition::is_burn(ops, &proof.asset).map_err(Error::BurnKey)?;
    Ok(AssetSnapshot {
        asset: proof.asset.clone(),
        out_point: proof.out_point(),
        anchor_block_hash: proof.block_header.block_hash(),
        anchor_block_height: proof.block_height,
        anchor_tx: proof.anchor_tx.clone(),
        internal_key: proof.inclusion_proof.internal_key,
        script_root: commitment,
        tapscript_sibling: proof
            .inclusion_proof
            .commitment_proof
            .as_ref()
            .and_then(|commitment| commitment.tap_sibling_preimage.clone()),
        split_asset: proof.asset.has_split_commitment_witness(),
        meta_reveal: if is_genesis {
            proof.meta_reveal.clone()
        } else {
            None
        },
        is_burn,
    })
}

fn verify_chain_position(
    proof: &Proof,
    prev: Option<&AssetSnapshot>,
    lookup: &dyn ChainLookup,
) -> Result<(), Error> {
    if let Some(prev) = prev {
        if proof.prev_out != prev.out_point {
            return Err(Error::PrevOutMismatch {
                expected: prev.out_point,
                actual: proof.prev_out,
            });
        }
        if proof.block_height < prev.anchor_block_height {
            return Err(Error::BlockHeightDecreased {
                prev: prev.anchor_block_height,
                height: proof.block_height,
            });
        }
    }

    let tip = lookup.current_height()?;
    if proof.block_height > tip {
        return Err(Error::BlockHeightInFuture {
            height: proof.block_height,
            tip,
        });
    }
    Ok(())
}

/// The anchor tx spends `prev_out` and sits in the claimed block of the
/// real chain.
fn verify_anchor(proof: &Proof, ctx: &VerifierCtx<'_>) -> Result<(), Error> {
    if !tx::tx_spends_prev_out(&proof.anchor_tx, &proof.prev_out) {
        return Err(Error::AnchorTxMissingPrevOut);
    }
    ctx.header_verifier
        .verify_header(&proof.block_header, proof.block_height)?;
    ctx.merkle_verifier
        .verify_merkle(
            &proof.anchor_tx,
            &proof.tx_merkle_proof,
            proof.block_header.merkle_root,
        )
        .map_err(Error::TxMerkleProof)
}

/// Genesis and meta reveals are present exactly on genesis proofs and match
/// the asset they reveal.
pub fn verify_genesis_reveal(proof: &Proof) -> Result<(), Error> {
    if !proof.asset.is_genesis_asset() {
        if proof.genesis_reveal.is_some() {
            return Err(Error::NonGenesisAssetWithGenesisReveal);
        }
        if proof.meta_reveal.is_some() {
            return Err(Error::NonGenesisAssetWithMetaReveal);
        }
        return Ok(());
    }

    let genesis = proof
        .genesis_reveal
        .as_ref()
        .ok_or(Error::GenesisRevealRequired)?;
    if genesis.first_prev_out != proof.prev_out {
        return Err(Error::GenesisRevealPrevOutMismatch);
    }
    if genesis.output_index != proof.inclusion_proof.output_index {
        return Err(Error::GenesisRevealOutputIndexMismatch);
    }

    match proof.meta_reveal.as_ref() {
        None if genesis.meta_hash != Sha256Hash::all_zeros() => {
            return Err(Error::MetaRevealRequired);
        }
        None => {}
        Some(meta) => {
            meta.validate().map_err(Error::Meta)?;
            if meta.meta_hash() != genesis.meta_hash {
                return Err(Error::MetaHashMismatch);
            }
        }
    }

    if genesis.id() != proof.asset.id() {
        return Err(Error::GenesisRevealAssetIdMismatch);
    }
    Ok(())
}

fn verify_group<O: TaprootOps>(
    ops: &O,
    proof: &Proof,
    ctx: &VerifierCtx<'_>,
    is_genesis: bool,
) -> Result<(), Error> {
    match (&proof.group_key_reveal, &proof.asset.group_key) {
        (Some(reveal), _) => {
            group_key_reveal::verify_group_key_reveal(ops, &proof.asset, reveal)
                .map_err(Error::GroupKeyReveal)?;
        }
        (None, Some(_)) if is_genesis => return Err(Error::MissingGroupKeyReveal),
        (None, _) => {}
    }

    if let Some(group_key) = proof.asset.group_key.as_ref() {
        ctx.group_verifier
            .verify_group_key(&group_key.group_pub_key)
            .map_err(Error::UnknownGroup)?;
    }
    Ok(())
}

fn verify_inclusion<O: TaprootOps>(ops: &O, proof: &Proof) -> Result<TapCommitment, Error> {
    taproot_proof::verify_taproot_proof(
        ops,
        &proof.anchor_tx,
        &proof.inclusion_proof,
        &proof.asset,
        true,
    )
    .map_err(|source| Error::TaprootProof {
        stage: ProofStage::Inclusion,
        source,
    })?
    .ok_or(Error::MissingCommitmentProof)
}

/// Every other P2TR output of the anchor tx must prove it does not hold the
/// asset.
fn verify_exclusion<O: TaprootOps>(
    ops: &O,
    proof: &Proof,
    inclusion: &TapCommitment,
) -> Result<(), Error> {
    let mut pending: BTreeSet<u32> = tx::p2tr_output_indices(&proof.anchor_tx)
        .filter(|index| *index != proof.inclusion_proof.output_index)
        .collect();

    for exclusion_proof in &proof.exclusion_proofs {
        let index = exclusion_proof.output_index;
        let commitment = taproot_proof::verify_taproot_proof(
            ops,
            &proof.anchor_tx,
            exclusion_proof,
            &proof.asset,
            false,
        )
        .map_err(|source| Error::TaprootProof {
            stage: ProofStage::Exclusion(index),
            source,
        })?;

        if let Some(commitment) = commitment {
            if !is_similar_tap_commitment_version(inclusion.version, commitment.version) {
                return Err(Error::MixedCommitmentVersions);
            }
        }
        pending.remove(&index);
    }

    match pending.first() {
        Some(index) => Err(Error::MissingExclusionProof(*index)),
        None => Ok(()),
    }
}

/// V0 and V1 commitments share a leaf format and may be mixed, V2 may not.
fn is_similar_tap_commitment_version(
    left: TapCommitmentVersion,
    right: TapCommitmentVersion,
) -> bool {
    (left == TapCommitmentVersion::V2) == (right == TapCommitmentVersion::V2)
}

/// A split output proves its root asset is in the anchor tx and that it is
/// itself a leaf of the root's split commitment.
fn verify_split<O: TaprootOps>(ops: &O, proof: &Proof) -> Result<(), Error> {
    let Some(witness) = proof
        .asset
        .prev_witnesses
        .first()
        .filter(|_| proof.asset.has_split_commitment_witness())
    else {
        return Ok(());
    };
    let Some(split_commitment) = witness.split_commitment.as_ref() else {
        return Ok(());
    };
    let root_asset: &Asset = &split_commitment.root_asset;

    let split_root_proof = proof
        .split_root_proof
        .as_ref()
        .ok_or(Error::MissingSplitRootProof)?;
    taproot_proof::verify_taproot_proof(ops, &proof.anchor_tx, split_root_proof, root_asset, true)
        .map_err(|source| Error::TaprootProof {
            stage: ProofStage::SplitRoot,
            source,
        })?
        .ok_or(Error::MissingCommitmentProof)?;

    let split_root = root_asset
        .split_commitment_root
        .ok_or(Error::MissingSplitCommitmentRoot)?;
    let key = split_commitment_key(
        proof.inclusion_proof.output_index,
        &proof.asset.id(),
        &proof.asset.script_key,
    );
    let derived = split_commitment
        .proof
        .root(&key, split_leaf(&proof.asset))
        .map_err(|_| Error::InvalidSplitCommitment)?;
    if derived != split_root {
        return Err(Error::InvalidSplitCommitment);
    }
    Ok(())
}
