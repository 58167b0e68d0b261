//! Taproot proof verification helpers.

use alloc::vec::Vec;

use bitcoin::hashes::Hash;
use bitcoin::taproot::TapNodeHash;
use bitcoin::Transaction;
use taproot_assets_types::asset::{Asset, SerializedKey};
use taproot_assets_types::commitment::{TapscriptPreimage, TapscriptPreimageType};
use taproot_assets_types::proof::{TaprootProof, TapscriptProof};

use super::tx;
use crate::commitment::{self, tapscript_preimage_hash, TapCommitment};
use crate::{OpsError, TaprootOps};

/// Errors returned by taproot proof verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The proof points at an output that is missing or not taproot.
    AnchorOutput(tx::Error),
    /// Taproot proof does not include a supported method.
    MissingTaprootProofMethod,
    /// Taproot proof commitment data is invalid or missing.
    InvalidCommitmentProof,
    /// Taproot proof is missing a commitment proof.
    MissingCommitmentProof,
    /// Taproot proof is missing an asset proof.
    MissingAssetProof,
    /// Taproot proof is invalid for tapscript verification.
    InvalidTapscriptProof,
    /// Taproot proof derived key does not match the anchor output.
    InvalidTaprootProof,
    /// Commitment could not be recomputed from the proof.
    Commitment(commitment::Error),
    /// Taproot operation failed.
    Ops(OpsError),
}

impl From<OpsError> for Error {
    fn from(err: OpsError) -> Self {
        Self::Ops(err)
    }
}

impl From<commitment::Error> for Error {
    fn from(err: commitment::Error) -> Self {
        Self::Commitment(err)
    }
}

impl From<tx::Error> for Error {
    fn from(err: tx::Error) -> Self {
        Self::AnchorOutput(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::AnchorOutput(err) => write!(f, "invalid anchor output: {}", err),
            Error::MissingTaprootProofMethod => {
                write!(f, "taproot proof missing commitment or tapscript data")
            }
            Error::InvalidCommitmentProof => write!(f, "invalid commitment proof"),
            Error::MissingCommitmentProof => write!(f, "missing commitment proof"),
            Error::MissingAssetProof => write!(f, "missing asset proof"),
            Error::InvalidTapscriptProof => write!(f, "invalid tapscript proof"),
            Error::InvalidTaprootProof => write!(f, "invalid taproot proof"),
            Error::Commitment(err) => write!(f, "invalid commitment: {}", err),
            Error::Ops(err) => write!(f, "taproot operation failed: {}", err),
        }
    }
}

impl core::error::Error for Error {}

/// Derived output keys and the commitment each one was derived from.
type ProofCommitmentKeys = Vec<(SerializedKey, TapCommitment)>;

/// Verifies a taproot proof against its anchor output and returns the
/// commitment it proves, if the output carries one.
///
/// With `inclusion` set the proof must show that `asset` is committed in the
/// output. Otherwise it must show that the asset is absent, either through an
/// exclusion commitment proof or a tapscript proof of a commitment-free output.
pub fn verify_taproot_proof<O: TaprootOps>(
    ops: &O,
    anchor_tx: &Transaction,
    proof: &TaprootProof,
    asset: &Asset,
    inclusion: bool,
) -> Result<Option<TapCommitment>, Error> {
    let expected_key = tx::taproot_output_key(anchor_tx, proof.output_index)?;
    verify_taproot_proof_with_key(ops, expected_key, proof, asset, inclusion)
}

/// Like `verify_taproot_proof`, against an already extracted x-only key.
pub fn verify_taproot_proof_with_key<O: TaprootOps>(
    ops: &O,
    expected_key: [u8; 32],
    proof: &TaprootProof,
    asset: &Asset,
    inclusion: bool,
) -> Result<Option<TapCommitment>, Error> {
    if inclusion {
        let derived = derive_by_asset_inclusion(ops, proof, asset)?;
        return match_expected_key(&expected_key, derived).map(Some);
    }

    if proof.commitment_proof.is_some() {
        let derived = derive_by_asset_exclusion(ops, proof, asset)?;
        return match_expected_key(&expected_key, derived).map(Some);
    }

    if proof.tapscript_proof.is_some() {
        let derived = derive_by_tapscript_proof(ops, proof)?;
        return if derived.x_only() == expected_key {
            Ok(None)
        } else {
            Err(Error::InvalidTaprootProof)
        };
    }

    Err(Error::MissingTaprootProofMethod)
}

fn match_expected_key(
    expected_key: &[u8; 32],
    derived: ProofCommitmentKeys,
) -> Result<TapCommitment, Error> {
    derived
        .into_iter()
        .find(|(key, _)| key.x_only() == *expected_key)
        .map(|(_, commitment)| commitment)
        .ok_or(Error::InvalidTaprootProof)
}

fn derive_by_asset_inclusion<O: TaprootOps>(
    ops: &O,
    proof: &TaprootProof,
    asset: &Asset,
) -> Result<ProofCommitmentKeys, Error> {
    let commitment_proof = proof
        .commitment_proof
        .as_ref()
        .ok_or(Error::MissingCommitmentProof)?;
    if proof.tapscript_proof.is_some() {
        return Err(Error::InvalidCommitmentProof);
    }

    let tap_commitment = commitment::tap_commitment_from_inclusion(&commitment_proof.proof, asset)?
        .ok_or(Error::MissingAssetProof)?;
    derive_commitment_keys(
        ops,
        &tap_commitment,
        &proof.internal_key,
        commitment_proof.tap_sibling_preimage.as_ref(),
    )
}

fn derive_by_asset_exclusion<O: TaprootOps>(
    ops: &O,
    proof: &TaprootProof,
    asset: &Asset,
) -> Result<ProofCommitmentKeys, Error> {
    let commitment_proof = proof
        .commitment_proof
        .as_ref()
        .ok_or(Error::MissingCommitmentProof)?;
    if proof.tapscript_proof.is_some() {
        return Err(Error::InvalidCommitmentProof);
    }

    let tap_commitment = commitment::tap_commitment_from_exclusion(&commitment_proof.proof, asset)?;
    derive_commitment_keys(
        ops,
        &tap_commitment,
        &proof.internal_key,
        commitment_proof.tap_sibling_preimage.as_ref(),
    )
}

fn derive_by_tapscript_proof<O: TaprootOps>(
    ops: &O,
    proof: &TaprootProof,
) -> Result<SerializedKey, Error> {
    let tapscript_proof = proof
        .tapscript_proof
        .as_ref()
        .ok_or(Error::InvalidTapscriptProof)?;
    if proof.commitment_proof.is_some() {
        return Err(Error::InvalidTapscriptProof);
    }

    let internal_key = ops.parse_internal_key(&proof.internal_key)?;
    let tapscript_root = tapscript_proof_root(tapscript_proof)?;
    Ok(ops.taproot_output_key(&internal_key, tapscript_root)?)
}

/// Derives the output key of the commitment as given and of its legacy
/// downgrade, since both leaf formats are valid on chain.
fn derive_commitment_keys<O: TaprootOps>(
    ops: &O,
    commitment: &TapCommitment,
    internal_key: &SerializedKey,
    sibling: Option<&TapscriptPreimage>,
) -> Result<ProofCommitmentKeys, Error> {
    let internal_pubkey = ops.parse_internal_key(internal_key)?;
    let mut keys = Vec::with_capacity(2);
    for candidate in [*commitment, commitment.downgrade()] {
        let tapscript_root = candidate.tapscript_root(sibling)?;
        let output_key =
            ops.taproot_output_key(&internal_pubkey, Some(tapscript_root.to_byte_array()))?;
        keys.push((output_key, candidate));
    }
    Ok(keys)
}

fn non_empty(preimage: Option<&TapscriptPreimage>) -> Option<&TapscriptPreimage> {
    preimage.filter(|p| !p.sibling_preimage.is_empty())
}

/// Tapscript root revealed by a tapscript proof, `None` for a BIP-86 output.
pub fn tapscript_proof_root(proof: &TapscriptProof) -> Result<Option<[u8; 32]>, Error> {
    use TapscriptPreimageType::{BranchPreimage, LeafPreimage};

    let preimage1 = non_empty(proof.tap_preimage1.as_ref());
    let preimage2 = non_empty(proof.tap_preimage2.as_ref());
    let root = match (preimage1, preimage2) {
        (Some(left), Some(right)) => match (left.sibling_type, right.sibling_type) {
            (LeafPreimage, LeafPreimage)
            | (BranchPreimage, BranchPreimage)
            | (LeafPreimage, BranchPreimage) => TapNodeHash::from_node_hashes(
                tapscript_preimage_hash(left)?,
                tapscript_preimage_hash(right)?,
            ),
            (BranchPreimage, LeafPreimage) => return Err(Error::InvalidTapscriptProof),
        },
        (Some(leaf), None) if leaf.sibling_type == LeafPreimage => tapscript_preimage_hash(leaf)?,
        _ if proof.bip86 => return Ok(None),
        _ => return Err(Error::InvalidTapscriptProof),
    };
    Ok(Some(root.to_byte_array()))
}
