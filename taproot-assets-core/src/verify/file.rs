//! Replays a proof file from its genesis to its latest proof.

use taproot_assets_types::file::{File, MAX_NESTING_DEPTH};
use taproot_assets_types::proof::Proof;

use super::ctx::VerifierCtx;
use super::{proof, AssetSnapshot, Error};
use crate::TaprootOps;

/// Verifies every proof of `file` in order and returns the state after the
/// last one. The file is rejected as a whole if any proof fails.
pub fn verify_file<O: TaprootOps>(
    ops: &O,
    file: &File,
    ctx: &VerifierCtx<'_>,
) -> Result<AssetSnapshot, Error> {
    verify_file_at_depth(ops, file, ctx, file.depth())
}

/// Verifies an already decoded proof chain.
pub fn verify_proofs<O: TaprootOps>(
    ops: &O,
    proofs: &[Proof],
    ctx: &VerifierCtx<'_>,
) -> Result<AssetSnapshot, Error> {
    verify_proofs_at_depth(ops, proofs, ctx, 0)
}

pub(crate) fn verify_file_at_depth<O: TaprootOps>(
    ops: &O,
    file: &File,
    ctx: &VerifierCtx<'_>,
    depth: u32,
) -> Result<AssetSnapshot, Error> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::MaxNestingDepthExceeded(MAX_NESTING_DEPTH));
    }
    let proofs = file.proofs()?;
    verify_proofs_at_depth(ops, &proofs, ctx, depth)
}

fn verify_proofs_at_depth<O: TaprootOps>(
    ops: &O,
    proofs: &[Proof],
    ctx: &VerifierCtx<'_>,
    depth: u32,
) -> Result<AssetSnapshot, Error> {
    if proofs.is_empty() {
        return Err(Error::EmptyFile);
    }
    let lookup = ctx
        .chain_lookup_gen
        .gen_file_chain_lookup(proofs)
        .map_err(Error::ChainLookup)?;

    let mut prev: Option<AssetSnapshot> = None;
    for (index, step) in proofs.iter().enumerate() {
        let snapshot = proof::verify_proof(ops, step, prev.as_ref(), ctx, &*lookup, depth)
            .map_err(|source| Error::Step { index, source })?;
        prev = Some(snapshot);
    }
    prev.ok_or(Error::EmptyFile)
}
