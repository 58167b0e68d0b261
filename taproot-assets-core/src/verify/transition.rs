//! Asset state transition rules.
//!
//! A transfer consumes one or more input assets, each referenced from a
//! witness of the root asset by its `PrevId`. The root asset is the asset
//! itself, or for a split output the root asset of its split commitment.

use alloc::collections::BTreeSet;

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::taproot::TapTweakHash;
use bitcoin::OutPoint;
use taproot_assets_types::asset::{Asset, AssetType, PrevId, SerializedKey, NUMS_KEY};
use taproot_assets_types::mssmt::empty_tree;
use thiserror::Error;

use super::ctx::{ChainError, ChainLookup};
use super::AssetSnapshot;
use crate::{OpsError, TaprootOps};

/// Lock time values at or above this are unix timestamps, below are heights.
pub const LOCK_TIME_THRESHOLD: u64 = 500_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("asset has no witnesses")]
    MissingAssetWitnesses,
    #[error("witness missing prev id")]
    MissingPrevId,
    #[error("witness spends unknown input {0:?}")]
    UnknownInput(PrevId),
    /// Two inputs, or two witnesses, refer to the same previous asset.
    #[error("input {0:?} referenced more than once")]
    DuplicateInput(PrevId),
    #[error("input at {0} is not spent by any witness")]
    UnspentInput(OutPoint),
    /// Inputs and outputs belong to different assets or groups.
    #[error("input asset identity does not match the output")]
    IdentityMismatch,
    #[error("amount mismatch: inputs {inputs}, outputs {outputs}")]
    AmountMismatch { inputs: u64, outputs: u64 },
    #[error("input amounts overflow")]
    AmountOverflow,
    #[error("collectible amount must be 1, got {0}")]
    InvalidCollectibleAmount(u64),
    #[error("zero amount asset is not a tombstone")]
    ZeroAmount,
    #[error("tombstone has no split commitment root")]
    TombstoneWithoutSplitRoot,
    #[error("lock time {lock_time} not reached")]
    LockTimeNotReached { lock_time: u64 },
    #[error("relative lock time {required} not reached, {elapsed} blocks elapsed")]
    RelativeLockTimeNotReached { required: u64, elapsed: u64 },
    #[error("chain lookup failed: {0}")]
    Chain(#[from] ChainError),
    #[error("burn key derivation failed: {0}")]
    BurnKey(OpsError),
}

/// The asset carrying the witnesses of a transfer.
pub fn root_asset(asset: &Asset) -> &Asset {
    asset.split_root_asset().unwrap_or(asset)
}

fn prev_id_of(input: &AssetSnapshot) -> PrevId {
    PrevId {
        out_point: input.out_point,
        asset_id: input.asset.id(),
        script_key: input.asset.script_key,
    }
}

/// Amount checks that hold for every asset, genesis or not.
pub fn verify_amount(asset: &Asset) -> Result<(), Error> {
    if asset.is_tombstone() {
        let has_root = asset
            .split_commitment_root
            .is_some_and(|root| root != empty_tree()[0]);
        if !has_root {
            return Err(Error::TombstoneWithoutSplitRoot);
        }
        return Ok(());
    }
    if asset.amount == 0 {
        return Err(Error::ZeroAmount);
    }
    if asset.genesis.asset_type == AssetType::Collectible && asset.amount != 1 {
        return Err(Error::InvalidCollectibleAmount(asset.amount));
    }
    Ok(())
}

/// Checks that `asset` is a legal spend of `inputs`, all of which must have
/// been verified already.
pub fn verify_transition(
    asset: &Asset,
    anchor_height: u32,
    inputs: &[AssetSnapshot],
    lookup: &dyn ChainLookup,
) -> Result<(), Error> {
    verify_amount(asset)?;
    let root = root_asset(asset);
    if !core::ptr::eq(root, asset) {
        verify_amount(root)?;
    }
    if root.prev_witnesses.is_empty() {
        return Err(Error::MissingAssetWitnesses);
    }

    let mut known = BTreeSet::new();
    for input in inputs {
        let prev_id = prev_id_of(input);
        if !known.insert(prev_id) {
            return Err(Error::DuplicateInput(prev_id));
        }
        let same_identity = match (&root.group_key, &input.asset.group_key) {
            (Some(ours), Some(theirs)) => ours.group_pub_key == theirs.group_pub_key,
            (None, None) => input.asset.id() == root.id(),
            _ => false,
        };
        if !same_identity {
            return Err(Error::IdentityMismatch);
        }
    }

    let mut spent = BTreeSet::new();
    for witness in &root.prev_witnesses {
        let prev_id = witness.prev_id.ok_or(Error::MissingPrevId)?;
        if !known.contains(&prev_id) {
            return Err(Error::UnknownInput(prev_id));
        }
        if !spent.insert(prev_id) {
            return Err(Error::DuplicateInput(prev_id));
        }
    }
    if let Some(unspent) = inputs.iter().find(|input| !spent.contains(&prev_id_of(input))) {
        return Err(Error::UnspentInput(unspent.out_point));
    }

    let input_sum = inputs.iter().try_fold(0u64, |sum, input| {
        sum.checked_add(input.asset.amount)
            .ok_or(Error::AmountOverflow)
    })?;
    let output_sum = root
        .split_commitment_root
        .map_or(root.amount, |split_root| split_root.sum);
    if input_sum != output_sum {
        return Err(Error::AmountMismatch {
            inputs: input_sum,
            outputs: output_sum,
        });
    }

    verify_lock_times(root, anchor_height, lookup)
}

/// Absolute and relative lock times of the root asset.
fn verify_lock_times(
    root: &Asset,
    anchor_height: u32,
    lookup: &dyn ChainLookup,
) -> Result<(), Error> {
    let lock_time = root.lock_time;
    if lock_time != 0 {
        let reached = if lock_time < LOCK_TIME_THRESHOLD {
            u64::from(anchor_height) >= lock_time
        } else {
            lookup.mean_block_timestamp(anchor_height)? >= lock_time
        };
        if !reached {
            return Err(Error::LockTimeNotReached { lock_time });
        }
    }

    let required = root.relative_lock_time;
    if required != 0 {
        for prev_id in root.prev_witnesses.iter().filter_map(|w| w.prev_id) {
            let input_height = lookup.tx_block_height(&prev_id.out_point.txid)?;
            let elapsed = u64::from(anchor_height.saturating_sub(input_height));
            if elapsed < required {
                return Err(Error::RelativeLockTimeNotReached { required, elapsed });
            }
        }
    }
    Ok(())
}

/// Provably unspendable script key a burn of `prev_id` is sent to:
/// the NUMS key tweaked by the spent input.
pub fn derive_burn_key<O: TaprootOps>(ops: &O, prev_id: &PrevId) -> Result<SerializedKey, OpsError> {
    let mut engine = TapTweakHash::engine();
    engine.input(&NUMS_KEY.x_only());
    engine.input(&serialize(&prev_id.out_point));
    engine.input(prev_id.asset_id.as_byte_array());
    engine.input(&prev_id.script_key.x_only());
    let tweak = TapTweakHash::from_engine(engine).to_byte_array();

    let nums = ops.parse_internal_key(&NUMS_KEY)?;
    let burn_key = ops.add_tweak(&nums, tweak)?;
    Ok(ops.serialize_key(&burn_key))
}

/// Returns true if the asset's script key is the burn key of its first input.
pub fn is_burn<O: TaprootOps>(ops: &O, asset: &Asset) -> Result<bool, OpsError> {
    let Some(prev_id) = root_asset(asset)
        .prev_witnesses
        .first()
        .and_then(|witness| witness.prev_id)
    else {
        return Ok(false);
    };
    if prev_id.is_zero() {
        return Ok(false);
    }
    let burn_key = derive_burn_key(ops, &prev_id)?;
    Ok(burn_key.x_only() == asset.script_key.x_only())
}
