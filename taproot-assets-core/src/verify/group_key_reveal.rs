//! Group key reveal verification logic.

use bitcoin::hashes::Hash;
use taproot_assets_types::asset::{Asset, AssetID, SerializedKey};
use taproot_assets_types::proof::GroupKeyReveal;

use crate::{OpsError, TaprootOps};

/// Errors returned by group key reveal verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Group key reveal is present but the asset has no group key.
    MissingGroupKey,
    /// Derived group key does not match the asset group key.
    GroupKeyMismatch,
    /// Taproot operation failed.
    Ops(OpsError),
}

impl From<OpsError> for Error {
    fn from(err: OpsError) -> Self {
        Self::Ops(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::MissingGroupKey => {
                write!(f, "group key reveal present but asset has no group key")
            }
            Error::GroupKeyMismatch => write!(f, "group key reveal mismatch"),
            Error::Ops(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl core::error::Error for Error {}

/// Derives the tweaked group key of a reveal: the raw key is tweaked by the
/// asset ID, then committed to the optional tapscript root.
pub fn group_pubkey_from_reveal<O: TaprootOps>(
    ops: &O,
    reveal: &GroupKeyReveal,
    asset_id: &AssetID,
) -> Result<SerializedKey, Error> {
    let raw_pubkey = ops.parse_group_key(&reveal.raw_group_key)?;
    let internal_key = ops.add_tweak(&raw_pubkey, asset_id.to_byte_array())?;
    Ok(ops.taproot_output_key(&internal_key, reveal.tapscript_root)?)
}

/// Verifies that the reveal derives the asset's group key and returns it.
pub fn verify_group_key_reveal<O: TaprootOps>(
    ops: &O,
    asset: &Asset,
    reveal: &GroupKeyReveal,
) -> Result<SerializedKey, Error> {
    let group_key = asset.group_key.as_ref().ok_or(Error::MissingGroupKey)?;
    let derived_key = group_pubkey_from_reveal(ops, reveal, &asset.id())?;
    if derived_key != group_key.group_pub_key {
        return Err(Error::GroupKeyMismatch);
    }
    Ok(derived_key)
}
