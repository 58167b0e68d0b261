//! Verification routines for Taproot Assets proofs.
//!
//! A proof file is replayed one proof at a time. Every step is checked
//! against the snapshot the previous step produced, and the snapshot of the
//! last proof is the verified state of the asset.

use bitcoin::{BlockHash, OutPoint, Transaction};
use serde::{Deserialize, Serialize};
use taproot_assets_types::asset::{Asset, SerializedKey};
use taproot_assets_types::commitment::TapscriptPreimage;
use taproot_assets_types::meta::MetaReveal;
use thiserror::Error;

use crate::commitment::TapCommitment;

/// Callbacks injected into a verification run.
pub mod ctx;
/// Whole-file replay.
pub mod file;
/// Group key reveal verification helpers.
pub mod group_key_reveal;
/// Checks of a single proof step.
pub mod proof;
/// Taproot proof verification helpers.
pub mod taproot_proof;
/// Asset state transition rules.
pub mod transition;
/// Anchor transaction verification helpers.
pub mod tx;

pub use ctx::{
    BridgeHeaderVerifier, ChainBridge, ChainError, ChainLookup, ChainLookupGenerator,
    DefaultMerkleVerifier, FileChainLookup, FileChainLookupGen, GroupAllowList, GroupVerifier,
    HeaderVerifier, MerkleVerifier, VerifierCtx,
};
pub use file::{verify_file, verify_proofs};

/// Errors returned by file verification.
#[derive(Error, Debug)]
pub enum Error {
    /// The file holds no proofs.
    #[error("proof file is empty")]
    EmptyFile,
    /// A proof of the file could not be decoded.
    #[error("failed to decode proof: {0}")]
    Decode(#[from] taproot_assets_types::error::Error),
    /// Additional inputs are nested deeper than allowed.
    #[error("additional inputs nested deeper than {0}")]
    MaxNestingDepthExceeded(u32),
    /// The chain lookup for the file could not be created.
    #[error("chain lookup unavailable: {0}")]
    ChainLookup(ChainError),
    /// The proof at `index` failed verification.
    #[error("proof {index} invalid: {source}")]
    Step {
        /// Position of the proof in the file, 0 is the genesis.
        index: usize,
        /// Why the proof was rejected.
        #[source]
        source: proof::Error,
    },
}

impl Error {
    /// Index of the rejected proof in the outermost file, if a proof was rejected.
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            Error::Step { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// The verified state of an asset after replaying its proof file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// The asset as of the last proof.
    pub asset: Asset,
    /// Output holding the asset.
    pub out_point: OutPoint,
    /// Block containing the anchor transaction.
    pub anchor_block_hash: BlockHash,
    pub anchor_block_height: u32,
    pub anchor_tx: Transaction,
    /// Internal key of the anchor output.
    pub internal_key: SerializedKey,
    /// Taproot Asset commitment of the anchor output.
    pub script_root: TapCommitment,
    /// Tapscript sibling of the commitment, if any.
    pub tapscript_sibling: Option<TapscriptPreimage>,
    /// True if the asset is a split output rather than a split root.
    pub split_asset: bool,
    /// Metadata revealed at genesis, only set for genesis proofs.
    pub meta_reveal: Option<MetaReveal>,
    /// True if the asset was sent to a provably unspendable burn key.
    pub is_burn: bool,
}
