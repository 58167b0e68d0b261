#![no_std]

extern crate alloc;

use taproot_assets_types::asset::SerializedKey;
use thiserror::Error;

/// Errors returned by TaprootOps implementations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsError {
    /// Raw group key bytes are invalid.
    #[error("invalid group key reveal raw key")]
    InvalidRawGroupKey,
    /// Internal key bytes are invalid.
    #[error("invalid internal key")]
    InvalidInternalKey,
    /// Tweak is not a valid scalar.
    #[error("tweak out of range")]
    TweakOutOfRange,
    /// Adding the tweak produced the point at infinity.
    #[error("invalid key tweak")]
    InvalidKeyTweak,
    /// Taproot output key derivation failed.
    #[error("invalid taproot output key")]
    InvalidTaprootOutputKey,
}

/// Curve operations the verifier needs. The core stays free of a concrete
/// secp256k1 context; the std crate and the test mocks supply one.
pub trait TaprootOps {
    /// Backend-specific public key representation.
    type PubKey;

    /// Parses a raw group key into the backend representation.
    fn parse_group_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError>;

    /// Parses an internal key into the backend representation.
    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError>;

    /// Adds `tweak * G` to a public key.
    fn add_tweak(&self, pubkey: &Self::PubKey, tweak: [u8; 32]) -> Result<Self::PubKey, OpsError>;

    /// Compressed encoding of a backend key.
    fn serialize_key(&self, pubkey: &Self::PubKey) -> SerializedKey;

    /// Computes the Taproot output key for an internal key and optional tapscript root.
    fn taproot_output_key(
        &self,
        internal_key: &Self::PubKey,
        tapscript_root: Option<[u8; 32]>,
    ) -> Result<SerializedKey, OpsError>;
}

/// Asset and tap commitment trees.
pub mod commitment;
/// In-memory chain and proof builders for tests.
#[cfg(feature = "test-utils")]
pub mod mock;
/// Merkle sum sparse merkle tree.
pub mod mssmt;
/// Verification routines for Taproot Assets proofs.
pub mod verify;
