//! Proof verification, proof courier and universe sync for Taproot Assets.
//!
//! Re-exports the `no_std` data model and verifier crates and adds the
//! std pieces around them: a secp256k1 backend, the proof archive, the
//! courier and the universe.

/// Re-export of taproot-assets-core for backend implementations.
pub use taproot_assets_core as core;
/// Re-export of the data model and codecs.
pub use taproot_assets_types as types;

/// Key/blob storage for proof files.
pub mod archive;
pub mod config;
/// Proof retrieval and delivery.
pub mod courier;
pub mod universe;
/// Host-side verification helpers backed by bitcoin/secp256k1.
pub mod verify;
