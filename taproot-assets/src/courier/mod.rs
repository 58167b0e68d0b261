//! Proof couriers move proof files between peers: a local archive is
//! consulted first, a remote universe second.

use std::future::Future;
use std::time::Duration;

use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};
use taproot_assets_types::asset::{AssetID, SerializedKey};
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::universe;

pub mod backoff;
pub mod locator;
pub mod subscription;
pub mod universe_courier;

pub use backoff::{Backoff, BackoffConfig};
pub use locator::{Locator, LocatorError};
pub use subscription::{Subscribers, Subscription};
pub use universe_courier::UniverseCourier;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourierError {
    /// Remote lookups need the anchor outpoint of the proof.
    #[error("locator {0} is missing outpoint")]
    MissingOutPoint(String),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Universe(#[from] universe::Error),

    #[error("failed to decode proof: {0}")]
    Decode(#[from] taproot_assets_types::error::Error),

    #[error("no proof in remote universe for {0}")]
    ProofNotFound(String),

    #[error("remote universe did not answer within {0:?}")]
    Timeout(Duration),

    #[error("proof chain loops back to {0}")]
    ProofCycle(OutPoint),

    /// A non-genesis proof whose root asset names no previous output.
    #[error("proof at {0} has no previous asset reference")]
    MissingPrevId(OutPoint),

    #[error("remote leaf does not hash to its universe root")]
    InvalidUniverseProof,
}

/// Who a proof is meant for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub script_key: Option<SerializedKey>,
    pub asset_id: Option<AssetID>,
    pub amount: u64,
}

/// An encoded proof file with the locator it was fetched under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedProof {
    pub locator: Locator,
    pub blob: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourierEvent {
    ProofReceived { locator: Locator },
    ProofDelivered { locator: Locator },
    /// A delivery attempt failed and the courier waits before the next one.
    BackoffWait {
        locator: Locator,
        attempt: u32,
        wait: Duration,
    },
}

pub trait Courier: Send + Sync {
    /// Fetches the full proof file named by `locator`. A remote answer is
    /// unverified and is not archived.
    fn receive_proof(
        &self,
        recipient: &Recipient,
        locator: &Locator,
    ) -> impl Future<Output = Result<AnnotatedProof, CourierError>> + Send;

    /// Hands `proof` to the recipient side. Delivering a known proof again
    /// succeeds without changing anything.
    fn deliver_proof(
        &self,
        recipient: &Recipient,
        proof: &AnnotatedProof,
    ) -> impl Future<Output = Result<(), CourierError>> + Send;

    fn subscribe(&self) -> Subscription<CourierEvent>;
}
