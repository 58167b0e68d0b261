//! Courier backed by a universe: proofs are pulled leaf by leaf from the
//! issuance and transfer trees. Fetched files only enter the local archive
//! through [`UniverseCourier::cache`], once the caller has verified them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::OutPoint;
use taproot_assets_types::file::File;
use taproot_assets_types::proof::Proof;

use super::{
    AnnotatedProof, Backoff, Courier, CourierError, CourierEvent, Locator, Recipient,
    Subscribers, Subscription,
};
use crate::archive::{ArchiveError, ProofArchive};
use crate::config::CourierConfig;
use crate::universe::{Identifier, Leaf, LeafKey, ProofType, UniverseClient, UniverseProof};

pub struct UniverseCourier<C> {
    client: C,
    archive: Arc<dyn ProofArchive>,
    receive_timeout: Duration,
    backoff: Backoff,
    subscribers: Subscribers<CourierEvent>,
}

impl<C: UniverseClient> UniverseCourier<C> {
    pub fn new(client: C, archive: Arc<dyn ProofArchive>, config: &CourierConfig) -> Self {
        Self {
            client,
            archive,
            receive_timeout: config.receive_timeout(),
            backoff: Backoff::new(config.backoff()),
            subscribers: Subscribers::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn archive(&self) -> &dyn ProofArchive {
        self.archive.as_ref()
    }

    /// Stores a verified proof file, so later receives for its locator are
    /// answered from the archive.
    pub async fn cache(&self, annotated: &AnnotatedProof) -> Result<(), CourierError> {
        let hash = annotated.locator.hash()?;
        let archive = Arc::clone(&self.archive);
        let blob = annotated.blob.clone();
        tokio::task::spawn_blocking(move || archive.store(&hash, &blob))
            .await
            .map_err(|err| ArchiveError::Backend(err.to_string()))??;
        log::debug!("Cached proof {}", hex::encode(hash));
        Ok(())
    }

    /// Archive lookups may block on disk, so they run on the blocking pool.
    async fn load_archived(&self, hash: [u8; 32]) -> Result<Option<Vec<u8>>, CourierError> {
        let archive = Arc::clone(&self.archive);
        let blob = tokio::task::spawn_blocking(move || archive.load(&hash))
            .await
            .map_err(|err| ArchiveError::Backend(err.to_string()))??;
        Ok(blob)
    }

    /// Fetches the proof at `key`, trying the issuance universe first.
    async fn fetch_proof(&self, locator: &Locator, key: &LeafKey) -> Result<Proof, CourierError> {
        for proof_type in [ProofType::Issuance, ProofType::Transfer] {
            let id = locator.universe_id(proof_type)?;
            let fetched =
                tokio::time::timeout(self.receive_timeout, self.client.fetch_proof_leaf(&id, key))
                    .await
                    .map_err(|_| CourierError::Timeout(self.receive_timeout))??;
            if let Some(universe_proof) = fetched {
                if universe_proof.key != *key || !universe_proof.verify() {
                    return Err(CourierError::InvalidUniverseProof);
                }
                log::debug!("Fetched proof {} from universe {}", key, id);
                return Ok(universe_proof.leaf.proof()?);
            }
        }
        Err(CourierError::ProofNotFound(key.to_string()))
    }

    /// Walks the previous-output references from `out_point` back to the
    /// genesis and assembles the proofs into a file.
    async fn fetch_file(&self, locator: &Locator, out_point: OutPoint) -> Result<File, CourierError> {
        let mut proofs = Vec::new();
        let mut visited = BTreeSet::new();
        let mut key = LeafKey {
            out_point,
            script_key: locator.script_key,
        };
        loop {
            if !visited.insert(key.out_point) {
                return Err(CourierError::ProofCycle(key.out_point));
            }
            let proof = self.fetch_proof(locator, &key).await?;
            let prev = if proof.asset.is_genesis_asset() {
                None
            } else {
                Some(prev_leaf_key(&proof)?)
            };
            proofs.push(proof);
            match prev {
                Some(prev) => key = prev,
                None => break,
            }
        }
        proofs.reverse();
        Ok(File::from_proofs(&proofs))
    }

    async fn push_leaf(
        &self,
        id: &Identifier,
        key: &LeafKey,
        leaf: Leaf,
    ) -> Result<UniverseProof, CourierError> {
        let pushed =
            tokio::time::timeout(self.receive_timeout, self.client.push_proof(id, key, leaf))
                .await
                .map_err(|_| CourierError::Timeout(self.receive_timeout))??;
        if !pushed.verify() {
            return Err(CourierError::InvalidUniverseProof);
        }
        Ok(pushed)
    }
}

/// Leaf key of the asset spent by `proof`, taken from the first witness of
/// its root asset.
fn prev_leaf_key(proof: &Proof) -> Result<LeafKey, CourierError> {
    let root = proof.asset.split_root_asset().unwrap_or(&proof.asset);
    let prev_id = root
        .prev_witnesses
        .first()
        .and_then(|witness| witness.prev_id)
        .filter(|prev_id| !prev_id.is_zero())
        .ok_or_else(|| CourierError::MissingPrevId(proof.out_point()))?;
    Ok(LeafKey {
        out_point: prev_id.out_point,
        script_key: prev_id.script_key,
    })
}

impl<C: UniverseClient> Courier for UniverseCourier<C> {
    async fn receive_proof(
        &self,
        _recipient: &Recipient,
        locator: &Locator,
    ) -> Result<AnnotatedProof, CourierError> {
        let hash = locator.hash()?;
        if let Some(blob) = self.load_archived(hash).await? {
            log::debug!("Proof {} found in local archive", hex::encode(hash));
            return Ok(AnnotatedProof {
                locator: *locator,
                blob,
            });
        }

        let Some(out_point) = locator.out_point else {
            return Err(CourierError::MissingOutPoint(hex::encode(hash)));
        };
        log::debug!(
            "Proof {} not in local archive, fetching {} from universe",
            hex::encode(hash),
            out_point
        );
        let blob = self.fetch_file(locator, out_point).await?.encode();

        self.subscribers.publish(&CourierEvent::ProofReceived { locator: *locator });
        Ok(AnnotatedProof {
            locator: *locator,
            blob,
        })
    }

    async fn deliver_proof(
        &self,
        _recipient: &Recipient,
        annotated: &AnnotatedProof,
    ) -> Result<(), CourierError> {
        let hash = annotated.locator.hash()?;
        let file = File::from_bytes(&annotated.blob)?;
        let locator = annotated.locator;

        // Every earlier proof is pushed too, so receivers can walk back.
        for proof in file.proofs()? {
            let id = Identifier::for_proof(&proof);
            let key = LeafKey::for_proof(&proof);
            let leaf = Leaf::from_proof(&proof);
            self.backoff
                .exec(
                    || self.push_leaf(&id, &key, leaf.clone()),
                    |attempt, wait| {
                        self.subscribers.publish(&CourierEvent::BackoffWait {
                            locator,
                            attempt,
                            wait,
                        })
                    },
                )
                .await?;
        }

        log::debug!("Delivered proof {}", hex::encode(hash));
        self.subscribers.publish(&CourierEvent::ProofDelivered { locator });
        Ok(())
    }

    fn subscribe(&self) -> Subscription<CourierEvent> {
        self.subscribers.subscribe()
    }
}
