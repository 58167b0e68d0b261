//! Root comparison and reconciliation against a remote universe.

use std::collections::{BTreeMap, BTreeSet};

use taproot_assets_core::verify::{self, VerifierCtx};
use taproot_assets_core::TaprootOps;
use taproot_assets_types::file::File;

use super::{Error, Identifier, Leaf, LeafKey, Multiverse, UniverseClient, UniverseRoot};
use crate::config::UniverseConfig;
use crate::courier::{Courier, CourierError, Locator, Recipient, UniverseCourier};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Universe(#[from] Error),

    #[error(transparent)]
    Courier(#[from] CourierError),

    #[error("failed to decode synced proof: {0}")]
    Decode(#[from] taproot_assets_types::error::Error),

    #[error("proof for {key} failed verification: {source}")]
    Verify {
        key: LeafKey,
        #[source]
        source: verify::Error,
    },

    /// The fetched file ends in a different asset than the leaf it was
    /// fetched for.
    #[error("synced proof does not match leaf {0} of universe {1}")]
    LeafMismatch(LeafKey, Identifier),
}

/// Every root of `client`, fetched page by page until an empty page.
pub async fn fetch_all_roots<C: UniverseClient>(
    client: &C,
    page_size: usize,
) -> Result<BTreeMap<Identifier, UniverseRoot>, Error> {
    let page_size = page_size.max(1);
    let mut roots = BTreeMap::new();
    let mut offset = 0;
    loop {
        let page = client.asset_roots(offset, page_size).await?;
        if page.is_empty() {
            break;
        }
        offset += page.len();
        roots.extend(page.into_iter().map(|root| (root.id, root)));
    }
    Ok(roots)
}

/// Every leaf key of universe `id`, fetched page by page until an empty page.
pub async fn fetch_all_leaf_keys<C: UniverseClient>(
    client: &C,
    id: &Identifier,
    page_size: usize,
) -> Result<BTreeSet<LeafKey>, Error> {
    let page_size = page_size.max(1);
    let mut keys = BTreeSet::new();
    let mut offset = 0;
    loop {
        let page = client.asset_leaf_keys(id, offset, page_size).await?;
        if page.is_empty() {
            break;
        }
        offset += page.len();
        keys.extend(page);
    }
    Ok(keys)
}

/// The first identifier, in order, that is tracked by only one side or
/// whose root differs.
pub fn first_root_mismatch(
    a: &BTreeMap<Identifier, UniverseRoot>,
    b: &BTreeMap<Identifier, UniverseRoot>,
) -> Option<Identifier> {
    a.keys()
        .chain(b.keys())
        .find(|id| a.get(id).map(|root| root.node) != b.get(id).map(|root| root.node))
        .copied()
}

/// Two complete root sets are equal if they track the same identifiers
/// with the same root hash and sum.
pub fn roots_equal(
    a: &BTreeMap<Identifier, UniverseRoot>,
    b: &BTreeMap<Identifier, UniverseRoot>,
) -> bool {
    first_root_mismatch(a, b).is_none()
}

/// Identifiers of `remote` that `local` lacks or holds a different root for.
pub fn diff_roots(
    local: &BTreeMap<Identifier, UniverseRoot>,
    remote: &BTreeMap<Identifier, UniverseRoot>,
) -> Vec<Identifier> {
    remote
        .iter()
        .filter(|(id, root)| local.get(id).map(|local| local.node) != Some(root.node))
        .map(|(id, _)| *id)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Universes that differed from the remote.
    pub synced_ids: Vec<Identifier>,
    pub new_leaves: usize,
}

/// Pulls the leaves a remote universe has and the local one lacks. Every
/// fetched proof file is verified before it is archived and its last proof
/// registered.
pub struct UniverseSyncer<'a, C, O> {
    local: &'a Multiverse,
    courier: &'a UniverseCourier<C>,
    ops: &'a O,
    ctx: VerifierCtx<'a>,
    page_size: usize,
}

impl<'a, C: UniverseClient, O: TaprootOps> UniverseSyncer<'a, C, O> {
    pub fn new(
        local: &'a Multiverse,
        courier: &'a UniverseCourier<C>,
        ops: &'a O,
        ctx: VerifierCtx<'a>,
        page_size: usize,
    ) -> Self {
        Self {
            local,
            courier,
            ops,
            ctx,
            page_size,
        }
    }

    /// Pages remote listings with the configured `sync_page_size`.
    pub fn from_config(
        local: &'a Multiverse,
        courier: &'a UniverseCourier<C>,
        ops: &'a O,
        ctx: VerifierCtx<'a>,
        config: &UniverseConfig,
    ) -> Self {
        Self::new(local, courier, ops, ctx, config.sync_page_size)
    }

    pub async fn sync_universe(&self) -> Result<SyncReport, SyncError> {
        let remote = self.courier.client();
        let remote_roots = fetch_all_roots(remote, self.page_size).await?;
        let local_roots = fetch_all_roots(self.local, self.page_size).await?;

        let mut report = SyncReport::default();
        if roots_equal(&local_roots, &remote_roots) {
            log::debug!("Universe roots match, nothing to sync");
            return Ok(report);
        }

        for id in diff_roots(&local_roots, &remote_roots) {
            let remote_keys = fetch_all_leaf_keys(remote, &id, self.page_size).await?;
            let local_keys = fetch_all_leaf_keys(self.local, &id, self.page_size).await?;
            let missing: Vec<_> = remote_keys.difference(&local_keys).copied().collect();
            log::info!(
                "Syncing universe {}: {} remote leaves, {} missing locally",
                id,
                remote_keys.len(),
                missing.len()
            );
            for key in missing {
                self.sync_leaf(&id, &key).await?;
                report.new_leaves += 1;
            }
            report.synced_ids.push(id);
        }
        Ok(report)
    }

    async fn sync_leaf(&self, id: &Identifier, key: &LeafKey) -> Result<(), SyncError> {
        let locator = Locator {
            asset_id: id.asset_id(),
            group_key: id.group_key(),
            script_key: key.script_key,
            out_point: Some(key.out_point),
        };
        let annotated = self
            .courier
            .receive_proof(&Recipient::default(), &locator)
            .await?;
        let file = File::from_bytes(&annotated.blob)?;
        let snapshot = verify::verify_file(self.ops, &file, &self.ctx)
            .map_err(|source| SyncError::Verify { key: *key, source })?;
        if snapshot.out_point != key.out_point || snapshot.asset.script_key != key.script_key {
            return Err(SyncError::LeafMismatch(*key, *id));
        }

        let last = file.last_proof()?;
        if Identifier::for_proof(&last) != *id {
            return Err(SyncError::LeafMismatch(*key, *id));
        }
        self.courier.cache(&annotated).await?;
        self.local.register(id, key, Leaf::from_proof(&last))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{IdentifierKey, ProofType};
    use bitcoin::hashes::sha256::Hash as Sha256Hash;
    use bitcoin::hashes::Hash;
    use taproot_assets_types::mssmt::MssmtNode;

    fn root(tag: &str, sum: u64) -> (Identifier, UniverseRoot) {
        let id = Identifier::new(
            IdentifierKey::AssetId(Sha256Hash::hash(tag.as_bytes())),
            ProofType::Issuance,
        );
        let root = UniverseRoot {
            id,
            node: MssmtNode::leaf(tag.as_bytes(), sum),
            asset_name: tag.to_string(),
        };
        (id, root)
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        let a: BTreeMap<_, _> = [root("gold", 1), root("silver", 2)].into_iter().collect();
        let mut b = a.clone();
        assert!(roots_equal(&a, &a));
        assert!(roots_equal(&a, &b));

        b.insert(root("silver", 3).0, root("silver", 3).1);
        assert!(!roots_equal(&a, &b));
        assert!(!roots_equal(&b, &a));
        assert_eq!(first_root_mismatch(&a, &b), Some(root("silver", 0).0));
    }

    #[test]
    fn missing_identifier_is_a_mismatch() {
        let a: BTreeMap<_, _> = [root("gold", 1), root("silver", 2)].into_iter().collect();
        let truncated: BTreeMap<_, _> = [root("gold", 1)].into_iter().collect();
        assert!(!roots_equal(&a, &truncated));
        assert!(!roots_equal(&truncated, &a));
        assert_eq!(diff_roots(&truncated, &a), vec![root("silver", 2).0]);
        assert!(diff_roots(&a, &truncated).is_empty());
    }
}
