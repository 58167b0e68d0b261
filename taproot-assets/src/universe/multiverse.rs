//! In-memory collection of universe trees.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use taproot_assets_core::mssmt::MssmtTree;
use taproot_assets_types::asset::AssetID;
use taproot_assets_types::mssmt::MssmtNode;
use taproot_assets_types::proof::Proof;

use super::{Error, Identifier, Leaf, LeafKey, UniverseClient, UniverseProof, UniverseRoot};
use crate::courier::subscription::{Subscribers, Subscription};

/// Published after a leaf was added or replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseEvent {
    pub id: Identifier,
    pub key: LeafKey,
    pub root: MssmtNode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniverseStats {
    pub num_proofs: usize,
    pub num_assets: usize,
    pub num_groups: usize,
}

#[derive(Debug, Default)]
struct UniverseState {
    tree: MssmtTree,
    /// Keyed by universe key, so pages come out in tree order.
    leaves: BTreeMap<[u8; 32], (LeafKey, Leaf)>,
    asset_name: String,
}

impl UniverseState {
    fn proof(&self, id: &Identifier, universe_key: &[u8; 32]) -> Option<UniverseProof> {
        let (key, leaf) = self.leaves.get(universe_key)?;
        debug_assert!(id.matches(leaf));
        Some(UniverseProof {
            key: *key,
            leaf: leaf.clone(),
            root: self.tree.root(),
            proof: self.tree.merkle_proof(universe_key),
        })
    }
}

/// Every universe this node knows about. Writes to one universe are
/// serialized by its own lock, reads of other universes are not blocked.
#[derive(Debug)]
pub struct Multiverse {
    universes: RwLock<BTreeMap<Identifier, Arc<RwLock<UniverseState>>>>,
    subscribers: Subscribers<UniverseEvent>,
    page_size: usize,
}

impl Default for Multiverse {
    fn default() -> Self {
        Self::new(512)
    }
}

impl Multiverse {
    /// `page_size` caps every page this universe serves.
    pub fn new(page_size: usize) -> Self {
        Self {
            universes: RwLock::new(BTreeMap::new()),
            subscribers: Subscribers::new(),
            page_size: page_size.max(1),
        }
    }

    fn universe(&self, id: &Identifier) -> Option<Arc<RwLock<UniverseState>>> {
        self.universes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn universe_or_insert(&self, id: &Identifier) -> Arc<RwLock<UniverseState>> {
        if let Some(universe) = self.universe(id) {
            return universe;
        }
        self.universes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*id)
            .or_default()
            .clone()
    }

    /// All universes in identifier order, including ones left empty by a
    /// failed insert.
    fn snapshot(&self) -> Vec<(Identifier, Arc<RwLock<UniverseState>>)> {
        self.universes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }

    fn page_limit(&self, limit: usize) -> usize {
        limit.min(self.page_size)
    }

    /// Files `leaf` under `key`. Registering the same leaf again returns
    /// the current proof and notifies nobody.
    pub fn register(
        &self,
        id: &Identifier,
        key: &LeafKey,
        leaf: Leaf,
    ) -> Result<UniverseProof, Error> {
        if !id.matches(&leaf) {
            return Err(Error::LeafMismatch(*id));
        }
        let universe_key = key.universe_key();
        let universe = self.universe_or_insert(id);
        let mut state = universe.write().unwrap_or_else(PoisonError::into_inner);

        if let Some((_, existing)) = state.leaves.get(&universe_key) {
            if *existing == leaf {
                log::debug!("Leaf {} already in universe {}", key, id);
                return state.proof(id, &universe_key).ok_or(Error::LeafMismatch(*id));
            }
        }

        state
            .tree
            .insert(universe_key, leaf.raw_proof.clone(), leaf.amount)?;
        if state.asset_name.is_empty() {
            state.asset_name = leaf.genesis.tag.clone();
        }
        state.leaves.insert(universe_key, (*key, leaf));
        let proof = state
            .proof(id, &universe_key)
            .ok_or(Error::LeafMismatch(*id))?;
        drop(state);

        log::info!(
            "Inserted leaf {} into universe {}, new root sum {}",
            key,
            id,
            proof.root.sum
        );
        self.subscribers.publish(&UniverseEvent {
            id: *id,
            key: *key,
            root: proof.root,
        });
        Ok(proof)
    }

    /// Files `proof` under the universe and key it belongs to.
    pub fn insert_proof(&self, proof: &Proof) -> Result<UniverseProof, Error> {
        self.register(
            &Identifier::for_proof(proof),
            &LeafKey::for_proof(proof),
            Leaf::from_proof(proof),
        )
    }

    pub fn root(&self, id: &Identifier) -> Option<UniverseRoot> {
        let universe = self.universe(id)?;
        let state = universe.read().unwrap_or_else(PoisonError::into_inner);
        if state.leaves.is_empty() {
            return None;
        }
        Some(UniverseRoot {
            id: *id,
            node: state.tree.root(),
            asset_name: state.asset_name.clone(),
        })
    }

    /// Roots of every non-empty universe, paged in identifier order.
    pub fn asset_roots(&self, offset: usize, limit: usize) -> Vec<UniverseRoot> {
        self.snapshot()
            .into_iter()
            .filter_map(|(id, universe)| {
                let state = universe.read().unwrap_or_else(PoisonError::into_inner);
                (!state.leaves.is_empty()).then(|| UniverseRoot {
                    id,
                    node: state.tree.root(),
                    asset_name: state.asset_name.clone(),
                })
            })
            .skip(offset)
            .take(self.page_limit(limit))
            .collect()
    }

    pub fn leaf_keys(&self, id: &Identifier, offset: usize, limit: usize) -> Vec<LeafKey> {
        let Some(universe) = self.universe(id) else {
            return Vec::new();
        };
        let state = universe.read().unwrap_or_else(PoisonError::into_inner);
        state
            .leaves
            .values()
            .skip(offset)
            .take(self.page_limit(limit))
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn leaves(&self, id: &Identifier, offset: usize, limit: usize) -> Vec<Leaf> {
        let Some(universe) = self.universe(id) else {
            return Vec::new();
        };
        let state = universe.read().unwrap_or_else(PoisonError::into_inner);
        state
            .leaves
            .values()
            .skip(offset)
            .take(self.page_limit(limit))
            .map(|(_, leaf)| leaf.clone())
            .collect()
    }

    pub fn fetch_proof_leaf(&self, id: &Identifier, key: &LeafKey) -> Option<UniverseProof> {
        let universe = self.universe(id)?;
        let state = universe.read().unwrap_or_else(PoisonError::into_inner);
        state.proof(id, &key.universe_key())
    }

    pub fn stats(&self) -> UniverseStats {
        let mut num_proofs = 0;
        let mut assets = BTreeSet::<AssetID>::new();
        let mut groups = BTreeSet::new();
        for (_, universe) in self.snapshot() {
            let state = universe.read().unwrap_or_else(PoisonError::into_inner);
            num_proofs += state.leaves.len();
            for (_, leaf) in state.leaves.values() {
                assets.insert(leaf.genesis.id());
                if let Some(group_key) = leaf.group_key {
                    groups.insert(group_key);
                }
            }
        }
        UniverseStats {
            num_proofs,
            num_assets: assets.len(),
            num_groups: groups.len(),
        }
    }

    /// Events for every leaf registered from now on.
    pub fn subscribe(&self) -> Subscription<UniverseEvent> {
        self.subscribers.subscribe()
    }
}

impl UniverseClient for Multiverse {
    async fn asset_roots(&self, offset: usize, limit: usize) -> Result<Vec<UniverseRoot>, Error> {
        Ok(Multiverse::asset_roots(self, offset, limit))
    }

    async fn asset_leaf_keys(
        &self,
        id: &Identifier,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LeafKey>, Error> {
        Ok(self.leaf_keys(id, offset, limit))
    }

    async fn asset_leaves(
        &self,
        id: &Identifier,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Leaf>, Error> {
        Ok(self.leaves(id, offset, limit))
    }

    async fn fetch_proof_leaf(
        &self,
        id: &Identifier,
        key: &LeafKey,
    ) -> Result<Option<UniverseProof>, Error> {
        Ok(Multiverse::fetch_proof_leaf(self, id, key))
    }

    async fn push_proof(
        &self,
        id: &Identifier,
        key: &LeafKey,
        leaf: Leaf,
    ) -> Result<UniverseProof, Error> {
        self.register(id, key, leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{IdentifierKey, ProofType};
    use bitcoin::hashes::sha256::Hash as Sha256Hash;
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, Txid};
    use taproot_assets_types::asset::{AssetType, Genesis, NUMS_KEY};

    fn genesis(tag: &str) -> Genesis {
        Genesis {
            first_prev_out: OutPoint {
                txid: Txid::from_byte_array([1; 32]),
                vout: 0,
            },
            tag: tag.to_string(),
            meta_hash: Sha256Hash::all_zeros(),
            output_index: 0,
            asset_type: AssetType::Normal,
        }
    }

    fn leaf(tag: &str, amount: u64) -> Leaf {
        Leaf {
            genesis: genesis(tag),
            group_key: None,
            raw_proof: format!("{tag}-{amount}").into_bytes(),
            amount,
        }
    }

    fn id_of(leaf: &Leaf) -> Identifier {
        Identifier::new(IdentifierKey::AssetId(leaf.genesis.id()), ProofType::Issuance)
    }

    fn key(n: u8) -> LeafKey {
        LeafKey {
            out_point: OutPoint {
                txid: Txid::from_byte_array([n; 32]),
                vout: 0,
            },
            script_key: NUMS_KEY,
        }
    }

    #[test]
    fn register_is_idempotent() {
        let multiverse = Multiverse::default();
        let gold = leaf("gold", 10);
        let id = id_of(&gold);
        let mut events = multiverse.subscribe();

        let first = multiverse.register(&id, &key(1), gold.clone()).unwrap();
        assert!(first.verify());
        assert_eq!(first.root.sum, 10);

        let again = multiverse.register(&id, &key(1), gold).unwrap();
        assert_eq!(again.root, first.root);
        assert_eq!(multiverse.stats().num_proofs, 1);

        assert_eq!(events.try_recv().map(|event| event.root), Some(first.root));
        assert_eq!(events.try_recv(), None);
    }

    #[test]
    fn root_sums_leaf_amounts() {
        let multiverse = Multiverse::default();
        let id = id_of(&leaf("gold", 0));
        multiverse.register(&id, &key(1), leaf("gold", 10)).unwrap();
        multiverse.register(&id, &key(2), leaf("gold", 32)).unwrap();

        let root = multiverse.root(&id).unwrap();
        assert_eq!(root.node.sum, 42);
        assert_eq!(root.asset_name, "gold");

        let proof = multiverse.fetch_proof_leaf(&id, &key(2)).unwrap();
        assert!(proof.verify());
        assert_eq!(proof.root, root.node);
        assert!(multiverse.fetch_proof_leaf(&id, &key(3)).is_none());
    }

    #[test]
    fn rejects_leaf_of_other_asset() {
        let multiverse = Multiverse::default();
        let id = id_of(&leaf("gold", 1));
        let err = multiverse
            .register(&id, &key(1), leaf("silver", 1))
            .unwrap_err();
        assert!(matches!(err, Error::LeafMismatch(_)));
        assert!(multiverse.root(&id).is_none());
        assert!(multiverse.asset_roots(0, 10).is_empty());
    }

    #[test]
    fn pages_are_capped_and_ordered() {
        let multiverse = Multiverse::new(2);
        let id = id_of(&leaf("gold", 0));
        for n in 1..=5 {
            multiverse.register(&id, &key(n), leaf("gold", n.into())).unwrap();
        }

        let first = multiverse.leaf_keys(&id, 0, 10);
        assert_eq!(first.len(), 2);
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = multiverse.leaf_keys(&id, offset, 10);
            if page.is_empty() {
                break;
            }
            offset += page.len();
            all.extend(page);
        }
        assert_eq!(all.len(), 5);
        let universe_keys: Vec<_> = all.iter().map(LeafKey::universe_key).collect();
        let mut sorted = universe_keys.clone();
        sorted.sort();
        assert_eq!(universe_keys, sorted);
        assert_eq!(multiverse.leaves(&id, 4, 10).len(), 1);
    }

    #[test]
    fn stats_count_assets_and_groups() {
        let multiverse = Multiverse::default();
        let gold = leaf("gold", 1);
        let silver = leaf("silver", 1);
        multiverse.register(&id_of(&gold), &key(1), gold.clone()).unwrap();
        multiverse.register(&id_of(&silver), &key(2), silver).unwrap();

        let grouped = Leaf {
            group_key: Some(NUMS_KEY),
            ..gold
        };
        let group_id = Identifier::new(IdentifierKey::GroupKey(NUMS_KEY), ProofType::Issuance);
        multiverse.register(&group_id, &key(3), grouped).unwrap();

        assert_eq!(
            multiverse.stats(),
            UniverseStats {
                num_proofs: 3,
                num_assets: 2,
                num_groups: 1,
            }
        );
        assert_eq!(multiverse.asset_roots(0, 10).len(), 3);
        assert_eq!(multiverse.asset_roots(2, 10).len(), 1);
    }
}
