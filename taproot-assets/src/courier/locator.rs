use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};
use taproot_assets_types::asset::{AssetID, SerializedKey};
use taproot_assets_types::proof::Proof;
use thiserror::Error;

use crate::universe::{Identifier, IdentifierKey, LeafKey, ProofType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("locator has neither an asset ID nor a group key")]
    MissingIdentity,

    /// Outpoints hash with a 16 bit output index.
    #[error("output index {0} does not fit a locator")]
    OutputIndexTooLarge(u32),
}

/// Everything needed to find one proof file: the asset (or its group), the
/// script key that owns it and, for remote lookups, the anchor outpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub asset_id: Option<AssetID>,
    pub group_key: Option<SerializedKey>,
    pub script_key: SerializedKey,
    pub out_point: Option<OutPoint>,
}

impl Locator {
    /// Locator of the asset created by `proof`.
    pub fn for_proof(proof: &Proof) -> Self {
        Self {
            asset_id: Some(proof.asset.id()),
            group_key: proof.asset.group_key.map(|key| key.group_pub_key),
            script_key: proof.asset.script_key,
            out_point: Some(proof.out_point()),
        }
    }

    /// Archive key of the proof file:
    /// `sha256(asset_id? || group_key? || script_key || outpoint?)`, the
    /// outpoint written as `txid || vout (u16 BE)`.
    pub fn hash(&self) -> Result<[u8; 32], LocatorError> {
        let mut engine = Sha256Hash::engine();
        if let Some(asset_id) = &self.asset_id {
            engine.input(asset_id.as_byte_array());
        }
        if let Some(group_key) = &self.group_key {
            engine.input(group_key.as_bytes());
        }
        engine.input(self.script_key.as_bytes());
        if let Some(out_point) = &self.out_point {
            let vout = u16::try_from(out_point.vout)
                .map_err(|_| LocatorError::OutputIndexTooLarge(out_point.vout))?;
            engine.input(out_point.txid.as_byte_array());
            engine.input(&vout.to_be_bytes());
        }
        Ok(Sha256Hash::from_engine(engine).to_byte_array())
    }

    /// The universe holding proofs of this asset. Grouped assets live in the
    /// universe of their group.
    pub fn universe_id(&self, proof_type: ProofType) -> Result<Identifier, LocatorError> {
        let key = match (self.group_key, self.asset_id) {
            (Some(group_key), _) => IdentifierKey::GroupKey(group_key),
            (None, Some(asset_id)) => IdentifierKey::AssetId(asset_id),
            (None, None) => return Err(LocatorError::MissingIdentity),
        };
        Ok(Identifier::new(key, proof_type))
    }

    pub fn leaf_key(&self) -> Option<LeafKey> {
        self.out_point.map(|out_point| LeafKey {
            out_point,
            script_key: self.script_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Txid;
    use taproot_assets_types::asset::NUMS_KEY;

    fn locator() -> Locator {
        Locator {
            asset_id: Some(AssetID::hash(b"asset")),
            group_key: None,
            script_key: NUMS_KEY,
            out_point: Some(OutPoint {
                txid: Txid::from_byte_array([3; 32]),
                vout: 1,
            }),
        }
    }

    #[test]
    fn hash_covers_every_field() {
        let base = locator().hash().unwrap();
        assert_eq!(locator().hash().unwrap(), base);

        let mut no_out_point = locator();
        no_out_point.out_point = None;
        assert_ne!(no_out_point.hash().unwrap(), base);

        let mut grouped = locator();
        grouped.group_key = Some(NUMS_KEY);
        assert_ne!(grouped.hash().unwrap(), base);

        let mut other_vout = locator();
        other_vout.out_point = Some(OutPoint {
            txid: Txid::from_byte_array([3; 32]),
            vout: 2,
        });
        assert_ne!(other_vout.hash().unwrap(), base);
    }

    #[test]
    fn hash_rejects_wide_output_index() {
        let mut wide = locator();
        wide.out_point = Some(OutPoint {
            txid: Txid::from_byte_array([3; 32]),
            vout: 70_000,
        });
        assert_eq!(wide.hash(), Err(LocatorError::OutputIndexTooLarge(70_000)));
    }

    #[test]
    fn universe_prefers_group_key() {
        let mut loc = locator();
        let id = loc.universe_id(ProofType::Transfer).unwrap();
        assert_eq!(id.key, IdentifierKey::AssetId(AssetID::hash(b"asset")));

        loc.group_key = Some(NUMS_KEY);
        let id = loc.universe_id(ProofType::Issuance).unwrap();
        assert_eq!(id.key, IdentifierKey::GroupKey(NUMS_KEY));

        loc.group_key = None;
        loc.asset_id = None;
        assert_eq!(
            loc.universe_id(ProofType::Issuance),
            Err(LocatorError::MissingIdentity)
        );
    }
}
