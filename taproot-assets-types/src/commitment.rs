use crate::asset::AssetVersion;
use crate::error::Error;
use crate::mssmt::MssmtProof;
use crate::tlv::{Stream, Type, UnknownOddTypes, Writer};

use crate::alloc::string::ToString;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

/// Denotes the structure of the Taproot Asset commitment MS-SMT and the procedure
/// for building a TapLeaf from a Taproot Asset commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TapCommitmentVersion {
    /// Initial Taproot Asset Commitment version. Uses legacy TapLeaf format, ONLY commits to V0 assets.
    V0 = 0,
    /// Used by Taproot Asset Commitments that commit to V0 or V1 assets. Uses legacy TapLeaf format.
    V1 = 1,
    /// Used by Taproot Asset Commitments that commit to V0 or V1 assets. Uses V1 TapLeaf format.
    V2 = 2,
}

impl TapCommitmentVersion {
    pub fn from_u8(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(TapCommitmentVersion::V0),
            1 => Ok(TapCommitmentVersion::V1),
            2 => Ok(TapCommitmentVersion::V2),
            _ => Err(Error::InvalidTlvValue(
                0,
                alloc::format!("Unknown TapCommitmentVersion: {}", val),
            )),
        }
    }
}

/// Type of tapscript sibling preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TapscriptPreimageType {
    /// Pre-image that's a leaf script.
    LeafPreimage = 0,
    /// Pre-image that's a branch (64-bytes of two child pre-images).
    BranchPreimage = 1,
}

impl TapscriptPreimageType {
    pub(crate) fn from_u8(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(TapscriptPreimageType::LeafPreimage),
            1 => Ok(TapscriptPreimageType::BranchPreimage),
            _ => Err(Error::InvalidTlvValue(
                0,
                alloc::format!("Unknown TapscriptPreimageType: {}", val),
            )),
        }
    }
}

/// Wraps a pre-image byte slice with a type byte that self identifies what type of pre-image it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TapscriptPreimage {
    /// The pre-image itself. This will be 64 bytes if representing a TapBranch,
    /// or any size under 4 MBytes if representing a TapLeaf.
    pub sibling_preimage: Vec<u8>,
    /// The type of the pre-image.
    pub sibling_type: TapscriptPreimageType,
}

impl TapscriptPreimage {
    /// Leaf preimage of a tapscript: leaf version, compact size length, script.
    pub fn from_leaf_script(leaf_version: u8, script: &[u8]) -> Self {
        let mut sibling_preimage = Vec::with_capacity(script.len() + 10);
        sibling_preimage.push(leaf_version);
        write_compact_size(script.len() as u64, &mut sibling_preimage);
        sibling_preimage.extend_from_slice(script);
        TapscriptPreimage {
            sibling_preimage,
            sibling_type: TapscriptPreimageType::LeafPreimage,
        }
    }

    /// Branch preimage made of two child hashes.
    pub fn from_branch(left: [u8; 32], right: [u8; 32]) -> Self {
        let mut sibling_preimage = Vec::with_capacity(64);
        sibling_preimage.extend_from_slice(&left);
        sibling_preimage.extend_from_slice(&right);
        TapscriptPreimage {
            sibling_preimage,
            sibling_type: TapscriptPreimageType::BranchPreimage,
        }
    }

    /// The format is: 1-byte type, then variable-length preimage bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.sibling_preimage.len());
        out.push(self.sibling_type as u8);
        out.extend_from_slice(&self.sibling_preimage);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (&type_byte, sibling_preimage) = bytes
            .split_first()
            .ok_or(Error::MissingTlvField("TapscriptPreimage.type".to_string()))?;
        let sibling_type = TapscriptPreimageType::from_u8(type_byte)?;

        if sibling_type == TapscriptPreimageType::BranchPreimage && sibling_preimage.len() != 64 {
            return Err(Error::InvalidTlvValue(
                type_byte as u64,
                "BranchPreimage must be 64 bytes".to_string(),
            ));
        }

        Ok(TapscriptPreimage {
            sibling_preimage: sibling_preimage.to_vec(),
            sibling_type,
        })
    }
}

/// Bitcoin compact size, as used inside tapleaf preimages.
fn write_compact_size(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Proof used along with an asset leaf to arrive at the root of the AssetCommitment MS-SMT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProof {
    /// The underlying MS-SMT proof.
    pub proof: MssmtProof,
    /// Max version of the assets committed.
    pub version: AssetVersion,
    /// Common identifier for all assets found within the AssetCommitment.
    /// Can be an asset.ID or an asset.GroupKey hash.
    pub tap_key: [u8; 32],
    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

impl AssetProof {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .record(ASSET_PROOF_VERSION_TYPE, alloc::vec![self.version as u8])
            .record(ASSET_PROOF_TAP_KEY_TYPE, self.tap_key.to_vec())
            .record(ASSET_PROOF_MSSMT_PROOF_TYPE, self.proof.encode())
            .unknown(&self.unknown_odd_types)
            .finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut mssmt_proof: Option<MssmtProof> = None;
        let mut version: Option<AssetVersion> = None;
        let mut tap_key: Option<[u8; 32]> = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                ASSET_PROOF_MSSMT_PROOF_TYPE => {
                    mssmt_proof = Some(MssmtProof::from_bytes(record.value())?);
                }
                ASSET_PROOF_VERSION_TYPE => {
                    version = Some(AssetVersion::from_u8(record.u8()?)?);
                }
                ASSET_PROOF_TAP_KEY_TYPE => tap_key = Some(record.fixed()?),
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }
        Ok(AssetProof {
            proof: mssmt_proof.ok_or(Error::MissingTlvField("AssetProof.proof".to_string()))?,
            version: version.ok_or(Error::MissingTlvField("AssetProof.version".to_string()))?,
            tap_key: tap_key.ok_or(Error::MissingTlvField("AssetProof.tap_key".to_string()))?,
            unknown_odd_types,
        })
    }
}

/// Proof used along with an asset commitment leaf to arrive at the root of the TapCommitment MS-SMT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootAssetProof {
    /// The underlying MS-SMT proof.
    pub proof: MssmtProof,
    /// Version of the TapCommitment used to create the proof.
    pub version: TapCommitmentVersion,
    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

impl TaprootAssetProof {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .record(
                TAPROOT_ASSET_PROOF_VERSION_TYPE,
                alloc::vec![self.version as u8],
            )
            .record(TAPROOT_ASSET_PROOF_MSSMT_PROOF_TYPE, self.proof.encode())
            .unknown(&self.unknown_odd_types)
            .finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut mssmt_proof: Option<MssmtProof> = None;
        let mut version: Option<TapCommitmentVersion> = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                TAPROOT_ASSET_PROOF_MSSMT_PROOF_TYPE => {
                    mssmt_proof = Some(MssmtProof::from_bytes(record.value())?);
                }
                TAPROOT_ASSET_PROOF_VERSION_TYPE => {
                    version = Some(TapCommitmentVersion::from_u8(record.u8()?)?);
                }
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }
        Ok(TaprootAssetProof {
            proof: mssmt_proof.ok_or(Error::MissingTlvField(
                "TaprootAssetProof.proof".to_string(),
            ))?,
            version: version.ok_or(Error::MissingTlvField(
                "TaprootAssetProof.version".to_string(),
            ))?,
            unknown_odd_types,
        })
    }
}

/// Represents a full commitment proof for a particular `Asset`. It proves
/// that an asset does or does not exist within a Taproot Asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Proof used along with the asset to arrive at the root of the AssetCommitment MS-SMT.
    /// NOTE: This proof must be None if the asset commitment for this
    /// particular asset is not found within the Taproot Asset commitment.
    pub asset_proof: Option<AssetProof>,
    /// Proof used along with the asset commitment to arrive at the root of the TapCommitment
    /// MS-SMT.
    pub taproot_asset_proof: TaprootAssetProof,
}

impl Proof {
    /// Adds the records of this proof to an enclosing stream.
    pub(crate) fn write_records(&self, writer: &mut Writer) {
        if let Some(asset_proof) = self.asset_proof.as_ref() {
            writer.record(PROOF_ASSET_PROOF_TYPE, asset_proof.encode());
        }
        writer.record(
            PROOF_TAPROOT_ASSET_PROOF_TYPE,
            self.taproot_asset_proof.encode(),
        );
    }
}

// --- TLV Type Constants for commitment structures ---

// For commitment::Proof
pub(crate) const PROOF_ASSET_PROOF_TYPE: Type = Type(0);
pub(crate) const PROOF_TAPROOT_ASSET_PROOF_TYPE: Type = Type(2);

// For commitment::AssetProof
const ASSET_PROOF_VERSION_TYPE: Type = Type(0);
const ASSET_PROOF_TAP_KEY_TYPE: Type = Type(2);
const ASSET_PROOF_MSSMT_PROOF_TYPE: Type = Type(4);

// For commitment::TaprootAssetProof
const TAPROOT_ASSET_PROOF_VERSION_TYPE: Type = Type(0);
const TAPROOT_ASSET_PROOF_MSSMT_PROOF_TYPE: Type = Type(2);
