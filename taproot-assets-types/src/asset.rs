use crate::error::Error;
use crate::mssmt::{MssmtNode, MssmtProof};
use crate::tlv::{
    self, read_array, read_bigsize, read_var_bytes, write_bigsize, write_var_bytes, Stream, Type,
    UnknownOddTypes, Writer,
};
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::io::Read;
use bitcoin::{OutPoint, Txid, Witness};
use core::convert::TryFrom;
use core::fmt;

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type AssetID = Sha256Hash;

/// Length in bytes of a compressed public key.
pub const COMPRESSED_KEY_LEN: usize = 33;

/// NUMS point used as the script key of tombstones and as the base of burn
/// keys. Nobody knows its discrete log.
pub const NUMS_KEY: SerializedKey = SerializedKey([
    0x02, 0x7c, 0x79, 0xb9, 0xb2, 0x6e, 0x46, 0x38, 0x95, 0xee, 0xf5, 0x67, 0x9d, 0x85, 0x58, 0x94,
    0x2c, 0x86, 0xc4, 0xad, 0x22, 0x33, 0xad, 0xef, 0x01, 0xbc, 0x3e, 0x6d, 0x54, 0x0b, 0x36, 0x53,
    0xfe,
]);

/// Nested assets (root assets of split commitments) deeper than this are
/// rejected while decoding.
const MAX_ASSET_NESTING: u32 = 4;

/// A compressed public key kept as raw bytes. Parsing into a curve point
/// happens where the key is used for arithmetic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerializedKey(pub [u8; COMPRESSED_KEY_LEN]);

impl SerializedKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let array: [u8; COMPRESSED_KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::BitcoinSerialization(format!(
                "compressed key must be {} bytes, got {}",
                COMPRESSED_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(SerializedKey(array))
    }

    pub fn from_public_key(key: &bitcoin::PublicKey) -> Self {
        SerializedKey(key.inner.serialize())
    }

    pub fn to_public_key(&self) -> Result<bitcoin::PublicKey, Error> {
        bitcoin::PublicKey::from_slice(&self.0)
            .map_err(|e| Error::BitcoinSerialization(format!("invalid public key: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8; COMPRESSED_KEY_LEN] {
        &self.0
    }

    /// The BIP-340 (x-only) serialization of the key.
    pub fn x_only(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.0[1..]);
        bytes
    }
}

impl fmt::Debug for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedKey(")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl Serialize for SerializedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SerializedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        SerializedKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
/// The version of the Taproot Asset.
pub enum AssetVersion {
    /// V0 is the default asset version. This version will include
    /// the witness vector in the leaf for a tap commitment.
    #[default]
    V0 = 0,
    /// V1 is the asset version that leaves out the witness vector
    /// from the MS-SMT leaf encoding.
    V1 = 1,
}

impl AssetVersion {
    pub(crate) fn from_u8(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(AssetVersion::V0),
            1 => Ok(AssetVersion::V1),
            _ => Err(Error::InvalidTlvValue(
                0,
                format!("Unknown AssetVersion: {}", val),
            )),
        }
    }
}

impl TryFrom<i32> for AssetVersion {
    type Error = String;

    fn try_from(value: i32) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(AssetVersion::V0),
            1 => Ok(AssetVersion::V1),
            _ => Err(format!("Invalid AssetVersion value: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// The type of the asset.
pub enum AssetType {
    ///
    /// Indicates that an asset is capable of being split/merged, with each of the
    /// units being fungible, even across a key asset ID boundary (assuming the
    /// key group is the same).
    Normal,
    ///
    /// Indicates that an asset is a collectible, meaning that each of the other
    /// items under the same key group are not fully fungible with each other.
    /// Collectibles also cannot be split or merged.
    Collectible,
}

impl AssetType {
    pub fn as_u8(self) -> u8 {
        match self {
            AssetType::Normal => 0,
            AssetType::Collectible => 1,
        }
    }

    pub(crate) fn from_u8(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(AssetType::Normal),
            1 => Ok(AssetType::Collectible),
            _ => Err(Error::InvalidTlvValue(
                ASSET_LEAF_TYPE.0,
                format!("Unknown asset type: {}", val),
            )),
        }
    }
}

impl TryFrom<i32> for AssetType {
    type Error = String;

    fn try_from(value: i32) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(AssetType::Normal),
            1 => Ok(AssetType::Collectible),
            _ => Err(format!("Invalid AssetType value: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Immutable issuance record of an asset. The asset ID is derived from it.
pub struct Genesis {
    /// The first outpoint spent by the minting transaction.
    pub first_prev_out: OutPoint,
    /// The name of the asset.
    pub tag: String,
    /// The hash of the meta data for this genesis asset.
    pub meta_hash: Sha256Hash,
    ///
    /// The index of the output that carries the unique Taproot Asset commitment in
    /// the genesis transaction.
    pub output_index: u32,
    /// The type of the asset.
    pub asset_type: AssetType,
}

impl Genesis {
    /// `sha256(first_prev_out || sha256(tag) || meta_hash || output_index || type)`.
    pub fn id(&self) -> AssetID {
        let mut engine = Sha256Hash::engine();
        engine.input(&serialize(&self.first_prev_out));
        engine.input(Sha256Hash::hash(self.tag.as_bytes()).as_byte_array());
        engine.input(self.meta_hash.as_byte_array());
        engine.input(&self.output_index.to_be_bytes());
        engine.input(&[self.asset_type.as_u8()]);
        Sha256Hash::from_engine(engine)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_outpoint(&self.first_prev_out, &mut out);
        write_var_bytes(self.tag.as_bytes(), &mut out);
        out.extend_from_slice(self.meta_hash.as_byte_array());
        out.extend_from_slice(&self.output_index.to_be_bytes());
        out.push(self.asset_type.as_u8());
        out
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let first_prev_out = decode_outpoint(r)?;
        let tag = String::from_utf8(read_var_bytes(r, tlv::MAX_RECORD_SIZE)?)
            .map_err(|_| Error::InvalidTlvValue(ASSET_LEAF_GENESIS.0, "tag is not UTF-8".to_string()))?;
        let meta_hash = Sha256Hash::from_byte_array(read_array(r)?);
        let output_index = u32::from_be_bytes(read_array(r)?);
        let [type_byte] = read_array::<1, _>(r)?;
        Ok(Genesis {
            first_prev_out,
            tag,
            meta_hash,
            output_index,
            asset_type: AssetType::from_u8(type_byte)?,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = bytes;
        let genesis = Self::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::TrailingBytes("genesis"));
        }
        Ok(genesis)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// The tweaked group key an asset was issued under.
pub struct GroupKey {
    pub group_pub_key: SerializedKey,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifies the previous asset output consumed by a witness.
pub struct PrevId {
    /// Anchor outpoint of the spent asset.
    pub out_point: OutPoint,
    /// The ID of the asset that was spent.
    pub asset_id: AssetID,
    /// The script key of the asset that was spent.
    pub script_key: SerializedKey,
}

impl PrevId {
    /// The all-zero reference carried by genesis witnesses.
    pub fn zero() -> Self {
        PrevId {
            out_point: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0,
            },
            asset_id: AssetID::all_zeros(),
            script_key: SerializedKey([0u8; COMPRESSED_KEY_LEN]),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == PrevId::zero()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36 + 32 + COMPRESSED_KEY_LEN);
        encode_outpoint(&self.out_point, &mut out);
        out.extend_from_slice(self.asset_id.as_byte_array());
        out.extend_from_slice(&self.script_key.0);
        out
    }

    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        Ok(PrevId {
            out_point: decode_outpoint(r)?,
            asset_id: AssetID::from_byte_array(read_array(r)?),
            script_key: SerializedKey(read_array(r)?),
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Represents a commitment to a split of an asset.
pub struct SplitCommitment {
    /// Proof of this split output within the root asset's split tree.
    pub proof: MssmtProof,
    /// The root asset of the split commitment.
    pub root_asset: Box<Asset>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Represents a previous witness.
pub struct PrevWitness {
    /// Previous input asset ID.
    pub prev_id: Option<PrevId>,
    /// Transaction witness.
    pub tx_witness: Witness,
    /// Split commitment.
    pub split_commitment: Option<SplitCommitment>,
}

impl PrevWitness {
    /// The witness every genesis asset carries.
    pub fn genesis() -> Self {
        PrevWitness {
            prev_id: Some(PrevId::zero()),
            tx_witness: Witness::new(),
            split_commitment: None,
        }
    }

    pub fn is_split_commit_witness(&self) -> bool {
        self.prev_id.is_some() && self.tx_witness.is_empty() && self.split_commitment.is_some()
    }

    fn encode(&self, include_tx_witness: bool) -> Vec<u8> {
        let mut writer = Writer::new();
        if let Some(prev_id) = self.prev_id.as_ref() {
            writer.record(WITNESS_PREV_ID, prev_id.encode());
        }
        if include_tx_witness && !self.tx_witness.is_empty() {
            writer.record(WITNESS_TX_WITNESS, encode_tx_witness(&self.tx_witness));
        }
        if let Some(split_commitment) = self.split_commitment.as_ref() {
            let mut value = Vec::new();
            write_var_bytes(&split_commitment.proof.encode(), &mut value);
            write_var_bytes(&split_commitment.root_asset.encode(), &mut value);
            writer.record(WITNESS_SPLIT_COMMITMENT, value);
        }
        writer.finish()
    }

    fn decode(bytes: &[u8], depth: u32) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut prev_id = None;
        let mut tx_witness = Witness::new();
        let mut split_commitment = None;

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                WITNESS_PREV_ID => {
                    let mut reader = record.value();
                    prev_id = Some(PrevId::decode(&mut reader)?);
                    if !reader.is_empty() {
                        return Err(Error::TrailingBytes("prev id"));
                    }
                }
                WITNESS_TX_WITNESS => {
                    tx_witness = decode_tx_witness(record.value())?;
                }
                WITNESS_SPLIT_COMMITMENT => {
                    let mut reader = record.value();
                    let proof_bytes = read_var_bytes(&mut reader, tlv::MAX_RECORD_SIZE)?;
                    let asset_bytes = read_var_bytes(&mut reader, tlv::MAX_RECORD_SIZE)?;
                    split_commitment = Some(SplitCommitment {
                        proof: MssmtProof::from_bytes(&proof_bytes)?,
                        root_asset: Box::new(Asset::decode_nested(&asset_bytes, depth + 1)?),
                    });
                }
                // Witnesses carry no extension records.
                type_val => return Err(Error::UnknownTlvType(type_val.0)),
            }
        }

        Ok(PrevWitness {
            prev_id,
            tx_witness,
            split_commitment,
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Represents a Taproot Asset.
pub struct Asset {
    /// The version of the Taproot Asset.
    pub version: AssetVersion,
    /// The base genesis information of an asset. This information never changes.
    pub genesis: Genesis,
    /// The total amount of the asset stored in this Taproot Asset UTXO.
    pub amount: u64,
    /// An optional locktime, as with Bitcoin transactions.
    pub lock_time: u64,
    /// An optional relative lock time, same as Bitcoin transactions.
    pub relative_lock_time: u64,
    /// Previous witnesses for the asset.
    pub prev_witnesses: Vec<PrevWitness>,
    /// Root of the split tree if this asset is the root of a split.
    pub split_commitment_root: Option<MssmtNode>,
    /// The version of the script, only version 0 is defined at present.
    pub script_version: u16,
    /// The script key of the asset, which can be spent under Taproot semantics.
    pub script_key: SerializedKey,
    /// The group key of the asset (if it exists).
    pub group_key: Option<GroupKey>,
    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

// TLV Types for Asset (based on Go's asset/records.go)
const ASSET_LEAF_VERSION: Type = Type(0);
const ASSET_LEAF_GENESIS: Type = Type(2);
const ASSET_LEAF_TYPE: Type = Type(4);
const ASSET_LEAF_AMOUNT: Type = Type(6);
const ASSET_LEAF_LOCK_TIME: Type = Type(7);
const ASSET_LEAF_RELATIVE_LOCK_TIME: Type = Type(9);
const ASSET_LEAF_PREV_WITNESS: Type = Type(11);
const ASSET_LEAF_SPLIT_COMMITMENT_ROOT: Type = Type(13);
const ASSET_LEAF_SCRIPT_VERSION: Type = Type(14);
const ASSET_LEAF_SCRIPT_KEY: Type = Type(16);
const ASSET_LEAF_GROUP_KEY: Type = Type(17);

const WITNESS_PREV_ID: Type = Type(1);
const WITNESS_TX_WITNESS: Type = Type(3);
const WITNESS_SPLIT_COMMITMENT: Type = Type(5);

impl Asset {
    pub fn id(&self) -> AssetID {
        self.genesis.id()
    }

    /// Key of this asset inside its asset commitment tree.
    pub fn commitment_key(&self) -> [u8; 32] {
        let script_key = self.script_key.x_only();
        match self.group_key {
            None => Sha256Hash::hash(&script_key).to_byte_array(),
            Some(_) => {
                let mut engine = Sha256Hash::engine();
                engine.input(self.id().as_byte_array());
                engine.input(&script_key);
                Sha256Hash::from_engine(engine).to_byte_array()
            }
        }
    }

    /// Key of this asset's asset commitment inside the tap commitment tree.
    pub fn tap_commitment_key(&self) -> [u8; 32] {
        match self.group_key {
            Some(group) => Sha256Hash::hash(&group.group_pub_key.x_only()).to_byte_array(),
            None => self.id().to_byte_array(),
        }
    }

    /// Returns true if the asset represents a genesis asset.
    pub fn is_genesis_asset(&self) -> bool {
        self.has_genesis_witness() || self.has_genesis_witness_for_group()
    }

    /// Returns true if the asset has a plain genesis witness.
    pub fn has_genesis_witness(&self) -> bool {
        match self.prev_witnesses.as_slice() {
            [witness] => {
                witness.tx_witness.is_empty()
                    && witness.split_commitment.is_none()
                    && witness.prev_id.is_some_and(|id| id.is_zero())
            }
            _ => false,
        }
    }

    /// Returns true if the asset has a genesis witness for an asset group.
    pub fn has_genesis_witness_for_group(&self) -> bool {
        if self.group_key.is_none() {
            return false;
        }
        match self.prev_witnesses.as_slice() {
            [witness] => {
                !witness.tx_witness.is_empty()
                    && witness.split_commitment.is_none()
                    && witness.prev_id.is_some_and(|id| id.is_zero())
            }
            _ => false,
        }
    }

    /// Returns true if the asset has a split commitment witness.
    pub fn has_split_commitment_witness(&self) -> bool {
        matches!(self.prev_witnesses.as_slice(), [witness] if witness.is_split_commit_witness())
    }

    /// Returns true if the asset represents a transfer root.
    pub fn is_transfer_root(&self) -> bool {
        !self.is_genesis_asset() && !self.has_split_commitment_witness()
    }

    /// Zero-value leftover of a fully spent split root.
    pub fn is_tombstone(&self) -> bool {
        self.amount == 0 && self.script_key == NUMS_KEY
    }

    /// Returns the root asset of a split commitment witness.
    pub fn split_root_asset(&self) -> Option<&Asset> {
        match self.prev_witnesses.as_slice() {
            [witness] => witness
                .split_commitment
                .as_ref()
                .map(|commitment| commitment.root_asset.as_ref()),
            _ => None,
        }
    }

    /// Returns a copy of the asset without any split commitment witness.
    pub fn without_split_commitment(&self) -> Asset {
        let mut asset = self.clone();
        if asset.has_split_commitment_witness() {
            asset.prev_witnesses[0].split_commitment = None;
        }
        asset
    }

    /// Bytes committed in the asset's MS-SMT leaf.
    pub fn leaf_encoding(&self) -> Vec<u8> {
        self.encode_tlv(self.version == AssetVersion::V0)
    }

    pub fn leaf(&self) -> MssmtNode {
        MssmtNode::leaf(&self.leaf_encoding(), self.amount)
    }

    /// Full TLV encoding with all witness data.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_tlv(true)
    }

    pub fn encode_tlv(&self, include_tx_witness: bool) -> Vec<u8> {
        let mut writer = Writer::new();
        writer
            .record(ASSET_LEAF_VERSION, alloc::vec![self.version as u8])
            .record(ASSET_LEAF_GENESIS, self.genesis.encode())
            .record(ASSET_LEAF_TYPE, alloc::vec![self.genesis.asset_type.as_u8()])
            .record(ASSET_LEAF_AMOUNT, tlv::bigsize_bytes(self.amount));
        if self.lock_time > 0 {
            writer.record(ASSET_LEAF_LOCK_TIME, tlv::bigsize_bytes(self.lock_time));
        }
        if self.relative_lock_time > 0 {
            writer.record(
                ASSET_LEAF_RELATIVE_LOCK_TIME,
                tlv::bigsize_bytes(self.relative_lock_time),
            );
        }
        if !self.prev_witnesses.is_empty() {
            let mut value = Vec::new();
            write_bigsize(self.prev_witnesses.len() as u64, &mut value);
            for witness in &self.prev_witnesses {
                write_var_bytes(&witness.encode(include_tx_witness), &mut value);
            }
            writer.record(ASSET_LEAF_PREV_WITNESS, value);
        }
        if let Some(root) = self.split_commitment_root.as_ref() {
            let mut value = Vec::with_capacity(40);
            value.extend_from_slice(root.hash.as_byte_array());
            value.extend_from_slice(&root.sum.to_be_bytes());
            writer.record(ASSET_LEAF_SPLIT_COMMITMENT_ROOT, value);
        }
        writer
            .record(
                ASSET_LEAF_SCRIPT_VERSION,
                self.script_version.to_be_bytes().to_vec(),
            )
            .record(ASSET_LEAF_SCRIPT_KEY, self.script_key.0.to_vec());
        if let Some(group) = self.group_key.as_ref() {
            writer.record(ASSET_LEAF_GROUP_KEY, group.group_pub_key.0.to_vec());
        }
        writer.unknown(&self.unknown_odd_types).finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_nested(bytes, 0)
    }

    /// Decodes an Asset from a TLV stream.
    pub fn decode_tlv<R: Read>(mut r: R) -> Result<Self, Error> {
        let bytes = tlv::read_to_end(&mut r)?;
        Self::decode_nested(&bytes, 0)
    }

    fn decode_nested(bytes: &[u8], depth: u32) -> Result<Self, Error> {
        if depth > MAX_ASSET_NESTING {
            return Err(Error::MaxNestingDepthExceeded(MAX_ASSET_NESTING));
        }

        let mut stream = Stream::new(bytes);
        let mut version: Option<AssetVersion> = None;
        let mut genesis: Option<Genesis> = None;
        let mut asset_type: Option<AssetType> = None;
        let mut amount: Option<u64> = None;
        let mut lock_time = 0;
        let mut relative_lock_time = 0;
        let mut prev_witnesses = Vec::new();
        let mut split_commitment_root = None;
        let mut script_version: Option<u16> = None;
        let mut script_key: Option<SerializedKey> = None;
        let mut group_key = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                ASSET_LEAF_VERSION => {
                    version = Some(AssetVersion::from_u8(record.u8()?)?);
                }
                ASSET_LEAF_GENESIS => {
                    genesis = Some(Genesis::from_bytes(record.value())?);
                }
                ASSET_LEAF_TYPE => {
                    asset_type = Some(AssetType::from_u8(record.u8()?)?);
                }
                ASSET_LEAF_AMOUNT => amount = Some(record.bigsize()?),
                ASSET_LEAF_LOCK_TIME => lock_time = record.bigsize()?,
                ASSET_LEAF_RELATIVE_LOCK_TIME => relative_lock_time = record.bigsize()?,
                ASSET_LEAF_PREV_WITNESS => {
                    let mut reader = record.value();
                    let count = read_bigsize(&mut reader)?;
                    for _ in 0..count {
                        let witness_bytes = read_var_bytes(&mut reader, tlv::MAX_RECORD_SIZE)?;
                        prev_witnesses.push(PrevWitness::decode(&witness_bytes, depth)?);
                    }
                    if !reader.is_empty() {
                        return Err(Error::TrailingBytes("prev witnesses"));
                    }
                }
                ASSET_LEAF_SPLIT_COMMITMENT_ROOT => {
                    let value: [u8; 40] = record.fixed()?;
                    let mut hash = [0u8; 32];
                    hash.copy_from_slice(&value[..32]);
                    let mut sum = [0u8; 8];
                    sum.copy_from_slice(&value[32..]);
                    split_commitment_root = Some(MssmtNode {
                        hash: Sha256Hash::from_byte_array(hash),
                        sum: u64::from_be_bytes(sum),
                    });
                }
                ASSET_LEAF_SCRIPT_VERSION => script_version = Some(record.u16_be()?),
                ASSET_LEAF_SCRIPT_KEY => {
                    script_key = Some(SerializedKey(record.fixed()?));
                }
                ASSET_LEAF_GROUP_KEY => {
                    group_key = Some(GroupKey {
                        group_pub_key: SerializedKey(record.fixed()?),
                    });
                }
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }

        let genesis = genesis.ok_or(Error::MissingTlvField("Asset.genesis".to_string()))?;
        let asset_type = asset_type.ok_or(Error::MissingTlvField("Asset.type".to_string()))?;
        if asset_type != genesis.asset_type {
            return Err(Error::InvalidTlvValue(
                ASSET_LEAF_TYPE.0,
                "asset type does not match genesis".to_string(),
            ));
        }

        Ok(Asset {
            version: version.ok_or(Error::MissingTlvField("Asset.version".to_string()))?,
            genesis,
            amount: amount.ok_or(Error::MissingTlvField("Asset.amount".to_string()))?,
            lock_time,
            relative_lock_time,
            prev_witnesses,
            split_commitment_root,
            script_version: script_version
                .ok_or(Error::MissingTlvField("Asset.script_version".to_string()))?,
            script_key: script_key.ok_or(Error::MissingTlvField("Asset.script_key".to_string()))?,
            group_key,
            unknown_odd_types,
        })
    }
}

/// Encodes a Bitcoin outpoint as `txid || vout (big endian)`.
pub fn encode_outpoint(out_point: &OutPoint, out: &mut Vec<u8>) {
    out.extend_from_slice(out_point.txid.as_byte_array());
    out.extend_from_slice(&out_point.vout.to_be_bytes());
}

pub fn decode_outpoint<R: Read + ?Sized>(r: &mut R) -> Result<OutPoint, Error> {
    let txid = Txid::from_byte_array(read_array(r)?);
    let vout = u32::from_be_bytes(read_array(r)?);
    Ok(OutPoint { txid, vout })
}

/// Encodes a transaction witness as a BigSize count of var-bytes items.
pub fn encode_tx_witness(witness: &Witness) -> Vec<u8> {
    let mut out = Vec::new();
    write_bigsize(witness.len() as u64, &mut out);
    for item in witness.iter() {
        write_var_bytes(item, &mut out);
    }
    out
}

pub fn decode_tx_witness(bytes: &[u8]) -> Result<Witness, Error> {
    let mut reader = bytes;
    let count = read_bigsize(&mut reader)?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(read_var_bytes(&mut reader, tlv::MAX_RECORD_SIZE)?);
    }
    if !reader.is_empty() {
        return Err(Error::TrailingBytes("tx witness"));
    }
    Ok(Witness::from_slice(&items))
}
