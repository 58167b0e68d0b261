//! A single issuance or transfer proof and its sub-proofs.

use alloc::vec::Vec;
use bitcoin::block::Header;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::{sha256d::Hash as Sha256dHash, Hash};
use bitcoin::{OutPoint, Transaction, Txid, Witness};
pub use bitcoin::TxMerkleNode;
use serde::{Deserialize, Serialize};

use crate::alloc::string::ToString;
use alloc::format;

use crate::asset::{
    decode_outpoint, decode_tx_witness, encode_outpoint, encode_tx_witness, Asset, Genesis,
    SerializedKey,
};
use crate::commitment::{
    self, AssetProof, TaprootAssetProof, TapscriptPreimage, PROOF_ASSET_PROOF_TYPE,
    PROOF_TAPROOT_ASSET_PROOF_TYPE,
};
use crate::error::Error;
use crate::file::File;
use crate::meta::MetaReveal;
use crate::tlv::{
    self, read_array, read_bigsize, read_var_bytes, write_bigsize, write_var_bytes, Stream, Type,
    UnknownOddTypes, Writer,
};

/// Represents a raw proof file, typically a byte vector.
pub type RawProofFile = Vec<u8>;

/// Largest number of sibling hashes accepted in a transaction merkle proof.
pub const MERKLE_PROOF_MAX_NODES: u64 = 512;

/// Represents a full commitment proof for an asset. It can either prove inclusion or exclusion of
/// an asset within a Taproot Asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentProof {
    /// The underlying Merkle proof structure from the commitment module.
    pub proof: commitment::Proof,

    /// TapSiblingPreimage is an optional preimage of a tap node used to
    /// hash together with the Taproot Asset commitment leaf node to arrive
    /// at the tapscript root of the expected output.
    pub tap_sibling_preimage: Option<TapscriptPreimage>,

    /// UnknownOddTypes is a map of unknown odd types that were encountered
    /// during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

const COMMITMENT_PROOF_TAP_SIBLING_PREIMAGE_TYPE: Type = Type(5);

impl CommitmentProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.proof.write_records(&mut writer);
        if let Some(preimage) = self.tap_sibling_preimage.as_ref() {
            writer.record(COMMITMENT_PROOF_TAP_SIBLING_PREIMAGE_TYPE, preimage.encode());
        }
        writer.unknown(&self.unknown_odd_types).finish()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut asset_proof: Option<AssetProof> = None;
        let mut taproot_asset_proof: Option<TaprootAssetProof> = None;
        let mut tap_sibling_preimage: Option<TapscriptPreimage> = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                PROOF_ASSET_PROOF_TYPE => {
                    asset_proof = Some(AssetProof::from_bytes(record.value())?);
                }
                PROOF_TAPROOT_ASSET_PROOF_TYPE => {
                    taproot_asset_proof = Some(TaprootAssetProof::from_bytes(record.value())?);
                }
                COMMITMENT_PROOF_TAP_SIBLING_PREIMAGE_TYPE => {
                    tap_sibling_preimage = Some(TapscriptPreimage::from_bytes(record.value())?);
                }
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }

        Ok(CommitmentProof {
            proof: commitment::Proof {
                asset_proof,
                taproot_asset_proof: taproot_asset_proof.ok_or(Error::MissingTlvField(
                    "CommitmentProof.proof.taproot_asset_proof".to_string(),
                ))?,
            },
            tap_sibling_preimage,
            unknown_odd_types,
        })
    }
}

/// TapscriptProof represents a proof of a Taproot output not including a
/// Taproot Asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapscriptProof {
    /// TapPreimage1 is the preimage for a TapNode at depth 0 or 1.
    pub tap_preimage1: Option<TapscriptPreimage>,

    /// TapPreimage2, if specified, is the pair preimage for TapPreimage1 at
    /// depth 1.
    pub tap_preimage2: Option<TapscriptPreimage>,

    /// Bip86 indicates this is a normal BIP-0086 wallet output.
    pub bip86: bool,

    /// UnknownOddTypes is a map of unknown odd types encountered during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

const TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE: Type = Type(1);
const TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE: Type = Type(3);
const TAPSCRIPT_PROOF_BIP86_TYPE: Type = Type(4);

impl TapscriptProof {
    pub fn bip86() -> Self {
        TapscriptProof {
            tap_preimage1: None,
            tap_preimage2: None,
            bip86: true,
            unknown_odd_types: UnknownOddTypes::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        if let Some(preimage) = self.tap_preimage1.as_ref() {
            writer.record(TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE, preimage.encode());
        }
        if let Some(preimage) = self.tap_preimage2.as_ref() {
            writer.record(TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE, preimage.encode());
        }
        writer
            .record(TAPSCRIPT_PROOF_BIP86_TYPE, alloc::vec![self.bip86 as u8])
            .unknown(&self.unknown_odd_types)
            .finish()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut tap_preimage1: Option<TapscriptPreimage> = None;
        let mut tap_preimage2: Option<TapscriptPreimage> = None;
        let mut bip86: Option<bool> = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE => {
                    tap_preimage1 = Some(TapscriptPreimage::from_bytes(record.value())?);
                }
                TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE => {
                    tap_preimage2 = Some(TapscriptPreimage::from_bytes(record.value())?);
                }
                TAPSCRIPT_PROOF_BIP86_TYPE => bip86 = Some(record.u8()? != 0),
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }

        Ok(TapscriptProof {
            tap_preimage1,
            tap_preimage2,
            bip86: bip86.ok_or(Error::MissingTlvField("TapscriptProof.bip86".to_string()))?,
            unknown_odd_types,
        })
    }
}

/// TaprootProof represents a proof that reveals the partial contents to a
/// tapscript tree within a taproot output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootProof {
    /// OutputIndex is the index of the output for which the proof applies.
    pub output_index: u32,

    /// InternalKey is the internal key of the taproot output at OutputIndex.
    pub internal_key: SerializedKey,

    /// CommitmentProof represents a commitment proof for an asset.
    pub commitment_proof: Option<CommitmentProof>,

    /// TapscriptProof represents a proof that a taproot output is not committing
    /// to a Taproot Asset commitment.
    pub tapscript_proof: Option<TapscriptProof>,

    /// UnknownOddTypes is a map of unknown odd types encountered during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

const TAPROOT_PROOF_OUTPUT_INDEX_TYPE: Type = Type(0);
const TAPROOT_PROOF_INTERNAL_KEY_TYPE: Type = Type(2);
const TAPROOT_PROOF_COMMITMENT_PROOF_TYPE: Type = Type(3);
const TAPROOT_PROOF_TAPSCRIPT_PROOF_TYPE: Type = Type(5);

impl TaprootProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer
            .record(
                TAPROOT_PROOF_OUTPUT_INDEX_TYPE,
                self.output_index.to_be_bytes().to_vec(),
            )
            .record(TAPROOT_PROOF_INTERNAL_KEY_TYPE, self.internal_key.0.to_vec());
        if let Some(proof) = self.commitment_proof.as_ref() {
            writer.record(TAPROOT_PROOF_COMMITMENT_PROOF_TYPE, proof.encode());
        }
        if let Some(proof) = self.tapscript_proof.as_ref() {
            writer.record(TAPROOT_PROOF_TAPSCRIPT_PROOF_TYPE, proof.encode());
        }
        writer.unknown(&self.unknown_odd_types).finish()
    }

    /// Decodes a TaprootProof from a TLV byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);

        let mut output_index: Option<u32> = None;
        let mut internal_key: Option<SerializedKey> = None;
        let mut commitment_proof: Option<CommitmentProof> = None;
        let mut tapscript_proof: Option<TapscriptProof> = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                TAPROOT_PROOF_OUTPUT_INDEX_TYPE => output_index = Some(record.u32_be()?),
                TAPROOT_PROOF_INTERNAL_KEY_TYPE => {
                    internal_key = Some(SerializedKey(record.fixed()?));
                }
                TAPROOT_PROOF_COMMITMENT_PROOF_TYPE => {
                    commitment_proof = Some(CommitmentProof::from_bytes(record.value())?);
                }
                TAPROOT_PROOF_TAPSCRIPT_PROOF_TYPE => {
                    tapscript_proof = Some(TapscriptProof::from_bytes(record.value())?);
                }
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }

        Ok(TaprootProof {
            output_index: output_index.ok_or(Error::MissingTlvField(
                "TaprootProof.output_index".to_string(),
            ))?,
            internal_key: internal_key.ok_or(Error::MissingTlvField(
                "TaprootProof.internal_key".to_string(),
            ))?,
            commitment_proof,
            tapscript_proof,
            unknown_odd_types,
        })
    }
}

/// A Merkle proof that a transaction is included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMerkleProof {
    /// The list of sibling hashes along the Merkle path from the transaction
    /// up to the root.
    pub nodes: Vec<TxMerkleNode>,

    /// Direction bits: `true` means the sibling is on the right.
    /// The bits correspond to entries in `nodes`.
    pub bits: Vec<bool>,
}

impl TxMerkleProof {
    /// Builds the proof for `txids[index]` in a block with the given
    /// transactions, duplicating the last node of odd sized levels.
    pub fn new(txids: &[Txid], index: usize) -> Result<Self, Error> {
        if index >= txids.len() {
            return Err(Error::ProofIndexOutOfRange {
                index,
                num_proofs: txids.len(),
            });
        }

        let mut level: Vec<[u8; 32]> = txids.iter().map(|txid| txid.to_byte_array()).collect();
        let mut position = index;
        let mut nodes = Vec::new();
        let mut bits = Vec::new();
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = level[level.len() - 1];
                level.push(last);
            }
            nodes.push(TxMerkleNode::from_byte_array(level[position ^ 1]));
            bits.push(position % 2 == 0);

            level = level
                .chunks(2)
                .map(|pair| {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(&pair[0]);
                    buf[32..].copy_from_slice(&pair[1]);
                    Sha256dHash::hash(&buf).to_byte_array()
                })
                .collect();
            position /= 2;
        }

        Ok(TxMerkleProof { nodes, bits })
    }

    /// The format consists of:
    /// 1. A BigSize for the number of nodes.
    /// 2. The nodes themselves (32 bytes each).
    /// 3. A BigSize for the length of the packed bits byte slice.
    /// 4. The packed bits byte slice.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.nodes.len() * 32 + 8);
        write_bigsize(self.nodes.len() as u64, &mut out);
        for node in &self.nodes {
            out.extend_from_slice(node.as_byte_array());
        }
        write_var_bytes(&tlv::pack_bits(&self.bits), &mut out);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut r = bytes;
        let num_nodes = read_bigsize(&mut r)?;
        if num_nodes > MERKLE_PROOF_MAX_NODES {
            return Err(Error::TlvStream(format!(
                "Merkle proof has too many nodes: {}",
                num_nodes
            )));
        }

        let mut nodes = Vec::with_capacity(num_nodes as usize);
        for _ in 0..num_nodes {
            nodes.push(TxMerkleNode::from_byte_array(read_array(&mut r)?));
        }

        // (bits + 8 - 1) / 8 rounds up to the nearest byte.
        let max_packed_bits_len = num_nodes.div_ceil(8);
        let packed_bits = read_var_bytes(&mut r, max_packed_bits_len)?;
        if !r.is_empty() {
            return Err(Error::TrailingBytes("tx merkle proof"));
        }

        let bits = tlv::unpack_bits(&packed_bits)
            .into_iter()
            .take(num_nodes as usize)
            .collect::<Vec<_>>();
        if bits.len() != nodes.len() {
            return Err(Error::InvalidTlvValue(
                PROOF_TX_MERKLE_PROOF_TYPE.0,
                "merkle proof bits do not cover all nodes".to_string(),
            ));
        }

        Ok(TxMerkleProof { nodes, bits })
    }
}

/// Information needed to re-derive a V0 tweaked group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKeyReveal {
    /// Untweaked key of the group.
    pub raw_group_key: SerializedKey,
    /// Optional tapscript root committed to by the group key.
    pub tapscript_root: Option<[u8; 32]>,
}

impl GroupKeyReveal {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.raw_group_key.0.to_vec();
        if let Some(root) = self.tapscript_root {
            out.extend_from_slice(&root);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes.len() {
            33 => Ok(GroupKeyReveal {
                raw_group_key: SerializedKey::from_slice(bytes)?,
                tapscript_root: None,
            }),
            65 => {
                let mut root = [0u8; 32];
                root.copy_from_slice(&bytes[33..]);
                Ok(GroupKeyReveal {
                    raw_group_key: SerializedKey::from_slice(&bytes[..33])?,
                    tapscript_root: Some(root),
                })
            }
            len => Err(Error::InvalidTlvValue(
                PROOF_GROUP_KEY_REVEAL_TYPE.0,
                format!("group key reveal has invalid length {}", len),
            )),
        }
    }
}

/// One state transition of an asset: the resulting asset, the anchor
/// transaction it lives in and the evidence tying both together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Transition version.
    pub version: u32,

    /// The outpoint spent by the anchor transaction, used to chain proofs.
    pub prev_out: OutPoint,

    /// Header of the block containing the anchor transaction.
    pub block_header: Header,

    /// Height of the block containing the anchor transaction.
    pub block_height: u32,

    /// The transaction anchoring the resulting asset.
    pub anchor_tx: Transaction,

    /// The merkle proof for AnchorTx used to prove its inclusion within
    /// BlockHeader.
    pub tx_merkle_proof: TxMerkleProof,

    /// The asset referenced in the proof. This is the resulting asset after its
    /// state transition.
    pub asset: Asset,

    /// The TaprootProof proving the new inclusion of the resulting asset
    /// within AnchorTx.
    pub inclusion_proof: TaprootProof,

    /// The set of TaprootProofs proving the exclusion of the resulting asset
    /// from all other Taproot outputs within AnchorTx.
    pub exclusion_proofs: Vec<TaprootProof>,

    /// An optional TaprootProof needed if this asset is the result of a split.
    /// SplitRootProof proves inclusion of the root asset of the split.
    pub split_root_proof: Option<TaprootProof>,

    /// The reveal meta data associated with the proof, if available.
    /// This field is optional and can only be specified if the asset
    /// above is a genesis asset.
    pub meta_reveal: Option<MetaReveal>,

    /// Full proof files of every input spent by this transition beyond
    /// `prev_out`.
    pub additional_inputs: Vec<File>,

    /// ChallengeWitness is an optional virtual transaction witness that serves
    /// as an ownership proof for the asset.
    pub challenge_witness: Option<Witness>,

    /// GenesisReveal is an optional field that is the Genesis information for
    /// the asset. This is required for minting proofs and must be empty for
    /// non-minting proofs. This allows for derivation of the asset ID.
    pub genesis_reveal: Option<Genesis>,

    /// GroupKeyReveal is an optional field that includes the information needed
    /// to derive the tweaked group key.
    pub group_key_reveal: Option<GroupKeyReveal>,

    /// Non-asset leaves committed next to the asset.
    pub alt_leaves: Vec<Asset>,

    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: UnknownOddTypes,
}

const PROOF_VERSION_TYPE: Type = Type(0);
const PROOF_PREV_OUT_TYPE: Type = Type(2);
const PROOF_BLOCK_HEADER_TYPE: Type = Type(4);
const PROOF_ANCHOR_TX_TYPE: Type = Type(6);
const PROOF_TX_MERKLE_PROOF_TYPE: Type = Type(8);
const PROOF_ASSET_LEAF_TYPE: Type = Type(10);
const PROOF_INCLUSION_PROOF_TYPE: Type = Type(12);
const PROOF_EXCLUSION_PROOFS_TYPE: Type = Type(13);
const PROOF_SPLIT_ROOT_PROOF_TYPE: Type = Type(15);
const PROOF_META_REVEAL_TYPE: Type = Type(17);
const PROOF_ADDITIONAL_INPUTS_TYPE: Type = Type(19);
const PROOF_CHALLENGE_WITNESS_TYPE: Type = Type(21);
const PROOF_BLOCK_HEIGHT_TYPE: Type = Type(22);
const PROOF_GENESIS_REVEAL_TYPE: Type = Type(23);
const PROOF_GROUP_KEY_REVEAL_TYPE: Type = Type(25);
const PROOF_ALT_LEAVES_TYPE: Type = Type(27);

impl Proof {
    /// The outpoint holding the resulting asset.
    pub fn out_point(&self) -> OutPoint {
        OutPoint {
            txid: self.anchor_tx.compute_txid(),
            vout: self.inclusion_proof.output_index,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        let mut prev_out = Vec::with_capacity(36);
        encode_outpoint(&self.prev_out, &mut prev_out);
        writer
            .record(PROOF_VERSION_TYPE, self.version.to_be_bytes().to_vec())
            .record(PROOF_PREV_OUT_TYPE, prev_out)
            .record(PROOF_BLOCK_HEADER_TYPE, serialize(&self.block_header))
            .record(PROOF_ANCHOR_TX_TYPE, serialize(&self.anchor_tx))
            .record(PROOF_TX_MERKLE_PROOF_TYPE, self.tx_merkle_proof.encode())
            .record(PROOF_ASSET_LEAF_TYPE, self.asset.encode())
            .record(PROOF_INCLUSION_PROOF_TYPE, self.inclusion_proof.encode());
        if !self.exclusion_proofs.is_empty() {
            let encoded: Vec<Vec<u8>> = self.exclusion_proofs.iter().map(|p| p.encode()).collect();
            writer.record(PROOF_EXCLUSION_PROOFS_TYPE, encode_list(&encoded));
        }
        if let Some(proof) = self.split_root_proof.as_ref() {
            writer.record(PROOF_SPLIT_ROOT_PROOF_TYPE, proof.encode());
        }
        if let Some(meta) = self.meta_reveal.as_ref() {
            writer.record(PROOF_META_REVEAL_TYPE, meta.encode());
        }
        if !self.additional_inputs.is_empty() {
            let encoded: Vec<Vec<u8>> = self.additional_inputs.iter().map(|f| f.encode()).collect();
            writer.record(PROOF_ADDITIONAL_INPUTS_TYPE, encode_list(&encoded));
        }
        if let Some(witness) = self.challenge_witness.as_ref() {
            writer.record(PROOF_CHALLENGE_WITNESS_TYPE, encode_tx_witness(witness));
        }
        writer.record(
            PROOF_BLOCK_HEIGHT_TYPE,
            self.block_height.to_be_bytes().to_vec(),
        );
        if let Some(genesis) = self.genesis_reveal.as_ref() {
            writer.record(PROOF_GENESIS_REVEAL_TYPE, genesis.encode());
        }
        if let Some(reveal) = self.group_key_reveal.as_ref() {
            writer.record(PROOF_GROUP_KEY_REVEAL_TYPE, reveal.encode());
        }
        if !self.alt_leaves.is_empty() {
            let encoded: Vec<Vec<u8>> = self.alt_leaves.iter().map(|a| a.encode()).collect();
            writer.record(PROOF_ALT_LEAVES_TYPE, encode_list(&encoded));
        }
        writer.unknown(&self.unknown_odd_types).finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_nested(bytes, 0)
    }

    pub(crate) fn decode_nested(bytes: &[u8], depth: u32) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut version = 0;
        let mut prev_out = None;
        let mut block_header = None;
        let mut block_height = None;
        let mut anchor_tx = None;
        let mut tx_merkle_proof = None;
        let mut asset = None;
        let mut inclusion_proof = None;
        let mut exclusion_proofs = Vec::new();
        let mut split_root_proof = None;
        let mut meta_reveal = None;
        let mut additional_inputs = Vec::new();
        let mut challenge_witness = None;
        let mut genesis_reveal = None;
        let mut group_key_reveal = None;
        let mut alt_leaves = Vec::new();
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                PROOF_VERSION_TYPE => version = record.u32_be()?,
                PROOF_PREV_OUT_TYPE => {
                    let mut reader = record.value();
                    prev_out = Some(decode_outpoint(&mut reader)?);
                    if !reader.is_empty() {
                        return Err(Error::TrailingBytes("prev out"));
                    }
                }
                PROOF_BLOCK_HEADER_TYPE => {
                    block_header = Some(consensus_decode::<Header>(&record, "block header")?);
                }
                PROOF_ANCHOR_TX_TYPE => {
                    anchor_tx = Some(consensus_decode::<Transaction>(&record, "anchor tx")?);
                }
                PROOF_TX_MERKLE_PROOF_TYPE => {
                    tx_merkle_proof = Some(TxMerkleProof::from_bytes(record.value())?);
                }
                PROOF_ASSET_LEAF_TYPE => asset = Some(Asset::from_bytes(record.value())?),
                PROOF_INCLUSION_PROOF_TYPE => {
                    inclusion_proof = Some(TaprootProof::from_bytes(record.value())?);
                }
                PROOF_EXCLUSION_PROOFS_TYPE => {
                    for item in decode_list(record.value())? {
                        exclusion_proofs.push(TaprootProof::from_bytes(&item)?);
                    }
                }
                PROOF_SPLIT_ROOT_PROOF_TYPE => {
                    split_root_proof = Some(TaprootProof::from_bytes(record.value())?);
                }
                PROOF_META_REVEAL_TYPE => {
                    meta_reveal = Some(MetaReveal::from_bytes(record.value())?);
                }
                PROOF_ADDITIONAL_INPUTS_TYPE => {
                    for item in decode_list(record.value())? {
                        additional_inputs.push(File::decode_nested(&item, depth + 1)?);
                    }
                }
                PROOF_CHALLENGE_WITNESS_TYPE => {
                    challenge_witness = Some(decode_tx_witness(record.value())?);
                }
                PROOF_BLOCK_HEIGHT_TYPE => block_height = Some(record.u32_be()?),
                PROOF_GENESIS_REVEAL_TYPE => {
                    genesis_reveal = Some(Genesis::from_bytes(record.value())?);
                }
                PROOF_GROUP_KEY_REVEAL_TYPE => {
                    group_key_reveal = Some(GroupKeyReveal::from_bytes(record.value())?);
                }
                PROOF_ALT_LEAVES_TYPE => {
                    for item in decode_list(record.value())? {
                        alt_leaves.push(Asset::from_bytes(&item)?);
                    }
                }
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }

        Ok(Proof {
            version,
            prev_out: prev_out.ok_or(Error::MissingTlvField("Proof.prev_out".to_string()))?,
            block_header: block_header
                .ok_or(Error::MissingTlvField("Proof.block_header".to_string()))?,
            block_height: block_height
                .ok_or(Error::MissingTlvField("Proof.block_height".to_string()))?,
            anchor_tx: anchor_tx.ok_or(Error::MissingTlvField("Proof.anchor_tx".to_string()))?,
            tx_merkle_proof: tx_merkle_proof
                .ok_or(Error::MissingTlvField("Proof.tx_merkle_proof".to_string()))?,
            asset: asset.ok_or(Error::MissingTlvField("Proof.asset".to_string()))?,
            inclusion_proof: inclusion_proof
                .ok_or(Error::MissingTlvField("Proof.inclusion_proof".to_string()))?,
            exclusion_proofs,
            split_root_proof,
            meta_reveal,
            additional_inputs,
            challenge_witness,
            genesis_reveal,
            group_key_reveal,
            alt_leaves,
            unknown_odd_types,
        })
    }
}

fn consensus_decode<T: bitcoin::consensus::Decodable>(
    record: &tlv::Record,
    what: &str,
) -> Result<T, Error> {
    deserialize(record.value())
        .map_err(|e| Error::BitcoinSerialization(format!("invalid {}: {}", what, e)))
}

/// BigSize count followed by var-bytes items.
fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    write_bigsize(items.len() as u64, &mut out);
    for item in items {
        write_var_bytes(item, &mut out);
    }
    out
}

fn decode_list(bytes: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut reader = bytes;
    let count = read_bigsize(&mut reader)?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(read_var_bytes(&mut reader, tlv::MAX_RECORD_SIZE)?);
    }
    if !reader.is_empty() {
        return Err(Error::TrailingBytes("list"));
    }
    Ok(items)
}
