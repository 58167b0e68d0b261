//! In-memory chain and proof builders for tests.
//!
//! Keys are derived from seeds by tweaking the NUMS point, so every key is a
//! valid curve point and no secret is ever involved. Anchor transactions carry
//! no signatures; verification does not look at them.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::{sha256::Hash as Sha256Hash, sha256d::Hash as Sha256dHash, Hash};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxMerkleNode, TxOut, Txid, Witness,
};
use taproot_assets_types::asset::{
    Asset, AssetType, AssetVersion, Genesis, GroupKey, PrevId, PrevWitness, SerializedKey,
    SplitCommitment, NUMS_KEY,
};
use taproot_assets_types::commitment::{TapCommitmentVersion, TapscriptPreimage};
use taproot_assets_types::file::File;
use taproot_assets_types::meta::MetaReveal;
use taproot_assets_types::proof::{
    CommitmentProof, GroupKeyReveal, Proof, TaprootProof, TapscriptProof, TxMerkleProof,
};
use taproot_assets_types::tlv::UnknownOddTypes;
use thiserror::Error;

use crate::commitment::{self, SplitCommitmentTree, TapCommitmentTree};
use crate::verify::ctx::{
    BridgeHeaderVerifier, ChainBridge, ChainError, ChainLookup, ChainLookupGenerator,
    DefaultMerkleVerifier, GroupAllowList, GroupVerifier, VerifierCtx,
};
use crate::verify::{group_key_reveal, transition};
use crate::{OpsError, TaprootOps};

const MOCK_START_HEIGHT: u32 = 100;
const MOCK_START_TIME: u32 = 1_700_000_000;
const MOCK_BLOCK_INTERVAL: u32 = 600;
const MOCK_OUTPUT_VALUE: u64 = 1_000;
const MEAN_TIME_BLOCKS: usize = 11;

#[derive(Error, Debug)]
pub enum MockError {
    #[error(transparent)]
    Commitment(#[from] commitment::Error),
    #[error(transparent)]
    Ops(#[from] OpsError),
    #[error("group key derivation failed: {0}")]
    GroupKey(group_key_reveal::Error),
    #[error("encoding failed: {0}")]
    Encoding(#[from] taproot_assets_types::error::Error),
    #[error("anchor has no output {0}")]
    MissingOutput(u32),
    #[error("output {0} holds no assets")]
    NotAnAssetOutput(u32),
    #[error("cannot send {amount} out of {available}")]
    InsufficientAmount { amount: u64, available: u64 },
    #[error("amount overflow")]
    AmountOverflow,
}

/// A key derived from `seed`.
pub fn mock_key<O: TaprootOps>(ops: &O, seed: &str) -> Result<SerializedKey, MockError> {
    let nums = ops.parse_internal_key(&NUMS_KEY)?;
    let tweak = Sha256Hash::hash(seed.as_bytes()).to_byte_array();
    Ok(ops.serialize_key(&ops.add_tweak(&nums, tweak)?))
}

/// An outpoint to fund a mint from.
pub fn funding_outpoint(seed: &str) -> OutPoint {
    OutPoint {
        txid: Txid::from_byte_array(Sha256dHash::hash(seed.as_bytes()).to_byte_array()),
        vout: 0,
    }
}

/// `OP_1 <x-only output key>`.
pub fn p2tr_script(output_key: &SerializedKey) -> ScriptBuf {
    let mut script = Vec::with_capacity(34);
    script.push(0x51);
    script.push(0x20);
    script.extend_from_slice(&output_key.x_only());
    ScriptBuf::from_bytes(script)
}

/// The reference a witness spending the asset of `proof` carries.
pub fn prev_id(proof: &Proof) -> PrevId {
    PrevId {
        out_point: proof.out_point(),
        asset_id: proof.asset.id(),
        script_key: proof.asset.script_key,
    }
}

fn spend_witness(prev_id: PrevId) -> PrevWitness {
    PrevWitness {
        prev_id: Some(prev_id),
        tx_witness: Witness::from_slice(&[[0x01u8; 64]]),
        split_commitment: None,
    }
}

/// Block inclusion data of a mined transaction.
#[derive(Debug, Clone)]
pub struct MinedTx {
    pub height: u32,
    pub header: Header,
    pub merkle_proof: TxMerkleProof,
}

/// A chain of blocks that each hold a filler transaction and at most one
/// anchor transaction.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    headers: BTreeMap<u32, Header>,
    tx_heights: BTreeMap<Txid, u32>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tip_height(&self) -> u32 {
        self.headers
            .keys()
            .next_back()
            .copied()
            .unwrap_or(MOCK_START_HEIGHT - 1)
    }

    pub fn header(&self, height: u32) -> Option<&Header> {
        self.headers.get(&height)
    }

    fn filler_tx(height: u32) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array(
                        Sha256dHash::hash(&height.to_be_bytes()).to_byte_array(),
                    ),
                    vout: u32::MAX,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(MOCK_OUTPUT_VALUE),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    fn mine_block(&mut self, txdata: Vec<Transaction>) -> (u32, Header) {
        let height = self.tip_height() + 1;
        let prev_blockhash = self
            .headers
            .get(&(height - 1))
            .map_or(BlockHash::all_zeros(), Header::block_hash);
        let mut block = Block {
            header: Header {
                version: BlockVersion::TWO,
                prev_blockhash,
                merkle_root: TxMerkleNode::all_zeros(),
                time: MOCK_START_TIME + (height - MOCK_START_HEIGHT) * MOCK_BLOCK_INTERVAL,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce: height,
            },
            txdata,
        };
        if let Some(root) = block.compute_merkle_root() {
            block.header.merkle_root = root;
        }
        for tx in &block.txdata {
            self.tx_heights.insert(tx.compute_txid(), height);
        }
        self.headers.insert(height, block.header);
        (height, block.header)
    }

    /// Mines `tx` into a new block.
    pub fn mine(&mut self, tx: &Transaction) -> Result<MinedTx, MockError> {
        let filler = Self::filler_tx(self.tip_height() + 1);
        let txids = [filler.compute_txid(), tx.compute_txid()];
        let (height, header) = self.mine_block(vec![filler, tx.clone()]);
        Ok(MinedTx {
            height,
            header,
            merkle_proof: TxMerkleProof::new(&txids, 1)?,
        })
    }

    /// Mines `count` blocks without anchor transactions.
    pub fn mine_empty(&mut self, count: u32) {
        for _ in 0..count {
            let filler = Self::filler_tx(self.tip_height() + 1);
            self.mine_block(vec![filler]);
        }
    }

    /// Builds and mines an anchor transaction spending `inputs`.
    pub fn anchor<O: TaprootOps>(
        &mut self,
        ops: &O,
        inputs: &[OutPoint],
        outputs: Vec<MockOutput>,
    ) -> Result<MockAnchor, MockError> {
        let mut tx_outputs = Vec::with_capacity(outputs.len());
        let mut anchor_outputs = Vec::with_capacity(outputs.len());
        for output in outputs {
            let (internal_key, tree, sibling) = match output {
                MockOutput::Assets {
                    internal_key,
                    version,
                    assets,
                    sibling,
                } => (
                    internal_key,
                    Some(TapCommitmentTree::from_assets(version, &assets)?),
                    sibling,
                ),
                MockOutput::Bip86 { internal_key } => (internal_key, None, None),
            };
            let tapscript_root = match tree.as_ref() {
                Some(tree) => Some(
                    tree.commitment()
                        .tapscript_root(sibling.as_ref())?
                        .to_byte_array(),
                ),
                None => None,
            };
            let internal = ops.parse_internal_key(&internal_key)?;
            let output_key = ops.taproot_output_key(&internal, tapscript_root)?;
            tx_outputs.push(TxOut {
                value: Amount::from_sat(MOCK_OUTPUT_VALUE),
                script_pubkey: p2tr_script(&output_key),
            });
            anchor_outputs.push(AnchorOutput {
                internal_key,
                tree,
                sibling,
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs
                .iter()
                .map(|previous_output| TxIn {
                    previous_output: *previous_output,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: tx_outputs,
        };
        let mined = self.mine(&tx)?;
        Ok(MockAnchor {
            tx,
            mined,
            outputs: anchor_outputs,
        })
    }

    /// Historical view of the chain as it is now.
    pub fn lookup(&self) -> MockChainLookup {
        MockChainLookup {
            block_times: self
                .headers
                .iter()
                .map(|(height, header)| (*height, header.time))
                .collect(),
            tx_heights: self.tx_heights.clone(),
        }
    }
}

impl ChainBridge for MockChain {
    fn block_header_by_height(&self, height: u32) -> Result<Header, ChainError> {
        self.headers
            .get(&height)
            .copied()
            .ok_or(ChainError::HeaderNotFound(height))
    }
}

impl ChainLookupGenerator for MockChain {
    fn gen_file_chain_lookup(&self, _proofs: &[Proof]) -> Result<Box<dyn ChainLookup>, ChainError> {
        Ok(Box::new(self.lookup()))
    }
}

/// Chain lookup over every block of a `MockChain`.
#[derive(Debug, Clone)]
pub struct MockChainLookup {
    block_times: BTreeMap<u32, u32>,
    tx_heights: BTreeMap<Txid, u32>,
}

impl ChainLookup for MockChainLookup {
    fn current_height(&self) -> Result<u32, ChainError> {
        self.block_times
            .keys()
            .next_back()
            .copied()
            .ok_or(ChainError::HeaderNotFound(0))
    }

    fn tx_block_height(&self, txid: &Txid) -> Result<u32, ChainError> {
        self.tx_heights
            .get(txid)
            .copied()
            .ok_or(ChainError::TxNotFound(*txid))
    }

    fn mean_block_timestamp(&self, height: u32) -> Result<u64, ChainError> {
        let times: Vec<u64> = self
            .block_times
            .range(..=height)
            .rev()
            .take(MEAN_TIME_BLOCKS)
            .map(|(_, time)| u64::from(*time))
            .collect();
        if times.is_empty() {
            return Err(ChainError::HeaderNotFound(height));
        }
        Ok(times.iter().sum::<u64>() / times.len() as u64)
    }
}

/// Group verifier accepting every group unless an allow list is set.
#[derive(Debug, Clone, Default)]
pub struct MockGroups {
    allowed: Option<GroupAllowList>,
}

impl GroupVerifier for MockGroups {
    fn verify_group_key(&self, group_key: &SerializedKey) -> Result<(), ChainError> {
        match self.allowed.as_ref() {
            Some(allowed) => allowed.verify_group_key(group_key),
            None => Ok(()),
        }
    }
}

/// Owns the callbacks of a verification run against a `MockChain`.
pub struct MockVerifier {
    headers: BridgeHeaderVerifier<MockChain>,
    merkle: DefaultMerkleVerifier,
    groups: MockGroups,
}

impl MockVerifier {
    /// Verifier over a snapshot of `chain`.
    pub fn new(chain: &MockChain) -> Self {
        MockVerifier {
            headers: BridgeHeaderVerifier::new(chain.clone()),
            merkle: DefaultMerkleVerifier,
            groups: MockGroups::default(),
        }
    }

    /// Only accept the given groups.
    pub fn with_groups(mut self, groups: GroupAllowList) -> Self {
        self.groups.allowed = Some(groups);
        self
    }

    pub fn ctx(&self) -> VerifierCtx<'_> {
        VerifierCtx {
            header_verifier: &self.headers,
            merkle_verifier: &self.merkle,
            group_verifier: &self.groups,
            chain_lookup_gen: self.headers.bridge(),
        }
    }
}

/// One output of a mock anchor transaction.
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// An output committing to `assets`.
    Assets {
        internal_key: SerializedKey,
        version: TapCommitmentVersion,
        assets: Vec<Asset>,
        sibling: Option<TapscriptPreimage>,
    },
    /// A plain key spend output.
    Bip86 { internal_key: SerializedKey },
}

impl MockOutput {
    pub fn assets(internal_key: SerializedKey, assets: Vec<Asset>) -> Self {
        MockOutput::Assets {
            internal_key,
            version: TapCommitmentVersion::V2,
            assets,
            sibling: None,
        }
    }
}

#[derive(Debug, Clone)]
struct AnchorOutput {
    internal_key: SerializedKey,
    tree: Option<TapCommitmentTree>,
    sibling: Option<TapscriptPreimage>,
}

/// A mined anchor transaction together with the commitment trees of its
/// outputs.
#[derive(Debug, Clone)]
pub struct MockAnchor {
    pub tx: Transaction,
    pub mined: MinedTx,
    outputs: Vec<AnchorOutput>,
}

impl MockAnchor {
    pub fn out_point(&self, index: u32) -> OutPoint {
        OutPoint {
            txid: self.tx.compute_txid(),
            vout: index,
        }
    }

    /// Inclusion or exclusion proof of `asset` for output `index`.
    pub fn taproot_proof(
        &self,
        index: u32,
        asset: &Asset,
        inclusion: bool,
    ) -> Result<TaprootProof, MockError> {
        let output = self
            .outputs
            .get(index as usize)
            .ok_or(MockError::MissingOutput(index))?;
        let (commitment_proof, tapscript_proof) = match output.tree.as_ref() {
            Some(tree) => {
                let proof = if inclusion {
                    tree.inclusion_proof(asset)?
                } else {
                    tree.exclusion_proof(asset)
                };
                let commitment_proof = CommitmentProof {
                    proof,
                    tap_sibling_preimage: output.sibling.clone(),
                    unknown_odd_types: UnknownOddTypes::new(),
                };
                (Some(commitment_proof), None)
            }
            None if inclusion => return Err(MockError::NotAnAssetOutput(index)),
            None => (None, Some(TapscriptProof::bip86())),
        };
        Ok(TaprootProof {
            output_index: index,
            internal_key: output.internal_key,
            commitment_proof,
            tapscript_proof,
            unknown_odd_types: UnknownOddTypes::new(),
        })
    }

    /// Exclusion proofs of `asset` for every output but `index`.
    pub fn exclusion_proofs(&self, index: u32, asset: &Asset) -> Result<Vec<TaprootProof>, MockError> {
        (0..self.outputs.len() as u32)
            .filter(|other| *other != index)
            .map(|other| self.taproot_proof(other, asset, false))
            .collect()
    }

    /// A proof of `asset` in output `index` whose anchor spends `prev_out`.
    pub fn proof(&self, prev_out: OutPoint, index: u32, asset: &Asset) -> Result<Proof, MockError> {
        Ok(Proof {
            version: 0,
            prev_out,
            block_header: self.mined.header,
            block_height: self.mined.height,
            anchor_tx: self.tx.clone(),
            tx_merkle_proof: self.mined.merkle_proof.clone(),
            asset: asset.clone(),
            inclusion_proof: self.taproot_proof(index, asset, true)?,
            exclusion_proofs: self.exclusion_proofs(index, asset)?,
            split_root_proof: None,
            meta_reveal: None,
            additional_inputs: Vec::new(),
            challenge_witness: None,
            genesis_reveal: None,
            group_key_reveal: None,
            alt_leaves: Vec::new(),
            unknown_odd_types: UnknownOddTypes::new(),
        })
    }
}

/// Parameters of a mock issuance.
#[derive(Debug, Clone)]
pub struct MintRequest {
    pub tag: String,
    pub amount: u64,
    pub asset_type: AssetType,
    pub version: AssetVersion,
    pub meta: Option<MetaReveal>,
    pub grouped: bool,
}

impl MintRequest {
    pub fn new(tag: &str, amount: u64) -> Self {
        MintRequest {
            tag: String::from(tag),
            amount,
            asset_type: AssetType::Normal,
            version: AssetVersion::V0,
            meta: None,
            grouped: false,
        }
    }

    pub fn collectible(mut self) -> Self {
        self.asset_type = AssetType::Collectible;
        self
    }

    pub fn meta(mut self, meta: MetaReveal) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn grouped(mut self) -> Self {
        self.grouped = true;
        self
    }

    pub fn version(mut self, version: AssetVersion) -> Self {
        self.version = version;
        self
    }
}

/// Mints an asset into output 0 of a new anchor, with a change output at 1.
pub fn mint<O: TaprootOps>(
    ops: &O,
    chain: &mut MockChain,
    req: &MintRequest,
) -> Result<Proof, MockError> {
    let tag = req.tag.as_str();
    let first_prev_out = funding_outpoint(tag);
    let genesis = Genesis {
        first_prev_out,
        tag: req.tag.clone(),
        meta_hash: req
            .meta
            .as_ref()
            .map_or(Sha256Hash::all_zeros(), MetaReveal::meta_hash),
        output_index: 0,
        asset_type: req.asset_type,
    };

    let group_key_reveal = if req.grouped {
        Some(GroupKeyReveal {
            raw_group_key: mock_key(ops, &format!("{}/group", tag))?,
            tapscript_root: None,
        })
    } else {
        None
    };
    let group_key = match group_key_reveal.as_ref() {
        Some(reveal) => Some(GroupKey {
            group_pub_key: group_key_reveal::group_pubkey_from_reveal(ops, reveal, &genesis.id())
                .map_err(MockError::GroupKey)?,
        }),
        None => None,
    };

    let asset = Asset {
        version: req.version,
        genesis: genesis.clone(),
        amount: req.amount,
        lock_time: 0,
        relative_lock_time: 0,
        prev_witnesses: vec![PrevWitness::genesis()],
        split_commitment_root: None,
        script_version: 0,
        script_key: mock_key(ops, &format!("{}/script", tag))?,
        group_key,
        unknown_odd_types: UnknownOddTypes::new(),
    };

    let anchor = chain.anchor(
        ops,
        &[first_prev_out],
        vec![
            MockOutput::assets(mock_key(ops, &format!("{}/internal", tag))?, vec![asset.clone()]),
            MockOutput::Bip86 {
                internal_key: mock_key(ops, &format!("{}/change", tag))?,
            },
        ],
    )?;
    let mut proof = anchor.proof(first_prev_out, 0, &asset)?;
    proof.genesis_reveal = Some(genesis);
    proof.meta_reveal = req.meta.clone();
    proof.group_key_reveal = group_key_reveal;
    Ok(proof)
}

/// Options of a mock transfer output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub lock_time: u64,
    pub relative_lock_time: u64,
}

/// Sends the whole asset of `prev` to `recipient`.
pub fn transfer<O: TaprootOps>(
    ops: &O,
    chain: &mut MockChain,
    prev: &Proof,
    recipient: SerializedKey,
    send: SendOptions,
) -> Result<Proof, MockError> {
    let mut asset = prev.asset.clone();
    asset.script_key = recipient;
    asset.prev_witnesses = vec![spend_witness(prev_id(prev))];
    asset.split_commitment_root = None;
    asset.lock_time = send.lock_time;
    asset.relative_lock_time = send.relative_lock_time;

    let anchor = chain.anchor(
        ops,
        &[prev.out_point()],
        vec![
            MockOutput::assets(mock_key(ops, "transfer/internal")?, vec![asset.clone()]),
            MockOutput::Bip86 {
                internal_key: mock_key(ops, "transfer/change")?,
            },
        ],
    )?;
    anchor.proof(prev.out_point(), 0, &asset)
}

/// Both proofs of a split: the root keeps the change in output 0, the split
/// output goes to the recipient in output 1.
#[derive(Debug, Clone)]
pub struct SplitProofs {
    pub root: Proof,
    pub split: Proof,
}

/// Splits `amount` off the asset of `prev`. Sending everything leaves a
/// tombstone as the root.
pub fn split<O: TaprootOps>(
    ops: &O,
    chain: &mut MockChain,
    prev: &Proof,
    amount: u64,
    recipient: SerializedKey,
) -> Result<SplitProofs, MockError> {
    let available = prev.asset.amount;
    let change = available
        .checked_sub(amount)
        .ok_or(MockError::InsufficientAmount { amount, available })?;

    let mut root = prev.asset.clone();
    root.amount = change;
    root.script_key = if change == 0 {
        NUMS_KEY
    } else {
        mock_key(ops, "split/change")?
    };
    root.prev_witnesses = vec![spend_witness(prev_id(prev))];
    root.split_commitment_root = None;

    let mut split_asset = prev.asset.clone();
    split_asset.amount = amount;
    split_asset.script_key = recipient;
    split_asset.prev_witnesses = vec![PrevWitness::genesis()];
    split_asset.split_commitment_root = None;

    let mut tree = SplitCommitmentTree::new();
    tree.insert(0, &root)?;
    tree.insert(1, &split_asset)?;
    root.split_commitment_root = Some(tree.root());
    split_asset.prev_witnesses = vec![PrevWitness {
        prev_id: Some(PrevId::zero()),
        tx_witness: Witness::new(),
        split_commitment: Some(SplitCommitment {
            proof: tree.proof(1, &split_asset),
            root_asset: Box::new(root.clone()),
        }),
    }];

    let anchor = chain.anchor(
        ops,
        &[prev.out_point()],
        vec![
            MockOutput::assets(mock_key(ops, "split/root-internal")?, vec![root.clone()]),
            MockOutput::assets(mock_key(ops, "split/internal")?, vec![split_asset.clone()]),
        ],
    )?;
    let root_proof = anchor.proof(prev.out_point(), 0, &root)?;
    let mut split_proof = anchor.proof(prev.out_point(), 1, &split_asset)?;
    split_proof.split_root_proof = Some(anchor.taproot_proof(0, &root, true)?);
    Ok(SplitProofs {
        root: root_proof,
        split: split_proof,
    })
}

/// Burns `amount` of the asset of `prev` by splitting it to the burn key.
pub fn burn<O: TaprootOps>(
    ops: &O,
    chain: &mut MockChain,
    prev: &Proof,
    amount: u64,
) -> Result<SplitProofs, MockError> {
    let burn_key = transition::derive_burn_key(ops, &prev_id(prev))?;
    split(ops, chain, prev, amount, burn_key)
}

/// Merges the asset of `prev` with the latest asset of `other` into one
/// output owned by `recipient`. `other` becomes an additional input.
pub fn merge<O: TaprootOps>(
    ops: &O,
    chain: &mut MockChain,
    prev: &Proof,
    other: &File,
    recipient: SerializedKey,
) -> Result<Proof, MockError> {
    let other_last = other.last_proof()?;
    let mut asset = prev.asset.clone();
    asset.amount = prev
        .asset
        .amount
        .checked_add(other_last.asset.amount)
        .ok_or(MockError::AmountOverflow)?;
    asset.script_key = recipient;
    asset.prev_witnesses = vec![
        spend_witness(prev_id(prev)),
        spend_witness(prev_id(&other_last)),
    ];
    asset.split_commitment_root = None;

    let anchor = chain.anchor(
        ops,
        &[prev.out_point(), other_last.out_point()],
        vec![
            MockOutput::assets(mock_key(ops, "merge/internal")?, vec![asset.clone()]),
            MockOutput::Bip86 {
                internal_key: mock_key(ops, "merge/change")?,
            },
        ],
    )?;
    let mut proof = anchor.proof(prev.out_point(), 0, &asset)?;
    proof.additional_inputs = vec![other.clone()];
    Ok(proof)
}
