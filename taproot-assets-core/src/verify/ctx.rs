//! The callback set a verification run depends on. Every callback is shared
//! read-only across concurrent runs and must be `Send + Sync`.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;

use bitcoin::block::Header;
use bitcoin::{BlockHash, Transaction, TxMerkleNode, Txid};
use taproot_assets_types::asset::SerializedKey;
use taproot_assets_types::proof::{Proof, TxMerkleProof};
use thiserror::Error;

use super::tx;

/// Errors reported by chain and group callbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The header in the proof is not the header the chain has at that height.
    #[error("chain mismatch at height {height}: proof has {claimed}, chain has {actual}")]
    ChainMismatch {
        height: u32,
        claimed: BlockHash,
        actual: BlockHash,
    },
    #[error("no block header at height {0}")]
    HeaderNotFound(u32),
    #[error("transaction {0} not found")]
    TxNotFound(Txid),
    /// The group key is not one the verifier recognises.
    #[error("unknown asset group {0:?}")]
    UnknownGroupKey(SerializedKey),
    /// The backing service failed.
    #[error("chain backend error: {0}")]
    Backend(String),
}

/// Checks a block header against the real chain.
pub trait HeaderVerifier: Send + Sync {
    /// Fails with `ChainMismatch` if the chain has another block at `height`.
    fn verify_header(&self, header: &Header, height: u32) -> Result<(), ChainError>;
}

/// Checks that a transaction is committed to by a block's merkle root.
pub trait MerkleVerifier: Send + Sync {
    fn verify_merkle(
        &self,
        tx: &Transaction,
        proof: &TxMerkleProof,
        merkle_root: TxMerkleNode,
    ) -> Result<(), tx::Error>;
}

/// Decides whether an asset group is recognised.
pub trait GroupVerifier: Send + Sync {
    fn verify_group_key(&self, group_key: &SerializedKey) -> Result<(), ChainError>;
}

/// Historical chain queries used for lock time rules.
pub trait ChainLookup {
    /// Height of the best block known to the lookup.
    fn current_height(&self) -> Result<u32, ChainError>;

    /// Height of the block that confirmed `txid`.
    fn tx_block_height(&self, txid: &Txid) -> Result<u32, ChainError>;

    /// Mean timestamp of the blocks up to and including `height`.
    fn mean_block_timestamp(&self, height: u32) -> Result<u64, ChainError>;
}

/// Creates a chain lookup for each verified file.
pub trait ChainLookupGenerator: Send + Sync {
    fn gen_file_chain_lookup(&self, proofs: &[Proof]) -> Result<Box<dyn ChainLookup>, ChainError>;
}

/// Source of block headers by height.
pub trait ChainBridge: Send + Sync {
    fn block_header_by_height(&self, height: u32) -> Result<Header, ChainError>;
}

/// The callbacks of one verification run.
#[derive(Clone, Copy)]
pub struct VerifierCtx<'a> {
    pub header_verifier: &'a dyn HeaderVerifier,
    pub merkle_verifier: &'a dyn MerkleVerifier,
    pub group_verifier: &'a dyn GroupVerifier,
    pub chain_lookup_gen: &'a dyn ChainLookupGenerator,
}

/// Header verifier that resolves the header at the claimed height through a
/// `ChainBridge` and compares block hashes.
#[derive(Debug, Clone)]
pub struct BridgeHeaderVerifier<B> {
    bridge: B,
}

impl<B: ChainBridge> BridgeHeaderVerifier<B> {
    pub fn new(bridge: B) -> Self {
        BridgeHeaderVerifier { bridge }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }
}

impl<B: ChainBridge> HeaderVerifier for BridgeHeaderVerifier<B> {
    fn verify_header(&self, header: &Header, height: u32) -> Result<(), ChainError> {
        let actual = self.bridge.block_header_by_height(height)?.block_hash();
        let claimed = header.block_hash();
        if actual != claimed {
            return Err(ChainError::ChainMismatch {
                height,
                claimed,
                actual,
            });
        }
        Ok(())
    }
}

/// Merkle verifier using Bitcoin's double-SHA-256 merkle tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMerkleVerifier;

impl MerkleVerifier for DefaultMerkleVerifier {
    fn verify_merkle(
        &self,
        tx: &Transaction,
        proof: &TxMerkleProof,
        merkle_root: TxMerkleNode,
    ) -> Result<(), tx::Error> {
        tx::verify_tx_merkle_proof(tx, proof, merkle_root)
    }
}

/// Group verifier backed by a fixed set of recognised groups.
#[derive(Debug, Clone, Default)]
pub struct GroupAllowList {
    groups: BTreeSet<SerializedKey>,
}

impl GroupAllowList {
    pub fn new(groups: impl IntoIterator<Item = SerializedKey>) -> Self {
        GroupAllowList {
            groups: groups.into_iter().collect(),
        }
    }
}

impl GroupVerifier for GroupAllowList {
    fn verify_group_key(&self, group_key: &SerializedKey) -> Result<(), ChainError> {
        if self.groups.contains(group_key) {
            Ok(())
        } else {
            Err(ChainError::UnknownGroupKey(*group_key))
        }
    }
}

/// Number of blocks averaged by `mean_block_timestamp`.
const MEAN_TIME_BLOCKS: usize = 11;

/// Chain lookup answered from the anchors of the file being verified. A
/// header is only consulted once the step anchored in it has passed the
/// header verifier.
#[derive(Debug, Clone, Default)]
pub struct FileChainLookup {
    tx_heights: BTreeMap<Txid, u32>,
    block_times: BTreeMap<u32, u32>,
}

impl FileChainLookup {
    /// Indexes the anchors of `proofs` and of their additional input files.
    pub fn new(proofs: &[Proof]) -> Self {
        let mut lookup = FileChainLookup::default();
        lookup.add_proofs(proofs);
        lookup
    }

    fn add_proofs(&mut self, proofs: &[Proof]) {
        for proof in proofs {
            self.tx_heights
                .insert(proof.anchor_tx.compute_txid(), proof.block_height);
            self.block_times
                .insert(proof.block_height, proof.block_header.time);
            // Nested files that fail to decode are rejected by verification.
            for file in &proof.additional_inputs {
                if let Ok(nested) = file.proofs() {
                    self.add_proofs(&nested);
                }
            }
        }
    }
}

impl ChainLookup for FileChainLookup {
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
        let (count, total) = self
            .block_times
            .range(..=height)
            .rev()
            .take(MEAN_TIME_BLOCKS)
            .fold((0u64, 0u64), |(count, total), (_, time)| {
                (count + 1, total + u64::from(*time))
            });
        if count == 0 {
            return Err(ChainError::HeaderNotFound(height));
        }
        Ok(total / count)
    }
}

/// Generates a `FileChainLookup` for every file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileChainLookupGen;

impl ChainLookupGenerator for FileChainLookupGen {
    fn gen_file_chain_lookup(&self, proofs: &[Proof]) -> Result<Box<dyn ChainLookup>, ChainError> {
        Ok(Box::new(FileChainLookup::new(proofs)))
    }
}
