//! Anchor transaction verification helpers.

use bitcoin::hashes::{sha256d::Hash as Sha256dHash, Hash};
use bitcoin::{OutPoint, Script, Transaction, TxMerkleNode};
use taproot_assets_types::proof::TxMerkleProof;
use thiserror::Error;

/// Errors returned by anchor transaction verification helpers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The anchor transaction does not spend the claimed previous outpoint.
    #[error("anchor tx missing prev out")]
    AnchorTxMissingPrevOut,
    /// The claimed output index is invalid for the transaction.
    #[error("output index {index} invalid for {output_count} outputs")]
    OutputIndexInvalid {
        /// Claimed output index.
        index: u32,
        /// Total number of outputs in the transaction.
        output_count: usize,
    },
    /// The output script is not a Taproot v1 witness program.
    #[error("output is not a taproot output")]
    NotTaprootOutput,
    /// The merkle proof node and bit counts do not match.
    #[error("merkle proof shape mismatch: nodes={nodes}, bits={bits}")]
    InvalidMerkleProofShape {
        /// Number of merkle proof nodes.
        nodes: usize,
        /// Number of merkle proof bits.
        bits: usize,
    },
    /// The merkle proof does not match the expected root.
    #[error("invalid transaction merkle proof")]
    InvalidTxMerkleProof,
}

/// Trait for hashing Merkle node pairs.
pub trait MerkleHasher {
    /// Hashes a left/right node pair into its parent.
    fn hash_nodes(&self, left: [u8; 32], right: [u8; 32]) -> [u8; 32];
}

/// Bitcoin merkle hasher using double-SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcoinMerkleHasher;

impl MerkleHasher for BitcoinMerkleHasher {
    fn hash_nodes(&self, left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&left);
        buf[32..].copy_from_slice(&right);
        Sha256dHash::hash(&buf).to_byte_array()
    }
}

/// Verifies a merkle proof for the given transaction and merkle root.
pub fn verify_tx_merkle_proof(
    tx: &Transaction,
    proof: &TxMerkleProof,
    merkle_root: TxMerkleNode,
) -> Result<(), Error> {
    verify_tx_merkle_proof_with_hasher(
        tx.compute_txid().to_byte_array(),
        proof,
        merkle_root.to_byte_array(),
        &BitcoinMerkleHasher,
    )
}

/// Walks the proof from `txid` up. A set bit means the running hash is the
/// left child.
pub fn verify_tx_merkle_proof_with_hasher<H: MerkleHasher>(
    txid: [u8; 32],
    proof: &TxMerkleProof,
    merkle_root: [u8; 32],
    hasher: &H,
) -> Result<(), Error> {
    if proof.nodes.len() != proof.bits.len() {
        return Err(Error::InvalidMerkleProofShape {
            nodes: proof.nodes.len(),
            bits: proof.bits.len(),
        });
    }

    let mut current = txid;
    for (node, is_left) in proof.nodes.iter().zip(proof.bits.iter()) {
        let node = node.to_byte_array();
        let (left, right) = if *is_left {
            (current, node)
        } else {
            (node, current)
        };
        current = hasher.hash_nodes(left, right);
    }

    if current == merkle_root {
        Ok(())
    } else {
        Err(Error::InvalidTxMerkleProof)
    }
}

/// Returns true if the transaction spends the specified outpoint.
pub fn tx_spends_prev_out(tx: &Transaction, prev_out: &OutPoint) -> bool {
    tx.input
        .iter()
        .any(|input| input.previous_output == *prev_out)
}

/// Indices of all P2TR outputs of a transaction.
pub fn p2tr_output_indices(tx: &Transaction) -> impl Iterator<Item = u32> + '_ {
    tx.output
        .iter()
        .enumerate()
        .filter(|(_, output)| output.script_pubkey.is_p2tr())
        .map(|(idx, _)| idx as u32)
}

/// Extracts the x-only taproot output key of an output.
pub fn taproot_output_key(tx: &Transaction, index: u32) -> Result<[u8; 32], Error> {
    let output = tx
        .output
        .get(index as usize)
        .ok_or(Error::OutputIndexInvalid {
            index,
            output_count: tx.output.len(),
        })?;
    extract_taproot_output_key(output.script_pubkey.as_script())
}

/// Extracts the x-only taproot output key from a P2TR script.
pub fn extract_taproot_output_key(script: &Script) -> Result<[u8; 32], Error> {
    if !script.is_p2tr() {
        return Err(Error::NotTaprootOutput);
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&script.as_bytes()[2..34]);
    Ok(key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};

    fn tx(tag: u8) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([tag; 32]),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(1000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    fn merkle_root(txids: &[Txid]) -> TxMerkleNode {
        let mut level: Vec<[u8; 32]> = txids.iter().map(|txid| txid.to_byte_array()).collect();
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                level.push(*level.last().unwrap());
            }
            level = level
                .chunks(2)
                .map(|pair| BitcoinMerkleHasher.hash_nodes(pair[0], pair[1]))
                .collect();
        }
        TxMerkleNode::from_byte_array(level[0])
    }

    #[test]
    fn merkle_proof_for_every_position() {
        let txs: Vec<Transaction> = (0..5).map(tx).collect();
        let txids: Vec<Txid> = txs.iter().map(Transaction::compute_txid).collect();
        let root = merkle_root(&txids);

        for (index, tx) in txs.iter().enumerate() {
            let proof = TxMerkleProof::new(&txids, index).unwrap();
            assert_eq!(verify_tx_merkle_proof(tx, &proof, root), Ok(()));
        }

        let proof = TxMerkleProof::new(&txids, 1).unwrap();
        assert_eq!(
            verify_tx_merkle_proof(&txs[2], &proof, root),
            Err(Error::InvalidTxMerkleProof)
        );
    }

    #[test]
    fn merkle_proof_shape_is_checked() {
        let txids = [tx(0).compute_txid(), tx(1).compute_txid()];
        let mut proof = TxMerkleProof::new(&txids, 0).unwrap();
        proof.bits.push(true);
        assert_eq!(
            verify_tx_merkle_proof(&tx(0), &proof, merkle_root(&txids)),
            Err(Error::InvalidMerkleProofShape { nodes: 1, bits: 2 })
        );
    }

    #[test]
    fn spends_and_taproot_outputs() {
        let anchor = tx(7);
        assert!(tx_spends_prev_out(
            &anchor,
            &OutPoint {
                txid: Txid::from_byte_array([7; 32]),
                vout: 0
            }
        ));
        assert_eq!(p2tr_output_indices(&anchor).count(), 0);
        assert_eq!(taproot_output_key(&anchor, 0), Err(Error::NotTaprootOutput));
        assert!(matches!(
            taproot_output_key(&anchor, 3),
            Err(Error::OutputIndexInvalid { index: 3, .. })
        ));
    }
}
