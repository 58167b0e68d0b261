//! Proof files: an append-only, hash-chained sequence of proofs.

use alloc::vec::Vec;
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::proof::Proof;
use crate::tlv::{self, read_array, read_bigsize, read_var_bytes, write_bigsize, write_var_bytes};

/// Magic bytes at the start of every encoded file.
pub const FILE_MAGIC: [u8; 4] = *b"TAPF";

/// Deepest chain of nested additional-input files accepted.
pub const MAX_NESTING_DEPTH: u32 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum FileVersion {
    #[default]
    V0 = 0,
}

impl FileVersion {
    fn from_u32(val: u32) -> Result<Self, Error> {
        match val {
            0 => Ok(FileVersion::V0),
            other => Err(Error::UnknownFileVersion(other)),
        }
    }
}

/// A proof kept in its encoded form together with its chain hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HashedProof {
    raw: Vec<u8>,
    hash: Sha256Hash,
}

/// An ordered chain of proofs: index 0 is the genesis, the last entry is the
/// current state of the asset. Proofs are parsed on access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct File {
    pub version: FileVersion,
    proofs: Vec<HashedProof>,
    /// Nesting level of this file below the outermost one.
    #[serde(skip)]
    depth: u32,
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.proofs == other.proofs
    }
}

impl Eq for File {}

/// `sha256(prev_hash || proof)`.
fn chain_hash(prev: &Sha256Hash, raw: &[u8]) -> Sha256Hash {
    let mut engine = Sha256Hash::engine();
    engine.input(prev.as_byte_array());
    engine.input(raw);
    Sha256Hash::from_engine(engine)
}

impl File {
    pub fn new(version: FileVersion) -> Self {
        File {
            version,
            proofs: Vec::new(),
            depth: 0,
        }
    }

    pub fn from_proofs(proofs: &[Proof]) -> Self {
        let mut file = File::new(FileVersion::V0);
        for proof in proofs {
            file.append_proof(proof);
        }
        file
    }

    pub fn num_proofs(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    fn last_hash(&self) -> Sha256Hash {
        self.proofs
            .last()
            .map_or(Sha256Hash::all_zeros(), |proof| proof.hash)
    }

    pub fn append_proof(&mut self, proof: &Proof) {
        let raw = proof.encode();
        let hash = chain_hash(&self.last_hash(), &raw);
        self.proofs.push(HashedProof { raw, hash });
    }

    /// Appends an already encoded proof after checking that it decodes.
    pub fn append_raw_proof(&mut self, raw: Vec<u8>) -> Result<(), Error> {
        Proof::decode_nested(&raw, self.depth)?;
        let hash = chain_hash(&self.last_hash(), &raw);
        self.proofs.push(HashedProof { raw, hash });
        Ok(())
    }

    /// Swaps the latest proof, re-hashing the tail of the chain.
    pub fn replace_last_proof(&mut self, proof: &Proof) -> Result<(), Error> {
        if self.proofs.pop().is_none() {
            return Err(Error::EmptyFile);
        }
        self.append_proof(proof);
        Ok(())
    }

    pub fn raw_proof_at(&self, index: usize) -> Result<&[u8], Error> {
        self.proofs
            .get(index)
            .map(|proof| proof.raw.as_slice())
            .ok_or(Error::ProofIndexOutOfRange {
                index,
                num_proofs: self.proofs.len(),
            })
    }

    pub fn proof_at(&self, index: usize) -> Result<Proof, Error> {
        Proof::decode_nested(self.raw_proof_at(index)?, self.depth)
    }

    pub fn raw_last_proof(&self) -> Result<&[u8], Error> {
        self.proofs
            .last()
            .map(|proof| proof.raw.as_slice())
            .ok_or(Error::EmptyFile)
    }

    pub fn last_proof(&self) -> Result<Proof, Error> {
        Proof::decode_nested(self.raw_last_proof()?, self.depth)
    }

    /// Decodes every proof in chain order.
    pub fn proofs(&self) -> Result<Vec<Proof>, Error> {
        (0..self.proofs.len()).map(|idx| self.proof_at(idx)).collect()
    }

    /// Nesting level of this file; 0 for a top level file.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Magic, version, proof count, then each proof with its chain hash.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&FILE_MAGIC);
        out.extend_from_slice(&(self.version as u32).to_be_bytes());
        write_bigsize(self.proofs.len() as u64, &mut out);
        for proof in &self.proofs {
            write_var_bytes(&proof.raw, &mut out);
            out.extend_from_slice(proof.hash.as_byte_array());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_nested(bytes, 0)
    }

    pub(crate) fn decode_nested(bytes: &[u8], depth: u32) -> Result<Self, Error> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::MaxNestingDepthExceeded(MAX_NESTING_DEPTH));
        }

        let mut r = bytes;
        let magic: [u8; 4] = read_array(&mut r)?;
        if magic != FILE_MAGIC {
            return Err(Error::InvalidMagicBytes);
        }
        let version = FileVersion::from_u32(u32::from_be_bytes(read_array(&mut r)?))?;

        let count = read_bigsize(&mut r)?;
        let mut proofs = Vec::new();
        let mut prev_hash = Sha256Hash::all_zeros();
        for index in 0..count as usize {
            let raw = read_var_bytes(&mut r, tlv::MAX_RECORD_SIZE)?;
            let hash = Sha256Hash::from_byte_array(read_array(&mut r)?);
            if chain_hash(&prev_hash, &raw) != hash {
                return Err(Error::ChecksumMismatch { index });
            }
            prev_hash = hash;
            proofs.push(HashedProof { raw, hash });
        }
        if !r.is_empty() {
            return Err(Error::TrailingBytes("proof file"));
        }

        Ok(File {
            version,
            proofs,
            depth,
        })
    }
}

/// Returns true if `bytes` starts with the file magic.
pub fn is_proof_file(bytes: &[u8]) -> bool {
    bytes.starts_with(&FILE_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_file(proofs: &[&[u8]]) -> File {
        let mut file = File::new(FileVersion::V0);
        for raw in proofs {
            let hash = chain_hash(&file.last_hash(), raw);
            file.proofs.push(HashedProof {
                raw: raw.to_vec(),
                hash,
            });
        }
        file
    }

    #[test]
    fn empty_file_has_no_last_proof() {
        let file = File::new(FileVersion::V0);
        assert_eq!(file.num_proofs(), 0);
        assert!(matches!(file.last_proof(), Err(Error::EmptyFile)));
        assert!(matches!(
            File::from_bytes(&file.encode()).unwrap().raw_last_proof(),
            Err(Error::EmptyFile)
        ));
    }

    #[test]
    fn broken_hash_chain_reports_index() {
        let file = raw_file(&[b"first", b"second"]);
        let mut bytes = file.encode();
        let decoded = File::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, file);
        assert_eq!(decoded.raw_proof_at(1).unwrap(), b"second");

        // Flip the last byte of the second proof's hash.
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            File::from_bytes(&bytes),
            Err(Error::ChecksumMismatch { index: 1 })
        ));
    }

    #[test]
    fn bad_magic_and_version() {
        let mut bytes = raw_file(&[b"p"]).encode();
        bytes[0] = b'X';
        assert!(matches!(File::from_bytes(&bytes), Err(Error::InvalidMagicBytes)));

        let mut bytes = raw_file(&[b"p"]).encode();
        bytes[7] = 9;
        assert!(matches!(
            File::from_bytes(&bytes),
            Err(Error::UnknownFileVersion(9))
        ));
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let bytes = raw_file(&[]).encode();
        assert!(File::decode_nested(&bytes, MAX_NESTING_DEPTH).is_ok());
        assert!(matches!(
            File::decode_nested(&bytes, MAX_NESTING_DEPTH + 1),
            Err(Error::MaxNestingDepthExceeded(_))
        ));
    }

    #[test]
    fn out_of_range_index() {
        let file = raw_file(&[b"only"]);
        assert!(matches!(
            file.raw_proof_at(3),
            Err(Error::ProofIndexOutOfRange {
                index: 3,
                num_proofs: 1
            })
        ));
    }
}
