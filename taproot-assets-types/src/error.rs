use crate::alloc::string::String; // For no_std compatibility
use bitcoin::io::Error as BitcoinIoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(BitcoinIoError),

    #[error("TLV stream error: {0}")]
    TlvStream(String),

    #[error("Missing TLV field: {0}")]
    MissingTlvField(String),

    #[error("Bitcoin serialization error: {0}")]
    BitcoinSerialization(String),

    #[error("Unknown TLV type: {0}")]
    UnknownTlvType(u64),

    #[error("Invalid TLV value for type {0}: {1}")]
    InvalidTlvValue(u64, String),

    #[error("TLV records out of order: type {current} follows {previous}")]
    OutOfOrderTlvType { previous: u64, current: u64 },

    #[error("Non-canonical BigSize encoding")]
    NonCanonicalVarInt,

    #[error("Invalid magic bytes")]
    InvalidMagicBytes,

    #[error("Unknown file version: {0}")]
    UnknownFileVersion(u32),

    #[error("File contains no proofs")]
    EmptyFile,

    #[error("Proof index {index} out of range ({num_proofs} proofs)")]
    ProofIndexOutOfRange { index: usize, num_proofs: usize },

    #[error("Checksum mismatch at proof {index}")]
    ChecksumMismatch { index: usize },

    #[error("Maximum nesting depth {0} exceeded")]
    MaxNestingDepthExceeded(u32),

    #[error("Trailing bytes after {0}")]
    TrailingBytes(&'static str),
}

impl From<BitcoinIoError> for Error {
    fn from(e: BitcoinIoError) -> Self {
        Error::Io(e)
    }
}
