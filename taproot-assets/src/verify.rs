//! Host-side verification utilities backed by bitcoin/secp256k1.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use bitcoin::block::Header;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{self, PublicKey as SecpPublicKey, Scalar, Secp256k1};
use bitcoin::TapNodeHash;
use rayon::prelude::*;
use taproot_assets_core::verify::{self, AssetSnapshot, ChainBridge, ChainError, VerifierCtx};
use taproot_assets_core::{OpsError, TaprootOps};
use taproot_assets_types::asset::SerializedKey;
use taproot_assets_types::file::File;

/// Taproot operations implemented with bitcoin/secp256k1 types.
#[derive(Debug)]
pub struct BitcoinTaprootOps {
    /// Secp256k1 context used for verification-only operations.
    secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl BitcoinTaprootOps {
    /// Creates a new Taproot operations backend.
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for BitcoinTaprootOps {
    fn default() -> Self {
        Self::new()
    }
}

impl TaprootOps for BitcoinTaprootOps {
    type PubKey = SecpPublicKey;

    fn parse_group_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError> {
        SecpPublicKey::from_slice(&key.0).map_err(|_| OpsError::InvalidRawGroupKey)
    }

    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError> {
        SecpPublicKey::from_slice(&key.0).map_err(|_| OpsError::InvalidInternalKey)
    }

    fn add_tweak(&self, pubkey: &Self::PubKey, tweak: [u8; 32]) -> Result<Self::PubKey, OpsError> {
        let tweak = Scalar::from_be_bytes(tweak).map_err(|_| OpsError::TweakOutOfRange)?;
        pubkey
            .add_exp_tweak(&self.secp, &tweak)
            .map_err(|_| OpsError::InvalidKeyTweak)
    }

    fn serialize_key(&self, pubkey: &Self::PubKey) -> SerializedKey {
        SerializedKey(pubkey.serialize())
    }

    /// Computes the Taproot output key for an internal key and optional tapscript root.
    fn taproot_output_key(
        &self,
        internal_key: &Self::PubKey,
        tapscript_root: Option<[u8; 32]>,
    ) -> Result<SerializedKey, OpsError> {
        let merkle_root = tapscript_root.map(TapNodeHash::from_byte_array);
        let (xonly_key, _) = internal_key.x_only_public_key();
        let (tweaked, parity) = xonly_key.tap_tweak(&self.secp, merkle_root);
        let output_key =
            SecpPublicKey::from_x_only_public_key(tweaked.to_x_only_public_key(), parity);

        Ok(SerializedKey(output_key.serialize()))
    }
}

/// Chain bridge that remembers every header it resolved. Headers are
/// immutable once buried, so the cache is never invalidated; reorg handling
/// is left to the wrapped bridge.
#[derive(Debug)]
pub struct CachingChainBridge<B> {
    inner: B,
    headers: RwLock<HashMap<u32, Header>>,
}

impl<B: ChainBridge> CachingChainBridge<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            headers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached headers.
    pub fn cached(&self) -> usize {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<B: ChainBridge> ChainBridge for CachingChainBridge<B> {
    fn block_header_by_height(&self, height: u32) -> Result<Header, ChainError> {
        if let Some(header) = self
            .headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&height)
        {
            return Ok(*header);
        }

        let header = self.inner.block_header_by_height(height)?;
        log::debug!("Caching block header at height {}", height);
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(height, header);
        Ok(header)
    }
}

/// Verifies a proof file with the bitcoin backend.
pub fn verify_file(file: &File, ctx: &VerifierCtx<'_>) -> Result<AssetSnapshot, verify::Error> {
    verify::verify_file(&BitcoinTaprootOps::new(), file, ctx)
}

/// Verifies independent proof files in parallel. Results are returned in
/// the order of `files`.
pub fn verify_files_parallel<O>(
    ops: &O,
    files: &[File],
    ctx: &VerifierCtx<'_>,
) -> Vec<Result<AssetSnapshot, verify::Error>>
where
    O: TaprootOps + Sync,
{
    log::debug!("Verifying {} proof files in parallel", files.len());
    files
        .par_iter()
        .map(|file| verify::verify_file(ops, file, ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bitcoin::block::Version;
    use bitcoin::{BlockHash, CompactTarget, TxMerkleNode};
    use taproot_assets_types::asset::NUMS_KEY;

    struct CountingBridge {
        calls: AtomicUsize,
    }

    impl ChainBridge for CountingBridge {
        fn block_header_by_height(&self, height: u32) -> Result<Header, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if height > 10 {
                return Err(ChainError::HeaderNotFound(height));
            }
            Ok(Header {
                version: Version::TWO,
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: height,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce: 0,
            })
        }
    }

    #[test]
    fn caching_bridge_hits_inner_once() {
        let bridge = CachingChainBridge::new(CountingBridge {
            calls: AtomicUsize::new(0),
        });
        assert_eq!(bridge.block_header_by_height(3).unwrap().time, 3);
        assert_eq!(bridge.block_header_by_height(3).unwrap().time, 3);
        assert_eq!(bridge.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.cached(), 1);

        assert_eq!(
            bridge.block_header_by_height(11),
            Err(ChainError::HeaderNotFound(11))
        );
        assert_eq!(bridge.cached(), 1);
    }

    #[test]
    fn ops_reject_invalid_keys() {
        let ops = BitcoinTaprootOps::new();
        let bad = SerializedKey([0u8; 33]);
        assert_eq!(ops.parse_group_key(&bad), Err(OpsError::InvalidRawGroupKey));
        assert_eq!(
            ops.parse_internal_key(&bad),
            Err(OpsError::InvalidInternalKey)
        );

        let nums = ops.parse_internal_key(&NUMS_KEY).unwrap();
        assert_eq!(ops.serialize_key(&nums), NUMS_KEY);
        assert_eq!(
            ops.add_tweak(&nums, [0xff; 32]),
            Err(OpsError::TweakOutOfRange)
        );
    }

    #[test]
    fn output_key_depends_on_tapscript_root() {
        let ops = BitcoinTaprootOps::new();
        let nums = ops.parse_internal_key(&NUMS_KEY).unwrap();
        let bip86 = ops.taproot_output_key(&nums, None).unwrap();
        let committed = ops.taproot_output_key(&nums, Some([7u8; 32])).unwrap();
        assert_ne!(bip86, committed);
        assert_eq!(ops.taproot_output_key(&nums, None).unwrap(), bip86);
    }
}
