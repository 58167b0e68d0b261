//! Key/blob storage for proof files, addressed by locator hash.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;

pub mod retry;

pub use retry::{execute_with_retry, retry_delay, RetryConfig};

/// Fragments of backend errors that may carry hosts or credentials.
const CONNECTION_ERROR_PATTERNS: &[&str] = &[
    "failed to connect to",
    "dial tcp",
    "user=",
    "password=",
    "host=",
    "dbname=",
    "sslmode=",
    "connection refused",
    "no route to host",
    "password authentication failed",
];

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// A concurrent write conflicted with this one.
    #[error("serialization conflict: {0}")]
    Serialization(String),

    #[error("deadlock detected: {0}")]
    Deadlock(String),

    /// Stands in for errors that exposed connection details.
    #[error("database connection failed")]
    ConnectionFailed,

    #[error("archive backend error: {0}")]
    Backend(String),

    #[error("archive operation gave up after {0} attempts")]
    RetriesExceeded(u32),

    #[error("archive operation timed out after {0:?}")]
    Timeout(Duration),
}

impl ArchiveError {
    /// Serialization and deadlock errors go away when the operation is
    /// repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Deadlock(_))
    }
}

/// Wraps a backend error message, hiding it if it reveals connection details.
pub fn sanitize_error(message: &str) -> ArchiveError {
    if CONNECTION_ERROR_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
    {
        log::error!("Archive connection error (sanitized): {}", message);
        return ArchiveError::ConnectionFailed;
    }
    ArchiveError::Backend(message.to_string())
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => ArchiveError::Serialization(err.to_string()),
            io::ErrorKind::WouldBlock => ArchiveError::Deadlock(err.to_string()),
            _ => sanitize_error(&err.to_string()),
        }
    }
}

/// A store of proof file blobs. Both operations are atomic: a concurrent
/// `load` sees either no blob or the whole blob. Implementations may block,
/// async callers run them on the blocking pool.
pub trait ProofArchive: Send + Sync {
    fn store(&self, hash: &[u8; 32], blob: &[u8]) -> Result<(), ArchiveError>;

    /// Returns `None` if nothing is stored under `hash`.
    fn load(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, ArchiveError>;
}

impl<A: ProofArchive + ?Sized> ProofArchive for std::sync::Arc<A> {
    fn store(&self, hash: &[u8; 32], blob: &[u8]) -> Result<(), ArchiveError> {
        (**self).store(hash, blob)
    }

    fn load(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, ArchiveError> {
        (**self).load(hash)
    }
}

/// Archive kept in memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    proofs: RwLock<HashMap<[u8; 32], Vec<u8>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.proofs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProofArchive for MemoryArchive {
    fn store(&self, hash: &[u8; 32], blob: &[u8]) -> Result<(), ArchiveError> {
        self.proofs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*hash, blob.to_vec());
        Ok(())
    }

    fn load(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self
            .proofs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned())
    }
}

/// Archive storing one file per proof under `root_dir`, named by the hex
/// locator hash. Writes go to a temporary file that is renamed into place.
#[derive(Debug)]
pub struct FileArchive {
    root_dir: PathBuf,
    retry: RetryConfig,
}

const PROOF_FILE_EXT: &str = "assetproof";

impl FileArchive {
    /// Opens the archive, creating `root_dir` if needed.
    pub fn open(root_dir: impl AsRef<Path>, retry: RetryConfig) -> Result<Self, ArchiveError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)?;
        log::debug!("Opened file archive at {}", root_dir.display());
        Ok(Self { root_dir, retry })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn proof_path(&self, hash: &[u8; 32]) -> PathBuf {
        self.root_dir
            .join(hex::encode(hash))
            .with_extension(PROOF_FILE_EXT)
    }
}

impl ProofArchive for FileArchive {
    fn store(&self, hash: &[u8; 32], blob: &[u8]) -> Result<(), ArchiveError> {
        let path = self.proof_path(hash);
        let tmp_path = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        execute_with_retry(&self.retry, || {
            let written = fs::write(&tmp_path, blob).and_then(|()| fs::rename(&tmp_path, &path));
            if let Err(err) = written {
                if let Err(cleanup) = fs::remove_file(&tmp_path) {
                    log::debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
                }
                return Err(err.into());
            }
            Ok(())
        })
    }

    fn load(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, ArchiveError> {
        let path = self.proof_path(hash);
        execute_with_retry(&self.retry, || match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_connection_details() {
        let err = sanitize_error("failed to connect to host=db.internal user=admin password=hunter2");
        assert!(matches!(err, ArchiveError::ConnectionFailed));
        assert_eq!(err.to_string(), "database connection failed");

        let err = sanitize_error("disk full");
        assert_eq!(err.to_string(), "archive backend error: disk full");
    }

    #[test]
    fn io_errors_map_to_retry_classes() {
        let err: ArchiveError = io::Error::new(io::ErrorKind::Interrupted, "again").into();
        assert!(err.is_retryable());
        let err: ArchiveError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn memory_archive_overwrites() {
        let archive = MemoryArchive::new();
        assert!(archive.load(&[1; 32]).unwrap().is_none());
        archive.store(&[1; 32], b"one").unwrap();
        archive.store(&[1; 32], b"uno").unwrap();
        assert_eq!(archive.load(&[1; 32]).unwrap().unwrap(), b"uno");
        assert_eq!(archive.len(), 1);
    }
}
