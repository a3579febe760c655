//! The storage capability consumed by the archiver. Backends only need to be
//! an ordered-enough key-value store: point reads and writes plus deletion of
//! every key under a prefix.

use async_trait::async_trait;
use thiserror::Error;
use vigil_common::impl_error_from;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("embedded store error: {0}")]
    Kv(kv::Error),
    #[error("remote store error: {0}")]
    Remote(String),
    #[error("store is unavailable")]
    Unavailable,
}

impl_error_from!(StoreError, kv::Error, Kv);

/// Key-value operations the archive needs from a backend.
///
/// Keys are binary-safe strings; values are opaque byte records. All
/// operations are fallible and the archiver treats every failure as an
/// observability loss, never as a fatal condition.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Deletes every record whose key starts with `prefix`, returning how
    /// many records were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    fn is_healthy(&self) -> bool;
}

/// The backend used when archiving is disabled. Every operation fails, which
/// the archiver folds into its `false`/`0` results.
pub struct NullStore;

#[async_trait]
impl ArchiveStore for NullStore {
    async fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable)
    }

    fn is_healthy(&self) -> bool {
        false
    }
}
