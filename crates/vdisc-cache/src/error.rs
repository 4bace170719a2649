use std::path::PathBuf;

use thiserror::Error;
use vdisc_storage::StorageError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid GC threshold {0:?}")]
    InvalidThreshold(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CacheError> for StorageError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Storage(e) => e,
            CacheError::Io(e) => StorageError::Io(e),
            other => StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
