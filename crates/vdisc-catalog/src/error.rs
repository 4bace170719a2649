use thiserror::Error;
use vdisc_cache::CacheError;
use vdisc_iso9660::IsoError;
use vdisc_storage::StorageError;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog bytes do not decode, or decode to something inconsistent.
    #[error("catalog format error: {0}")]
    Format(String),

    /// No extent starts at the requested LBA.
    #[error("no extent starts at LBA {0}")]
    NoExtent(u32),

    #[error("invalid burn entry on line {line}: {reason}")]
    InvalidEntry { line: u64, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ISO 9660 error: {0}")]
    Iso(#[from] IsoError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        CatalogError::Format(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            CatalogError::Storage(e) => e.is_not_found(),
            CatalogError::Iso(e) => e.is_not_found(),
            CatalogError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
