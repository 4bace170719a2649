use thiserror::Error;
use vdisc_storage::StorageError;

#[derive(Debug, Error)]
pub enum IsoError {
    /// Bytes on the image do not follow the format.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// A field or counter does not fit its encoding.
    #[error("overflow: {0}")]
    Overflow(String),

    /// Two entries of one directory share a name.
    #[error("{0}: already exists")]
    Collision(String),

    #[error("directory {path} encodes to {size} bytes, more than one extent can hold")]
    DirectoryTooBig { path: String, size: u64 },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("{0}: no such file or directory")]
    NotFound(String),

    #[error("{0}: not a directory")]
    NotADirectory(String),

    #[error("{0}: is a directory")]
    IsADirectory(String),

    #[error("{0}: too many levels of symbolic links")]
    Loop(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IsoError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        IsoError::FormatMismatch(msg.into())
    }

    pub(crate) fn overflow(msg: impl Into<String>) -> Self {
        IsoError::Overflow(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            IsoError::NotFound(_) => true,
            IsoError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type IsoResult<T> = Result<T, IsoError>;
