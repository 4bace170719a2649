use std::io;

/// Errors from storage drivers and objects.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The URL does not name an existing object.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The object or writer has already been closed.
    #[error("use of closed object: {0}")]
    Closed(String),

    /// The source returned fewer bytes than it declared.
    #[error("unexpected EOF")]
    UnexpectedEof,

    /// The operation's context was canceled.
    #[error("operation canceled")]
    Canceled,

    /// The operation's context deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// `commit` was called on a writer that had been aborted.
    #[error("commit called on aborted writer: {0}")]
    CommitAborted(String),

    /// No driver is registered for the URL's scheme.
    #[error("no driver registered for scheme {0:?}")]
    UnsupportedScheme(String),

    /// A driver was registered twice for one scheme.
    #[error("driver already registered for scheme {0:?}")]
    DuplicateDriver(String),

    /// The URL could not be parsed by its driver.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The driver does not implement the requested capability.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Returns `true` if this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => e,
            StorageError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            StorageError::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            StorageError::DeadlineExceeded => io::Error::new(io::ErrorKind::TimedOut, err),
            StorageError::Canceled => io::Error::new(io::ErrorKind::Interrupted, err),
            StorageError::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
