use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};

/// A sized, random-access blob addressed by URL.
///
/// All implementations must satisfy these invariants:
/// - `read_at` is independent of any cursor and safe to call concurrently.
/// - `read_at` fills `buf` completely unless the end of the object is
///   reached; a short count means EOF, and `off >= size()` returns `Ok(0)`.
/// - After `close`, every call fails with [`StorageError::Closed`].
pub trait Object: Send + Sync {
    /// The URL this object was opened from.
    fn url(&self) -> &str;

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Read into `buf` starting at byte `off`. Returns the number of bytes read.
    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize>;

    /// Release the object's resources. Later calls fail with `Closed`.
    fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Shared handle to an object.
pub type ObjectRef = Arc<dyn Object>;

impl std::fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("url", &self.url())
            .field("size", &self.size())
            .finish()
    }
}

/// Streamed writer that publishes its object atomically.
///
/// Exactly one of [`commit`](Self::commit) or [`abort`](Self::abort) ends the
/// writer. Until `commit` returns, no reader can observe the object.
pub trait ObjectWriter: Write + Send {
    /// Publish the written bytes. Returns the final URL, which may carry a
    /// version identifier.
    fn commit(&mut self) -> StorageResult<String>;

    /// Discard everything written. Idempotent.
    fn abort(&mut self) -> StorageResult<()>;

    /// Attach an extended attribute to the object being written.
    fn set_xattr(&mut self, name: &str, _value: &[u8]) -> StorageResult<()> {
        Err(StorageError::Unsupported(format!("set_xattr({name})")))
    }
}

/// Read until `buf` is full or the object ends. Returns bytes read.
pub fn read_full_at(obj: &dyn Object, buf: &mut [u8], off: u64) -> StorageResult<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = obj.read_at(&mut buf[total..], off + total as u64)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Read exactly `buf.len()` bytes or fail with `UnexpectedEof`.
pub fn read_exact_at(obj: &dyn Object, buf: &mut [u8], off: u64) -> StorageResult<()> {
    if read_full_at(obj, buf, off)? != buf.len() {
        return Err(StorageError::UnexpectedEof);
    }
    Ok(())
}

/// Read an entire object into memory.
pub fn read_all(obj: &dyn Object) -> StorageResult<Vec<u8>> {
    let size = usize::try_from(obj.size())
        .map_err(|_| StorageError::Unsupported(format!("{} too large to buffer", obj.url())))?;
    let mut buf = vec![0u8; size];
    let n = read_full_at(obj, &mut buf, 0)?;
    if n != size {
        return Err(StorageError::UnexpectedEof);
    }
    Ok(buf)
}

/// Open/closed latch shared by driver objects.
#[derive(Debug, Default)]
pub(crate) struct ClosedFlag(AtomicBool);

impl ClosedFlag {
    pub(crate) fn ensure_open(&self, url: &str) -> StorageResult<()> {
        if self.0.load(Ordering::Acquire) {
            return Err(StorageError::Closed(url.to_string()));
        }
        Ok(())
    }

    /// Mark closed. Fails if it already was.
    pub(crate) fn close(&self, url: &str) -> StorageResult<()> {
        if self.0.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed(url.to_string()));
        }
        Ok(())
    }
}

/// Lifecycle of an [`ObjectWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WriterState {
    Open,
    Committed,
    Aborted,
}

impl WriterState {
    /// Validate a transition to `Committed`.
    pub(crate) fn begin_commit(&self, url: &str) -> StorageResult<()> {
        match self {
            Self::Open => Ok(()),
            Self::Aborted => Err(StorageError::CommitAborted(url.to_string())),
            Self::Committed => Err(StorageError::Closed(url.to_string())),
        }
    }

    pub(crate) fn ensure_writable(&self, url: &str) -> std::io::Result<()> {
        match self {
            Self::Open => Ok(()),
            _ => Err(StorageError::Closed(url.to_string()).into()),
        }
    }
}
