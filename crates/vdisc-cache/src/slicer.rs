use std::sync::Arc;

use vdisc_storage::{Object, ObjectRef, StorageResult};

/// A cache tier that hands out block-sized views of objects.
pub trait Slicer: Send + Sync {
    /// The fixed block size.
    fn bsize(&self) -> u64;

    /// A lazy handle for `[off, min(off + bsize, obj.size()))` of `obj`.
    ///
    /// `off` must be block aligned. Nothing is read until the slice is.
    fn slice(&self, obj: &ObjectRef, off: u64) -> Arc<dyn Slice>;
}

/// A block of an object, addressable as its own object.
pub trait Slice: Object {
    /// Populate the cache for this block without copying to a caller.
    fn read_ahead(&self) -> StorageResult<()>;

    /// View this slice as a plain object.
    fn into_object(self: Arc<Self>) -> ObjectRef;
}

/// Identity of a slice: `"{url}[{off},{off+len})"`.
pub fn slice_id(url: &str, off: u64, len: u64) -> String {
    format!("{url}[{off},{})", off + len)
}

/// Length of the slice of an `size`-byte object starting at `off`.
pub(crate) fn slice_len(bsize: u64, size: u64, off: u64) -> u64 {
    bsize.min(size.saturating_sub(off))
}
