use crate::error::StorageResult;
use crate::object::{Object, ObjectRef};

/// A bounded window `[base, base + len)` of another object, addressed from 0.
#[derive(Debug)]
pub struct SectionObject {
    url: String,
    inner: ObjectRef,
    base: u64,
    len: u64,
}

impl SectionObject {
    /// View `len` bytes of `inner` starting at `base`. The window is clipped
    /// to the end of `inner`.
    pub fn new(inner: ObjectRef, base: u64, len: u64) -> Self {
        let len = len.min(inner.size().saturating_sub(base));
        let url = format!("{}[{},{})", inner.url(), base, base + len);
        Self {
            url,
            inner,
            base,
            len,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn inner(&self) -> &ObjectRef {
        &self.inner
    }
}

impl Object for SectionObject {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        if off >= self.len {
            return Ok(0);
        }
        let avail = (self.len - off).min(buf.len() as u64) as usize;
        self.inner.read_at(&mut buf[..avail], self.base + off)
    }
}
