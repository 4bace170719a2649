use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vdisc_storage::{BytesObject, Object, StorageResult};

/// Counts how many reads reach the source.
pub(crate) struct Counting {
    inner: BytesObject,
    reads: AtomicUsize,
}

impl Counting {
    pub(crate) fn new(url: &str, data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            inner: BytesObject::new(url, data.to_vec()),
            reads: AtomicUsize::new(0),
        })
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Object for Counting {
    fn url(&self) -> &str {
        self.inner.url()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(buf, off)
    }
}
