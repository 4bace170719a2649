use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;
use vdisc_storage::{concat_concurrent, read_full_at, Object, ObjectRef, StorageResult};

use crate::config::{CacheBackend, CacheConfig};
use crate::disk::DiskCache;
use crate::error::{CacheError, CacheResult};
use crate::memory::MemoryCache;
use crate::readahead::ReadAhead;
use crate::slicer::Slicer;

/// Wraps objects so their reads are served through a [`Slicer`].
///
/// One `Cache` is shared by every object of a disc; the read-ahead token pool
/// is shared with it.
#[derive(Clone)]
pub struct Cache {
    slicer: Option<Arc<dyn Slicer>>,
    tokens: Arc<Semaphore>,
    window: u64,
}

impl Cache {
    pub fn new(slicer: Arc<dyn Slicer>, readahead_window: u64, readahead_tokens: usize) -> Self {
        Self {
            slicer: Some(slicer),
            tokens: Arc::new(Semaphore::new(readahead_tokens)),
            window: readahead_window,
        }
    }

    /// A cache that hands objects back untouched.
    pub fn passthrough() -> Self {
        Self {
            slicer: None,
            tokens: Arc::new(Semaphore::new(0)),
            window: 0,
        }
    }

    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let slicer: Arc<dyn Slicer> = match &config.backend {
            CacheBackend::None => return Ok(Self::passthrough()),
            CacheBackend::Memory { bsize, bcount } => Arc::new(MemoryCache::new(*bsize, *bcount)),
            CacheBackend::Disk { root, bsize } => Arc::new(DiskCache::new(root.clone(), *bsize)?),
        };
        debug!(backend = ?config.backend, "cache configured");
        Ok(Self::new(slicer, config.readahead_window, config.readahead_tokens))
    }

    pub fn slicer(&self) -> Option<&Arc<dyn Slicer>> {
        self.slicer.as_ref()
    }

    /// Read-ahead tokens not currently held by a prefetch.
    pub fn available_tokens(&self) -> usize {
        self.tokens.available_permits()
    }

    pub fn with_caching(&self, obj: ObjectRef) -> ObjectRef {
        match &self.slicer {
            None => obj,
            Some(slicer) => Arc::new(CachedObject {
                readahead: ReadAhead::new(
                    Arc::clone(slicer),
                    Arc::clone(&obj),
                    Arc::clone(&self.tokens),
                    self.window,
                ),
                slicer: Arc::clone(slicer),
                inner: obj,
            }),
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("bsize", &self.slicer.as_ref().map(|s| s.bsize()))
            .field("window", &self.window)
            .finish()
    }
}

impl TryFrom<&CacheConfig> for Cache {
    type Error = CacheError;

    fn try_from(config: &CacheConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}

/// An object whose reads go through a slicer and feed a read-ahead
/// controller.
pub struct CachedObject {
    inner: ObjectRef,
    slicer: Arc<dyn Slicer>,
    readahead: ReadAhead,
}

impl CachedObject {
    pub fn inner(&self) -> &ObjectRef {
        &self.inner
    }
}

impl Object for CachedObject {
    fn url(&self) -> &str {
        self.inner.url()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        let size = self.inner.size();
        if off >= size || buf.is_empty() {
            return Ok(0);
        }
        let bsize = self.slicer.bsize();
        let end = size.min(off.saturating_add(buf.len() as u64));
        let first = off / bsize * bsize;

        let mut slices = Vec::new();
        let mut block = first;
        while block < end {
            slices.push(self.slicer.slice(&self.inner, block).into_object());
            block += bsize;
        }
        let view = match slices.len() {
            1 => slices.remove(0),
            _ => concat_concurrent(slices),
        };

        let want = (end - off) as usize;
        let n = read_full_at(view.as_ref(), &mut buf[..want], off - first)?;
        self.readahead.update(off, n);
        Ok(n)
    }

    fn close(&self) -> StorageResult<()> {
        self.inner.close()
    }
}
