use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::trace;
use vdisc_storage::{read_exact_at, Object, ObjectRef, StorageResult};

use crate::slicer::{slice_id, slice_len, Slice, Slicer};

/// One block buffer and the slice it currently holds.
struct Buffer {
    key: Option<String>,
    data: Vec<u8>,
    len: usize,
}

/// Which buffer holds which slice, plus buffers never handed out yet.
struct PoolIndex {
    lru: LruCache<String, usize>,
    free: Vec<usize>,
}

struct MemoryPool {
    bsize: u64,
    index: Mutex<PoolIndex>,
    buffers: Vec<Mutex<Buffer>>,
}

impl MemoryPool {
    /// Pick the buffer for `key`, evicting the least recently used one if
    /// the pool is full. Only the index mutex is held here.
    fn assign(&self, key: &str) -> usize {
        let mut index = self.index.lock().expect("lock poisoned");
        if let Some(&i) = index.lru.get(key) {
            return i;
        }
        let i = match index.free.pop() {
            Some(i) => i,
            None => match index.lru.pop_lru() {
                Some((victim, i)) => {
                    trace!(%victim, buffer = i, "evicting memory cache block");
                    i
                }
                // The pool always has at least one buffer, so the LRU is
                // non-empty whenever the free list is.
                None => 0,
            },
        };
        index.lru.put(key.to_string(), i);
        i
    }

    /// Serve `dst` from `key`'s block at `off`, filling it with `filler` on a
    /// miss. The per-buffer mutex serializes fills of one buffer.
    fn read_at_cached<F>(
        &self,
        key: &str,
        size: usize,
        dst: &mut [u8],
        off: usize,
        filler: F,
    ) -> StorageResult<usize>
    where
        F: FnOnce(&mut [u8]) -> StorageResult<()>,
    {
        let i = self.assign(key);
        let mut buf = self.buffers[i].lock().expect("lock poisoned");
        if buf.key.as_deref() != Some(key) {
            buf.key = None;
            filler(&mut buf.data[..size])?;
            buf.key = Some(key.to_string());
            buf.len = size;
        }
        if off >= buf.len {
            return Ok(0);
        }
        let n = dst.len().min(buf.len - off);
        dst[..n].copy_from_slice(&buf.data[off..off + n]);
        Ok(n)
    }
}

/// Fixed pool of `bcount` buffers of `bsize` bytes, reused in LRU order.
#[derive(Clone)]
pub struct MemoryCache {
    pool: Arc<MemoryPool>,
}

impl MemoryCache {
    /// Allocate the pool. `bcount` is raised to at least one buffer.
    pub fn new(bsize: u64, bcount: usize) -> Self {
        let bcount = bcount.max(1);
        let buffers = (0..bcount)
            .map(|_| {
                Mutex::new(Buffer {
                    key: None,
                    data: vec![0u8; bsize as usize],
                    len: 0,
                })
            })
            .collect();
        let index = PoolIndex {
            lru: LruCache::unbounded(),
            free: (0..bcount).rev().collect(),
        };
        Self {
            pool: Arc::new(MemoryPool {
                bsize,
                index: Mutex::new(index),
                buffers,
            }),
        }
    }

    pub fn bcount(&self) -> usize {
        self.pool.buffers.len()
    }

    /// Number of blocks currently indexed.
    pub fn cached_blocks(&self) -> usize {
        self.pool.index.lock().expect("lock poisoned").lru.len()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("bsize", &self.pool.bsize)
            .field("bcount", &self.bcount())
            .finish()
    }
}

impl Slicer for MemoryCache {
    fn bsize(&self) -> u64 {
        self.pool.bsize
    }

    fn slice(&self, obj: &ObjectRef, off: u64) -> Arc<dyn Slice> {
        let len = slice_len(self.pool.bsize, obj.size(), off);
        Arc::new(MemorySlice {
            pool: Arc::clone(&self.pool),
            key: slice_id(obj.url(), off, len),
            obj: Arc::clone(obj),
            off,
            len,
        })
    }
}

/// A block served from a [`MemoryCache`].
pub struct MemorySlice {
    pool: Arc<MemoryPool>,
    key: String,
    obj: ObjectRef,
    off: u64,
    len: u64,
}

impl MemorySlice {
    fn fill(&self, buf: &mut [u8]) -> StorageResult<()> {
        read_exact_at(self.obj.as_ref(), buf, self.off)
    }
}

impl Object for MemorySlice {
    fn url(&self) -> &str {
        &self.key
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        if off >= self.len {
            return Ok(0);
        }
        self.pool
            .read_at_cached(&self.key, self.len as usize, buf, off as usize, |b| self.fill(b))
    }
}

impl Slice for MemorySlice {
    fn read_ahead(&self) -> StorageResult<()> {
        if self.len == 0 {
            return Ok(());
        }
        self.pool
            .read_at_cached(&self.key, self.len as usize, &mut [], 0, |b| self.fill(b))
            .map(|_| ())
    }

    fn into_object(self: Arc<Self>) -> ObjectRef {
        self
    }
}
