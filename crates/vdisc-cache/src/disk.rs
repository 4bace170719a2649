use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use serde::Serialize;
use tracing::{debug, warn};
use vdisc_storage::drivers::FileWriter;
use vdisc_storage::{read_exact_at, Object, ObjectRef, ObjectWriter, StorageResult};
use walkdir::WalkDir;
use xxhash_rust::xxh64::xxh64;

use crate::error::{CacheError, CacheResult};
use crate::pool::BufferPool;
use crate::slicer::{slice_id, slice_len, Slice, Slicer};

/// Extended attribute holding the JSON cache key of an entry.
pub const KEY_XATTR: &str = "user.vdisc-cache-key";

/// Extended attribute holding the little-endian xxh64 of an entry.
pub const CHECKSUM_XATTR: &str = "user.vdisc-cache-checksum";

const LAYOUT_DIR: &str = "v0";
const LOCK_PREFIX: &str = ".lock.";
const TMP_PREFIX: &str = ".tmp.";
const MAX_IDLE_BUFFERS: usize = 16;

#[derive(Serialize)]
struct CacheKey<'a> {
    url: &'a str,
    off: u64,
    len: u64,
}

/// The JSON key identifying `[off, off + len)` of `url`.
pub fn cache_key(url: &str, off: u64, len: u64) -> String {
    // Serializing a struct of a string and two integers cannot fail.
    serde_json::to_string(&CacheKey { url, off, len }).unwrap_or_default()
}

/// Returns `true` for lock and temp files, which are never cache entries.
pub(crate) fn is_bookkeeping(name: &str) -> bool {
    name.starts_with(LOCK_PREFIX) || name.starts_with(TMP_PREFIX)
}

struct DiskInner {
    root: PathBuf,
    bsize: u64,
    pool: BufferPool,
    pending: Mutex<usize>,
    idle: Condvar,
}

impl DiskInner {
    fn writeback_started(&self) {
        *self.pending.lock().expect("lock poisoned") += 1;
    }

    fn writeback_finished(&self) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Block cache persisted as one file per block.
///
/// Layout: `root/v0/{md5[:2]}/{md5[2:]}` where `md5` is the lowercase hex
/// digest of the entry's JSON key. The key and an xxh64 checksum are stored
/// as extended attributes. Fills of one key are serialized across processes
/// by an advisory lock on `root/v0/{md5[:2]}/.lock.{md5[2:]}`.
#[derive(Clone)]
pub struct DiskCache {
    inner: Arc<DiskInner>,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, bsize: u64) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(LAYOUT_DIR))?;
        Ok(Self {
            inner: Arc::new(DiskInner {
                root,
                bsize,
                pool: BufferPool::new(bsize as usize, MAX_IDLE_BUFFERS),
                pending: Mutex::new(0),
                idle: Condvar::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Directory holding the hashed entries.
    pub fn entries_dir(&self) -> PathBuf {
        self.inner.root.join(LAYOUT_DIR)
    }

    /// Data and lock paths for a JSON key.
    pub fn paths_for_key(&self, key: &str) -> (PathBuf, PathBuf) {
        let digest = hex::encode(md5::compute(key.as_bytes()).0);
        let (prefix, suffix) = digest.split_at(2);
        let dir = self.entries_dir().join(prefix);
        let data = dir.join(suffix);
        let lock = dir.join(format!("{LOCK_PREFIX}{suffix}"));
        (data, lock)
    }

    /// Block until every asynchronous write-back has finished.
    pub fn wait_for_writeback(&self) {
        let mut pending = self.inner.pending.lock().expect("lock poisoned");
        while *pending > 0 {
            pending = self.inner.idle.wait(pending).expect("lock poisoned");
        }
    }

    /// Every cache entry file, in directory order. Lock and temp files are
    /// skipped.
    pub(crate) fn entry_files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(self.entries_dir())
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| !is_bookkeeping(&e.file_name().to_string_lossy()))
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("root", &self.inner.root)
            .field("bsize", &self.inner.bsize)
            .finish()
    }
}

impl Slicer for DiskCache {
    fn bsize(&self) -> u64 {
        self.inner.bsize
    }

    fn slice(&self, obj: &ObjectRef, off: u64) -> Arc<dyn Slice> {
        let len = slice_len(self.inner.bsize, obj.size(), off);
        let key = cache_key(obj.url(), off, len);
        let (path, lock_path) = self.paths_for_key(&key);
        Arc::new(DiskSlice {
            inner: Arc::clone(&self.inner),
            id: slice_id(obj.url(), off, len),
            key,
            path,
            lock_path,
            obj: Arc::clone(obj),
            off,
            len,
        })
    }
}

/// A block served from a [`DiskCache`].
pub struct DiskSlice {
    inner: Arc<DiskInner>,
    id: String,
    key: String,
    path: PathBuf,
    lock_path: PathBuf,
    obj: ObjectRef,
    off: u64,
    len: u64,
}

/// A filled block waiting to be persisted. Holds the fill lock until done.
struct WriteBack {
    path: PathBuf,
    key: String,
    buf: Vec<u8>,
    len: usize,
    lock: File,
}

impl DiskSlice {
    /// The JSON key of this slice.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Where this slice's entry lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve from an existing entry whose key attribute matches. `None`
    /// means absent, a hash collision, or a truncated entry.
    fn try_serve(&self, dst: &mut [u8], off: u64) -> CacheResult<Option<usize>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match xattr::FileExt::get_xattr(&file, KEY_XATTR)? {
            Some(stored) if stored == self.key.as_bytes() => {}
            stored => {
                debug!(
                    path = %self.path.display(),
                    stored = ?stored.map(|s| String::from_utf8_lossy(&s).into_owned()),
                    "cache key mismatch"
                );
                return Ok(None);
            }
        }
        if file.metadata()?.len() != self.len {
            return Ok(None);
        }
        let want = (self.len - off).min(dst.len() as u64) as usize;
        let mut total = 0;
        while total < want {
            match file.read_at(&mut dst[total..want], off + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(total))
    }

    fn lock(&self) -> CacheResult<File> {
        if let Some(dir) = self.lock_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        fs2::FileExt::lock_exclusive(&lock).map_err(|source| CacheError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        Ok(lock)
    }

    /// Fill the entry from the source under the per-key lock, serve the
    /// caller from memory, and persist in the background.
    fn fill(&self, dst: &mut [u8], off: u64) -> CacheResult<usize> {
        let lock = self.lock()?;

        // Another filler may have finished while we waited.
        if let Some(n) = self.try_serve(dst, off)? {
            return Ok(n);
        }

        let len = self.len as usize;
        let mut buf = self.inner.pool.get();
        if let Err(e) = read_exact_at(self.obj.as_ref(), &mut buf[..len], self.off) {
            self.inner.pool.put(buf);
            return Err(e.into());
        }
        debug!(key = %self.key, "filled disk cache block");

        let start = off as usize;
        let n = dst.len().min(len - start);
        dst[..n].copy_from_slice(&buf[start..start + n]);

        self.spawn_writeback(WriteBack {
            path: self.path.clone(),
            key: self.key.clone(),
            buf,
            len,
            lock,
        });
        Ok(n)
    }

    fn spawn_writeback(&self, job: WriteBack) {
        let inner = Arc::clone(&self.inner);
        inner.writeback_started();
        let spawned = thread::Builder::new()
            .name("vdisc-writeback".into())
            .spawn({
                let inner = Arc::clone(&inner);
                move || {
                    let WriteBack {
                        path,
                        key,
                        buf,
                        len,
                        lock,
                    } = job;
                    if let Err(e) = persist(&path, &key, &buf[..len]) {
                        warn!(path = %path.display(), error = %e, "disk cache write-back failed");
                    }
                    drop(lock);
                    inner.pool.put(buf);
                    inner.writeback_finished();
                }
            });
        if let Err(e) = spawned {
            // The closure, lock included, was dropped with the error.
            warn!(error = %e, "could not spawn disk cache write-back");
            inner.writeback_finished();
        }
    }

    fn read(&self, dst: &mut [u8], off: u64) -> CacheResult<usize> {
        if let Some(n) = self.try_serve(dst, off)? {
            return Ok(n);
        }
        self.fill(dst, off)
    }
}

/// Write an entry beside its final path, tag it, and rename it into place.
fn persist(path: &Path, key: &str, data: &[u8]) -> StorageResult<()> {
    let display = path.to_string_lossy();
    let mut w = FileWriter::create(&display, path)?;
    let result = (|| {
        w.write_all(data)?;
        w.set_xattr(KEY_XATTR, key.as_bytes())?;
        w.set_xattr(CHECKSUM_XATTR, &xxh64(data, 0).to_le_bytes())?;
        w.commit().map(|_| ())
    })();
    if result.is_err() {
        let _ = w.abort();
    }
    result
}

impl Object for DiskSlice {
    fn url(&self) -> &str {
        &self.id
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        if off >= self.len || buf.is_empty() {
            return Ok(0);
        }
        Ok(self.read(buf, off)?)
    }
}

impl Slice for DiskSlice {
    fn read_ahead(&self) -> StorageResult<()> {
        if self.len == 0 {
            return Ok(());
        }
        self.read(&mut [], 0)?;
        Ok(())
    }

    fn into_object(self: Arc<Self>) -> ObjectRef {
        self
    }
}
