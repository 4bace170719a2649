use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, RwLock};

use crate::context::Context;
use crate::error::{StorageError, StorageResult};
use crate::object::{ClosedFlag, Object, ObjectRef, ObjectWriter, WriterState};
use crate::registry::Driver;

/// An object whose bytes are held in memory.
#[derive(Debug)]
pub struct BytesObject {
    url: String,
    data: Arc<[u8]>,
    closed: ClosedFlag,
}

impl BytesObject {
    pub fn new(url: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: url.into(),
            data: data.into(),
            closed: ClosedFlag::default(),
        }
    }
}

impl Object for BytesObject {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        self.closed.ensure_open(&self.url)?;
        let len = self.data.len() as u64;
        if off >= len {
            return Ok(0);
        }
        let start = off as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.close(&self.url)
    }
}

type Objects = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// `mem:` driver: a process-local map from URL to immutable bytes.
///
/// Intended for tests and embedding. Writers publish into the map on commit.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    objects: Objects,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `data` at `url`, replacing any previous object.
    pub fn insert(&self, url: &str, data: impl Into<Arc<[u8]>>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(url.to_string(), data.into());
    }

    /// Number of published objects.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("object_count", &self.len())
            .finish()
    }
}

impl Driver for MemoryDriver {
    fn open(&self, ctx: &Context, url: &str, _size_hint: Option<u64>) -> StorageResult<ObjectRef> {
        ctx.check()?;
        let objects = self.objects.read().expect("lock poisoned");
        let data = objects
            .get(url)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        Ok(Arc::new(BytesObject::new(url, data)))
    }

    fn create(&self, ctx: &Context, url: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        ctx.check()?;
        Ok(Box::new(MemoryWriter {
            url: url.to_string(),
            buf: Vec::new(),
            objects: Arc::clone(&self.objects),
            state: WriterState::Open,
        }))
    }
}

/// Buffers writes and publishes them into a [`MemoryDriver`] on commit.
pub struct MemoryWriter {
    url: String,
    buf: Vec<u8>,
    objects: Objects,
    state: WriterState,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.state.ensure_writable(&self.url)?;
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryWriter {
    fn commit(&mut self) -> StorageResult<String> {
        self.state.begin_commit(&self.url)?;
        let data: Arc<[u8]> = std::mem::take(&mut self.buf).into();
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(self.url.clone(), data);
        self.state = WriterState::Committed;
        Ok(self.url.clone())
    }

    fn abort(&mut self) -> StorageResult<()> {
        if self.state == WriterState::Open {
            self.buf.clear();
            self.state = WriterState::Aborted;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::read_all;

    #[test]
    fn open_missing_is_not_found() {
        let driver = MemoryDriver::new();
        let err = driver.open(&Context::background(), "mem://nope", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn abort_hides_partial_object() {
        let driver = MemoryDriver::new();
        let ctx = Context::background();
        let mut w = driver.create(&ctx, "mem://x").unwrap();
        w.write_all(b"partial").unwrap();
        w.abort().unwrap();
        assert!(driver.open(&ctx, "mem://x", None).is_err());
        let err = w.commit().unwrap_err();
        assert!(matches!(err, StorageError::CommitAborted(_)));
    }

    #[test]
    fn write_after_commit_fails() {
        let driver = MemoryDriver::new();
        let mut w = driver.create(&Context::background(), "mem://y").unwrap();
        w.write_all(b"a").unwrap();
        w.commit().unwrap();
        assert!(w.write_all(b"b").is_err());
        assert!(matches!(w.commit(), Err(StorageError::Closed(_))));
    }

    #[test]
    fn closed_object_rejects_reads() {
        let driver = MemoryDriver::new();
        driver.insert("mem://z", b"zz".to_vec());
        let obj = driver.open(&Context::background(), "mem://z", None).unwrap();
        assert_eq!(read_all(obj.as_ref()).unwrap(), b"zz");
        obj.close().unwrap();
        let mut buf = [0u8; 1];
        assert!(matches!(obj.read_at(&mut buf, 0), Err(StorageError::Closed(_))));
    }
}
