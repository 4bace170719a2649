use std::fs::File;
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::context::Context;
use crate::error::{StorageError, StorageResult};
use crate::object::{ClosedFlag, Object, ObjectRef, ObjectWriter, WriterState};
use crate::registry::{scheme_of, Driver};

/// Driver for local files: `file://` URLs and bare paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileDriver;

impl FileDriver {
    /// The filesystem path named by `url`.
    pub fn path_of(url: &str) -> StorageResult<PathBuf> {
        match scheme_of(url) {
            Some(s) if s.eq_ignore_ascii_case("file") => {
                let parsed = url::Url::parse(url)
                    .map_err(|e| StorageError::invalid_url(url, e.to_string()))?;
                parsed
                    .to_file_path()
                    .map_err(|()| StorageError::invalid_url(url, "not a local file path"))
            }
            Some(other) => Err(StorageError::invalid_url(
                url,
                format!("scheme {other:?} is not a file URL"),
            )),
            None => Ok(PathBuf::from(url)),
        }
    }
}

impl Driver for FileDriver {
    fn open(&self, ctx: &Context, url: &str, size_hint: Option<u64>) -> StorageResult<ObjectRef> {
        ctx.check()?;
        let path = Self::path_of(url)?;
        Ok(Arc::new(FileObject::open(url, &path, size_hint)?))
    }

    fn create(&self, ctx: &Context, url: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        ctx.check()?;
        let path = Self::path_of(url)?;
        Ok(Box::new(FileWriter::create(url, &path)?))
    }
}

/// A local file read with positional reads.
#[derive(Debug)]
pub struct FileObject {
    url: String,
    file: File,
    size: u64,
    closed: ClosedFlag,
}

impl FileObject {
    pub fn open(url: &str, path: &Path, size_hint: Option<u64>) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(url.to_string()),
            _ => StorageError::Io(e),
        })?;
        let size = match size_hint {
            Some(size) => size,
            None => file.metadata()?.len(),
        };
        Ok(Self {
            url: url.to_string(),
            file,
            size,
            closed: ClosedFlag::default(),
        })
    }
}

impl Object for FileObject {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        self.closed.ensure_open(&self.url)?;
        if off >= self.size {
            return Ok(0);
        }
        let want = (self.size - off).min(buf.len() as u64) as usize;
        let mut total = 0;
        while total < want {
            match self.file.read_at(&mut buf[total..want], off + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.close(&self.url)
    }
}

/// Streams into a hidden temp file beside the destination and renames it
/// into place on commit.
pub struct FileWriter {
    url: String,
    path: PathBuf,
    tmp: Option<NamedTempFile>,
    state: WriterState,
}

impl FileWriter {
    pub fn create(url: &str, path: &Path) -> StorageResult<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let tmp = tempfile::Builder::new().prefix(".tmp.").tempfile_in(&dir)?;
        Ok(Self {
            url: url.to_string(),
            path: path.to_path_buf(),
            tmp: Some(tmp),
            state: WriterState::Open,
        })
    }

    fn tmp_mut(&mut self) -> io::Result<&mut NamedTempFile> {
        self.state.ensure_writable(&self.url)?;
        self.tmp
            .as_mut()
            .ok_or_else(|| StorageError::Closed(self.url.clone()).into())
    }
}

impl Write for FileWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.tmp_mut()?.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp_mut()?.flush()
    }
}

impl ObjectWriter for FileWriter {
    fn commit(&mut self) -> StorageResult<String> {
        self.state.begin_commit(&self.url)?;
        let mut tmp = self
            .tmp
            .take()
            .ok_or_else(|| StorageError::Closed(self.url.clone()))?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        self.state = WriterState::Committed;
        debug!(url = %self.url, "committed file object");
        Ok(self.url.clone())
    }

    fn abort(&mut self) -> StorageResult<()> {
        if self.state == WriterState::Open {
            // Dropping the temp file unlinks it.
            self.tmp = None;
            self.state = WriterState::Aborted;
        }
        Ok(())
    }

    fn set_xattr(&mut self, name: &str, value: &[u8]) -> StorageResult<()> {
        let tmp = self.tmp_mut()?;
        xattr::set(tmp.path(), name, value)?;
        Ok(())
    }
}
