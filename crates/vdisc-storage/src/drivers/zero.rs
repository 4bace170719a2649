use std::sync::Arc;

use crate::context::Context;
use crate::error::{StorageError, StorageResult};
use crate::object::{ClosedFlag, Object, ObjectRef};
use crate::registry::Driver;

/// `N` zero bytes, addressed as `zero:N`.
#[derive(Debug)]
pub struct ZeroObject {
    url: String,
    size: u64,
    closed: ClosedFlag,
}

impl ZeroObject {
    pub fn new(size: u64) -> Self {
        Self {
            url: format!("zero:{size}"),
            size,
            closed: ClosedFlag::default(),
        }
    }
}

impl Object for ZeroObject {
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
        let n = (self.size - off).min(buf.len() as u64) as usize;
        buf[..n].fill(0);
        Ok(n)
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.close(&self.url)
    }
}

/// Driver for the `zero:` scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroDriver;

impl Driver for ZeroDriver {
    fn open(&self, ctx: &Context, url: &str, _size_hint: Option<u64>) -> StorageResult<ObjectRef> {
        ctx.check()?;
        let size = url
            .strip_prefix("zero:")
            .map(|s| s.trim_start_matches("//"))
            .ok_or_else(|| StorageError::invalid_url(url, "expected zero:N"))?
            .parse::<u64>()
            .map_err(|e| StorageError::invalid_url(url, e.to_string()))?;
        Ok(Arc::new(ZeroObject::new(size)))
    }
}
