use std::sync::Arc;

use base64::Engine;
use percent_encoding::percent_decode_str;

use crate::context::Context;
use crate::drivers::memory::BytesObject;
use crate::error::{StorageError, StorageResult};
use crate::object::ObjectRef;
use crate::registry::Driver;

/// Driver for RFC 2397 `data:` URLs.
///
/// The payload is decoded once at open time; the object serves it from memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataDriver;

impl DataDriver {
    /// Decode the payload of a `data:` URL.
    pub fn decode(url: &str) -> StorageResult<Vec<u8>> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| StorageError::invalid_url(url, "missing data: prefix"))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| StorageError::invalid_url(url, "missing ',' separator"))?;
        let raw: Vec<u8> = percent_decode_str(payload).collect();
        if meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
            let compact: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
            return base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| StorageError::invalid_url(url, e.to_string()));
        }
        Ok(raw)
    }
}

impl Driver for DataDriver {
    fn open(&self, ctx: &Context, url: &str, _size_hint: Option<u64>) -> StorageResult<ObjectRef> {
        ctx.check()?;
        let data = Self::decode(url)?;
        Ok(Arc::new(BytesObject::new(url, data)))
    }
}
