//! Opening a published catalog as one image object.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::{debug, info};
use vdisc_cache::Cache;
use vdisc_iso9660::{Walker, LOGICAL_BLOCK_SIZE};
use vdisc_storage::{
    concat_concurrent, scheme_of, Context, Object, ObjectReader, ObjectRef, Registry, StorageResult,
};

use crate::error::{CatalogError, CatalogResult};
use crate::format::{maybe_gunzip, Catalog};

/// Resolve an extent URL against the catalog URL it was read from.
///
/// URLs with a scheme are used as they are. Relative references are joined
/// onto the catalog's directory.
pub fn resolve_url(base: &str, reference: &str) -> CatalogResult<String> {
    if scheme_of(reference).is_some() {
        return Ok(reference.to_string());
    }
    if scheme_of(base).is_some() {
        if let Ok(parsed) = url::Url::parse(base) {
            if !parsed.cannot_be_a_base() {
                return parsed
                    .join(reference)
                    .map(String::from)
                    .map_err(|e| CatalogError::format(format!("cannot resolve {reference:?}: {e}")));
            }
        }
    } else if reference.starts_with('/') {
        return Ok(reference.to_string());
    }
    // Opaque URLs and bare paths: replace everything after the last '/'.
    let dir = base.rfind('/').map(|i| &base[..=i]).unwrap_or("");
    Ok(format!("{dir}{reference}"))
}

/// Copy the (possibly compressed) catalog into an unlinked temp file and
/// decode it from a read-only mapping.
fn fetch_catalog(obj: &ObjectRef) -> CatalogResult<Catalog> {
    let mut spool = tempfile::tempfile()?;
    let mut src = maybe_gunzip(ObjectReader::new(Arc::clone(obj)))?;
    let copied = io::copy(&mut src, &mut spool)?;
    if copied == 0 {
        return Err(CatalogError::format(format!("catalog {} is empty", obj.url())));
    }
    // SAFETY: the file is private to this process and already unlinked, so
    // nothing can modify it while mapped.
    let map = unsafe { Mmap::map(&spool)? };
    let catalog: Catalog = bincode::deserialize(&map[..])?;
    catalog.validate()?;
    debug!(url = obj.url(), bytes = copied, "decoded catalog");
    Ok(catalog)
}

/// A virtual disc: the image described by a catalog, assembled from its
/// extents.
///
/// Reads of the image fan out to the extents concurrently; each extent is
/// read through the cache it was opened with.
pub struct VDisc {
    url: String,
    catalog: Catalog,
    /// Resolved extent URLs, in image order.
    extent_urls: Vec<String>,
    /// Extent objects without their padding, in image order.
    extents: Vec<ObjectRef>,
    /// Starting LBA of each extent.
    by_lba: BTreeMap<u32, usize>,
    image: ObjectRef,
}

impl VDisc {
    /// Open the catalog at `url` through the global registry without caching.
    pub fn open(url: &str) -> CatalogResult<Self> {
        Self::open_with(
            &Context::background(),
            vdisc_storage::global(),
            url,
            &Cache::passthrough(),
        )
    }

    pub fn open_with(ctx: &Context, registry: &Registry, url: &str, cache: &Cache) -> CatalogResult<Self> {
        let src = registry.open_context(ctx, url)?;
        let catalog = fetch_catalog(&src);
        src.close()?;
        let catalog = catalog?;
        let v1 = catalog.v1();
        let block_size = v1.block_size;

        let mut extent_urls = Vec::with_capacity(v1.extents.len());
        let mut extents = Vec::with_capacity(v1.extents.len());
        let mut parts: Vec<ObjectRef> = Vec::with_capacity(v1.extents.len() * 2);
        let mut by_lba = BTreeMap::new();
        let mut lba: u64 = 0;

        for (i, ext) in v1.extents.iter().enumerate() {
            ctx.check()?;
            let stored = catalog.extent_url(i)?;
            let resolved = resolve_url(url, &stored)?;
            let size = ext.object_size(block_size);
            let obj = cache.with_caching(registry.open_context_size(ctx, &resolved, Some(size))?);
            if obj.size() != size {
                return Err(CatalogError::format(format!(
                    "extent {i} ({resolved}) has {} bytes, catalog expects {size}",
                    obj.size()
                )));
            }

            let start = u32::try_from(lba)
                .map_err(|_| CatalogError::format(format!("extent {i} starts past the last LBA")))?;
            by_lba.insert(start, i);
            lba += ext.blocks as u64;

            parts.push(Arc::clone(&obj));
            if ext.padding > 0 {
                let pad = ext.padding as u64;
                parts.push(registry.open_context_size(ctx, &format!("zero:{pad}"), Some(pad))?);
            }
            extent_urls.push(resolved);
            extents.push(obj);
        }

        let image = concat_concurrent(parts);
        debug_assert_eq!(image.size(), lba * LOGICAL_BLOCK_SIZE);
        info!(%url, extents = extents.len(), size = image.size(), "opened virtual disc");
        Ok(Self {
            url: url.to_string(),
            catalog,
            extent_urls,
            extents,
            by_lba,
            image,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The assembled image.
    pub fn image(&self) -> &ObjectRef {
        &self.image
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    /// Resolved URL of extent `i`.
    pub fn extent_url(&self, i: usize) -> Option<&str> {
        self.extent_urls.get(i).map(String::as_str)
    }

    /// The object of the extent starting at `lba`, without padding.
    pub fn open_extent(&self, lba: u32) -> CatalogResult<ObjectRef> {
        self.by_lba
            .get(&lba)
            .map(|&i| Arc::clone(&self.extents[i]))
            .ok_or(CatalogError::NoExtent(lba))
    }

    /// A walker over the image.
    pub fn walker(&self) -> CatalogResult<Walker> {
        Ok(Walker::new(Arc::clone(&self.image))?)
    }
}

impl Object for VDisc {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.image.size()
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        self.image.read_at(buf, off)
    }

    fn close(&self) -> StorageResult<()> {
        self.image.close()
    }
}

impl std::fmt::Debug for VDisc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VDisc")
            .field("url", &self.url)
            .field("extents", &self.extents.len())
            .field("size", &self.image.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_references_win() {
        assert_eq!(resolve_url("https://h/a/disc", "mem:x").unwrap(), "mem:x");
        assert_eq!(resolve_url("/srv/disc", "data:,hi").unwrap(), "data:,hi");
    }

    #[test]
    fn relative_to_hierarchical_base() {
        assert_eq!(
            resolve_url("https://h/discs/one.vdisc", "parts/a.bin").unwrap(),
            "https://h/discs/parts/a.bin"
        );
        assert_eq!(resolve_url("file:///srv/discs/one", "../a").unwrap(), "file:///srv/a");
    }

    #[test]
    fn relative_to_opaque_and_bare_bases() {
        assert_eq!(resolve_url("mem:burn/disc", "a").unwrap(), "mem:burn/a");
        assert_eq!(resolve_url("/srv/discs/one", "a.bin").unwrap(), "/srv/discs/a.bin");
        assert_eq!(resolve_url("/srv/discs/one", "/abs/a.bin").unwrap(), "/abs/a.bin");
        assert_eq!(resolve_url("one", "a.bin").unwrap(), "a.bin");
    }

    #[test]
    fn missing_catalog_is_not_found() {
        let registry = Registry::with_builtin();
        let err = VDisc::open_with(&Context::background(), &registry, "mem:nope", &Cache::passthrough())
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let registry = Registry::with_builtin();
        let mut w = registry.create("mem:empty").unwrap();
        w.commit().unwrap();
        let err = VDisc::open_with(&Context::background(), &registry, "mem:empty", &Cache::passthrough())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Format(_)), "{err}");
    }
}
