//! Building a virtual disc from a list of remote objects.
//!
//! Burning writes two objects next to each other:
//!
//! - `{url}.isohdr` holds the ISO 9660 metadata, everything before the first
//!   file's data;
//! - `{url}` holds the catalog, whose first extent is the `.isohdr` object
//!   and whose remaining extents are the files, in layout order.

use std::io::{BufWriter, Read, Write};

use serde::Serialize;
use tracing::{debug, info, warn};
use vdisc_iso9660::{BuildOptions, Builder, LOGICAL_BLOCK_SIZE};
use vdisc_storage::{Context, ObjectRef, Registry};

use crate::error::{CatalogError, CatalogResult};
use crate::format::{Catalog, CatalogV1, Extent, FS_TYPE_ISO9660};
use crate::trie::UriTrie;

/// Volume settings for a burn.
pub use vdisc_iso9660::BuildOptions as BurnOptions;

/// Suffix of the metadata object written beside a catalog.
pub const HEADER_SUFFIX: &str = ".isohdr";

/// URL prefix marking a burn list row as a symbolic link to the rest of the
/// URL, e.g. `symlink:../lib/libfoo.so.1`.
pub const SYMLINK_PREFIX: &str = "symlink:";

/// One row of a burn list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnEntry {
    /// Absolute path inside the image.
    pub path: String,
    /// Where the content lives. Empty for a directory row,
    /// `symlink:{target}` for a symbolic link.
    pub url: String,
    /// Content size when known, saving a stat of the object.
    pub size: Option<u64>,
}

impl BurnEntry {
    pub fn file(path: impl Into<String>, url: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            size,
        }
    }

    pub fn symlink(path: impl Into<String>, target: &str) -> Self {
        Self::file(path, format!("{SYMLINK_PREFIX}{target}"), None)
    }

    pub fn is_dir(&self) -> bool {
        self.url.is_empty()
    }

    /// The link target of a symlink row.
    pub fn symlink_target(&self) -> Option<&str> {
        self.url.strip_prefix(SYMLINK_PREFIX)
    }
}

/// Parse a burn list: `path,url[,size]` per line, no header row, `#`
/// starting a comment line. A row with an empty URL creates a directory and
/// a `symlink:{target}` URL creates a symbolic link; neither takes a size.
pub fn read_csv<R: Read>(r: R) -> CatalogResult<Vec<BurnEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(r);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let invalid = |reason: &str| CatalogError::InvalidEntry {
            line,
            reason: reason.to_string(),
        };
        if record.len() < 2 || record.len() > 3 {
            return Err(invalid(&format!("expected 2 or 3 fields, found {}", record.len())));
        }
        let path = &record[0];
        if path.is_empty() {
            return Err(invalid("empty path"));
        }
        let size = match record.get(2) {
            None | Some("") => None,
            Some(s) => Some(
                s.parse::<u64>()
                    .map_err(|e| invalid(&format!("bad size {s:?}: {e}")))?,
            ),
        };
        if record[1].is_empty() && size.is_some() {
            return Err(invalid("directory rows take no size"));
        }
        if let Some(target) = record[1].strip_prefix(SYMLINK_PREFIX) {
            if target.is_empty() {
                return Err(invalid("empty symlink target"));
            }
            if size.is_some() {
                return Err(invalid("symlink rows take no size"));
            }
        }
        entries.push(BurnEntry::file(path, &record[1], size));
    }
    Ok(entries)
}

/// What a burn produced.
#[derive(Debug, Clone, Serialize)]
pub struct BurnReport {
    /// Committed catalog URL.
    pub url: String,
    /// Committed metadata URL.
    pub header_url: String,
    pub files: usize,
    pub extents: usize,
    pub metadata_size: u64,
    pub image_size: u64,
}

/// Write `w` to a new object at `url`, committing on success and aborting
/// on any failure.
fn publish<F>(ctx: &Context, registry: &Registry, url: &str, f: F) -> CatalogResult<String>
where
    F: FnOnce(&mut dyn Write) -> CatalogResult<()>,
{
    let mut writer = registry.create_context(ctx, url)?;
    let result = f(&mut writer).and_then(|()| {
        ctx.check()?;
        Ok(writer.commit()?)
    });
    if result.is_err() {
        if let Err(e) = writer.abort() {
            warn!(%url, error = %e, "abort after failed write also failed");
        }
    }
    result
}

fn padding_of(blocks: u32, size: u64) -> CatalogResult<u16> {
    let padding = blocks as u64 * LOGICAL_BLOCK_SIZE - size;
    u16::try_from(padding).map_err(|_| CatalogError::format(format!("padding {padding} exceeds a block")))
}

/// Build the image described by `entries` and publish it at `url`.
pub fn burn(
    ctx: &Context,
    registry: &Registry,
    url: &str,
    entries: &[BurnEntry],
    opts: &BuildOptions,
) -> CatalogResult<BurnReport> {
    let mut builder = Builder::new(opts.clone());
    let mut files = 0;
    for entry in entries {
        ctx.check()?;
        if entry.is_dir() {
            builder.mkdir_all(&entry.path)?;
            continue;
        }
        if let Some(target) = entry.symlink_target() {
            debug!(path = %entry.path, %target, "adding symlink");
            builder.add_symlink(&entry.path, target)?;
            continue;
        }
        let obj: ObjectRef = registry.open_context_size(ctx, &entry.url, entry.size)?;
        debug!(path = %entry.path, url = %entry.url, size = obj.size(), "adding file");
        builder.add_file(&entry.path, obj)?;
        files += 1;
    }
    let volume = builder.finish()?;
    let layout = *volume.layout();

    let header_url = publish(ctx, registry, &format!("{url}{HEADER_SUFFIX}"), |w| {
        let mut buf = BufWriter::new(w);
        volume.write_metadata(&mut buf)?;
        buf.flush()?;
        Ok(())
    })?;

    // Extent 0 is the metadata; file extents follow in layout order.
    let mut runs = vec![(header_url.clone(), layout.metadata_sectors, 0u64)];
    volume.visit_file_inodes(|fe| {
        runs.push((fe.obj.url().to_string(), fe.blocks, fe.size));
        Ok(())
    })?;
    let mut trie = UriTrie::new();
    for (i, (run_url, _, _)) in runs.iter().enumerate() {
        trie.put(run_url, i as u32);
    }

    let (uris, mut leaves) = trie.invert()?;
    let mut extents = Vec::with_capacity(runs.len());
    for (i, (_, blocks, size)) in runs.into_iter().enumerate() {
        let leaf = leaves
            .remove(&(i as u32))
            .ok_or_else(|| CatalogError::format(format!("extent {i} missing from URI trie")))?;
        extents.push(Extent {
            uri_prefix: leaf.parent,
            uri_suffix: leaf.content,
            blocks,
            padding: if i == 0 { 0 } else { padding_of(blocks, size)? },
        });
    }
    let catalog = Catalog::V1(CatalogV1 {
        block_size: LOGICAL_BLOCK_SIZE as u16,
        fs_type: FS_TYPE_ISO9660.to_string(),
        uris,
        extents,
    });
    catalog.validate()?;
    let image_size = catalog.image_size();
    debug_assert_eq!(image_size, volume.total_len());

    let committed = publish(ctx, registry, url, |w| {
        catalog.write_compressed(w)?;
        Ok(())
    })?;

    let report = BurnReport {
        url: committed,
        header_url,
        files,
        extents: catalog.v1().extents.len(),
        metadata_size: volume.metadata_len(),
        image_size,
    };
    info!(
        url = %report.url,
        files = report.files,
        uris = catalog.v1().uris.len(),
        metadata = report.metadata_size,
        size = report.image_size,
        "burned virtual disc"
    );
    Ok(report)
}
