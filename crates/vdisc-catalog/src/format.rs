//! The serialized catalog.
//!
//! A catalog is a bincode-encoded [`Catalog`], gzip-compressed for publish.
//! Readers accept both compressed and raw bytes.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use vdisc_iso9660::LOGICAL_BLOCK_SIZE;

use crate::error::{CatalogError, CatalogResult};
use crate::trie::{resolve, UriNode};

/// Leading bytes of a gzip stream with deflate and no flags.
pub const GZIP_MAGIC: [u8; 4] = [0x1f, 0x8b, 0x08, 0x00];

/// File system type of every catalog this crate writes.
pub const FS_TYPE_ISO9660: &str = "iso9660";

/// Root of the catalog schema. New layouts get new variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Catalog {
    V1(CatalogV1),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogV1 {
    pub block_size: u16,
    pub fs_type: String,
    /// Branch nodes of the inverted URI trie; index 0 is the root.
    pub uris: Vec<UriNode>,
    /// Extents in image order. The first holds the ISO metadata.
    pub extents: Vec<Extent>,
}

/// A run of sectors served by one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// Index into [`CatalogV1::uris`] of the branch this URL hangs off.
    pub uri_prefix: u32,
    pub uri_suffix: String,
    pub blocks: u32,
    /// Zero bytes appended after the object to fill its last block.
    pub padding: u16,
}

impl Extent {
    /// Bytes the backing object must provide.
    pub fn object_size(&self, block_size: u16) -> u64 {
        self.blocks as u64 * block_size as u64 - self.padding as u64
    }
}

impl Catalog {
    pub fn v1(&self) -> &CatalogV1 {
        match self {
            Catalog::V1(v1) => v1,
        }
    }

    /// Serialize without compression.
    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Serialize and gzip at best compression into `w`.
    pub fn write_compressed<W: Write>(&self, w: W) -> CatalogResult<W> {
        let mut gz = GzEncoder::new(w, Compression::best());
        bincode::serialize_into(&mut gz, self)?;
        Ok(gz.finish()?)
    }

    /// Decode raw or gzip-compressed catalog bytes and validate them.
    pub fn from_bytes(data: &[u8]) -> CatalogResult<Self> {
        let catalog: Catalog = if data.starts_with(&GZIP_MAGIC) {
            let mut raw = Vec::new();
            GzDecoder::new(data).read_to_end(&mut raw)?;
            bincode::deserialize(&raw)?
        } else {
            bincode::deserialize(data)?
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the invariants every reader relies on.
    pub fn validate(&self) -> CatalogResult<()> {
        let v1 = self.v1();
        if v1.block_size as u64 != LOGICAL_BLOCK_SIZE {
            return Err(CatalogError::format(format!("unsupported block size {}", v1.block_size)));
        }
        if v1.fs_type != FS_TYPE_ISO9660 {
            return Err(CatalogError::format(format!("unsupported fs type {:?}", v1.fs_type)));
        }
        match v1.uris.first() {
            Some(root) if root.parent == 0 && root.content.is_empty() => {}
            _ => return Err(CatalogError::format("URI table lacks its root node")),
        }
        for (i, node) in v1.uris.iter().enumerate().skip(1) {
            if node.parent as usize >= i {
                return Err(CatalogError::format(format!(
                    "URI node {i} has parent {} after it",
                    node.parent
                )));
            }
        }
        if v1.extents.is_empty() {
            return Err(CatalogError::format("catalog has no extents"));
        }
        for (i, ext) in v1.extents.iter().enumerate() {
            if ext.uri_prefix as usize >= v1.uris.len() {
                return Err(CatalogError::format(format!(
                    "extent {i} references URI node {}",
                    ext.uri_prefix
                )));
            }
            // An empty file still occupies one all-padding block.
            if ext.padding > v1.block_size || ext.padding as u64 > ext.blocks as u64 * v1.block_size as u64 {
                return Err(CatalogError::format(format!(
                    "extent {i} has padding {} for {} blocks",
                    ext.padding, ext.blocks
                )));
            }
        }
        Ok(())
    }

    /// Reconstructed URL of extent `i`, as stored.
    pub fn extent_url(&self, i: usize) -> CatalogResult<String> {
        let v1 = self.v1();
        let ext = v1
            .extents
            .get(i)
            .ok_or_else(|| CatalogError::format(format!("extent {i} out of range")))?;
        let leaf = UriNode {
            parent: ext.uri_prefix,
            content: ext.uri_suffix.clone(),
        };
        resolve(&v1.uris, &leaf)
    }

    /// Total image size in bytes.
    pub fn image_size(&self) -> u64 {
        let v1 = self.v1();
        v1.extents.iter().map(|e| e.blocks as u64).sum::<u64>() * v1.block_size as u64
    }
}

/// Wrap `r` in a gzip decoder when its stream starts with the gzip magic.
pub fn maybe_gunzip<'a, R: Read + 'a>(mut r: R) -> io::Result<Box<dyn Read + 'a>> {
    let mut head = [0u8; 4];
    let mut got = 0;
    while got < head.len() {
        match r.read(&mut head[got..])? {
            0 => break,
            n => got += n,
        }
    }
    let prefix = io::Cursor::new(head[..got].to_vec());
    let chained = prefix.chain(r);
    if got == head.len() && head == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(chained)))
    } else {
        Ok(Box::new(chained))
    }
}
