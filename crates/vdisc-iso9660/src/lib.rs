//! ISO 9660 with Rock Ridge extensions for virtual discs.
//!
//! A virtual disc is an ISO 9660 image whose file contents live elsewhere.
//! This crate writes and reads the metadata that describes them: volume
//! descriptors, path tables, and directory extents carrying Rock Ridge
//! names, POSIX attributes, timestamps, and symlinks.
//!
//! # Building
//!
//! [`Builder`] collects paths backed by [`vdisc_storage::Object`]s, lays
//! them out in 2048-byte sectors, and yields a [`Volume`]. The volume's
//! metadata is everything before the first file; [`Volume::image`] stitches
//! metadata, contents, and padding into one object.
//!
//! # Reading
//!
//! [`Walker`] resolves paths over any image object, following `CE`
//! continuation chains and symlinks, and opens files as bounded sections of
//! the image.
//!
//! # Codec
//!
//! - [`DirectoryRecord`], [`PrimaryVolumeDescriptor`], [`PathTableRecord`]
//! - [`SuspEntry`] -- `SP`, `ST`, `CE`, `ER`, `NM`, `PX`, `SL`, `TF`
//! - [`ContinuationArea`] -- spilled system use entries
//! - [`SectorAllocator`] -- monotonic LBA assignment
//! - [`NamePolicy`] -- which file names the builder accepts

pub mod alloc;
pub mod builder;
pub mod consts;
pub mod continuation;
pub mod datetime;
pub mod descriptor;
pub mod directory;
pub mod encoding;
pub mod error;
pub mod inode;
pub mod names;
pub mod path_table;
pub mod record;
pub mod strings;
pub mod susp;
pub mod walker;

pub use alloc::SectorAllocator;
pub use builder::{BuildOptions, Builder, FileExtent, Layout, Volume};
pub use consts::{LOGICAL_BLOCK_SIZE, MAX_DIRECTORY_RECORD_IDENTIFIER_LEN, MAX_DIRECTORY_RECORD_LEN, MAX_PART_SIZE};
pub use continuation::{pack_system_use, ContinuationArea};
pub use descriptor::PrimaryVolumeDescriptor;
pub use error::{IsoError, IsoResult};
pub use inode::{Inode, InodeId, InodeKind, Tree};
pub use names::NamePolicy;
pub use path_table::{Endian, PathTableRecord};
pub use record::DirectoryRecord;
pub use susp::SuspEntry;
pub use walker::{DirEntries, FileInfo, Walker};
