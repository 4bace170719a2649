//! Read-through block cache for virtual disc objects.
//!
//! Remote extents are slow to reach and are read at random offsets. This
//! crate decomposes every read into block-aligned [`Slice`]s, serves each
//! slice from a cache tier, and watches the access pattern to prefetch ahead
//! of sequential readers.
//!
//! # Tiers
//!
//! - [`MemoryCache`] -- fixed pool of block buffers with LRU reuse
//! - [`DiskCache`] -- one file per block under `root/v0/`, keyed by extended
//!   attribute, filled under a per-key advisory lock so several processes can
//!   share a directory
//!
//! # Pieces
//!
//! - [`Slicer`] / [`Slice`] -- the tier abstraction
//! - [`Cache`] -- wraps objects so reads go through a slicer
//! - [`ReadAhead`] -- sequential-access detector bounded by a shared semaphore
//! - [`GcThreshold`], [`GcReport`], [`FsckReport`] -- disk maintenance
//! - [`CacheConfig`] -- serde-loadable configuration
//!
//! # Rules
//!
//! 1. Fills against one key are serialized; fills of unrelated keys never
//!    wait on each other.
//! 2. Read-ahead never blocks the caller; without a free token it is dropped.
//! 3. A disk write-back failure after the caller was served is logged and
//!    dropped, never surfaced.

pub mod caching;
pub mod config;
pub mod disk;
pub mod error;
pub mod fsck;
pub mod gc;
pub mod memory;
pub mod pool;
pub mod readahead;
pub mod slicer;

#[cfg(test)]
pub(crate) mod testutil;

pub use caching::{Cache, CachedObject};
pub use config::{CacheBackend, CacheConfig};
pub use disk::{DiskCache, DiskSlice, CHECKSUM_XATTR, KEY_XATTR};
pub use error::{CacheError, CacheResult};
pub use fsck::{FsckIssue, FsckIssueKind, FsckReport};
pub use gc::{GcReport, GcThreshold, SpaceUsage};
pub use memory::{MemoryCache, MemorySlice};
pub use readahead::ReadAhead;
pub use slicer::{slice_id, Slice, Slicer};
