//! Storage facade for virtual disc images.
//!
//! Every byte a virtual disc serves lives behind an [`Object`]: a sized,
//! random-access blob addressed by URL. Objects are produced by [`Driver`]s
//! registered per URL scheme in a [`Registry`]; writers are produced the same
//! way and publish their content only on [`ObjectWriter::commit`].
//!
//! # Built-in Drivers
//!
//! - [`FileDriver`] -- local files (`file:` URLs and bare paths)
//! - [`MemoryDriver`] -- process-local `mem:` objects for tests and embedding
//! - [`ZeroDriver`] -- `zero:N`, `N` zero bytes
//! - [`DataDriver`] -- RFC 2397 `data:` URLs
//!
//! Remote drivers (HTTP, object storage) plug in through [`Registry::register`].
//!
//! # Composition
//!
//! - [`SectionObject`] -- a bounded window onto another object
//! - [`Concat`] -- one addressable object over an ordered list of parts,
//!   read either serially or with one thread per intersected part
//!
//! # Design Rules
//!
//! 1. `read_at` never touches a cursor; concurrent calls are always safe.
//! 2. `read_at` returns fewer bytes than requested only at end of object.
//! 3. A closed object fails every further call with [`StorageError::Closed`].
//! 4. Writers publish atomically: observers see the whole object or nothing.

pub mod concat;
pub mod context;
pub mod drivers;
pub mod error;
pub mod interval;
pub mod object;
pub mod reader;
pub mod registry;
pub mod section;

pub use concat::{concat, concat_concurrent, Concat};
pub use context::Context;
pub use drivers::{BytesObject, DataDriver, FileDriver, MemoryDriver, ZeroDriver, ZeroObject};
pub use error::{StorageError, StorageResult};
pub use interval::Interval;
pub use object::{read_all, read_exact_at, read_full_at, Object, ObjectRef, ObjectWriter};
pub use reader::ObjectReader;
pub use registry::{create, global, open, open_size, scheme_of, Driver, Registry};
pub use section::SectionObject;
