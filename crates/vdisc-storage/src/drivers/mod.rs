//! Built-in storage drivers.

pub mod data;
pub mod file;
pub mod memory;
pub mod zero;

pub use data::DataDriver;
pub use file::{FileDriver, FileObject, FileWriter};
pub use memory::{BytesObject, MemoryDriver, MemoryWriter};
pub use zero::{ZeroDriver, ZeroObject};
