use std::io::{self, Read, Seek, SeekFrom};

use crate::object::ObjectRef;

/// Sequential cursor over an [`Object`](crate::Object).
///
/// The object itself is cursor-free; the position lives here so many
/// readers can share one object.
#[derive(Clone, Debug)]
pub struct ObjectReader {
    obj: ObjectRef,
    position: u64,
}

impl ObjectReader {
    pub fn new(obj: ObjectRef) -> Self {
        Self { obj, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn object(&self) -> &ObjectRef {
        &self.obj
    }

    pub fn into_inner(self) -> ObjectRef {
        self.obj
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.obj.read_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ObjectReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(off) => Some(off),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.obj.size().checked_add_signed(delta),
        };
        match target {
            Some(off) => {
                self.position = off;
                Ok(off)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            )),
        }
    }
}
