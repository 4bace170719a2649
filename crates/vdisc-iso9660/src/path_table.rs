//! Path tables.
//!
//! One record per directory, in level order. Each record names its parent
//! by 1-based position in the table; the root is its own parent.

use crate::error::{IsoError, IsoResult};

/// Byte order of a path table's numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// The L table.
    Little,
    /// The M table.
    Big,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableRecord {
    pub identifier: Vec<u8>,
    pub location: u32,
    /// 1-based index of the parent record.
    pub parent: u16,
}

impl PathTableRecord {
    pub fn encoded_len(&self) -> usize {
        record_len(self.identifier.len())
    }

    pub fn encode(&self, endian: Endian, out: &mut Vec<u8>) -> IsoResult<()> {
        let id_len = u8::try_from(self.identifier.len())
            .map_err(|_| IsoError::overflow("path table identifier longer than 255 bytes"))?;
        out.push(id_len);
        out.push(0);
        match endian {
            Endian::Little => {
                out.extend_from_slice(&self.location.to_le_bytes());
                out.extend_from_slice(&self.parent.to_le_bytes());
            }
            Endian::Big => {
                out.extend_from_slice(&self.location.to_be_bytes());
                out.extend_from_slice(&self.parent.to_be_bytes());
            }
        }
        out.extend_from_slice(&self.identifier);
        if id_len % 2 == 1 {
            out.push(0);
        }
        Ok(())
    }
}

/// Encoded length of a record with an identifier of `id_len` bytes.
pub fn record_len(id_len: usize) -> usize {
    8 + id_len + id_len % 2
}

/// Encode a whole table.
pub fn encode_table(records: &[PathTableRecord], endian: Endian) -> IsoResult<Vec<u8>> {
    let mut out = Vec::with_capacity(records.iter().map(PathTableRecord::encoded_len).sum());
    for r in records {
        r.encode(endian, &mut out)?;
    }
    Ok(out)
}

/// Decode a whole table of `b.len()` bytes.
pub fn decode_table(b: &[u8], endian: Endian) -> IsoResult<Vec<PathTableRecord>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < b.len() {
        let id_len = b[pos] as usize;
        if id_len == 0 {
            break;
        }
        let len = record_len(id_len);
        let r = b
            .get(pos..pos + len)
            .ok_or_else(|| IsoError::format(format!("truncated path table record at {pos}")))?;
        let (location, parent) = match endian {
            Endian::Little => (
                u32::from_le_bytes([r[2], r[3], r[4], r[5]]),
                u16::from_le_bytes([r[6], r[7]]),
            ),
            Endian::Big => (
                u32::from_be_bytes([r[2], r[3], r[4], r[5]]),
                u16::from_be_bytes([r[6], r[7]]),
            ),
        };
        out.push(PathTableRecord {
            identifier: r[8..8 + id_len].to_vec(),
            location,
            parent,
        });
        pos += len;
    }
    Ok(out)
}

/// Convert a 0-based table position into a parent index.
pub fn parent_index(position: usize) -> IsoResult<u16> {
    u16::try_from(position + 1)
        .map_err(|_| IsoError::overflow(format!("more than {} directories in path table", u16::MAX)))
}
