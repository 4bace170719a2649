//! Continuation areas.
//!
//! System use entries that do not fit in a directory record spill into
//! sectors following the directory's extent. The record then ends with a
//! `CE` entry pointing at the spilled run; a run too long for the rest of a
//! sector ends with another `CE` pointing at the next sector.

use crate::consts::{LOGICAL_BLOCK_SIZE, MAX_DIRECTORY_RECORD_LEN};
use crate::error::{IsoError, IsoResult};
use crate::susp::{encode_all, encoded_len, ContinuationRef, SuspEntry, CE_LEN};

const SECTOR: usize = LOGICAL_BLOCK_SIZE as usize;

/// Sectors of spilled entries, placed at `lba`.
#[derive(Debug, Default)]
pub struct ContinuationArea {
    lba: u32,
    sectors: Vec<Vec<u8>>,
}

/// One run of entries planned into a sector.
struct Chunk<'a> {
    sector: usize,
    offset: usize,
    entries: &'a [SuspEntry],
}

impl ContinuationArea {
    /// An empty area whose first sector will be at `lba`.
    pub fn new(lba: u32) -> Self {
        Self {
            lba,
            sectors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Length in bytes, whole sectors.
    pub fn byte_len(&self) -> usize {
        self.sectors.len() * SECTOR
    }

    fn location(&self, sector: usize, offset: usize, len: usize) -> ContinuationRef {
        ContinuationRef {
            lba: self.lba + sector as u32,
            offset: offset as u32,
            len: len as u32,
        }
    }

    /// Append `entries`, chaining across sectors as needed. Returns where
    /// the run starts.
    pub fn push(&mut self, entries: &[SuspEntry]) -> IsoResult<ContinuationRef> {
        if self.sectors.is_empty() {
            self.sectors.push(Vec::new());
        }

        // Plan which entries land in which sector before encoding, since a
        // chained CE needs the length of the run it points at.
        let mut chunks: Vec<Chunk<'_>> = Vec::new();
        let mut sector = self.sectors.len() - 1;
        let mut offset = self.sectors[sector].len();
        let mut rest = entries;
        while !rest.is_empty() {
            let room = SECTOR - offset;
            if encoded_len(rest) <= room {
                chunks.push(Chunk {
                    sector,
                    offset,
                    entries: rest,
                });
                break;
            }
            let budget = room.saturating_sub(CE_LEN);
            let mut used = 0;
            let n = rest
                .iter()
                .take_while(|e| {
                    used += e.encoded_len();
                    used <= budget
                })
                .count();
            if n == 0 {
                if offset == 0 {
                    return Err(IsoError::overflow("system use entry larger than a sector"));
                }
            } else {
                chunks.push(Chunk {
                    sector,
                    offset,
                    entries: &rest[..n],
                });
                rest = &rest[n..];
            }
            sector += 1;
            offset = 0;
        }

        let mut next: Option<ContinuationRef> = None;
        let mut encoded: Vec<(usize, usize, Vec<u8>)> = Vec::with_capacity(chunks.len());
        for chunk in chunks.iter().rev() {
            let mut bytes = Vec::new();
            encode_all(chunk.entries, &mut bytes)?;
            if let Some(r) = next {
                SuspEntry::Ce(r).encode(&mut bytes)?;
            }
            next = Some(self.location(chunk.sector, chunk.offset, bytes.len()));
            encoded.push((chunk.sector, chunk.offset, bytes));
        }

        for (sector, offset, bytes) in encoded.into_iter().rev() {
            while self.sectors.len() <= sector {
                self.sectors.push(Vec::new());
            }
            debug_assert_eq!(self.sectors[sector].len(), offset);
            self.sectors[sector].extend_from_slice(&bytes);
        }
        next.ok_or_else(|| IsoError::overflow("empty continuation run"))
    }

    /// The area's bytes, each sector zero padded.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for mut s in self.sectors {
            s.resize(SECTOR, 0);
            out.extend_from_slice(&s);
        }
        out
    }
}

/// Pack `entries` into a record whose fixed part is `base_len` bytes.
///
/// Entries are kept in order. When all of them fit within
/// [`MAX_DIRECTORY_RECORD_LEN`] they stay in the record; otherwise the
/// longest prefix that leaves room for a `CE` stays and the rest moves to
/// `area`.
pub fn pack_system_use(
    base_len: usize,
    entries: &[SuspEntry],
    area: &mut ContinuationArea,
) -> IsoResult<Vec<u8>> {
    let mut out = Vec::new();
    let budget = MAX_DIRECTORY_RECORD_LEN.saturating_sub(base_len);
    if encoded_len(entries) <= budget {
        encode_all(entries, &mut out)?;
        return Ok(out);
    }

    let room = budget.saturating_sub(CE_LEN);
    let mut used = 0;
    let n = entries
        .iter()
        .take_while(|e| {
            used += e.encoded_len();
            used <= room
        })
        .count();
    encode_all(&entries[..n], &mut out)?;
    let ce = area.push(&entries[n..])?;
    SuspEntry::Ce(ce).encode(&mut out)?;
    Ok(out)
}
