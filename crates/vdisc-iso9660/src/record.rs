use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::{
    DIRECTORY_RECORD_BASE_LEN, MAX_DIRECTORY_RECORD_IDENTIFIER_LEN, MAX_DIRECTORY_RECORD_LEN,
};
use crate::datetime::{decode_entry, encode_entry};
use crate::encoding::{put_u16_both, put_u32_both, u16_both, u32_both};
use crate::error::{IsoError, IsoResult};

pub const FLAG_HIDDEN: u8 = 0x01;
pub const FLAG_DIRECTORY: u8 = 0x02;
pub const FLAG_ASSOCIATED: u8 = 0x04;
/// More records of the same file follow.
pub const FLAG_NOT_FINAL: u8 = 0x80;

/// Identifier of a directory's own (`.`) record.
pub const IDENT_SELF: &[u8] = &[0];
/// Identifier of a directory's parent (`..`) record.
pub const IDENT_PARENT: &[u8] = &[1];

/// One directory record.
///
/// Layout (offsets in bytes):
///
/// | Off | Len | Field |
/// |-----|-----|-------|
/// | 0 | 1 | record length |
/// | 1 | 1 | extended attribute record length |
/// | 2 | 8 | extent LBA (both-endian) |
/// | 10 | 8 | data length (both-endian) |
/// | 18 | 7 | recording time |
/// | 25 | 1 | flags |
/// | 26 | 1 | file unit size |
/// | 27 | 1 | interleave gap |
/// | 28 | 4 | volume sequence number (both-endian) |
/// | 32 | 1 | identifier length |
/// | 33 | n | identifier, then a zero pad byte when `n` is even |
/// | .. | .. | system use area |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub ext_attr_len: u8,
    pub extent: u32,
    pub data_len: u32,
    pub recorded: DateTime<Utc>,
    pub flags: u8,
    pub file_unit_size: u8,
    pub interleave_gap: u8,
    pub volume_seq: u16,
    pub identifier: Vec<u8>,
    pub system_use: Vec<u8>,
}

impl DirectoryRecord {
    pub fn new(identifier: Vec<u8>, extent: u32, data_len: u32, flags: u8, recorded: DateTime<Utc>) -> Self {
        Self {
            ext_attr_len: 0,
            extent,
            data_len,
            recorded,
            flags,
            file_unit_size: 0,
            interleave_gap: 0,
            volume_seq: 1,
            identifier,
            system_use: Vec::new(),
        }
    }

    /// Length of the record without its system use area.
    pub fn base_len(&self) -> usize {
        header_len(self.identifier.len())
    }

    /// Encoded length of the whole record.
    pub fn encoded_len(&self) -> usize {
        self.base_len() + self.system_use.len()
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    pub fn is_final(&self) -> bool {
        self.flags & FLAG_NOT_FINAL == 0
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> IsoResult<()> {
        let id_len = self.identifier.len();
        if id_len == 0 || id_len > MAX_DIRECTORY_RECORD_IDENTIFIER_LEN {
            return Err(IsoError::overflow(format!("identifier of {id_len} bytes")));
        }
        let len = self.encoded_len();
        if len > MAX_DIRECTORY_RECORD_LEN {
            return Err(IsoError::overflow(format!("directory record of {len} bytes")));
        }
        out.reserve(len);
        out.push(len as u8);
        out.push(self.ext_attr_len);
        put_u32_both(out, self.extent);
        put_u32_both(out, self.data_len);
        out.extend_from_slice(&encode_entry(&self.recorded));
        out.push(self.flags);
        out.push(self.file_unit_size);
        out.push(self.interleave_gap);
        put_u16_both(out, self.volume_seq);
        out.push(id_len as u8);
        out.extend_from_slice(&self.identifier);
        if id_len % 2 == 0 {
            out.push(0);
        }
        out.extend_from_slice(&self.system_use);
        Ok(())
    }

    /// Decode one record. `b` must start at the record's length byte and
    /// hold at least that many bytes.
    pub fn decode(b: &[u8]) -> IsoResult<Self> {
        let len = *b
            .first()
            .ok_or_else(|| IsoError::format("empty directory record"))? as usize;
        if len < DIRECTORY_RECORD_BASE_LEN + 1 || b.len() < len {
            return Err(IsoError::format(format!("directory record length {len}")));
        }
        let b = &b[..len];
        let id_len = b[32] as usize;
        let su_start = header_len(id_len);
        if id_len == 0 || su_start > len {
            return Err(IsoError::format(format!(
                "identifier of {id_len} bytes in a {len}-byte record"
            )));
        }
        Ok(Self {
            ext_attr_len: b[1],
            extent: u32_both(&b[2..10])?,
            data_len: u32_both(&b[10..18])?,
            recorded: decode_entry(&b[18..25])?,
            flags: b[25],
            file_unit_size: b[26],
            interleave_gap: b[27],
            volume_seq: u16_both(&b[28..32])?,
            identifier: b[33..33 + id_len].to_vec(),
            system_use: b[su_start..].to_vec(),
        })
    }
}

/// Bytes before the system use area for an identifier of `id_len` bytes.
pub fn header_len(id_len: usize) -> usize {
    DIRECTORY_RECORD_BASE_LEN + id_len + (id_len + 1) % 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, 22, 22, 22, 22).unwrap()
    }

    #[test]
    fn root_record_is_34_bytes() {
        let rec = DirectoryRecord::new(IDENT_SELF.to_vec(), 20, 2048, FLAG_DIRECTORY, when());
        let mut out = Vec::new();
        rec.encode(&mut out).unwrap();
        assert_eq!(out.len(), 34);
        assert_eq!(out[0], 34);
        assert_eq!(&out[2..10], &[20, 0, 0, 0, 0, 0, 0, 20]);
        assert_eq!(out[25], FLAG_DIRECTORY);
        assert_eq!(out[32], 1);
        assert_eq!(DirectoryRecord::decode(&out).unwrap(), rec);
    }

    #[test]
    fn even_identifier_is_padded() {
        let rec = DirectoryRecord::new(b"AB".to_vec(), 0, 0, 0, when());
        assert_eq!(rec.base_len(), 36);
        let mut out = Vec::new();
        rec.encode(&mut out).unwrap();
        assert_eq!(out[35], 0);
    }

    #[test]
    fn rejects_oversized() {
        let mut rec = DirectoryRecord::new(vec![b'A'; 31], 0, 0, 0, when());
        assert!(matches!(rec.encode(&mut Vec::new()), Err(IsoError::Overflow(_))));
        rec.identifier = vec![b'A'; 1];
        rec.system_use = vec![0; 256 - 34];
        assert!(matches!(rec.encode(&mut Vec::new()), Err(IsoError::Overflow(_))));
        rec.system_use.pop();
        assert!(rec.encode(&mut Vec::new()).is_ok());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let rec = DirectoryRecord::new(b"A;1".to_vec(), 5, 6, 0, when());
        let mut out = Vec::new();
        rec.encode(&mut out).unwrap();
        assert!(DirectoryRecord::decode(&out[..out.len() - 1]).is_err());
    }

    proptest! {
        #[test]
        fn round_trip(
            identifier in proptest::collection::vec(any::<u8>(), 1..=30),
            su_len in 0usize..=190,
            extent in any::<u32>(),
            data_len in any::<u32>(),
            flags in any::<u8>(),
            secs in 0i64..4_000_000_000,
        ) {
            let recorded = Utc.timestamp_opt(secs, 0).unwrap();
            let mut rec = DirectoryRecord::new(identifier, extent, data_len, flags, recorded);
            rec.system_use = (0..su_len).map(|i| i as u8).collect();
            let mut out = Vec::new();
            rec.encode(&mut out).unwrap();
            prop_assert_eq!(out.len(), rec.encoded_len());
            prop_assert_eq!(DirectoryRecord::decode(&out).unwrap(), rec);
        }
    }
}
