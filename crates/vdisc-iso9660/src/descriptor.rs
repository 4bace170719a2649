//! Volume descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::{LOGICAL_BLOCK_SIZE, STANDARD_IDENTIFIER};
use crate::datetime::{decode_decimal, encode_decimal};
use crate::encoding::{put_u16_both, put_u32_both, u16_both, u32_be, u32_both, u32_le};
use crate::error::{IsoError, IsoResult};
use crate::record::{DirectoryRecord, FLAG_DIRECTORY, IDENT_SELF};
use crate::strings::{decode, str_a, str_d};

const SECTOR: usize = LOGICAL_BLOCK_SIZE as usize;

pub const TYPE_PRIMARY: u8 = 1;
pub const TYPE_TERMINATOR: u8 = 255;

const ROOT_RECORD_OFFSET: usize = 156;
const ROOT_RECORD_LEN: usize = 34;
const APPLICATION_USE_OFFSET: usize = 883;
const APPLICATION_USE_LEN: usize = 512;

/// The primary volume descriptor at LBA 16.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryVolumeDescriptor {
    pub system_id: String,
    pub volume_id: String,
    /// Total sectors in the volume.
    pub volume_space_size: u32,
    pub volume_set_size: u16,
    pub volume_sequence_number: u16,
    pub logical_block_size: u16,
    pub path_table_size: u32,
    pub l_path_table: u32,
    pub optional_l_path_table: u32,
    pub m_path_table: u32,
    pub optional_m_path_table: u32,
    pub root: DirectoryRecord,
    pub volume_set_id: String,
    pub publisher_id: String,
    pub data_preparer_id: String,
    pub application_id: String,
    pub copyright_file_id: String,
    pub abstract_file_id: String,
    pub bibliographic_file_id: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub effective: Option<DateTime<Utc>>,
}

impl PrimaryVolumeDescriptor {
    /// A descriptor with empty identifiers and the given root.
    pub fn new(root_lba: u32, root_len: u32, recorded: DateTime<Utc>) -> Self {
        Self {
            system_id: String::new(),
            volume_id: String::new(),
            volume_space_size: 0,
            volume_set_size: 1,
            volume_sequence_number: 1,
            logical_block_size: LOGICAL_BLOCK_SIZE as u16,
            path_table_size: 0,
            l_path_table: 0,
            optional_l_path_table: 0,
            m_path_table: 0,
            optional_m_path_table: 0,
            root: DirectoryRecord::new(IDENT_SELF.to_vec(), root_lba, root_len, FLAG_DIRECTORY, recorded),
            volume_set_id: String::new(),
            publisher_id: String::new(),
            data_preparer_id: String::new(),
            application_id: String::new(),
            copyright_file_id: String::new(),
            abstract_file_id: String::new(),
            bibliographic_file_id: String::new(),
            created: Some(recorded),
            modified: Some(recorded),
            expires: None,
            effective: Some(recorded),
        }
    }

    pub fn encode(&self) -> IsoResult<[u8; SECTOR]> {
        let mut out = Vec::with_capacity(SECTOR);
        out.push(TYPE_PRIMARY);
        out.extend_from_slice(STANDARD_IDENTIFIER);
        out.push(1);
        out.push(0);
        out.extend_from_slice(&str_a(&self.system_id, 32));
        out.extend_from_slice(&str_d(&self.volume_id, 32));
        out.extend_from_slice(&[0; 8]);
        put_u32_both(&mut out, self.volume_space_size);
        out.extend_from_slice(&[0; 32]);
        put_u16_both(&mut out, self.volume_set_size);
        put_u16_both(&mut out, self.volume_sequence_number);
        put_u16_both(&mut out, self.logical_block_size);
        put_u32_both(&mut out, self.path_table_size);
        out.extend_from_slice(&self.l_path_table.to_le_bytes());
        out.extend_from_slice(&self.optional_l_path_table.to_le_bytes());
        out.extend_from_slice(&self.m_path_table.to_be_bytes());
        out.extend_from_slice(&self.optional_m_path_table.to_be_bytes());
        debug_assert_eq!(out.len(), ROOT_RECORD_OFFSET);

        let mut root = self.root.clone();
        root.system_use.clear();
        root.encode(&mut out)?;
        debug_assert_eq!(out.len(), ROOT_RECORD_OFFSET + ROOT_RECORD_LEN);

        out.extend_from_slice(&str_d(&self.volume_set_id, 128));
        out.extend_from_slice(&str_a(&self.publisher_id, 128));
        out.extend_from_slice(&str_a(&self.data_preparer_id, 128));
        out.extend_from_slice(&str_a(&self.application_id, 128));
        out.extend_from_slice(&str_d(&self.copyright_file_id, 37));
        out.extend_from_slice(&str_d(&self.abstract_file_id, 37));
        out.extend_from_slice(&str_d(&self.bibliographic_file_id, 37));
        for t in [&self.created, &self.modified, &self.expires, &self.effective] {
            out.extend_from_slice(&encode_decimal(t.as_ref()));
        }
        out.push(1);
        out.push(0);
        debug_assert_eq!(out.len(), APPLICATION_USE_OFFSET);
        out.resize(APPLICATION_USE_OFFSET + APPLICATION_USE_LEN, b' ');
        out.resize(SECTOR, 0);

        let mut sector = [0u8; SECTOR];
        sector.copy_from_slice(&out);
        Ok(sector)
    }

    pub fn decode(b: &[u8]) -> IsoResult<Self> {
        if b.len() < SECTOR {
            return Err(IsoError::format("truncated volume descriptor"));
        }
        if b[0] != TYPE_PRIMARY || &b[1..6] != STANDARD_IDENTIFIER || b[6] != 1 {
            return Err(IsoError::format(format!(
                "not a primary volume descriptor (type {}, id {:?})",
                b[0],
                String::from_utf8_lossy(&b[1..6])
            )));
        }
        let root_bytes = &b[ROOT_RECORD_OFFSET..ROOT_RECORD_OFFSET + ROOT_RECORD_LEN];
        Ok(Self {
            system_id: decode(&b[8..40]),
            volume_id: decode(&b[40..72]),
            volume_space_size: u32_both(&b[80..88])?,
            volume_set_size: u16_both(&b[120..124])?,
            volume_sequence_number: u16_both(&b[124..128])?,
            logical_block_size: u16_both(&b[128..132])?,
            path_table_size: u32_both(&b[132..140])?,
            l_path_table: u32_le(&b[140..144]),
            optional_l_path_table: u32_le(&b[144..148]),
            m_path_table: u32_be(&b[148..152]),
            optional_m_path_table: u32_be(&b[152..156]),
            root: DirectoryRecord::decode(root_bytes)?,
            volume_set_id: decode(&b[190..318]),
            publisher_id: decode(&b[318..446]),
            data_preparer_id: decode(&b[446..574]),
            application_id: decode(&b[574..702]),
            copyright_file_id: decode(&b[702..739]),
            abstract_file_id: decode(&b[739..776]),
            bibliographic_file_id: decode(&b[776..813]),
            created: decode_decimal(&b[813..830])?,
            modified: decode_decimal(&b[830..847])?,
            expires: decode_decimal(&b[847..864])?,
            effective: decode_decimal(&b[864..881])?,
        })
    }
}

/// The volume descriptor set terminator.
pub fn terminator() -> [u8; SECTOR] {
    let mut out = [0u8; SECTOR];
    out[0] = TYPE_TERMINATOR;
    out[1..6].copy_from_slice(STANDARD_IDENTIFIER);
    out[6] = 1;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> PrimaryVolumeDescriptor {
        let t = Utc.with_ymd_and_hms(2023, 5, 6, 7, 8, 9).unwrap();
        let mut pvd = PrimaryVolumeDescriptor::new(20, 4096, t);
        pvd.system_id = "LINUX".into();
        pvd.volume_id = "VDISC".into();
        pvd.volume_space_size = 1234;
        pvd.path_table_size = 10;
        pvd.l_path_table = 18;
        pvd.m_path_table = 19;
        pvd.publisher_id = "ACME".into();
        pvd.application_id = "VDISC".into();
        pvd
    }

    #[test]
    fn fixed_offsets() {
        let b = sample().encode().unwrap();
        assert_eq!(b[0], 1);
        assert_eq!(&b[1..6], b"CD001");
        assert_eq!(&b[8..13], b"LINUX");
        assert_eq!(&b[40..45], b"VDISC");
        assert_eq!(&b[80..88], &[0xD2, 0x04, 0, 0, 0, 0, 0x04, 0xD2]);
        assert_eq!(&b[128..132], &[0x00, 0x08, 0x08, 0x00]);
        assert_eq!(&b[140..144], &18u32.to_le_bytes());
        assert_eq!(&b[148..152], &19u32.to_be_bytes());
        assert_eq!(b[156], 34);
        assert_eq!(b[881], 1);
        assert!(b[883..1395].iter().all(|&c| c == b' '));
        assert!(b[1395..].iter().all(|&c| c == 0));
        assert_eq!(&b[847..864], &crate::datetime::UNSPECIFIED_DECIMAL);
    }

    #[test]
    fn recorded_times_are_utc() {
        let b = sample().encode().unwrap();
        assert_eq!(&b[813..829], b"2023050607080900");
        assert_eq!(b[829], 50);
        assert_eq!(b[846], 50);
    }

    #[test]
    fn round_trip() {
        let pvd = sample();
        let b = pvd.encode().unwrap();
        assert_eq!(PrimaryVolumeDescriptor::decode(&b).unwrap(), pvd);
    }

    #[test]
    fn identifiers_are_space_padded() {
        let b = sample().encode().unwrap();
        assert_eq!(&b[318..323], b"ACME ");
        assert!(b[323..446].iter().all(|&c| c == b' '));
        assert!(b[702..813].iter().all(|&c| c == b' '));
    }

    #[test]
    fn rejects_terminator() {
        let t = terminator();
        assert_eq!(t[0], 255);
        assert_eq!(&t[1..7], b"CD001\x01");
        assert!(PrimaryVolumeDescriptor::decode(&t).is_err());
    }
}
