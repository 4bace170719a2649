/// Bytes per logical block (sector).
pub const LOGICAL_BLOCK_SIZE: u64 = 2048;

/// Longest directory record, system use area included.
pub const MAX_DIRECTORY_RECORD_LEN: usize = 255;

/// Longest file identifier in a directory record.
pub const MAX_DIRECTORY_RECORD_IDENTIFIER_LEN: usize = 30;

/// Largest run of file content one directory record can describe.
pub const MAX_PART_SIZE: u64 = (1 << 32) - LOGICAL_BLOCK_SIZE;

/// Sectors reserved for the system area ahead of the volume descriptors.
pub const SYSTEM_AREA_SECTORS: u64 = 16;

/// LBA of the primary volume descriptor.
pub const PVD_LBA: u32 = 16;

/// Directory record length without identifier or system use.
pub const DIRECTORY_RECORD_BASE_LEN: usize = 33;

pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

/// POSIX file type bits as carried in Rock Ridge `PX` entries.
pub mod mode {
    pub const S_IFMT: u32 = 0o170_000;
    pub const S_IFLNK: u32 = 0o120_000;
    pub const S_IFREG: u32 = 0o100_000;
    pub const S_IFDIR: u32 = 0o040_000;
    pub const PERMISSIONS: u32 = 0o7_777;
}

/// Number of sectors needed to hold `bytes`. Zero bytes still take one.
pub fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(LOGICAL_BLOCK_SIZE).max(1)
}
