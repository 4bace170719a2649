use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use xxhash_rust::xxh64::Xxh64;

use crate::disk::{DiskCache, CHECKSUM_XATTR};
use crate::error::CacheResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsckIssueKind {
    /// The stored checksum does not match the contents.
    Mismatch,
    /// No checksum attribute, or one of the wrong length.
    MissingChecksum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsckIssue {
    pub path: PathBuf,
    pub kind: FsckIssueKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsckReport {
    pub checked: usize,
    pub issues: Vec<FsckIssue>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

fn checksum_file(file: &mut File) -> io::Result<u64> {
    let mut hasher = Xxh64::new(0);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => return Ok(hasher.digest()),
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

impl DiskCache {
    /// Recompute the checksum of every entry and compare it with the stored
    /// attribute. Entries that vanish mid-scan are skipped.
    pub fn fsck(&self) -> CacheResult<FsckReport> {
        let mut report = FsckReport::default();
        for entry in self.entry_files() {
            let path = entry.into_path();
            let mut file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            report.checked += 1;

            let stored = xattr::FileExt::get_xattr(&file, CHECKSUM_XATTR)?
                .and_then(|v| <[u8; 8]>::try_from(v.as_slice()).ok())
                .map(u64::from_le_bytes);
            let kind = match stored {
                None => Some(FsckIssueKind::MissingChecksum),
                Some(want) if checksum_file(&mut file)? != want => Some(FsckIssueKind::Mismatch),
                Some(_) => None,
            };
            if let Some(kind) = kind {
                warn!(path = %path.display(), ?kind, "cache entry failed integrity check");
                report.issues.push(FsckIssue { path, kind });
            }
        }
        info!(checked = report.checked, issues = report.issues.len(), "cache fsck complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slicer::Slicer;
    use std::sync::Arc;
    use vdisc_storage::{read_all, BytesObject, ObjectRef};

    #[test]
    fn clean_then_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 8).unwrap();
        let obj: ObjectRef = Arc::new(BytesObject::new("mem://fsck", b"0123456789abcdef".to_vec()));
        read_all(cache.slice(&obj, 0).as_ref()).unwrap();
        read_all(cache.slice(&obj, 8).as_ref()).unwrap();
        cache.wait_for_writeback();

        let report = cache.fsck().unwrap();
        assert_eq!(report.checked, 2);
        assert!(report.is_clean());

        let (path, _) = cache.paths_for_key(&crate::disk::cache_key("mem://fsck", 8, 8));
        let checksum = xattr::get(&path, CHECKSUM_XATTR).unwrap().unwrap();
        std::fs::write(&path, b"XXXXXXXX").unwrap();
        // Rewriting replaced the file contents but kept the inode and xattrs.
        assert_eq!(xattr::get(&path, CHECKSUM_XATTR).unwrap().unwrap(), checksum);

        let report = cache.fsck().unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(
            report.issues,
            vec![FsckIssue { path: path.clone(), kind: FsckIssueKind::Mismatch }]
        );

        xattr::remove(&path, CHECKSUM_XATTR).unwrap();
        let report = cache.fsck().unwrap();
        assert_eq!(report.issues[0].kind, FsckIssueKind::MissingChecksum);
    }
}
