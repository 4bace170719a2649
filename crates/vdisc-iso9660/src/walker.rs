//! Reading a volume back: path lookup, directory listing, and file access
//! over a random-access image.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use tracing::debug;
use vdisc_storage::{read_exact_at, ObjectRef, SectionObject};

use crate::consts::{mode, LOGICAL_BLOCK_SIZE, PVD_LBA};
use crate::descriptor::PrimaryVolumeDescriptor;
use crate::error::{IsoError, IsoResult};
use crate::names::{self, display_identifier};
use crate::record::{DirectoryRecord, IDENT_PARENT, IDENT_SELF};
use crate::susp::{decode_name, decode_symlink, tf, SuspEntry};

const SECTOR: usize = LOGICAL_BLOCK_SIZE as usize;

/// Directory extents are read in chunks of this many bytes.
const READ_BUFFER: u64 = 1 << 20;

pub const MAX_SYMLINK_REDIRECTS: u32 = 40;

const MAX_CONTINUATION_HOPS: usize = 1024;

const STAT_CACHE_ENTRIES: usize = 1024;

/// What the walker knows about one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// File type and permission bits.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub ino: u32,
    pub modified: DateTime<Utc>,
    /// First LBA of the content.
    pub extent: u32,
    pub symlink: Option<String>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFLNK
    }

    pub fn permissions(&self) -> u32 {
        self.mode & mode::PERMISSIONS
    }
}

/// The modification time among the timestamps a `TF` carries.
fn tf_modified(flags: u8, times: &[DateTime<Utc>]) -> Option<DateTime<Utc>> {
    if flags & tf::MODIFY == 0 {
        return None;
    }
    let idx = usize::from(flags & tf::CREATION != 0);
    times.get(idx).copied()
}

pub struct Walker {
    image: ObjectRef,
    pvd: PrimaryVolumeDescriptor,
    root_record: DirectoryRecord,
    /// Bytes to skip at the start of each system use area, when the volume
    /// carries Rock Ridge.
    len_skp: Option<u8>,
    root: OnceLock<FileInfo>,
    cache: Mutex<LruCache<String, FileInfo>>,
}

impl Walker {
    pub fn new(image: ObjectRef) -> IsoResult<Self> {
        let mut sector = vec![0u8; SECTOR];
        read_exact_at(&*image, &mut sector, PVD_LBA as u64 * LOGICAL_BLOCK_SIZE)?;
        let pvd = PrimaryVolumeDescriptor::decode(&sector)?;
        if pvd.logical_block_size as u64 != LOGICAL_BLOCK_SIZE {
            return Err(IsoError::format(format!(
                "logical block size {}",
                pvd.logical_block_size
            )));
        }

        read_exact_at(&*image, &mut sector, pvd.root.extent as u64 * LOGICAL_BLOCK_SIZE)?;
        let root_record = DirectoryRecord::decode(&sector)?;
        if root_record.identifier != IDENT_SELF {
            return Err(IsoError::format("root directory does not start with its own record"));
        }
        let len_skp = match SuspEntry::decode_all(&root_record.system_use) {
            Ok(entries) => match entries.first() {
                Some(SuspEntry::Sp { len_skp }) => Some(*len_skp),
                _ => None,
            },
            Err(_) => None,
        };
        debug!(
            volume = %pvd.volume_id,
            sectors = pvd.volume_space_size,
            rock_ridge = len_skp.is_some(),
            "opened volume"
        );

        let capacity = NonZeroUsize::new(STAT_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            image,
            pvd,
            root_record,
            len_skp,
            root: OnceLock::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn primary_volume_descriptor(&self) -> &PrimaryVolumeDescriptor {
        &self.pvd
    }

    pub fn image(&self) -> &ObjectRef {
        &self.image
    }

    pub fn has_rock_ridge(&self) -> bool {
        self.len_skp.is_some()
    }

    /// All system use entries of `rec`, following `CE` chains.
    pub fn system_use_entries(&self, rec: &DirectoryRecord) -> IsoResult<Vec<SuspEntry>> {
        let skip = self.len_skp.unwrap_or(0) as usize;
        let area = rec.system_use.get(skip..).unwrap_or(&[]);
        let mut pending = SuspEntry::decode_all(area)?;
        let mut out = Vec::new();
        for _ in 0..MAX_CONTINUATION_HOPS {
            let mut next = None;
            for e in pending {
                match e {
                    SuspEntry::Ce(r) => next = Some(r),
                    other => out.push(other),
                }
            }
            let Some(r) = next else {
                return Ok(out);
            };
            if r.offset as u64 + r.len as u64 > LOGICAL_BLOCK_SIZE {
                return Err(IsoError::format(format!(
                    "continuation area at {}+{} of {} bytes crosses a sector",
                    r.lba, r.offset, r.len
                )));
            }
            let mut buf = vec![0u8; r.len as usize];
            read_exact_at(
                &*self.image,
                &mut buf,
                r.lba as u64 * LOGICAL_BLOCK_SIZE + r.offset as u64,
            )?;
            pending = SuspEntry::decode_all(&buf)?;
        }
        Err(IsoError::format("continuation chain does not terminate"))
    }

    fn entry_info(&self, rec: &DirectoryRecord) -> IsoResult<FileInfo> {
        let entries = match self.len_skp {
            Some(_) => self.system_use_entries(rec)?,
            None => Vec::new(),
        };
        let name = match rec.identifier.as_slice() {
            IDENT_SELF => ".".to_string(),
            IDENT_PARENT => "..".to_string(),
            ident => decode_name(&entries)
                .map(|n| String::from_utf8_lossy(&n).into_owned())
                .unwrap_or_else(|| display_identifier(ident)),
        };
        let is_dir = rec.is_directory();
        let mut info = FileInfo {
            name,
            size: rec.data_len as u64,
            mode: if is_dir {
                mode::S_IFDIR | 0o555
            } else {
                mode::S_IFREG | 0o444
            },
            nlink: if is_dir { 2 } else { 1 },
            uid: 0,
            gid: 0,
            ino: 0,
            modified: rec.recorded,
            extent: rec.extent,
            symlink: decode_symlink(&entries),
        };
        let mut has_px = false;
        for e in &entries {
            match e {
                SuspEntry::Px(px) => {
                    has_px = true;
                    info.mode = px.mode;
                    info.nlink = px.nlink;
                    info.uid = px.uid;
                    info.gid = px.gid;
                    info.ino = px.ino;
                }
                SuspEntry::Tf { flags, times } => {
                    if let Some(t) = tf_modified(*flags, times) {
                        info.modified = t;
                    }
                }
                _ => {}
            }
        }
        if info.symlink.is_some() && !has_px {
            info.mode = mode::S_IFLNK | 0o777;
        }
        Ok(info)
    }

    fn root_info(&self) -> IsoResult<FileInfo> {
        if let Some(info) = self.root.get() {
            return Ok(info.clone());
        }
        let mut info = self.entry_info(&self.root_record)?;
        info.name = "/".to_string();
        let _ = self.root.set(info.clone());
        Ok(info)
    }

    /// Iterate the entries of directory `dir`, starting `offset` bytes into
    /// its extent.
    pub fn entries(&self, dir: &FileInfo, offset: u64) -> IsoResult<DirEntries<'_>> {
        if !dir.is_dir() {
            return Err(IsoError::NotADirectory(dir.name.clone()));
        }
        Ok(DirEntries {
            walker: self,
            base: dir.extent as u64 * LOGICAL_BLOCK_SIZE,
            size: dir.size,
            pos: offset,
            buf: Vec::new(),
            buf_start: 0,
            pending: None,
        })
    }

    fn find(&self, dir_path: &str, dir: &FileInfo, name: &str) -> IsoResult<FileInfo> {
        let full = names::join(dir_path, name);
        if let Some(hit) = self.cache.lock().expect("lock poisoned").get(&full) {
            return Ok(hit.clone());
        }
        for entry in self.entries(dir, 0)? {
            let entry = entry?;
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let found = entry.name == name;
            self.cache
                .lock()
                .expect("lock poisoned")
                .put(names::join(dir_path, &entry.name), entry.clone());
            if found {
                return Ok(entry);
            }
        }
        Err(IsoError::NotFound(full))
    }

    fn lookup(&self, path: &str, follow: bool, hops: &mut u32) -> IsoResult<(String, FileInfo)> {
        let cleaned = names::clean(path);
        if cleaned == "/" {
            return Ok((cleaned, self.root_info()?));
        }
        let (dir, leaf) = names::split(&cleaned);
        let (dir_path, dir_info) = self.lookup(dir, true, hops)?;
        if !dir_info.is_dir() {
            return Err(IsoError::NotADirectory(dir_path));
        }
        let info = self.find(&dir_path, &dir_info, leaf)?;
        match &info.symlink {
            Some(target) if follow => {
                *hops += 1;
                if *hops > MAX_SYMLINK_REDIRECTS {
                    return Err(IsoError::Loop(cleaned));
                }
                let next = if target.starts_with('/') {
                    target.clone()
                } else {
                    names::join(&dir_path, target)
                };
                self.lookup(&next, true, hops)
            }
            _ => Ok((names::join(&dir_path, leaf), info)),
        }
    }

    /// Look up `path` without following a symlink in its last component.
    pub fn lstat(&self, path: &str) -> IsoResult<FileInfo> {
        self.lookup(path, false, &mut 0).map(|(_, info)| info)
    }

    /// Look up `path`, following symlinks.
    ///
    /// A relative target is resolved against the directory holding the
    /// link, whether it names a file or a directory, as POSIX path
    /// resolution does. Targets are never joined onto the link's own path.
    /// All links met along the way share a budget of
    /// [`MAX_SYMLINK_REDIRECTS`]; past it the lookup fails with
    /// [`IsoError::Loop`].
    pub fn stat(&self, path: &str) -> IsoResult<FileInfo> {
        self.lookup(path, true, &mut 0).map(|(_, info)| info)
    }

    /// Entries of the directory at `path`, without `.` and `..`.
    pub fn read_dir(&self, path: &str) -> IsoResult<Vec<FileInfo>> {
        let (entries, _) = self.read_dir_from(path, 0, usize::MAX)?;
        Ok(entries)
    }

    /// Up to `limit` entries of the directory at `path`, starting `offset`
    /// bytes into its extent. Returns the offset to resume from, or `None`
    /// when the directory is exhausted.
    pub fn read_dir_from(
        &self,
        path: &str,
        offset: u64,
        limit: usize,
    ) -> IsoResult<(Vec<FileInfo>, Option<u64>)> {
        let dir = self.stat(path)?;
        if !dir.is_dir() {
            return Err(IsoError::NotADirectory(names::clean(path)));
        }
        let mut it = self.entries(&dir, offset)?;
        let mut out = Vec::new();
        while out.len() < limit {
            match it.next_entry()? {
                Some(e) if e.name == "." || e.name == ".." => {}
                Some(e) => out.push(e),
                None => return Ok((out, None)),
            }
        }
        let next = if it.has_more()? { Some(it.offset()) } else { None };
        Ok((out, next))
    }

    /// Visit `root` and everything below it in level order. Symlinks are
    /// reported, never followed.
    pub fn walk<F>(&self, root: &str, mut f: F) -> IsoResult<()>
    where
        F: FnMut(&str, &FileInfo) -> IsoResult<()>,
    {
        let root = names::clean(root);
        let info = self.stat(&root)?;
        let mut queue = VecDeque::from([(root, info)]);
        while let Some((path, info)) = queue.pop_front() {
            f(&path, &info)?;
            if !info.is_dir() {
                continue;
            }
            for entry in self.entries(&info, 0)? {
                let entry = entry?;
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                queue.push_back((names::join(&path, &entry.name), entry));
            }
        }
        Ok(())
    }

    /// The content of the file at `path`.
    pub fn open(&self, path: &str) -> IsoResult<ObjectRef> {
        let info = self.stat(path)?;
        if info.is_dir() {
            return Err(IsoError::IsADirectory(names::clean(path)));
        }
        Ok(Arc::new(SectionObject::new(
            self.image.clone(),
            info.extent as u64 * LOGICAL_BLOCK_SIZE,
            info.size,
        )))
    }
}

/// Entries of one directory extent, with multi-extent files merged.
pub struct DirEntries<'w> {
    walker: &'w Walker,
    base: u64,
    size: u64,
    pos: u64,
    buf: Vec<u8>,
    buf_start: u64,
    pending: Option<(u64, DirectoryRecord)>,
}

impl DirEntries<'_> {
    fn fill(&mut self) -> IsoResult<()> {
        let start = self.pos - self.pos % LOGICAL_BLOCK_SIZE;
        let n = READ_BUFFER.min(self.size - start) as usize;
        self.buf.resize(n, 0);
        read_exact_at(&*self.walker.image, &mut self.buf, self.base + start)?;
        self.buf_start = start;
        Ok(())
    }

    fn record(&mut self) -> IsoResult<Option<(u64, DirectoryRecord)>> {
        if let Some(p) = self.pending.take() {
            return Ok(Some(p));
        }
        loop {
            if self.pos >= self.size {
                return Ok(None);
            }
            if self.pos < self.buf_start || self.pos >= self.buf_start + self.buf.len() as u64 {
                self.fill()?;
            }
            let i = (self.pos - self.buf_start) as usize;
            let len = self.buf[i] as u64;
            let sector_end = (self.pos / LOGICAL_BLOCK_SIZE + 1) * LOGICAL_BLOCK_SIZE;
            if len == 0 {
                self.pos = sector_end;
                continue;
            }
            if self.pos + len > sector_end {
                return Err(IsoError::format(format!(
                    "directory record at offset {} crosses a sector",
                    self.pos
                )));
            }
            let rec = DirectoryRecord::decode(&self.buf[i..])?;
            let at = self.pos;
            self.pos += len;
            return Ok(Some((at, rec)));
        }
    }

    /// The next logical entry, summing the sizes of consecutive records that
    /// share an identifier.
    pub fn next_entry(&mut self) -> IsoResult<Option<FileInfo>> {
        let Some((_, first)) = self.record()? else {
            return Ok(None);
        };
        let mut info = self.walker.entry_info(&first)?;
        while let Some((at, rec)) = self.record()? {
            if rec.identifier != first.identifier {
                self.pending = Some((at, rec));
                break;
            }
            info.size += rec.data_len as u64;
        }
        Ok(Some(info))
    }

    fn has_more(&mut self) -> IsoResult<bool> {
        match self.record()? {
            Some(p) => {
                self.pending = Some(p);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Offset of the next unread record.
    pub fn offset(&self) -> u64 {
        self.pending.as_ref().map_or(self.pos, |(at, _)| *at)
    }
}

impl Iterator for DirEntries<'_> {
    type Item = IsoResult<FileInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildOptions, Builder, Volume};
    use crate::consts::MAX_PART_SIZE;
    use crate::names::NamePolicy;
    use chrono::TimeZone;
    use vdisc_storage::{read_all, BytesObject, ZeroObject};

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 7, 8, 9, 10).unwrap()
    }

    fn bytes(data: &[u8]) -> ObjectRef {
        Arc::new(BytesObject::new("mem:test", data.to_vec()))
    }

    fn zeros(n: u64) -> ObjectRef {
        Arc::new(ZeroObject::new(n))
    }

    fn build(f: impl FnOnce(&mut Builder)) -> (Volume, Walker) {
        let mut b = Builder::new(BuildOptions {
            timestamp: Some(when()),
            ..BuildOptions::default()
        });
        f(&mut b);
        let vol = b.finish().unwrap();
        let walker = Walker::new(vol.image().unwrap()).unwrap();
        (vol, walker)
    }

    #[test]
    fn files_round_trip() {
        let (_, w) = build(|b| {
            b.add_file("/docs/readme.txt", bytes(b"hello")).unwrap();
            b.add_file("/empty", bytes(b"")).unwrap();
            let tool = b.add_file("/bin/tool", bytes(&[9u8; 5000])).unwrap();
            let inode = b.inode_mut(tool);
            inode.permissions = 0o755;
            inode.uid = 1000;
            inode.gid = 100;
        });
        assert!(w.has_rock_ridge());

        let root = w.stat("/").unwrap();
        assert!(root.is_dir());
        assert_eq!(root.ino, 1);
        assert_eq!(root.nlink, 4);

        let names: Vec<String> = w.read_dir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["docs", "empty", "bin"]);

        let readme = w.stat("/docs/readme.txt").unwrap();
        assert!(readme.is_file());
        assert_eq!(readme.size, 5);
        assert_eq!(readme.permissions(), 0o444);
        assert_eq!(readme.modified, when());
        assert_eq!(read_all(&*w.open("/docs/readme.txt").unwrap()).unwrap(), b"hello");

        let tool = w.lstat("bin/tool").unwrap();
        assert_eq!(tool.mode, 0o100755);
        assert_eq!((tool.uid, tool.gid), (1000, 100));
        assert_eq!(read_all(&*w.open("/bin/tool").unwrap()).unwrap(), vec![9u8; 5000]);

        let empty = w.stat("/empty").unwrap();
        assert_eq!(empty.size, 0);
        assert!(read_all(&*w.open("/empty").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn lookup_errors() {
        let (_, w) = build(|b| {
            b.add_file("/dir/f", bytes(b"x")).unwrap();
        });
        assert!(matches!(w.stat("/nope"), Err(IsoError::NotFound(p)) if p == "/nope"));
        assert!(w.stat("/dir/nope").unwrap_err().is_not_found());
        assert!(matches!(w.stat("/dir/f/x"), Err(IsoError::NotADirectory(p)) if p == "/dir/f"));
        assert!(matches!(w.open("/dir"), Err(IsoError::IsADirectory(_))));
        assert!(matches!(w.read_dir("/dir/f"), Err(IsoError::NotADirectory(_))));
    }

    #[test]
    fn symlinks() {
        let (_, w) = build(|b| {
            b.add_file("/docs/readme.txt", bytes(b"hello")).unwrap();
            b.add_symlink("/docs/link", "readme.txt").unwrap();
            b.add_symlink("/abs", "/docs/readme.txt").unwrap();
            b.add_symlink("/dirlink", "docs").unwrap();
            b.add_symlink("/up", "docs/../docs/link").unwrap();
            b.add_symlink("/dangling", "missing").unwrap();
            b.add_symlink("/loop1", "loop2").unwrap();
            b.add_symlink("/loop2", "loop1").unwrap();
        });
        let link = w.lstat("/docs/link").unwrap();
        assert!(link.is_symlink());
        assert_eq!(link.symlink.as_deref(), Some("readme.txt"));
        assert_eq!(w.stat("/docs/link").unwrap().size, 5);
        assert_eq!(w.stat("/abs").unwrap().size, 5);
        assert!(w.stat("/dirlink").unwrap().is_dir());
        assert_eq!(read_all(&*w.open("/dirlink/readme.txt").unwrap()).unwrap(), b"hello");
        assert_eq!(w.stat("/up").unwrap().size, 5);
        assert!(w.stat("/dangling").unwrap_err().is_not_found());
        assert!(matches!(w.stat("/loop1"), Err(IsoError::Loop(_))));
        assert!(w.lstat("/loop1").unwrap().is_symlink());
    }

    #[test]
    fn long_names_and_targets() {
        let name = "n".repeat(300);
        let target = format!("/{}/{}", "t".repeat(600), "end");
        let (_, w) = build(|b| {
            b.add_file(&format!("/{name}"), bytes(b"long")).unwrap();
            b.add_symlink("/far", &target).unwrap();
        });
        let entries = w.read_dir("/").unwrap();
        assert_eq!(entries[0].name, name);
        assert_eq!(entries[0].size, 4);
        assert_eq!(entries[1].symlink.as_deref(), Some(target.as_str()));
        assert_eq!(read_all(&*w.open(&format!("/{name}")).unwrap()).unwrap(), b"long");
    }

    /// The `.` record at the start of directory `path`.
    fn self_record(w: &Walker, path: &str) -> DirectoryRecord {
        let dir = w.stat(path).unwrap();
        let mut sector = vec![0u8; LOGICAL_BLOCK_SIZE as usize];
        read_exact_at(&**w.image(), &mut sector, dir.extent as u64 * LOGICAL_BLOCK_SIZE).unwrap();
        let rec = DirectoryRecord::decode(&sector).unwrap();
        assert_eq!(rec.identifier, IDENT_SELF);
        rec
    }

    #[test]
    fn every_directory_declares_rock_ridge() {
        let (_, w) = build(|b| {
            b.add_file("/docs/deep/readme.txt", bytes(b"hello")).unwrap();
        });
        for path in ["/", "/docs", "/docs/deep"] {
            let su = w.system_use_entries(&self_record(&w, path)).unwrap();
            assert!(su.iter().any(|e| matches!(e, SuspEntry::Er { .. })), "{path}");
            let has_sp = su.iter().any(|e| matches!(e, SuspEntry::Sp { .. }));
            assert_eq!(has_sp, path == "/", "{path}");
        }
        assert_eq!(read_all(&*w.open("/docs/deep/readme.txt").unwrap()).unwrap(), b"hello");
    }

    #[test]
    fn thousand_files_resume() {
        let (vol, w) = build(|b| {
            for i in 0..1000u64 {
                b.add_file(&format!("/file-{i:04}"), zeros(i)).unwrap();
            }
        });
        let all = w.read_dir("/").unwrap();
        assert_eq!(all.len(), 1000);
        for (i, e) in all.iter().enumerate() {
            assert_eq!(e.name, format!("file-{i:04}"));
            assert_eq!(e.size, i as u64);
        }

        // 15 file records share the first sector with `.` and `..`, then
        // 16 of 121 bytes fit per sector.
        let root = w.stat("/").unwrap();
        let built = vol.tree().get(crate::inode::ROOT).dir().unwrap().size;
        assert_eq!(built, 129_024);
        assert_eq!(root.size, 129_024);
        assert_eq!(w.primary_volume_descriptor().root.data_len, 129_024);
        assert_eq!(self_record(&w, "/").data_len, 129_024);
        assert_eq!(w.primary_volume_descriptor().volume_space_size, vol.layout().total_sectors);

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let (page, next) = w.read_dir_from("/", offset, 128).unwrap();
            paged.extend(page);
            match next {
                Some(n) => offset = n,
                None => break,
            }
        }
        assert_eq!(paged, all);
    }

    #[test]
    fn multi_extent_file_is_merged() {
        let size = MAX_PART_SIZE + 4096;
        let (_, w) = build(|b| {
            b.add_file("/big", zeros(size)).unwrap();
            b.add_file("/after", bytes(b"tail")).unwrap();
        });
        let entries = w.read_dir("/").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size, size);
        let big = w.open("/big").unwrap();
        assert_eq!(big.size(), size);
        let mut buf = [1u8; 8];
        assert_eq!(big.read_at(&mut buf, MAX_PART_SIZE + 10).unwrap(), 8);
        assert_eq!(buf, [0u8; 8]);
        assert_eq!(read_all(&*w.open("/after").unwrap()).unwrap(), b"tail");
    }

    #[test]
    fn walk_is_level_order() {
        let (_, w) = build(|b| {
            b.add_file("/a/b/c", bytes(b"1")).unwrap();
            b.add_file("/top", bytes(b"2")).unwrap();
            b.add_symlink("/a/l", "b").unwrap();
        });
        let mut seen = Vec::new();
        w.walk("/", |path, _| {
            seen.push(path.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, ["/", "/a", "/top", "/a/b", "/a/l", "/a/b/c"]);
    }

    #[test]
    fn posix_policy_volume() {
        let mut b = Builder::new(BuildOptions {
            name_policy: NamePolicy::Posix,
            ..BuildOptions::default()
        });
        assert!(b.add_file("/bad name", bytes(b"")).is_err());
        b.add_file("/good_name", bytes(b"")).unwrap();
        let w = Walker::new(b.finish().unwrap().image().unwrap()).unwrap();
        assert_eq!(w.read_dir("/").unwrap()[0].name, "good_name");
    }

    #[test]
    fn rejects_blank_image() {
        let blank: ObjectRef = Arc::new(ZeroObject::new(40 * LOGICAL_BLOCK_SIZE));
        assert!(matches!(Walker::new(blank), Err(IsoError::FormatMismatch(_))));
    }
}
