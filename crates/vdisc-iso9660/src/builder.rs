//! Volume layout and metadata writing.
//!
//! A [`Builder`] collects files and symlinks into a [`Tree`]. [`Builder::finish`]
//! assigns every directory and file part its LBA:
//!
//! | LBA | Contents |
//! |-----|----------|
//! | 0-15 | system area (zeros) |
//! | 16 | primary volume descriptor |
//! | 17 | descriptor set terminator |
//! | 18.. | L path table, then M path table |
//! | .. | each directory in level order, followed by its continuation area |
//! | .. | each file's parts in level order |
//!
//! Everything before the first file part is the volume's metadata.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vdisc_storage::{concat, BytesObject, ObjectRef, ZeroObject};

use crate::alloc::SectorAllocator;
use crate::consts::{sectors_for, LOGICAL_BLOCK_SIZE, SYSTEM_AREA_SECTORS};
use crate::descriptor::{terminator, PrimaryVolumeDescriptor};
use crate::directory::encode_directory;
use crate::error::{IsoError, IsoResult};
use crate::inode::{Inode, InodeId, InodeKind, Tree, ROOT};
use crate::names::NamePolicy;
use crate::path_table::{encode_table, parent_index, Endian, PathTableRecord};
use crate::record::IDENT_SELF;

const SECTOR: usize = LOGICAL_BLOCK_SIZE as usize;

/// Volume-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub name_policy: NamePolicy,
    pub system_id: String,
    pub volume_id: String,
    pub volume_set_id: String,
    pub publisher_id: String,
    pub data_preparer_id: String,
    pub application_id: String,
    /// Timestamp for every inode and the descriptor. Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            name_policy: NamePolicy::default(),
            system_id: String::new(),
            volume_id: "VDISC".to_string(),
            volume_set_id: String::new(),
            publisher_id: String::new(),
            data_preparer_id: String::new(),
            application_id: "VDISC".to_string(),
            timestamp: None,
        }
    }
}

pub struct Builder {
    tree: Tree,
    opts: BuildOptions,
    now: DateTime<Utc>,
}

impl Builder {
    pub fn new(opts: BuildOptions) -> Self {
        let now = opts.timestamp.unwrap_or_else(Utc::now);
        let now = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            tree: Tree::new(opts.name_policy, now),
            opts,
            now,
        }
    }

    /// Add a file at `path`, creating missing parent directories.
    pub fn add_file(&mut self, path: &str, obj: ObjectRef) -> IsoResult<InodeId> {
        self.tree.add_file(path, obj)
    }

    pub fn add_symlink(&mut self, path: &str, target: &str) -> IsoResult<InodeId> {
        self.tree.add_symlink(path, target)
    }

    pub fn mkdir_all(&mut self, path: &str) -> IsoResult<InodeId> {
        self.tree.mkdir_all(path)
    }

    /// Adjust an inode's attributes before layout.
    pub fn inode_mut(&mut self, id: InodeId) -> &mut Inode {
        self.tree.get_mut(id)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Lay out the volume and encode its metadata.
    pub fn finish(mut self) -> IsoResult<Volume> {
        let mut alloc = SectorAllocator::new();
        alloc.alloc(SYSTEM_AREA_SECTORS * LOGICAL_BLOCK_SIZE)?;
        let pvd_lba = alloc.alloc(LOGICAL_BLOCK_SIZE)?;
        alloc.alloc(LOGICAL_BLOCK_SIZE)?;
        debug_assert_eq!(pvd_lba, crate::consts::PVD_LBA);

        let dirs = self.tree.directories_bfs();

        // Path table length depends only on identifiers, never on LBAs.
        let path_table_size: usize = path_table(&self.tree, &dirs)?
            .iter()
            .map(PathTableRecord::encoded_len)
            .sum();
        let l_table_lba = alloc.alloc(path_table_size as u64)?;
        let m_table_lba = alloc.alloc(path_table_size as u64)?;

        for &id in &dirs {
            let sizing = encode_directory(&self.tree, id, 0)?;
            let lba = alloc.alloc(sizing.size() as u64)?;
            let continuation = match sizing.continuation_sectors() {
                0 => None,
                n => Some((alloc.alloc(n as u64 * LOGICAL_BLOCK_SIZE)?, n)),
            };
            let inode = self.tree.get_mut(id);
            inode.lba = lba;
            if let InodeKind::Directory(d) = &mut inode.kind {
                d.size = sizing.size();
                d.continuation = continuation;
            }
        }
        let metadata_sectors = alloc.next_lba();

        let files = self.tree.files_bfs();
        for &id in &files {
            let inode = self.tree.get_mut(id);
            if let InodeKind::File(f) = &mut inode.kind {
                for part in f.parts.iter_mut() {
                    part.lba = alloc.alloc(part.size as u64)?;
                }
                inode.lba = f.parts[0].lba;
            }
        }
        let total_sectors = alloc.next_lba();

        let mut extents = Vec::with_capacity(dirs.len());
        for &id in &dirs {
            let inode = self.tree.get(id);
            let Some(d) = inode.dir() else { continue };
            let cont_lba = d.continuation.map(|(lba, _)| lba).unwrap_or(0);
            let enc = encode_directory(&self.tree, id, cont_lba)?;
            if enc.size() != d.size || enc.continuation_sectors() != d.continuation.map_or(0, |(_, n)| n) {
                return Err(IsoError::overflow(format!(
                    "{}: directory size changed during layout",
                    self.tree.path_of(id)
                )));
            }
            extents.push((inode.lba, enc.extent));
            if let Some((lba, _)) = d.continuation {
                extents.push((lba, enc.continuation.into_bytes()));
            }
        }

        let records = path_table(&self.tree, &dirs)?;
        let l_table = encode_table(&records, Endian::Little)?;
        let m_table = encode_table(&records, Endian::Big)?;
        debug_assert_eq!(l_table.len(), path_table_size);

        let root = self.tree.get(ROOT);
        let root_size = root.dir().map_or(0, |d| d.size);
        let mut pvd = PrimaryVolumeDescriptor::new(root.lba, root_size, root.modified);
        pvd.system_id = self.opts.system_id.clone();
        pvd.volume_id = self.opts.volume_id.clone();
        pvd.volume_space_size = total_sectors;
        pvd.path_table_size = path_table_size as u32;
        pvd.l_path_table = l_table_lba;
        pvd.m_path_table = m_table_lba;
        pvd.volume_set_id = self.opts.volume_set_id.clone();
        pvd.publisher_id = self.opts.publisher_id.clone();
        pvd.data_preparer_id = self.opts.data_preparer_id.clone();
        pvd.application_id = self.opts.application_id.clone();
        pvd.created = Some(self.now);
        pvd.modified = Some(self.now);
        pvd.effective = Some(self.now);

        let layout = Layout {
            path_table_size: path_table_size as u32,
            l_table_lba,
            m_table_lba,
            metadata_sectors,
            total_sectors,
        };
        info!(
            directories = dirs.len(),
            files = files.len(),
            metadata_sectors,
            total_sectors,
            "volume laid out"
        );

        Ok(Volume {
            tree: self.tree,
            pvd,
            layout,
            l_table,
            m_table,
            extents,
        })
    }
}

fn path_table(tree: &Tree, dirs: &[InodeId]) -> IsoResult<Vec<PathTableRecord>> {
    let mut position = vec![0usize; tree.len()];
    let mut ident: Vec<&[u8]> = vec![IDENT_SELF; tree.len()];
    for (i, &id) in dirs.iter().enumerate() {
        position[id] = i;
        if let Some(d) = tree.get(id).dir() {
            for (k, child) in d.children() {
                ident[child] = k;
            }
        }
    }
    dirs.iter()
        .map(|&id| {
            let inode = tree.get(id);
            let parent = inode.parent.map_or(0, |p| position[p]);
            Ok(PathTableRecord {
                identifier: ident[id].to_vec(),
                location: inode.lba,
                parent: parent_index(parent)?,
            })
        })
        .collect()
}

/// Where the fixed structures of a volume landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub path_table_size: u32,
    pub l_table_lba: u32,
    pub m_table_lba: u32,
    /// Sectors before the first file part.
    pub metadata_sectors: u32,
    pub total_sectors: u32,
}

/// One file's run of the image, as handed to [`Volume::visit_file_inodes`].
pub struct FileExtent<'a> {
    pub path: String,
    pub lba: u32,
    pub size: u64,
    /// Sectors covered, padding included.
    pub blocks: u32,
    pub obj: &'a ObjectRef,
}

impl FileExtent<'_> {
    /// Zero bytes between the end of the content and the next sector.
    pub fn padding(&self) -> u64 {
        self.blocks as u64 * LOGICAL_BLOCK_SIZE - self.size
    }
}

/// A laid out volume.
pub struct Volume {
    tree: Tree,
    pvd: PrimaryVolumeDescriptor,
    layout: Layout,
    l_table: Vec<u8>,
    m_table: Vec<u8>,
    /// Directory extents and continuation areas, in LBA order.
    extents: Vec<(u32, Vec<u8>)>,
}

impl Volume {
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn primary_volume_descriptor(&self) -> &PrimaryVolumeDescriptor {
        &self.pvd
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn metadata_len(&self) -> u64 {
        self.layout.metadata_sectors as u64 * LOGICAL_BLOCK_SIZE
    }

    pub fn total_len(&self) -> u64 {
        self.layout.total_sectors as u64 * LOGICAL_BLOCK_SIZE
    }

    /// Write everything before the first file part.
    pub fn write_metadata<W: Write>(&self, w: &mut W) -> IsoResult<()> {
        let mut pos: u64 = 0;
        let put = |w: &mut W, b: &[u8], pos: &mut u64| -> IsoResult<()> {
            w.write_all(b)?;
            *pos += b.len() as u64;
            Ok(())
        };
        let zeros = [0u8; SECTOR];
        for _ in 0..SYSTEM_AREA_SECTORS {
            put(w, &zeros, &mut pos)?;
        }
        put(w, &self.pvd.encode()?, &mut pos)?;
        put(w, &terminator(), &mut pos)?;

        for (lba, table) in [
            (self.layout.l_table_lba, &self.l_table),
            (self.layout.m_table_lba, &self.m_table),
        ] {
            debug_assert_eq!(pos, lba as u64 * LOGICAL_BLOCK_SIZE);
            put(w, table, &mut pos)?;
            let pad = sectors_for(table.len() as u64) * LOGICAL_BLOCK_SIZE - table.len() as u64;
            put(w, &vec![0u8; pad as usize], &mut pos)?;
        }

        for (lba, bytes) in &self.extents {
            debug_assert_eq!(pos, *lba as u64 * LOGICAL_BLOCK_SIZE);
            debug_assert_eq!(bytes.len() % SECTOR, 0);
            put(w, bytes, &mut pos)?;
        }
        debug_assert_eq!(pos, self.metadata_len());
        Ok(())
    }

    pub fn metadata(&self) -> IsoResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.metadata_len() as usize);
        self.write_metadata(&mut out)?;
        Ok(out)
    }

    /// Call `f` for every file in layout order.
    pub fn visit_file_inodes<F>(&self, mut f: F) -> IsoResult<()>
    where
        F: FnMut(FileExtent<'_>) -> IsoResult<()>,
    {
        for id in self.tree.files_bfs() {
            let inode = self.tree.get(id);
            let Some(file) = inode.file() else { continue };
            let blocks: u64 = file.parts.iter().map(|p| sectors_for(p.size as u64)).sum();
            f(FileExtent {
                path: self.tree.path_of(id),
                lba: inode.lba,
                size: file.size(),
                blocks: blocks as u32,
                obj: &file.obj,
            })?;
        }
        Ok(())
    }

    /// The whole image: metadata followed by each file and its padding.
    pub fn image(&self) -> IsoResult<ObjectRef> {
        let mut parts: Vec<ObjectRef> = vec![Arc::new(BytesObject::new("mem:isohdr", self.metadata()?))];
        let mut next = self.layout.metadata_sectors;
        self.visit_file_inodes(|fe| {
            debug_assert_eq!(fe.lba, next);
            next = fe.lba + fe.blocks;
            parts.push(fe.obj.clone());
            let pad = fe.padding();
            if pad > 0 {
                parts.push(Arc::new(ZeroObject::new(pad)));
            }
            Ok(())
        })?;
        debug!(parts = parts.len(), "assembled image");
        Ok(concat(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_table::decode_table;
    use chrono::TimeZone;
    use vdisc_storage::read_all;

    fn opts() -> BuildOptions {
        BuildOptions {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            ..BuildOptions::default()
        }
    }

    fn bytes(data: &[u8]) -> ObjectRef {
        Arc::new(BytesObject::new("mem:test", data.to_vec()))
    }

    #[test]
    fn empty_volume_layout() {
        let vol = Builder::new(opts()).finish().unwrap();
        let l = vol.layout();
        assert_eq!(l.path_table_size, 10);
        assert_eq!(l.l_table_lba, 18);
        assert_eq!(l.m_table_lba, 19);
        // Root extent at 20, its continuation (ER) at 21.
        assert_eq!(vol.tree().get(ROOT).lba, 20);
        assert_eq!(l.metadata_sectors, 22);
        assert_eq!(l.total_sectors, 22);
        assert_eq!(vol.metadata().unwrap().len(), 22 * SECTOR);
    }

    #[test]
    fn metadata_sectors_are_placed() {
        let mut b = Builder::new(opts());
        b.add_file("/docs/readme.txt", bytes(b"hello")).unwrap();
        b.add_file("/empty", bytes(b"")).unwrap();
        let vol = b.finish().unwrap();
        let meta = vol.metadata().unwrap();
        assert!(meta[..16 * SECTOR].iter().all(|&c| c == 0));
        let pvd = PrimaryVolumeDescriptor::decode(&meta[16 * SECTOR..17 * SECTOR]).unwrap();
        assert_eq!(&pvd, vol.primary_volume_descriptor());
        assert_eq!(pvd.volume_id, "VDISC");
        assert_eq!(meta[17 * SECTOR], 255);

        let l = vol.layout();
        let l_off = l.l_table_lba as usize * SECTOR;
        let m_off = l.m_table_lba as usize * SECTOR;
        let size = l.path_table_size as usize;
        let lt = decode_table(&meta[l_off..l_off + size], Endian::Little).unwrap();
        let mt = decode_table(&meta[m_off..m_off + size], Endian::Big).unwrap();
        assert_eq!(lt, mt);
        assert_eq!(lt.len(), 2);
        assert_eq!(lt[1].parent, 1);
        assert_eq!(lt[1].location, vol.tree().resolve("/docs").map(|d| vol.tree().get(d).lba).unwrap());
    }

    #[test]
    fn image_places_file_content() {
        let mut b = Builder::new(opts());
        b.add_file("/a", bytes(b"first")).unwrap();
        b.add_file("/b", bytes(&[7u8; 3000])).unwrap();
        b.add_file("/c", bytes(b"")).unwrap();
        let vol = b.finish().unwrap();
        let image = vol.image().unwrap();
        assert_eq!(image.size(), vol.total_len());

        let mut seen = Vec::new();
        vol.visit_file_inodes(|fe| {
            seen.push((fe.path.clone(), fe.lba, fe.blocks, fe.padding()));
            Ok(())
        })
        .unwrap();
        let m = vol.layout().metadata_sectors;
        assert_eq!(
            seen,
            vec![
                ("/a".to_string(), m, 1, 2043),
                ("/b".to_string(), m + 1, 2, 1096),
                ("/c".to_string(), m + 3, 1, 2048),
            ]
        );

        let data = read_all(&*image).unwrap();
        let at = |lba: u32| lba as usize * SECTOR;
        assert_eq!(&data[at(m)..at(m) + 5], b"first");
        assert!(data[at(m + 1)..at(m + 1) + 3000].iter().all(|&c| c == 7));
        assert_eq!(data.len(), at(m + 4));
    }

    #[test]
    fn identifiers_are_passed_through() {
        let mut o = opts();
        o.volume_id = "my disc".to_string();
        o.publisher_id = "acme".to_string();
        let vol = Builder::new(o).finish().unwrap();
        let pvd = vol.primary_volume_descriptor().clone();
        let decoded = PrimaryVolumeDescriptor::decode(&pvd.encode().unwrap()).unwrap();
        assert_eq!(decoded.volume_id, "MY_DISC");
        assert_eq!(decoded.publisher_id, "ACME");
    }
}
