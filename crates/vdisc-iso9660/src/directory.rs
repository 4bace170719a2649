//! Directory extent encoding.

use crate::consts::{LOGICAL_BLOCK_SIZE, MAX_PART_SIZE};
use crate::continuation::{pack_system_use, ContinuationArea};
use crate::error::{IsoError, IsoResult};
use crate::inode::{InodeId, InodeKind, Tree};
use crate::record::{header_len, DirectoryRecord, FLAG_DIRECTORY, FLAG_NOT_FINAL, IDENT_PARENT, IDENT_SELF};
use crate::susp::{name_entries, symlink_entries, tf, PosixAttrs, SuspEntry};

const SECTOR: usize = LOGICAL_BLOCK_SIZE as usize;

/// A directory's extent and the continuation area that follows it.
pub struct EncodedDirectory {
    pub extent: Vec<u8>,
    pub continuation: ContinuationArea,
}

impl EncodedDirectory {
    pub fn size(&self) -> u32 {
        self.extent.len() as u32
    }

    pub fn continuation_sectors(&self) -> u32 {
        self.continuation.sector_count() as u32
    }
}

fn posix_entries(tree: &Tree, id: InodeId) -> [SuspEntry; 2] {
    let inode = tree.get(id);
    [
        SuspEntry::Px(PosixAttrs {
            mode: inode.posix_mode(),
            nlink: tree.nlink(id),
            uid: inode.uid,
            gid: inode.gid,
            ino: inode.ino,
        }),
        SuspEntry::Tf {
            flags: tf::CREATION | tf::MODIFY,
            times: vec![inode.created, inode.modified],
        },
    ]
}

/// Extent and size a record for `id` should point at.
fn extent_of(tree: &Tree, id: InodeId) -> (u32, u32) {
    let inode = tree.get(id);
    match &inode.kind {
        InodeKind::Directory(d) => (inode.lba, d.size),
        _ => (inode.lba, 0),
    }
}

/// Append `rec` to `out`, starting a new sector when it would straddle one.
fn push_record(out: &mut Vec<u8>, rec: &DirectoryRecord) -> IsoResult<()> {
    let used = out.len() % SECTOR;
    if used + rec.encoded_len() > SECTOR {
        out.resize(out.len() + SECTOR - used, 0);
    }
    rec.encode(out)
}

/// Encode directory `id` of `tree`. Spilled system use entries go into a
/// continuation area starting at `continuation_lba`.
///
/// Record sizes depend only on names and entry lengths, so encoding with
/// unassigned LBAs yields the same sizes as the final pass.
pub fn encode_directory(tree: &Tree, id: InodeId, continuation_lba: u32) -> IsoResult<EncodedDirectory> {
    let dir = tree.get(id);
    let InodeKind::Directory(node) = &dir.kind else {
        return Err(IsoError::NotADirectory(tree.path_of(id)));
    };
    let mut area = ContinuationArea::new(continuation_lba);
    let mut out = Vec::new();

    let (self_lba, self_len) = extent_of(tree, id);
    let mut entries = Vec::new();
    if dir.parent.is_none() {
        entries.push(SuspEntry::Sp { len_skp: 0 });
    }
    entries.push(SuspEntry::rrip());
    entries.extend(posix_entries(tree, id));
    entries.extend(dir.extra.iter().cloned());
    let mut rec = DirectoryRecord::new(IDENT_SELF.to_vec(), self_lba, self_len, FLAG_DIRECTORY, dir.modified);
    rec.system_use = pack_system_use(rec.base_len(), &entries, &mut area)?;
    push_record(&mut out, &rec)?;

    let parent = dir.parent.unwrap_or(id);
    let (parent_lba, parent_len) = extent_of(tree, parent);
    let mut rec = DirectoryRecord::new(
        IDENT_PARENT.to_vec(),
        parent_lba,
        parent_len,
        FLAG_DIRECTORY,
        tree.get(parent).modified,
    );
    rec.system_use = pack_system_use(rec.base_len(), &posix_entries(tree, parent), &mut area)?;
    push_record(&mut out, &rec)?;

    for (ident, child_id) in node.children() {
        let child = tree.get(child_id);
        let mut entries = name_entries(child.name.as_bytes());
        entries.extend(posix_entries(tree, child_id));
        if let InodeKind::Symlink(target) = &child.kind {
            entries.extend(symlink_entries(target));
        }
        entries.extend(child.extra.iter().cloned());
        let base_len = header_len(ident.len());

        match &child.kind {
            InodeKind::File(file) => {
                let last = file.parts.len() - 1;
                for (i, part) in file.parts.iter().enumerate() {
                    let flags = if i < last { FLAG_NOT_FINAL } else { 0 };
                    let mut rec = DirectoryRecord::new(ident.to_vec(), part.lba, part.size, flags, child.modified);
                    if i == 0 {
                        rec.system_use = pack_system_use(base_len, &entries, &mut area)?;
                    }
                    push_record(&mut out, &rec)?;
                }
            }
            InodeKind::Directory(_) => {
                let (lba, len) = extent_of(tree, child_id);
                let mut rec = DirectoryRecord::new(ident.to_vec(), lba, len, FLAG_DIRECTORY, child.modified);
                rec.system_use = pack_system_use(base_len, &entries, &mut area)?;
                push_record(&mut out, &rec)?;
            }
            InodeKind::Symlink(_) => {
                let mut rec = DirectoryRecord::new(ident.to_vec(), 0, 0, 0, child.modified);
                rec.system_use = pack_system_use(base_len, &entries, &mut area)?;
                push_record(&mut out, &rec)?;
            }
        }
    }

    let rem = out.len() % SECTOR;
    if rem != 0 {
        out.resize(out.len() + SECTOR - rem, 0);
    }
    if out.len() as u64 > MAX_PART_SIZE {
        return Err(IsoError::DirectoryTooBig {
            path: tree.path_of(id),
            size: out.len() as u64,
        });
    }
    Ok(EncodedDirectory {
        extent: out,
        continuation: area,
    })
}
