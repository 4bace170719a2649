//! The build-time directory tree.
//!
//! Inodes live in an arena and refer to each other by [`InodeId`]. A parent
//! owns its children through an identifier-ordered map; children point back
//! at their parent by index.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use vdisc_storage::ObjectRef;

use crate::consts::{mode, MAX_PART_SIZE};
use crate::error::{IsoError, IsoResult};
use crate::names::{self, NamePolicy};
use crate::susp::SuspEntry;

/// Index of an inode in its [`Tree`].
pub type InodeId = usize;

/// The root directory.
pub const ROOT: InodeId = 0;

pub const DEFAULT_DIR_PERMISSIONS: u32 = 0o555;
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o444;
pub const DEFAULT_SYMLINK_PERMISSIONS: u32 = 0o777;

/// One run of file content described by a single directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub lba: u32,
    pub size: u32,
}

pub struct FileNode {
    pub obj: ObjectRef,
    pub parts: Vec<Part>,
}

impl FileNode {
    fn new(obj: ObjectRef) -> Self {
        let size = obj.size();
        let mut parts = Vec::new();
        let mut left = size;
        loop {
            let n = left.min(MAX_PART_SIZE);
            parts.push(Part { lba: 0, size: n as u32 });
            left -= n;
            if left == 0 {
                break;
            }
        }
        Self { obj, parts }
    }

    pub fn size(&self) -> u64 {
        self.obj.size()
    }
}

#[derive(Debug, Default)]
pub struct DirNode {
    names: HashMap<String, Vec<u8>>,
    entries: BTreeMap<Vec<u8>, InodeId>,
    next_ident: u32,
    /// Encoded size of the directory extent, once laid out.
    pub size: u32,
    /// First LBA and sector count of the continuation area, if any.
    pub continuation: Option<(u32, u32)>,
}

impl DirNode {
    /// Children in identifier order.
    pub fn children(&self) -> impl Iterator<Item = (&[u8], InodeId)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_slice(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub enum InodeKind {
    File(FileNode),
    Directory(DirNode),
    Symlink(String),
}

pub struct Inode {
    pub ino: u32,
    pub name: String,
    /// Permission bits only; the file type comes from `kind`.
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub lba: u32,
    pub parent: Option<InodeId>,
    /// Extra entries appended to this inode's system use area.
    pub extra: Vec<SuspEntry>,
    pub kind: InodeKind,
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, InodeKind::Directory(_))
    }

    pub fn dir(&self) -> Option<&DirNode> {
        match &self.kind {
            InodeKind::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn file(&self) -> Option<&FileNode> {
        match &self.kind {
            InodeKind::File(f) => Some(f),
            _ => None,
        }
    }

    /// Mode as carried in `PX`: permissions plus file type.
    pub fn posix_mode(&self) -> u32 {
        let kind = match self.kind {
            InodeKind::File(_) => mode::S_IFREG,
            InodeKind::Directory(_) => mode::S_IFDIR,
            InodeKind::Symlink(_) => mode::S_IFLNK,
        };
        kind | (self.permissions & mode::PERMISSIONS)
    }
}

pub struct Tree {
    inodes: Vec<Inode>,
    next_ino: u64,
    policy: NamePolicy,
    now: DateTime<Utc>,
}

impl Tree {
    /// A tree holding only the root directory, inode 1. New inodes are
    /// stamped with `now`, truncated to whole seconds.
    pub fn new(policy: NamePolicy, now: DateTime<Utc>) -> Self {
        let now = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let root = Inode {
            ino: 1,
            name: String::new(),
            permissions: DEFAULT_DIR_PERMISSIONS,
            uid: 0,
            gid: 0,
            created: now,
            modified: now,
            lba: 0,
            parent: None,
            extra: Vec::new(),
            kind: InodeKind::Directory(DirNode::default()),
        };
        Self {
            inodes: vec![root],
            next_ino: 2,
            policy,
            now,
        }
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    pub fn get(&self, id: InodeId) -> &Inode {
        &self.inodes[id]
    }

    pub fn get_mut(&mut self, id: InodeId) -> &mut Inode {
        &mut self.inodes[id]
    }

    pub fn policy(&self) -> NamePolicy {
        self.policy
    }

    fn alloc_ino(&mut self) -> IsoResult<u32> {
        let ino = u32::try_from(self.next_ino)
            .map_err(|_| IsoError::overflow("inode numbers exhausted"))?;
        self.next_ino += 1;
        Ok(ino)
    }

    /// The child of `dir` called `name`.
    pub fn lookup(&self, dir: InodeId, name: &str) -> Option<InodeId> {
        let d = self.inodes[dir].dir()?;
        d.names.get(name).and_then(|ident| d.entries.get(ident)).copied()
    }

    /// Resolve a path to an inode without following symlinks.
    pub fn resolve(&self, path: &str) -> Option<InodeId> {
        let mut cur = ROOT;
        for seg in names::components(path) {
            cur = self.lookup(cur, seg)?;
        }
        Some(cur)
    }

    fn insert(&mut self, parent: InodeId, name: &str, kind: InodeKind) -> IsoResult<InodeId> {
        self.policy.validate(name)?;
        let is_dir = matches!(kind, InodeKind::Directory(_));
        let ident = {
            let path = self.path_of(parent);
            let InodeKind::Directory(d) = &mut self.inodes[parent].kind else {
                return Err(IsoError::NotADirectory(path));
            };
            if d.names.contains_key(name) {
                return Err(IsoError::Collision(names::join(&path, name)));
            }
            let n = d.next_ident;
            d.next_ident = n
                .checked_add(1)
                .ok_or_else(|| IsoError::overflow(format!("{path}: too many entries")))?;
            names::identifier(n, is_dir)
        };
        let ino = self.alloc_ino()?;
        let permissions = match kind {
            InodeKind::File(_) => DEFAULT_FILE_PERMISSIONS,
            InodeKind::Directory(_) => DEFAULT_DIR_PERMISSIONS,
            InodeKind::Symlink(_) => DEFAULT_SYMLINK_PERMISSIONS,
        };
        let id = self.inodes.len();
        self.inodes.push(Inode {
            ino,
            name: name.to_string(),
            permissions,
            uid: 0,
            gid: 0,
            created: self.now,
            modified: self.now,
            lba: 0,
            parent: Some(parent),
            extra: Vec::new(),
            kind,
        });
        if let InodeKind::Directory(d) = &mut self.inodes[parent].kind {
            d.names.insert(name.to_string(), ident.clone());
            d.entries.insert(ident, id);
        }
        Ok(id)
    }

    /// Create every missing directory along `path` and return the last.
    pub fn mkdir_all(&mut self, path: &str) -> IsoResult<InodeId> {
        let mut cur = ROOT;
        let mut walked = String::from("/");
        for seg in names::components(path) {
            walked = names::join(&walked, seg);
            cur = match self.lookup(cur, seg) {
                Some(id) if self.inodes[id].is_dir() => id,
                Some(_) => return Err(IsoError::NotADirectory(walked)),
                None => self.insert(cur, seg, InodeKind::Directory(DirNode::default()))?,
            };
        }
        Ok(cur)
    }

    fn parent_and_leaf(&mut self, path: &str) -> IsoResult<(InodeId, String)> {
        let cleaned = names::clean(path);
        if cleaned == "/" {
            return Err(IsoError::InvalidName {
                name: path.to_string(),
                reason: "path names the root".to_string(),
            });
        }
        let (dir, leaf) = names::split(&cleaned);
        let parent = self.mkdir_all(dir)?;
        Ok((parent, leaf.to_string()))
    }

    pub fn add_file(&mut self, path: &str, obj: ObjectRef) -> IsoResult<InodeId> {
        let (parent, leaf) = self.parent_and_leaf(path)?;
        self.insert(parent, &leaf, InodeKind::File(FileNode::new(obj)))
    }

    pub fn add_symlink(&mut self, path: &str, target: &str) -> IsoResult<InodeId> {
        if target.is_empty() {
            return Err(IsoError::InvalidName {
                name: path.to_string(),
                reason: "empty symlink target".to_string(),
            });
        }
        let (parent, leaf) = self.parent_and_leaf(path)?;
        self.insert(parent, &leaf, InodeKind::Symlink(target.to_string()))
    }

    /// Absolute path of `id`.
    pub fn path_of(&self, id: InodeId) -> String {
        let mut segs = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.inodes[cur].parent {
            segs.push(self.inodes[cur].name.as_str());
            cur = parent;
        }
        if segs.is_empty() {
            return "/".to_string();
        }
        segs.reverse();
        let mut out = String::new();
        for s in segs {
            out.push('/');
            out.push_str(s);
        }
        out
    }

    /// Link count: directories count `.`, their entry in the parent, and
    /// each subdirectory's `..`.
    pub fn nlink(&self, id: InodeId) -> u32 {
        match &self.inodes[id].kind {
            InodeKind::Directory(d) => {
                let subdirs = d.entries.values().filter(|&&c| self.inodes[c].is_dir()).count();
                2 + subdirs as u32
            }
            _ => 1,
        }
    }

    /// Every inode in level order, children in identifier order.
    pub fn bfs(&self) -> Vec<InodeId> {
        let mut out = Vec::with_capacity(self.inodes.len());
        let mut queue = VecDeque::from([ROOT]);
        while let Some(id) = queue.pop_front() {
            out.push(id);
            if let Some(d) = self.inodes[id].dir() {
                queue.extend(d.entries.values().copied());
            }
        }
        out
    }

    pub fn directories_bfs(&self) -> Vec<InodeId> {
        self.bfs().into_iter().filter(|&id| self.inodes[id].is_dir()).collect()
    }

    pub fn files_bfs(&self) -> Vec<InodeId> {
        self.bfs()
            .into_iter()
            .filter(|&id| matches!(self.inodes[id].kind, InodeKind::File(_)))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn set_next_ino(&mut self, next: u64) {
        self.next_ino = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vdisc_storage::ZeroObject;

    fn tree() -> Tree {
        Tree::new(NamePolicy::Extended, DateTime::UNIX_EPOCH)
    }

    fn zeros(n: u64) -> ObjectRef {
        Arc::new(ZeroObject::new(n))
    }

    #[test]
    fn intermediate_directories() {
        let mut t = tree();
        let f = t.add_file("/a/b/c.txt", zeros(3)).unwrap();
        assert_eq!(t.path_of(f), "/a/b/c.txt");
        let a = t.resolve("/a").unwrap();
        assert!(t.get(a).is_dir());
        assert_eq!(t.get(ROOT).ino, 1);
        assert_eq!(t.get(a).ino, 2);
        assert_eq!(t.get(f).ino, 4);
        assert_eq!(t.nlink(ROOT), 3);
        assert_eq!(t.nlink(f), 1);
        assert_eq!(t.get(f).posix_mode(), 0o100444);
        assert_eq!(t.get(a).posix_mode(), 0o040555);
    }

    #[test]
    fn collisions() {
        let mut t = tree();
        t.add_file("x", zeros(1)).unwrap();
        assert!(matches!(t.add_file("/x", zeros(1)), Err(IsoError::Collision(p)) if p == "/x"));
        assert!(matches!(t.add_file("/x/y", zeros(1)), Err(IsoError::NotADirectory(p)) if p == "/x"));
        assert!(matches!(t.mkdir_all("/x"), Err(IsoError::NotADirectory(_))));
        t.mkdir_all("/d").unwrap();
        assert!(matches!(t.add_symlink("/d", "x"), Err(IsoError::Collision(_))));
    }

    #[test]
    fn rejects_bad_names_and_targets() {
        let mut t = Tree::new(NamePolicy::Posix, DateTime::UNIX_EPOCH);
        assert!(matches!(t.add_file("/a b", zeros(1)), Err(IsoError::InvalidName { .. })));
        assert!(matches!(t.add_symlink("/l", ""), Err(IsoError::InvalidName { .. })));
        assert!(t.add_file("/", zeros(1)).is_err());
    }

    #[test]
    fn parts_split_at_max_part_size() {
        let mut t = tree();
        let sizes = [0, 1, MAX_PART_SIZE, MAX_PART_SIZE + 1, 3 * MAX_PART_SIZE];
        for (i, size) in sizes.into_iter().enumerate() {
            let id = t.add_file(&format!("f{i}"), zeros(size)).unwrap();
            let parts: Vec<u64> = t.get(id).file().unwrap().parts.iter().map(|p| p.size as u64).collect();
            let expect: Vec<u64> = match i {
                0 => vec![0],
                1 => vec![1],
                2 => vec![MAX_PART_SIZE],
                3 => vec![MAX_PART_SIZE, 1],
                _ => vec![MAX_PART_SIZE; 3],
            };
            assert_eq!(parts, expect);
        }
    }

    #[test]
    fn level_order() {
        let mut t = tree();
        t.add_file("/b/deep/f", zeros(1)).unwrap();
        t.add_file("/a", zeros(1)).unwrap();
        t.mkdir_all("/c").unwrap();
        let dirs: Vec<String> = t.directories_bfs().into_iter().map(|d| t.path_of(d)).collect();
        assert_eq!(dirs, ["/", "/b", "/c", "/b/deep"]);
        let files: Vec<String> = t.files_bfs().into_iter().map(|d| t.path_of(d)).collect();
        assert_eq!(files, ["/a", "/b/deep/f"]);
    }

    #[test]
    fn inode_exhaustion() {
        let mut t = tree();
        t.set_next_ino(u32::MAX as u64);
        t.add_file("/last", zeros(0)).unwrap();
        assert!(matches!(t.add_file("/over", zeros(0)), Err(IsoError::Overflow(_))));
    }
}
