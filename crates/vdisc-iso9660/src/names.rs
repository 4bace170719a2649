//! Name validation, generated identifiers, and path cleaning.

use serde::{Deserialize, Serialize};

use crate::error::{IsoError, IsoResult};

/// Characters never accepted by [`NamePolicy::Extended`].
const EXTENDED_INVALID: &[char] = &[
    '/', '\\', '?', '%', '*', ':', '|', '"', '<', '>', ' ', '\n', '\t', '$', '!',
];

/// Which names the builder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePolicy {
    /// The POSIX portable filename set `[A-Za-z0-9._-]`.
    Posix,
    /// Printable Unicode except path separators, shell metacharacters, and
    /// whitespace.
    #[default]
    Extended,
}

impl NamePolicy {
    pub fn validate(&self, name: &str) -> IsoResult<()> {
        let invalid = |reason: &str| IsoError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if name == "." || name == ".." {
            return Err(invalid("reserved name"));
        }
        let bad = match self {
            NamePolicy::Posix => name
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))),
            NamePolicy::Extended => name
                .chars()
                .find(|c| c.is_control() || EXTENDED_INVALID.contains(c)),
        };
        match bad {
            Some(c) => Err(invalid(&format!("character {c:?} not allowed"))),
            None => Ok(()),
        }
    }
}

impl std::str::FromStr for NamePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posix" => Ok(NamePolicy::Posix),
            "extended" => Ok(NamePolicy::Extended),
            other => Err(format!("unknown name policy {other:?}")),
        }
    }
}

const BASE32HEX: &[u8; 32] = b"0123456789ABCDEFGHIJKLMNOPQRSTUV";
const IDENT_DIGITS: usize = 8;

/// The ISO identifier for the `n`th child of a directory.
///
/// Fixed-width base32 keeps lexical order equal to creation order. Files and
/// symlinks carry the `;1` version suffix.
pub fn identifier(n: u32, is_dir: bool) -> Vec<u8> {
    let mut out = vec![b'0'; IDENT_DIGITS];
    let mut v = n as u64;
    for slot in out.iter_mut().rev() {
        *slot = BASE32HEX[(v % 32) as usize];
        v /= 32;
    }
    if !is_dir {
        out.extend_from_slice(b";1");
    }
    out
}

/// The display form of an ISO identifier: version suffix and a trailing dot
/// removed.
pub fn display_identifier(ident: &[u8]) -> String {
    let s = String::from_utf8_lossy(ident);
    let s = match s.rfind(';') {
        Some(i) => &s[..i],
        None => &s,
    };
    s.strip_suffix('.').unwrap_or(s).to_string()
}

/// Split `path` into components, resolving `.` and `..` lexically. `..`
/// never climbs above the root.
pub fn components(path: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out
}

/// Canonical absolute form of `path`.
pub fn clean(path: &str) -> String {
    let parts = components(path);
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for p in parts {
        out.push('/');
        out.push_str(p);
    }
    out
}

/// Join a child name onto a cleaned directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent directory and final component of a cleaned path.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}
