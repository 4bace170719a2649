//! System Use Sharing Protocol entries and the Rock Ridge entries carried in
//! them.
//!
//! Every entry is `signature(2) || length(1) || version(1) || payload`, where
//! `length` counts the whole entry.

use chrono::{DateTime, Utc};

use crate::datetime::{self, DECIMAL_LEN, ENTRY_LEN};
use crate::encoding::{put_u32_both, u32_both};
use crate::error::{IsoError, IsoResult};

/// Length of a `CE` entry.
pub const CE_LEN: usize = 28;
/// Length of a `PX` entry.
pub const PX_LEN: usize = 44;
/// Longest name chunk in one `NM` entry.
pub const NM_MAX_CHUNK: usize = 250;
/// Longest component chunk in one `SL` entry.
pub const SL_MAX_CHUNK: usize = 248;
/// Longest single entry.
pub const MAX_ENTRY_LEN: usize = 255;

const HEADER_LEN: usize = 4;

/// `NM` flag: the name continues in the next `NM` entry.
pub const NM_CONTINUE: u8 = 0x01;

/// `SL` entry flag: the link continues in the next `SL` entry.
pub const SL_CONTINUE: u8 = 0x01;

/// `SL` component flags.
pub mod component {
    pub const CONTINUE: u8 = 0x01;
    pub const CURRENT: u8 = 0x02;
    pub const PARENT: u8 = 0x04;
    pub const ROOT: u8 = 0x08;
}

/// `TF` flags, one per timestamp in order, plus the long-form bit.
pub mod tf {
    pub const CREATION: u8 = 0x01;
    pub const MODIFY: u8 = 0x02;
    pub const ACCESS: u8 = 0x04;
    pub const ATTRIBUTES: u8 = 0x08;
    pub const BACKUP: u8 = 0x10;
    pub const EXPIRATION: u8 = 0x20;
    pub const EFFECTIVE: u8 = 0x40;
    pub const LONG_FORM: u8 = 0x80;
}

pub const RRIP_ID: &str = "RRIP_1991A";
pub const RRIP_DESCRIPTOR: &str =
    "THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS";
pub const RRIP_SOURCE: &str = "PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.  \
SEE PUBLISHER IDENTIFIER IN PRIMARY VOLUME DESCRIPTOR FOR CONTACT INFORMATION.";

/// Where a continuation area lives on the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContinuationRef {
    pub lba: u32,
    pub offset: u32,
    pub len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PosixAttrs {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub ino: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlComponent {
    pub flags: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspEntry {
    /// Sharing protocol indicator; only on the root's `.` record.
    Sp { len_skp: u8 },
    /// Terminator.
    St,
    /// Continuation area pointer.
    Ce(ContinuationRef),
    /// Extensions reference.
    Er {
        identifier: Vec<u8>,
        descriptor: Vec<u8>,
        source: Vec<u8>,
        version: u8,
    },
    /// Alternate name chunk.
    Nm { flags: u8, name: Vec<u8> },
    /// POSIX attributes.
    Px(PosixAttrs),
    /// Symbolic link components.
    Sl { flags: u8, components: Vec<SlComponent> },
    /// Timestamps selected by `flags`.
    Tf { flags: u8, times: Vec<DateTime<Utc>> },
    /// Anything this crate does not interpret.
    Other {
        signature: [u8; 2],
        version: u8,
        data: Vec<u8>,
    },
}

impl SuspEntry {
    /// The extensions reference for Rock Ridge.
    pub fn rrip() -> Self {
        SuspEntry::Er {
            identifier: RRIP_ID.as_bytes().to_vec(),
            descriptor: RRIP_DESCRIPTOR.as_bytes().to_vec(),
            source: RRIP_SOURCE.as_bytes().to_vec(),
            version: 1,
        }
    }

    pub fn signature(&self) -> [u8; 2] {
        match self {
            SuspEntry::Sp { .. } => *b"SP",
            SuspEntry::St => *b"ST",
            SuspEntry::Ce(_) => *b"CE",
            SuspEntry::Er { .. } => *b"ER",
            SuspEntry::Nm { .. } => *b"NM",
            SuspEntry::Px(_) => *b"PX",
            SuspEntry::Sl { .. } => *b"SL",
            SuspEntry::Tf { .. } => *b"TF",
            SuspEntry::Other { signature, .. } => *signature,
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + match self {
                SuspEntry::Sp { .. } => 3,
                SuspEntry::St => 0,
                SuspEntry::Ce(_) => CE_LEN - HEADER_LEN,
                SuspEntry::Er {
                    identifier,
                    descriptor,
                    source,
                    ..
                } => 4 + identifier.len() + descriptor.len() + source.len(),
                SuspEntry::Nm { name, .. } => 1 + name.len(),
                SuspEntry::Px(_) => PX_LEN - HEADER_LEN,
                SuspEntry::Sl { components, .. } => {
                    1 + components.iter().map(|c| 2 + c.data.len()).sum::<usize>()
                }
                SuspEntry::Tf { flags, times } => {
                    let each = if flags & tf::LONG_FORM != 0 {
                        DECIMAL_LEN
                    } else {
                        ENTRY_LEN
                    };
                    1 + times.len() * each
                }
                SuspEntry::Other { data, .. } => data.len(),
            }
    }

    fn version(&self) -> u8 {
        match self {
            SuspEntry::Other { version, .. } => *version,
            _ => 1,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> IsoResult<()> {
        let len = self.encoded_len();
        if len > MAX_ENTRY_LEN {
            let sig = self.signature();
            return Err(IsoError::overflow(format!(
                "{} entry of {len} bytes",
                String::from_utf8_lossy(&sig)
            )));
        }
        out.extend_from_slice(&self.signature());
        out.push(len as u8);
        out.push(self.version());
        match self {
            SuspEntry::Sp { len_skp } => out.extend_from_slice(&[0xBE, 0xEF, *len_skp]),
            SuspEntry::St => {}
            SuspEntry::Ce(r) => {
                put_u32_both(out, r.lba);
                put_u32_both(out, r.offset);
                put_u32_both(out, r.len);
            }
            SuspEntry::Er {
                identifier,
                descriptor,
                source,
                version,
            } => {
                out.extend_from_slice(&[
                    identifier.len() as u8,
                    descriptor.len() as u8,
                    source.len() as u8,
                    *version,
                ]);
                out.extend_from_slice(identifier);
                out.extend_from_slice(descriptor);
                out.extend_from_slice(source);
            }
            SuspEntry::Nm { flags, name } => {
                out.push(*flags);
                out.extend_from_slice(name);
            }
            SuspEntry::Px(px) => {
                for v in [px.mode, px.nlink, px.uid, px.gid, px.ino] {
                    put_u32_both(out, v);
                }
            }
            SuspEntry::Sl { flags, components } => {
                out.push(*flags);
                for c in components {
                    out.push(c.flags);
                    out.push(c.data.len() as u8);
                    out.extend_from_slice(&c.data);
                }
            }
            SuspEntry::Tf { flags, times } => {
                out.push(*flags);
                for t in times {
                    if flags & tf::LONG_FORM != 0 {
                        out.extend_from_slice(&datetime::encode_decimal(Some(t)));
                    } else {
                        out.extend_from_slice(&datetime::encode_entry(t));
                    }
                }
            }
            SuspEntry::Other { data, .. } => out.extend_from_slice(data),
        }
        Ok(())
    }

    /// Decode entries until the area ends, an `ST` entry, or zero padding.
    pub fn decode_all(area: &[u8]) -> IsoResult<Vec<SuspEntry>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos + HEADER_LEN <= area.len() {
            let sig = [area[pos], area[pos + 1]];
            let len = area[pos + 2] as usize;
            if sig == [0, 0] {
                break;
            }
            if len < HEADER_LEN || pos + len > area.len() {
                return Err(IsoError::format(format!(
                    "{} entry of length {len} at offset {pos}",
                    String::from_utf8_lossy(&sig)
                )));
            }
            let entry = Self::decode_one(sig, area[pos + 3], &area[pos + HEADER_LEN..pos + len])?;
            pos += len;
            if entry == SuspEntry::St {
                break;
            }
            out.push(entry);
        }
        Ok(out)
    }

    fn decode_one(sig: [u8; 2], version: u8, p: &[u8]) -> IsoResult<SuspEntry> {
        let short = || {
            IsoError::format(format!(
                "{} entry too short ({} payload bytes)",
                String::from_utf8_lossy(&sig),
                p.len()
            ))
        };
        Ok(match &sig {
            b"SP" => {
                if p.len() < 3 || p[0] != 0xBE || p[1] != 0xEF {
                    return Err(IsoError::format("SP entry without BE EF check bytes"));
                }
                SuspEntry::Sp { len_skp: p[2] }
            }
            b"ST" => SuspEntry::St,
            b"CE" => {
                if p.len() < CE_LEN - HEADER_LEN {
                    return Err(short());
                }
                SuspEntry::Ce(ContinuationRef {
                    lba: u32_both(&p[0..8])?,
                    offset: u32_both(&p[8..16])?,
                    len: u32_both(&p[16..24])?,
                })
            }
            b"ER" => {
                if p.len() < 4 {
                    return Err(short());
                }
                let (li, ld, ls) = (p[0] as usize, p[1] as usize, p[2] as usize);
                let body = &p[4..];
                if body.len() < li + ld + ls {
                    return Err(short());
                }
                SuspEntry::Er {
                    identifier: body[..li].to_vec(),
                    descriptor: body[li..li + ld].to_vec(),
                    source: body[li + ld..li + ld + ls].to_vec(),
                    version: p[3],
                }
            }
            b"NM" => {
                let (&flags, name) = p.split_first().ok_or_else(short)?;
                SuspEntry::Nm {
                    flags,
                    name: name.to_vec(),
                }
            }
            b"PX" => {
                // RRIP 1.09 omits the serial number.
                if p.len() < 32 {
                    return Err(short());
                }
                let ino = if p.len() >= 40 { u32_both(&p[32..40])? } else { 0 };
                SuspEntry::Px(PosixAttrs {
                    mode: u32_both(&p[0..8])?,
                    nlink: u32_both(&p[8..16])?,
                    uid: u32_both(&p[16..24])?,
                    gid: u32_both(&p[24..32])?,
                    ino,
                })
            }
            b"SL" => {
                let (&flags, mut rest) = p.split_first().ok_or_else(short)?;
                let mut components = Vec::new();
                while rest.len() >= 2 {
                    let clen = rest[1] as usize;
                    if rest.len() < 2 + clen {
                        return Err(short());
                    }
                    components.push(SlComponent {
                        flags: rest[0],
                        data: rest[2..2 + clen].to_vec(),
                    });
                    rest = &rest[2 + clen..];
                }
                SuspEntry::Sl { flags, components }
            }
            b"TF" => {
                let (&flags, mut rest) = p.split_first().ok_or_else(short)?;
                let count = (flags & 0x7F).count_ones() as usize;
                let long = flags & tf::LONG_FORM != 0;
                let mut times = Vec::with_capacity(count);
                for _ in 0..count {
                    let t = if long {
                        if rest.len() < DECIMAL_LEN {
                            return Err(short());
                        }
                        let t = datetime::decode_decimal(rest)?.unwrap_or(DateTime::UNIX_EPOCH);
                        rest = &rest[DECIMAL_LEN..];
                        t
                    } else {
                        if rest.len() < ENTRY_LEN {
                            return Err(short());
                        }
                        let t = datetime::decode_entry(rest)?;
                        rest = &rest[ENTRY_LEN..];
                        t
                    };
                    times.push(t);
                }
                SuspEntry::Tf { flags, times }
            }
            _ => SuspEntry::Other {
                signature: sig,
                version,
                data: p.to_vec(),
            },
        })
    }
}

/// Total encoded length of `entries`.
pub fn encoded_len(entries: &[SuspEntry]) -> usize {
    entries.iter().map(SuspEntry::encoded_len).sum()
}

/// Encode `entries` back to back.
pub fn encode_all(entries: &[SuspEntry], out: &mut Vec<u8>) -> IsoResult<()> {
    for e in entries {
        e.encode(out)?;
    }
    Ok(())
}

/// `NM` entries spelling `name`, split into chunks of at most
/// [`NM_MAX_CHUNK`] bytes.
pub fn name_entries(name: &[u8]) -> Vec<SuspEntry> {
    let chunks: Vec<&[u8]> = name.chunks(NM_MAX_CHUNK).collect();
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| SuspEntry::Nm {
            flags: if i < last { NM_CONTINUE } else { 0 },
            name: chunk.to_vec(),
        })
        .collect()
}

/// The name spelled by the `NM` entries in `entries`, if any.
pub fn decode_name(entries: &[SuspEntry]) -> Option<Vec<u8>> {
    let mut name: Option<Vec<u8>> = None;
    for e in entries {
        if let SuspEntry::Nm { flags, name: chunk } = e {
            if flags & (component::CURRENT | component::PARENT) != 0 {
                continue;
            }
            name.get_or_insert_with(Vec::new).extend_from_slice(chunk);
        }
    }
    name
}

/// `SL` entries describing `target`.
///
/// The target is split on `/`; each segment becomes one component, longer
/// segments are split into [`SL_MAX_CHUNK`]-byte components carrying the
/// continue flag. Components are packed into as few entries as fit.
pub fn symlink_entries(target: &str) -> Vec<SuspEntry> {
    let mut components = Vec::new();
    if target.starts_with('/') {
        components.push(SlComponent {
            flags: component::ROOT,
            data: Vec::new(),
        });
    }
    for seg in target.split('/').filter(|s| !s.is_empty()) {
        match seg {
            "." => components.push(SlComponent {
                flags: component::CURRENT,
                data: Vec::new(),
            }),
            ".." => components.push(SlComponent {
                flags: component::PARENT,
                data: Vec::new(),
            }),
            _ => {
                let chunks: Vec<&[u8]> = seg.as_bytes().chunks(SL_MAX_CHUNK).collect();
                let last = chunks.len() - 1;
                for (i, chunk) in chunks.into_iter().enumerate() {
                    components.push(SlComponent {
                        flags: if i < last { component::CONTINUE } else { 0 },
                        data: chunk.to_vec(),
                    });
                }
            }
        }
    }

    let mut entries = Vec::new();
    let mut current: Vec<SlComponent> = Vec::new();
    let mut current_len = HEADER_LEN + 1;
    for c in components {
        let clen = 2 + c.data.len();
        if current_len + clen > MAX_ENTRY_LEN && !current.is_empty() {
            entries.push(SuspEntry::Sl {
                flags: SL_CONTINUE,
                components: std::mem::take(&mut current),
            });
            current_len = HEADER_LEN + 1;
        }
        current_len += clen;
        current.push(c);
    }
    entries.push(SuspEntry::Sl {
        flags: 0,
        components: current,
    });
    entries
}

/// The link target spelled by the `SL` entries in `entries`, if any.
pub fn decode_symlink(entries: &[SuspEntry]) -> Option<String> {
    let mut target: Option<String> = None;
    let mut joined = false;
    for e in entries {
        let SuspEntry::Sl { components, .. } = e else {
            continue;
        };
        let out = target.get_or_insert_with(String::new);
        for c in components {
            if c.flags & component::ROOT != 0 {
                out.clear();
                out.push('/');
                joined = false;
                continue;
            }
            let piece = if c.flags & component::CURRENT != 0 {
                ".".into()
            } else if c.flags & component::PARENT != 0 {
                "..".into()
            } else {
                String::from_utf8_lossy(&c.data)
            };
            if !joined && !out.is_empty() && !out.ends_with('/') {
                out.push('/');
            }
            out.push_str(&piece);
            joined = c.flags & component::CONTINUE != 0;
        }
    }
    target
}
