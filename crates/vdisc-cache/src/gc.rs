use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::disk::{is_bookkeeping, DiskCache};
use crate::error::{CacheError, CacheResult};

/// How much free space the collector must leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GcThreshold {
    FreeBytes(u64),
    FreePercent(f64),
}

impl GcThreshold {
    pub fn is_met(&self, usage: SpaceUsage) -> bool {
        match *self {
            GcThreshold::FreeBytes(want) => usage.available >= want,
            GcThreshold::FreePercent(pct) => {
                if usage.total == 0 {
                    return true;
                }
                usage.available as f64 * 100.0 / usage.total as f64 >= pct
            }
        }
    }
}

impl FromStr for GcThreshold {
    type Err = CacheError;

    /// Accepts `"15%"`, or a byte count with an optional binary `K`/`M`/`G`/`T`
    /// suffix such as `"10G"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CacheError::InvalidThreshold(s.to_string());
        let t = s.trim();
        if let Some(pct) = t.strip_suffix('%') {
            let pct: f64 = pct.trim().parse().map_err(|_| invalid())?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(invalid());
            }
            return Ok(GcThreshold::FreePercent(pct));
        }
        let (digits, shift) = match t.char_indices().last() {
            Some((i, c)) if c.is_ascii_alphabetic() => {
                let shift = match c.to_ascii_uppercase() {
                    'K' => 10,
                    'M' => 20,
                    'G' => 30,
                    'T' => 40,
                    _ => return Err(invalid()),
                };
                (&t[..i], shift)
            }
            _ => (t, 0),
        };
        let n: u64 = digits.trim().parse().map_err(|_| invalid())?;
        n.checked_mul(1u64 << shift)
            .map(GcThreshold::FreeBytes)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for GcThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcThreshold::FreeBytes(n) => write!(f, "{n}"),
            GcThreshold::FreePercent(p) => write!(f, "{p}%"),
        }
    }
}

impl TryFrom<String> for GcThreshold {
    type Error = CacheError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GcThreshold> for String {
    fn from(t: GcThreshold) -> Self {
        t.to_string()
    }
}

/// Free and total bytes of the filesystem holding the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceUsage {
    pub available: u64,
    pub total: u64,
}

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
    /// Whether the threshold held when the run ended.
    pub threshold_met: bool,
}

impl DiskCache {
    /// Space usage of the filesystem holding this cache.
    pub fn space_usage(&self) -> io::Result<SpaceUsage> {
        let root = self.root();
        Ok(SpaceUsage {
            available: fs2::available_space(root)?,
            total: fs2::total_space(root)?,
        })
    }

    /// Evict entries in random order until `threshold` holds.
    pub fn gc(&self, threshold: GcThreshold) -> CacheResult<GcReport> {
        self.gc_with(threshold, |_| self.space_usage())
    }

    /// Like [`gc`](Self::gc), but space usage comes from `probe`, which is
    /// given the number of bytes freed so far.
    pub fn gc_with<F>(&self, threshold: GcThreshold, mut probe: F) -> CacheResult<GcReport>
    where
        F: FnMut(u64) -> io::Result<SpaceUsage>,
    {
        let mut report = GcReport::default();
        if threshold.is_met(probe(0)?) {
            report.threshold_met = true;
            return Ok(report);
        }

        let mut rng = rand::thread_rng();
        let mut dirs: Vec<PathBuf> = fs::read_dir(self.entries_dir())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        dirs.shuffle(&mut rng);

        for dir in dirs {
            let mut victims: Vec<PathBuf> = match fs::read_dir(&dir) {
                Ok(rd) => rd
                    .filter_map(|e| e.ok())
                    .filter(|e| !is_bookkeeping(&e.file_name().to_string_lossy()))
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .map(|e| e.path())
                    .collect(),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable cache directory");
                    continue;
                }
            };
            victims.shuffle(&mut rng);

            for victim in victims {
                let size = match fs::metadata(&victim) {
                    Ok(m) => m.len(),
                    Err(_) => continue,
                };
                match fs::remove_file(&victim) {
                    Ok(()) => {
                        report.files_removed += 1;
                        report.bytes_freed += size;
                        debug!(path = %victim.display(), size, "evicted cache entry");
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
                if threshold.is_met(probe(report.bytes_freed)?) {
                    report.threshold_met = true;
                    info!(
                        files = report.files_removed,
                        bytes = report.bytes_freed,
                        "cache gc reached threshold"
                    );
                    return Ok(report);
                }
            }
        }

        info!(
            files = report.files_removed,
            bytes = report.bytes_freed,
            "cache gc exhausted victims"
        );
        Ok(report)
    }
}
