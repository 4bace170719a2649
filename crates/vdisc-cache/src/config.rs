use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Which tier backs the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheBackend {
    /// Reads go straight to the source.
    None,
    Memory { bsize: u64, bcount: usize },
    Disk { root: PathBuf, bsize: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Most blocks prefetched beyond the current one.
    pub readahead_window: u64,
    /// Process-wide bound on in-flight prefetches.
    pub readahead_tokens: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory {
                bsize: 1024 * 1024,
                bcount: 64,
            },
            readahead_window: 32,
            readahead_tokens: 64,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(s: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> CacheResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> CacheResult<()> {
        match &self.backend {
            CacheBackend::Memory { bsize: 0, .. } | CacheBackend::Disk { bsize: 0, .. } => {
                Err(CacheError::Config("block size must be positive".into()))
            }
            CacheBackend::Memory { bcount: 0, .. } => {
                Err(CacheError::Config("block count must be positive".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = CacheConfig::default();
        assert_eq!(c.backend, CacheBackend::Memory { bsize: 1 << 20, bcount: 64 });
        assert_eq!(c.readahead_window, 32);
        assert_eq!(c.readahead_tokens, 64);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn disk_from_toml() {
        let c = CacheConfig::from_toml_str(
            r#"
            readahead_tokens = 8

            [backend]
            kind = "disk"
            root = "/var/cache/vdisc"
            bsize = 4096
            "#,
        )
        .unwrap();
        assert_eq!(
            c.backend,
            CacheBackend::Disk { root: "/var/cache/vdisc".into(), bsize: 4096 }
        );
        assert_eq!(c.readahead_tokens, 8);
        assert_eq!(c.readahead_window, 32);
    }

    #[test]
    fn none_backend() {
        let c = CacheConfig::from_toml_str("[backend]\nkind = \"none\"\n").unwrap();
        assert_eq!(c.backend, CacheBackend::None);
    }

    #[test]
    fn rejects_zero_block_size() {
        let err = CacheConfig::from_toml_str("[backend]\nkind = \"memory\"\nbsize = 0\nbcount = 4\n")
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let c = CacheConfig::default();
        let text = toml::to_string(&c).unwrap();
        assert_eq!(CacheConfig::from_toml_str(&text).unwrap(), c);
    }
}
