use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use crate::context::Context;
use crate::drivers::{DataDriver, FileDriver, MemoryDriver, ZeroDriver};
use crate::error::{StorageError, StorageResult};
use crate::object::{ObjectRef, ObjectWriter};

/// A storage backend for one URL scheme.
///
/// Drivers support at least one of random-access reads ([`open`](Self::open))
/// or atomic streamed writes ([`create`](Self::create)).
pub trait Driver: Send + Sync {
    /// Open `url` for random access.
    ///
    /// When `size_hint` is `Some`, drivers that would otherwise need a stat
    /// or HEAD round trip must trust it instead.
    fn open(&self, ctx: &Context, url: &str, size_hint: Option<u64>) -> StorageResult<ObjectRef>;

    /// Begin writing a new object at `url`.
    fn create(&self, _ctx: &Context, url: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        Err(StorageError::Unsupported(format!("create {url}")))
    }
}

/// Maps URL schemes to drivers.
///
/// Registration is expected at process init; lookups afterwards are
/// read-only. Registering a scheme twice fails deterministically.
pub struct Registry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in `file`, `mem`, `zero` and `data` drivers.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let builtin: [(&str, Arc<dyn Driver>); 4] = [
            ("file", Arc::new(FileDriver)),
            ("mem", Arc::new(MemoryDriver::new())),
            ("zero", Arc::new(ZeroDriver)),
            ("data", Arc::new(DataDriver)),
        ];
        for (scheme, driver) in builtin {
            // A fresh registry cannot already hold these schemes.
            let _ = registry.register(scheme, driver);
        }
        registry
    }

    /// Register `driver` for `scheme`. Fails if the scheme is taken.
    pub fn register(&self, scheme: &str, driver: Arc<dyn Driver>) -> StorageResult<()> {
        let scheme = scheme.to_ascii_lowercase();
        let mut drivers = self.drivers.write().expect("lock poisoned");
        if drivers.contains_key(&scheme) {
            return Err(StorageError::DuplicateDriver(scheme));
        }
        debug!(%scheme, "registered storage driver");
        drivers.insert(scheme, driver);
        Ok(())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let drivers = self.drivers.read().expect("lock poisoned");
        let mut schemes: Vec<String> = drivers.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// The driver responsible for `url`, falling back to `file` when the
    /// URL carries no scheme.
    pub fn driver_for(&self, url: &str) -> StorageResult<Arc<dyn Driver>> {
        let scheme = scheme_of(url)
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| "file".to_string());
        let drivers = self.drivers.read().expect("lock poisoned");
        drivers
            .get(&scheme)
            .cloned()
            .ok_or(StorageError::UnsupportedScheme(scheme))
    }

    pub fn open(&self, url: &str) -> StorageResult<ObjectRef> {
        self.open_context_size(&Context::background(), url, None)
    }

    pub fn open_context(&self, ctx: &Context, url: &str) -> StorageResult<ObjectRef> {
        self.open_context_size(ctx, url, None)
    }

    /// Open `url` with an optional pre-declared size.
    pub fn open_context_size(
        &self,
        ctx: &Context,
        url: &str,
        size_hint: Option<u64>,
    ) -> StorageResult<ObjectRef> {
        ctx.check()?;
        self.driver_for(url)?.open(ctx, url, size_hint)
    }

    pub fn create(&self, url: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        self.create_context(&Context::background(), url)
    }

    pub fn create_context(&self, ctx: &Context, url: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        ctx.check()?;
        self.driver_for(url)?.create(ctx, url)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// The process-wide registry, initialized with the built-in drivers.
pub fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::with_builtin)
}

/// Open `url` through the global registry.
pub fn open(url: &str) -> StorageResult<ObjectRef> {
    global().open(url)
}

/// Open `url` through the global registry with a known size.
pub fn open_size(url: &str, size: u64) -> StorageResult<ObjectRef> {
    global().open_context_size(&Context::background(), url, Some(size))
}

/// Create `url` through the global registry.
pub fn create(url: &str) -> StorageResult<Box<dyn ObjectWriter>> {
    global().create(url)
}

/// The RFC 3986 scheme of `url`, if it has one.
///
/// Single-letter schemes are treated as drive letters, not schemes.
pub fn scheme_of(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() || scheme.len() < 2 {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::read_all;
    use std::io::Write;

    #[test]
    fn scheme_parsing() {
        assert_eq!(scheme_of("https://example.com/a"), Some("https"));
        assert_eq!(scheme_of("data:,hi"), Some("data"));
        assert_eq!(scheme_of("zero:10"), Some("zero"));
        assert_eq!(scheme_of("/var/tmp/x"), None);
        assert_eq!(scheme_of("relative/path"), None);
        assert_eq!(scheme_of("C:\\x"), None);
        assert_eq!(scheme_of("s3+v4://b/k"), Some("s3+v4"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        registry.register("zero", Arc::new(ZeroDriver)).unwrap();
        let err = registry.register("ZERO", Arc::new(ZeroDriver)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateDriver(s) if s == "zero"));
    }

    #[test]
    fn unknown_scheme() {
        let registry = Registry::with_builtin();
        let err = registry.open("gopher://x").unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedScheme(s) if s == "gopher"));
    }

    #[test]
    fn bare_path_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"payload").unwrap();
        let registry = Registry::with_builtin();
        let obj = registry.open(path.to_str().unwrap()).unwrap();
        assert_eq!(read_all(obj.as_ref()).unwrap(), b"payload");
    }

    #[test]
    fn canceled_context_rejects_open() {
        let registry = Registry::with_builtin();
        let ctx = Context::background();
        ctx.cancel();
        let err = registry.open_context(&ctx, "zero:4").unwrap_err();
        assert!(matches!(err, StorageError::Canceled));
    }

    #[test]
    fn memory_create_then_open() {
        let registry = Registry::with_builtin();
        let mut w = registry.create("mem://bucket/key").unwrap();
        w.write_all(b"abc").unwrap();
        assert_eq!(w.commit().unwrap(), "mem://bucket/key");
        let obj = registry.open("mem://bucket/key").unwrap();
        assert_eq!(read_all(obj.as_ref()).unwrap(), b"abc");
    }

    #[test]
    fn global_has_builtins() {
        let schemes = global().schemes();
        for s in ["data", "file", "mem", "zero"] {
            assert!(schemes.iter().any(|x| x == s), "missing {s}");
        }
    }
}
