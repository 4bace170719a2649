//! Virtual disc catalogs.
//!
//! A catalog is the table of contents of a virtual disc: for every extent of
//! an ISO 9660 image, which object provides its bytes and how many zero
//! bytes pad it to a sector boundary. Extent URLs are stored in an inverted
//! [`UriTrie`] so shared prefixes are written once.
//!
//! - [`burn`] builds an image from a list of objects and publishes its
//!   metadata and catalog
//! - [`VDisc`] opens a catalog as one image object, reading every extent
//!   through a [`vdisc_cache::Cache`]
//! - [`Catalog`] is the serialized form

pub mod burn;
pub mod error;
pub mod format;
pub mod loader;
pub mod trie;

pub use burn::{burn, read_csv, BurnEntry, BurnOptions, BurnReport, HEADER_SUFFIX, SYMLINK_PREFIX};
pub use error::{CatalogError, CatalogResult};
pub use format::{Catalog, CatalogV1, Extent, FS_TYPE_ISO9660, GZIP_MAGIC};
pub use loader::{resolve_url, VDisc};
pub use trie::{UriNode, UriTrie};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::TimeZone;
    use vdisc_cache::{Cache, DiskCache, CHECKSUM_XATTR, KEY_XATTR};
    use vdisc_storage::{
        read_all, Context, DataDriver, Driver, MemoryDriver, Object, ObjectRef, Registry, StorageResult,
        ZeroDriver,
    };

    const HELLO_URL: &str = "data:,Hello%2C%20World!";
    const HELLO_KEY: &str = r#"{"url":"data:,Hello%2C%20World!","off":0,"len":13}"#;

    /// Serves `data:` URLs and counts the reads that reach them.
    #[derive(Default)]
    struct CountingData {
        reads: Arc<AtomicUsize>,
    }

    struct Counted {
        inner: ObjectRef,
        reads: Arc<AtomicUsize>,
    }

    impl Object for Counted {
        fn url(&self) -> &str {
            self.inner.url()
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }

        fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_at(buf, off)
        }
    }

    impl Driver for CountingData {
        fn open(&self, ctx: &Context, url: &str, size_hint: Option<u64>) -> StorageResult<ObjectRef> {
            Ok(Arc::new(Counted {
                inner: DataDriver.open(ctx, url, size_hint)?,
                reads: Arc::clone(&self.reads),
            }))
        }
    }

    fn registry() -> (Registry, Arc<AtomicUsize>) {
        let data = CountingData::default();
        let reads = Arc::clone(&data.reads);
        let registry = Registry::new();
        registry.register("mem", Arc::new(MemoryDriver::new())).unwrap();
        registry.register("zero", Arc::new(ZeroDriver)).unwrap();
        registry.register("data", Arc::new(data)).unwrap();
        (registry, reads)
    }

    fn opts() -> BurnOptions {
        BurnOptions {
            timestamp: Some(chrono::Utc.with_ymd_and_hms(2023, 3, 4, 5, 6, 7).unwrap()),
            ..BurnOptions::default()
        }
    }

    /// Burn a disc holding `/hello.txt` and open it through `cache`.
    fn hello_disc(registry: &Registry, cache: &Cache) -> VDisc {
        let ctx = Context::background();
        let entries = [BurnEntry::file("/hello.txt", HELLO_URL, Some(13))];
        burn(&ctx, registry, "mem:discs/hello", &entries, &opts()).unwrap();
        VDisc::open_with(&ctx, registry, "mem:discs/hello", cache).unwrap()
    }

    fn hello_extent(disc: &VDisc) -> ObjectRef {
        let info = disc.walker().unwrap().stat("/hello.txt").unwrap();
        disc.open_extent(info.extent).unwrap()
    }

    fn cache_path(root: &Path) -> std::path::PathBuf {
        root.join("v0/60/db8a29f0b095e1b5135740e98ff420")
    }

    #[test]
    fn disk_cache_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(dir.path(), 4096).unwrap();
        let (registry, reads) = registry();
        let disc = hello_disc(&registry, &Cache::new(Arc::new(disk.clone()), 32, 64));
        let file = hello_extent(&disc);
        assert_eq!(file.url(), HELLO_URL);

        assert_eq!(read_all(file.as_ref()).unwrap(), b"Hello, World!");
        disk.wait_for_writeback();
        let first = reads.load(Ordering::SeqCst);
        assert!(first >= 1);

        let path = cache_path(dir.path());
        assert_eq!(std::fs::read(&path).unwrap(), b"Hello, World!");
        assert_eq!(xattr::get(&path, KEY_XATTR).unwrap().unwrap(), HELLO_KEY.as_bytes());
        assert_eq!(
            xattr::get(&path, CHECKSUM_XATTR).unwrap().unwrap(),
            [0x7f, 0xe4, 0x0f, 0x08, 0xf8, 0xac, 0x9a, 0xc4]
        );

        assert_eq!(read_all(file.as_ref()).unwrap(), b"Hello, World!");
        assert_eq!(reads.load(Ordering::SeqCst), first);
    }

    #[test]
    fn stale_cache_key_is_refilled() {
        let dir = tempfile::tempdir().unwrap();
        let path = cache_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"Goodbye, All!").unwrap();
        xattr::set(&path, KEY_XATTR, br#"{"url":"data:,other","off":0,"len":13}"#).unwrap();

        let disk = DiskCache::new(dir.path(), 4096).unwrap();
        let (registry, reads) = registry();
        let disc = hello_disc(&registry, &Cache::new(Arc::new(disk.clone()), 32, 64));
        let file = hello_extent(&disc);

        assert_eq!(read_all(file.as_ref()).unwrap(), b"Hello, World!");
        disk.wait_for_writeback();
        assert!(reads.load(Ordering::SeqCst) >= 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"Hello, World!");
        assert_eq!(xattr::get(&path, KEY_XATTR).unwrap().unwrap(), HELLO_KEY.as_bytes());
    }

    #[test]
    fn read_spanning_two_slices() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(dir.path(), 10).unwrap();
        let (registry, _) = registry();
        let disc = hello_disc(&registry, &Cache::new(Arc::new(disk.clone()), 32, 64));
        let file = hello_extent(&disc);

        assert_eq!(read_all(file.as_ref()).unwrap(), b"Hello, World!");
        disk.wait_for_writeback();
        for (off, len, want) in [(0, 10, &b"Hello, Wor"[..]), (10, 3, &b"ld!"[..])] {
            let key = vdisc_cache::disk::cache_key(HELLO_URL, off, len);
            let (data, _) = disk.paths_for_key(&key);
            assert_eq!(std::fs::read(&data).unwrap(), want);
        }
    }

    #[test]
    fn image_matches_built_volume() {
        let (registry, _) = registry();
        let disc = hello_disc(&registry, &Cache::passthrough());
        assert_eq!(disc.extent_count(), 2);
        assert_eq!(disc.extent_url(0), Some("mem:discs/hello.isohdr"));
        assert_eq!(disc.extent_url(1), Some(HELLO_URL));
        assert!(matches!(disc.open_extent(1), Err(CatalogError::NoExtent(1))));

        let walker = disc.walker().unwrap();
        let info = walker.stat("/hello.txt").unwrap();
        assert_eq!(info.size, 13);
        assert_eq!(read_all(walker.open("/hello.txt").unwrap().as_ref()).unwrap(), b"Hello, World!");

        let image = read_all(&disc).unwrap();
        assert_eq!(image.len() as u64, disc.size());
        assert_eq!(image.len() % 2048, 0);
        let at = info.extent as usize * 2048;
        assert_eq!(&image[at..at + 13], b"Hello, World!");
        assert!(image[at + 13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn csv_burn_and_load_with_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::new();
        let mut want = Vec::new();
        for (i, name) in ["empty", "a.bin", "docs/b.txt", "docs/deep/c"].iter().enumerate() {
            let src = dir.path().join(format!("src-{i}"));
            let body: Vec<u8> = (0..i * 3000).map(|n| (n % 251) as u8).collect();
            std::fs::write(&src, &body).unwrap();
            let url = url::Url::from_file_path(&src).unwrap();
            csv.push_str(&format!("/{name},{url},{}\n", body.len()));
            want.push((format!("/{name}"), body));
        }
        csv.push_str("/docs/none,\n");

        let entries = read_csv(csv.as_bytes()).unwrap();
        let registry = Registry::with_builtin();
        let catalog_url = dir.path().join("disc.vdisc").to_string_lossy().into_owned();
        let ctx = Context::background();
        let report = burn(&ctx, &registry, &catalog_url, &entries, &opts()).unwrap();
        assert_eq!(report.files, 4);
        assert!(dir.path().join("disc.vdisc.isohdr").exists());

        let disc = VDisc::open_with(&ctx, &registry, &catalog_url, &Cache::passthrough()).unwrap();
        assert_eq!(disc.size(), report.image_size);
        let walker = disc.walker().unwrap();
        for (path, body) in &want {
            let info = walker.stat(path).unwrap();
            assert_eq!(info.size, body.len() as u64, "{path}");
            assert_eq!(&read_all(walker.open(path).unwrap().as_ref()).unwrap(), body, "{path}");
        }
        assert!(walker.stat("/docs/none").unwrap().is_dir());

        let mut seen = Vec::new();
        walker
            .walk("/", |p, _| {
                seen.push(p.to_string());
                Ok(())
            })
            .unwrap();
        assert!(seen.contains(&"/docs/deep/c".to_string()));
    }

    #[test]
    fn gzip_and_raw_catalogs_load_alike() {
        let (registry, _) = registry();
        let disc = hello_disc(&registry, &Cache::passthrough());
        let raw = disc.catalog().to_bytes().unwrap();
        let mut w = registry.create("mem:discs/raw").unwrap();
        std::io::Write::write_all(&mut w, &raw).unwrap();
        w.commit().unwrap();

        let again = VDisc::open_with(&Context::background(), &registry, "mem:discs/raw", &Cache::passthrough())
            .unwrap();
        assert_eq!(again.catalog(), disc.catalog());
        assert_eq!(read_all(&again).unwrap(), read_all(&disc).unwrap());
    }
}
