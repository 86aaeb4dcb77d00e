//! Parsed-element cache.
//!
//! `parse_file` consults a cache keyed by source path and validated by the
//! file's modification time. The default `NoopCache` never hits; the
//! file-backed store is compiled under the `cache` feature.

use std::path::Path;

use crate::element::Element;

/// Storage for parsed elements, keyed by source file identity.
pub trait Cache: Send + Sync {
    /// Whether a stored element for `path` exists and is still current.
    fn cache_valid(&self, path: &Path) -> bool;
    /// Load the stored element for `path`, if any.
    fn load(&self, path: &Path) -> Option<Element>;
    /// Store the element parsed from `path`.
    fn save(&self, path: &Path, element: &Element);
}

/// A cache that never hits.
#[derive(Debug, Default)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn cache_valid(&self, _path: &Path) -> bool {
        false
    }

    fn load(&self, _path: &Path) -> Option<Element> {
        None
    }

    fn save(&self, _path: &Path, _element: &Element) {}
}

#[cfg(feature = "cache")]
pub use file_cache::FileCache;

#[cfg(feature = "cache")]
mod file_cache {
    use std::collections::hash_map::DefaultHasher;
    use std::fs;
    use std::hash::{Hash, Hasher};
    use std::path::{Path, PathBuf};
    use std::time::UNIX_EPOCH;

    use serde::{Deserialize, Serialize};

    use super::Cache;
    use crate::element::Element;

    /// File-backed element cache: one bitcode+zstd file per source path,
    /// stamped with the source's mtime.
    #[derive(Debug, Clone)]
    pub struct FileCache {
        dir: PathBuf,
    }

    #[derive(Serialize, Deserialize)]
    struct Entry {
        mtime: (u64, u32),
        element: Element,
    }

    impl FileCache {
        /// A cache rooted at `dir`. The directory is created on first save.
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self { dir: dir.into() }
        }

        fn entry_path(&self, path: &Path) -> PathBuf {
            let mut hasher = DefaultHasher::new();
            path.hash(&mut hasher);
            self.dir.join(format!("{:016x}.zst", hasher.finish()))
        }

        fn read_entry(&self, path: &Path) -> Option<Entry> {
            let compressed = fs::read(self.entry_path(path)).ok()?;
            let bytes = zstd::decode_all(&compressed[..]).ok()?;
            bitcode::deserialize(&bytes).ok()
        }
    }

    fn mtime_of(path: &Path) -> Option<(u64, u32)> {
        let modified = fs::metadata(path).ok()?.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        Some((since_epoch.as_secs(), since_epoch.subsec_nanos()))
    }

    impl Cache for FileCache {
        fn cache_valid(&self, path: &Path) -> bool {
            match (self.read_entry(path), mtime_of(path)) {
                (Some(entry), Some(mtime)) => entry.mtime == mtime,
                _ => false,
            }
        }

        fn load(&self, path: &Path) -> Option<Element> {
            self.read_entry(path).map(|entry| entry.element)
        }

        fn save(&self, path: &Path, element: &Element) {
            let Some(mtime) = mtime_of(path) else {
                return;
            };
            let entry = Entry {
                mtime,
                element: element.clone(),
            };

            let write = || -> std::io::Result<()> {
                fs::create_dir_all(&self.dir)?;
                let bytes = bitcode::serialize(&entry)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                let compressed = zstd::encode_all(&bytes[..], 3)?;
                fs::write(self.entry_path(path), compressed)
            };
            if let Err(err) = write() {
                log::warn!("failed to write cache entry for {}: {}", path.display(), err);
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::element::Element;

        fn temp_cache(tag: &str) -> (FileCache, PathBuf) {
            let dir = std::env::temp_dir().join(format!("trama-cache-{}-{}", tag, std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            (FileCache::new(&dir), dir)
        }

        #[test]
        fn round_trips_an_element() {
            let (cache, dir) = temp_cache("roundtrip");
            let source = dir.join("input.m");
            fs::create_dir_all(&dir).unwrap();
            fs::write(&source, "0xF\n").unwrap();

            let element = Element::with_captures(
                "constant.numeric.hex.matlab",
                "0xF",
                vec![Element::new("storage.type.number.hex.matlab", "F")],
            );
            cache.save(&source, &element);

            assert!(cache.cache_valid(&source));
            assert_eq!(cache.load(&source), Some(element));

            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn stale_mtime_invalidates() {
            let (cache, dir) = temp_cache("stale");
            let source = dir.join("input.m");
            fs::create_dir_all(&dir).unwrap();
            fs::write(&source, "1\n").unwrap();

            cache.save(&source, &Element::new("constant.numeric.decimal.matlab", "1"));
            assert!(cache.cache_valid(&source));

            // rewrite with a different mtime
            let old = fs::metadata(&source).unwrap().modified().unwrap();
            loop {
                fs::write(&source, "2\n").unwrap();
                if fs::metadata(&source).unwrap().modified().unwrap() != old {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            assert!(!cache.cache_valid(&source));

            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn missing_entry_misses() {
            let (cache, dir) = temp_cache("miss");
            assert!(!cache.cache_valid(Path::new("/no/such/file.m")));
            assert_eq!(cache.load(Path::new("/no/such/file.m")), None);
            let _ = fs::remove_dir_all(&dir);
        }
    }
}
