// SPDX-License-Identifier: MIT OR Apache-2.0
//! One bucket per content hash.
//!
//! A bucket directory holds every source file whose content hashed to the
//! bucket's digest (`sources/source_<N>`), one artifact directory per
//! stored representation (`repr/<S>/<R>/<name>`), the key files that index
//! representations (`keys/<S>/<R>.key`) and a small JSON catalog (`data`)
//! tracking the highest assigned numbers.
//!
//! Mutations take an exclusive advisory lock on a sibling lock file,
//! re-read the catalog from disk, and persist it via write-to-temp plus
//! atomic rename with fsync, so concurrent writers in the same or other
//! processes serialize per bucket. The lock lives next to the catalog
//! rather than on it: the catalog inode is replaced on every persist and a
//! lock held across that rename would no longer exclude fresh openers.

use crate::error::CacheError;
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub(crate) const CATALOG_FILE: &str = "data";
const LOCK_FILE: &str = "data.lock";
const SOURCES_DIR: &str = "sources";
const REPR_DIR: &str = "repr";
const KEYS_DIR: &str = "keys";
const SOURCE_PREFIX: &str = "source_";
const KEY_SUFFIX: &str = "key";
const COMPARE_BLOCK_SIZE: usize = 64 * 1024;

/// Persistent per-bucket state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalog schema version.
    pub version: u32,
    /// Highest assigned source number (0 when no source is stored).
    pub curr_src_num: u32,
    /// Highest assigned representation number per source number.
    #[serde(default)]
    pub curr_repr_num: BTreeMap<u32, u32>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            version: 1,
            curr_src_num: 0,
            curr_repr_num: BTreeMap::new(),
        }
    }
}

/// Advisory lock scoped to one bucket. Unlocks on drop.
struct BucketLock {
    file: File,
}

impl BucketLock {
    fn exclusive(path: &Path) -> Result<Self, CacheError> {
        let file = Self::open(path)?;
        file.lock_exclusive()
            .map_err(|e| CacheError::io("lock bucket", path, e))?;
        Ok(Self { file })
    }

    fn shared(path: &Path) -> Result<Self, CacheError> {
        let file = Self::open(path)?;
        file.lock_shared()
            .map_err(|e| CacheError::io("lock bucket", path, e))?;
        Ok(Self { file })
    }

    fn open(path: &Path) -> Result<File, CacheError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CacheError::io("open bucket lock", path, e))
    }
}

impl Drop for BucketLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// On-disk bucket for one content hash.
#[derive(Debug)]
pub struct Bucket {
    root: PathBuf,
    srcdir: PathBuf,
    reprdir: PathBuf,
    keysdir: PathBuf,
    catalog_path: PathBuf,
    lock_path: PathBuf,
}

impl Bucket {
    /// Open the bucket at `root`, creating its layout on first use.
    ///
    /// Safe against concurrent opens of the same path: the catalog is only
    /// initialized under the bucket lock, and an existing catalog is never
    /// overwritten.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        let bucket = Self {
            srcdir: root.join(SOURCES_DIR),
            reprdir: root.join(REPR_DIR),
            keysdir: root.join(KEYS_DIR),
            catalog_path: root.join(CATALOG_FILE),
            lock_path: root.join(LOCK_FILE),
            root,
        };
        for dir in [&bucket.srcdir, &bucket.reprdir, &bucket.keysdir] {
            fs::create_dir_all(dir).map_err(|e| CacheError::io("create bucket dir", dir, e))?;
        }
        if !bucket.catalog_path.exists() {
            let _lock = BucketLock::exclusive(&bucket.lock_path)?;
            // Re-check under the lock; a racing opener may have won.
            if !bucket.catalog_path.exists() {
                bucket.persist_catalog(&Catalog::default())?;
            }
        }
        Ok(bucket)
    }

    /// Bucket root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory holding the numbered source files.
    pub fn sources_dir(&self) -> &Path {
        &self.srcdir
    }

    /// Directory holding the representation artifact directories.
    pub fn repr_dir(&self) -> &Path {
        &self.reprdir
    }

    /// Directory holding the representation key files.
    pub fn keys_dir(&self) -> &Path {
        &self.keysdir
    }

    /// Read the current catalog.
    pub fn catalog(&self) -> Result<Catalog, CacheError> {
        let _lock = BucketLock::shared(&self.lock_path)?;
        self.load_catalog()
    }

    /// Replace the catalog wholesale. Maintenance hook; regular stores keep
    /// the catalog consistent on their own.
    pub fn set_catalog(&self, catalog: &Catalog) -> Result<(), CacheError> {
        let _lock = BucketLock::exclusive(&self.lock_path)?;
        self.persist_catalog(catalog)
    }

    /// Highest assigned source number.
    pub fn current_source_num(&self) -> Result<u32, CacheError> {
        Ok(self.catalog()?.curr_src_num)
    }

    /// Force the highest assigned source number.
    pub fn set_current_source_num(&self, num: u32) -> Result<(), CacheError> {
        let _lock = BucketLock::exclusive(&self.lock_path)?;
        let mut catalog = self.load_catalog()?;
        catalog.curr_src_num = num;
        self.persist_catalog(&catalog)
    }

    /// Highest assigned representation number for `src_num` (0 when none).
    pub fn current_repr_num(&self, src_num: u32) -> Result<u32, CacheError> {
        Ok(self
            .catalog()?
            .curr_repr_num
            .get(&src_num)
            .copied()
            .unwrap_or(0))
    }

    /// Force the highest assigned representation number for `src_num`.
    pub fn set_current_repr_num(&self, src_num: u32, num: u32) -> Result<(), CacheError> {
        let _lock = BucketLock::exclusive(&self.lock_path)?;
        let mut catalog = self.load_catalog()?;
        catalog.curr_repr_num.insert(src_num, num);
        self.persist_catalog(&catalog)
    }

    /// Number of the stored source whose bytes equal the file at `src`.
    ///
    /// Equality is full-content, not hash-based; this is the collision
    /// resolution step for byte-distinct sources sharing one digest.
    pub fn stored_source_num(&self, src: &Path) -> Result<Option<u32>, CacheError> {
        let _lock = BucketLock::shared(&self.lock_path)?;
        self.stored_source_num_locked(src)
    }

    /// Representation number stored for `(src_num, key)`, if any.
    pub fn stored_repr_num(&self, src_num: u32, key: &str) -> Result<Option<u32>, CacheError> {
        let _lock = BucketLock::shared(&self.lock_path)?;
        self.stored_repr_num_locked(src_num, key)
    }

    /// Store `artifact` as the representation of `src` under `key`.
    ///
    /// Assigns the next source number for byte-new sources and the next
    /// representation number for new keys; an existing `(source, key)`
    /// pair keeps its number and has its artifact directory replaced in
    /// full, so no stale sibling files survive an update. Returns the
    /// bucket-local identifier `"<src_num>_<repr_num>"`.
    pub fn store_representation(
        &self,
        src: &Path,
        artifact: &Path,
        key: &str,
    ) -> Result<String, CacheError> {
        let artifact_name = artifact
            .file_name()
            .ok_or_else(|| CacheError::NoFileName(artifact.to_path_buf()))?
            .to_os_string();

        let _lock = BucketLock::exclusive(&self.lock_path)?;
        let mut catalog = self.load_catalog()?;

        let src_num = match self.stored_source_num_locked(src)? {
            Some(num) => {
                // A crash before the catalog persist can leave the counter
                // behind the files on disk.
                catalog.curr_src_num = catalog.curr_src_num.max(num);
                num
            }
            None => {
                let num = catalog.curr_src_num + 1;
                let dst = self.source_path(num);
                fs::copy(src, &dst).map_err(|e| CacheError::io("store source", &dst, e))?;
                catalog.curr_src_num = num;
                num
            }
        };

        let repr_num = match self.stored_repr_num_locked(src_num, key)? {
            Some(num) => {
                let counter = catalog.curr_repr_num.entry(src_num).or_insert(0);
                *counter = (*counter).max(num);
                num
            }
            None => {
                let num = catalog.curr_repr_num.get(&src_num).copied().unwrap_or(0) + 1;
                catalog.curr_repr_num.insert(src_num, num);
                num
            }
        };

        let repr_dir = self
            .reprdir
            .join(src_num.to_string())
            .join(repr_num.to_string());
        if repr_dir.exists() {
            debug!(dir = %repr_dir.display(), "replacing stored representation");
            fs::remove_dir_all(&repr_dir)
                .map_err(|e| CacheError::io("remove stale representation", &repr_dir, e))?;
        }
        fs::create_dir_all(&repr_dir)
            .map_err(|e| CacheError::io("create representation dir", &repr_dir, e))?;
        let artifact_dst = repr_dir.join(&artifact_name);
        fs::copy(artifact, &artifact_dst)
            .map_err(|e| CacheError::io("store artifact", &artifact_dst, e))?;

        let key_dir = self.keysdir.join(src_num.to_string());
        fs::create_dir_all(&key_dir).map_err(|e| CacheError::io("create key dir", &key_dir, e))?;
        let key_path = key_dir.join(format!("{repr_num}.{KEY_SUFFIX}"));
        fs::write(&key_path, key).map_err(|e| CacheError::io("write key file", &key_path, e))?;

        // Catalog last: an artifact without a persisted catalog bump is
        // invisible and gets overwritten by the next store for this slot.
        self.persist_catalog(&catalog)?;

        info!(
            bucket = %self.root.display(),
            src_num,
            repr_num,
            artifact = %artifact_name.to_string_lossy(),
            "stored representation"
        );
        Ok(format!("{src_num}_{repr_num}"))
    }

    /// Path of the artifact stored under the bucket-local identifier
    /// `"<src_num>_<repr_num>"`, if present.
    pub fn representation(&self, bucket_key: &str) -> Result<Option<PathBuf>, CacheError> {
        let Some((src_num, repr_num)) = parse_bucket_key(bucket_key) else {
            return Ok(None);
        };
        let _lock = BucketLock::shared(&self.lock_path)?;
        let repr_dir = self
            .reprdir
            .join(src_num.to_string())
            .join(repr_num.to_string());
        if !repr_dir.is_dir() {
            return Ok(None);
        }
        let mut files = Vec::new();
        let entries = fs::read_dir(&repr_dir)
            .map_err(|e| CacheError::io("read representation dir", &repr_dir, e))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| CacheError::io("read representation dir", &repr_dir, e))?;
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files.into_iter().next())
    }

    /// All bucket-local identifiers that have both a stored artifact and a
    /// matching key file, sorted by `(src_num, repr_num)`.
    ///
    /// Half-written representation directories without a key file (a crash
    /// between artifact copy and catalog persist) are not listed.
    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        let _lock = BucketLock::shared(&self.lock_path)?;
        let mut out = Vec::new();
        for src_num in numbered_subdirs(&self.reprdir)? {
            let src_dir = self.reprdir.join(src_num.to_string());
            for repr_num in numbered_subdirs(&src_dir)? {
                let repr_dir = src_dir.join(repr_num.to_string());
                let key_path = self
                    .keysdir
                    .join(src_num.to_string())
                    .join(format!("{repr_num}.{KEY_SUFFIX}"));
                if key_path.is_file() && dir_has_file(&repr_dir)? {
                    out.push((src_num, repr_num));
                }
            }
        }
        out.sort_unstable();
        Ok(out
            .into_iter()
            .map(|(s, r)| format!("{s}_{r}"))
            .collect())
    }

    // -- internals (callers hold the bucket lock) ------------------------

    fn source_path(&self, num: u32) -> PathBuf {
        self.srcdir.join(format!("{SOURCE_PREFIX}{num}"))
    }

    fn stored_source_num_locked(&self, src: &Path) -> Result<Option<u32>, CacheError> {
        let mut num = 1;
        loop {
            let candidate = self.source_path(num);
            if !candidate.is_file() {
                return Ok(None);
            }
            if files_equal(src, &candidate)? {
                return Ok(Some(num));
            }
            num += 1;
        }
    }

    fn stored_repr_num_locked(&self, src_num: u32, key: &str) -> Result<Option<u32>, CacheError> {
        let key_dir = self.keysdir.join(src_num.to_string());
        if !key_dir.is_dir() {
            return Ok(None);
        }
        let mut nums = Vec::new();
        let entries =
            fs::read_dir(&key_dir).map_err(|e| CacheError::io("read key dir", &key_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io("read key dir", &key_dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_SUFFIX) {
                continue;
            }
            if let Some(num) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            {
                nums.push((num, path));
            }
        }
        nums.sort_unstable_by_key(|(num, _)| *num);
        for (num, path) in nums {
            let stored =
                fs::read_to_string(&path).map_err(|e| CacheError::io("read key file", &path, e))?;
            if stored == key {
                return Ok(Some(num));
            }
        }
        Ok(None)
    }

    fn load_catalog(&self) -> Result<Catalog, CacheError> {
        let raw = fs::read(&self.catalog_path)
            .map_err(|e| CacheError::io("read bucket catalog", &self.catalog_path, e))?;
        serde_json::from_slice(&raw).map_err(|source| CacheError::Catalog {
            path: self.catalog_path.clone(),
            source,
        })
    }

    fn persist_catalog(&self, catalog: &Catalog) -> Result<(), CacheError> {
        let tmp_path = self.catalog_path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path)
            .map_err(|e| CacheError::io("create catalog temp file", &tmp_path, e))?;
        let raw = serde_json::to_vec(catalog).map_err(|source| CacheError::Catalog {
            path: self.catalog_path.clone(),
            source,
        })?;
        tmp.write_all(&raw)
            .map_err(|e| CacheError::io("write catalog", &tmp_path, e))?;
        tmp.sync_all()
            .map_err(|e| CacheError::io("sync catalog", &tmp_path, e))?;
        fs::rename(&tmp_path, &self.catalog_path)
            .map_err(|e| CacheError::io("replace catalog", &self.catalog_path, e))?;
        // The rename must be durable before the lock is released.
        let dir = File::open(&self.root).map_err(|e| CacheError::io("open bucket dir", &self.root, e))?;
        dir.sync_all()
            .map_err(|e| CacheError::io("sync bucket dir", &self.root, e))?;
        Ok(())
    }
}

fn parse_bucket_key(bucket_key: &str) -> Option<(u32, u32)> {
    let (src, repr) = bucket_key.split_once('_')?;
    Some((src.parse().ok()?, repr.parse().ok()?))
}

fn numbered_subdirs(dir: &Path) -> Result<Vec<u32>, CacheError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut nums = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| CacheError::io("read bucket dir", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io("read bucket dir", dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(num) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
            nums.push(num);
        }
    }
    nums.sort_unstable();
    Ok(nums)
}

fn dir_has_file(dir: &Path) -> Result<bool, CacheError> {
    let entries = fs::read_dir(dir).map_err(|e| CacheError::io("read representation dir", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io("read representation dir", dir, e))?;
        if entry.path().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn files_equal(a: &Path, b: &Path) -> Result<bool, CacheError> {
    let meta_a = fs::metadata(a).map_err(|e| CacheError::io("stat file", a, e))?;
    let meta_b = fs::metadata(b).map_err(|e| CacheError::io("stat file", b, e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let mut file_a = File::open(a).map_err(|e| CacheError::io("open file", a, e))?;
    let mut file_b = File::open(b).map_err(|e| CacheError::io("open file", b, e))?;
    let mut buf_a = vec![0u8; COMPARE_BLOCK_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BLOCK_SIZE];
    loop {
        let read_a = read_full(&mut file_a, &mut buf_a).map_err(|e| CacheError::io("read file", a, e))?;
        let read_b = read_full(&mut file_b, &mut buf_b).map_err(|e| CacheError::io("read file", b, e))?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or EOF is reached.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = file.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
