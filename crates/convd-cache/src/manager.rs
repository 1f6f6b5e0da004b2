// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cache-wide operations: bucket addressing, cache identifiers, lookups.

use crate::bucket::{Bucket, CATALOG_FILE};
use crate::error::CacheError;
use crate::hash::{Md5Hasher, SourceHasher};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Default number of two-hex-character prefix layers under the cache root.
pub const DEFAULT_LEVEL: usize = 1;
/// Upper bound on the prefix depth; a digest only has 16 two-char slices.
const MAX_LEVEL: usize = 8;

/// Compose a cache identifier from a content digest and a bucket-local
/// identifier (`"<src_num>_<repr_num>"`).
pub fn compose_cache_key(digest: &str, bucket_key: &str) -> String {
    format!("{digest}_{bucket_key}")
}

/// Split a cache identifier into `(digest, bucket_key)`.
///
/// The split is at the first `_`; both halves must be non-empty. Anything
/// else is not a cache identifier and yields `None`.
pub fn dissolve_cache_key(cache_key: &str) -> Option<(String, String)> {
    let (digest, bucket_key) = cache_key.split_once('_')?;
    if digest.is_empty() || bucket_key.is_empty() {
        return None;
    }
    Some((digest.to_string(), bucket_key.to_string()))
}

/// Representation-key input: a literal string or a reader drained to EOF.
///
/// Callers usually pass a fingerprint string; readers exist for key
/// material that arrives as a stream. Either way the key is normalized to
/// a string before it reaches a bucket.
pub enum ReprKey {
    /// The key, verbatim.
    Literal(String),
    /// A reader whose entire content is the key.
    Reader(Box<dyn Read + Send>),
}

impl ReprKey {
    /// Wrap a reader; it is read to EOF when the key is used.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    fn into_string(self) -> Result<String, CacheError> {
        match self {
            Self::Literal(key) => Ok(key),
            Self::Reader(mut reader) => {
                let mut key = String::new();
                reader
                    .read_to_string(&mut key)
                    .map_err(|e| CacheError::io("read representation key", "<reader>", e))?;
                Ok(key)
            }
        }
    }
}

impl Default for ReprKey {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

impl From<&str> for ReprKey {
    fn from(key: &str) -> Self {
        Self::Literal(key.to_string())
    }
}

impl From<String> for ReprKey {
    fn from(key: String) -> Self {
        Self::Literal(key)
    }
}

impl fmt::Debug for ReprKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            Self::Reader(_) => f.debug_tuple("Reader").field(&"..").finish(),
        }
    }
}

/// Entry point to one on-disk cache.
///
/// A manager is plain value state (root directory, prefix depth, hasher);
/// construct one wherever needed and pass it explicitly rather than
/// relying on ambient configuration.
pub struct CacheManager {
    cache_dir: PathBuf,
    level: usize,
    hasher: Box<dyn SourceHasher>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_dir", &self.cache_dir)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Open or create the cache at `cache_dir` with the default prefix
    /// depth.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::with_level(cache_dir, DEFAULT_LEVEL)
    }

    /// Open or create the cache at `cache_dir` with `level` two-hex prefix
    /// layers between the root and the bucket directories.
    pub fn with_level(cache_dir: impl Into<PathBuf>, level: usize) -> Result<Self, CacheError> {
        Self::with_hasher(cache_dir, level, Box::new(Md5Hasher))
    }

    /// Open or create the cache with a custom [`SourceHasher`].
    ///
    /// Production caches use [`Md5Hasher`]; swapping the hasher is the
    /// hook for exercising collision handling.
    pub fn with_hasher(
        cache_dir: impl Into<PathBuf>,
        level: usize,
        hasher: Box<dyn SourceHasher>,
    ) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        let level = level.clamp(1, MAX_LEVEL);
        prepare_cache_dir(&cache_dir)?;
        Ok(Self {
            cache_dir,
            level,
            hasher,
        })
    }

    /// Root directory of this cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Number of prefix layers below the root.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Content digest of the file at `path`.
    pub fn hash(&self, path: &Path) -> Result<String, CacheError> {
        self.hasher.hash(path)
    }

    /// Directory of the bucket addressed by `digest`.
    pub fn bucket_path(&self, digest: &str) -> PathBuf {
        let mut path = self.cache_dir.clone();
        for layer in 0..self.level {
            let start = 2 * layer;
            let Some(prefix) = digest.get(start..(start + 2).min(digest.len())) else {
                break;
            };
            if prefix.is_empty() {
                break;
            }
            path.push(prefix);
        }
        path.push(digest);
        path
    }

    /// Register `artifact` as the conversion result of `src` under `key`.
    ///
    /// Creates the bucket on first use and returns the cache identifier.
    /// Re-registering an identical `(source bytes, key)` pair returns the
    /// same identifier and replaces the stored artifact.
    pub fn register_doc(
        &self,
        src: &Path,
        artifact: &Path,
        key: ReprKey,
    ) -> Result<String, CacheError> {
        let digest = self.hash(src)?;
        let bucket = Bucket::open(self.bucket_path(&digest))?;
        let key = key.into_string()?;
        let bucket_key = bucket.store_representation(src, artifact, &key)?;
        Ok(compose_cache_key(&digest, &bucket_key))
    }

    /// Path of the artifact addressed by `cache_key`, if present.
    ///
    /// Unparsable identifiers and missing buckets or representations are
    /// quiet misses (`Ok(None)`); only real I/O failures error.
    pub fn cached_file(&self, cache_key: &str) -> Result<Option<PathBuf>, CacheError> {
        let Some((digest, bucket_key)) = dissolve_cache_key(cache_key) else {
            return Ok(None);
        };
        let bucket_path = self.bucket_path(&digest);
        if !bucket_path.is_dir() {
            debug!(cache_key, "cache miss: no bucket");
            return Ok(None);
        }
        Bucket::open(bucket_path)?.representation(&bucket_key)
    }

    /// Look up the cached artifact for `src` under `key`.
    ///
    /// Returns the artifact path together with its cache identifier, or
    /// `Ok(None)` when nothing matching is stored. A `key` of `None`
    /// matches registrations made without a key.
    pub fn cached_file_by_source(
        &self,
        src: &Path,
        key: Option<&str>,
    ) -> Result<Option<(PathBuf, String)>, CacheError> {
        let digest = self.hash(src)?;
        let bucket_path = self.bucket_path(&digest);
        if !bucket_path.is_dir() {
            return Ok(None);
        }
        let bucket = Bucket::open(bucket_path)?;
        let Some(src_num) = bucket.stored_source_num(src)? else {
            return Ok(None);
        };
        let Some(repr_num) = bucket.stored_repr_num(src_num, key.unwrap_or(""))? else {
            return Ok(None);
        };
        let bucket_key = format!("{src_num}_{repr_num}");
        let Some(path) = bucket.representation(&bucket_key)? else {
            return Ok(None);
        };
        Ok(Some((path, compose_cache_key(&digest, &bucket_key))))
    }

    /// All cache identifiers with a stored artifact, across every bucket.
    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut out = Vec::new();
        let walk = WalkDir::new(&self.cache_dir)
            .min_depth(self.level + 1)
            .max_depth(self.level + 1);
        for entry in walk {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                CacheError::io("walk cache dir", path, e.into())
            })?;
            if !entry.file_type().is_dir() || !entry.path().join(CATALOG_FILE).is_file() {
                continue;
            }
            let Some(digest) = entry.file_name().to_str() else {
                continue;
            };
            let bucket = Bucket::open(entry.path())?;
            for bucket_key in bucket.keys()? {
                out.push(compose_cache_key(digest, &bucket_key));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Create the cache root if missing; fail loudly when the path exists but
/// is not a directory.
fn prepare_cache_dir(cache_dir: &Path) -> Result<(), CacheError> {
    if cache_dir.exists() && !cache_dir.is_dir() {
        return Err(CacheError::NotADirectory(cache_dir.to_path_buf()));
    }
    fs::create_dir_all(cache_dir).map_err(|e| CacheError::io("create cache dir", cache_dir, e))
}
