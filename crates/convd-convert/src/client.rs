// SPDX-License-Identifier: MIT OR Apache-2.0
//! The conversion façade: cache lookup, conversion, registration.

use crate::convert::{Converter, Metadata};
use crate::error::ConvertError;
use crate::options::Options;
use convd_cache::{CacheManager, ReprKey, fingerprint};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of [`convert_doc`].
#[derive(Debug)]
pub struct Converted {
    /// Artifact path: inside the cache on a hit, inside a fresh
    /// caller-owned result directory otherwise. Absent when the engine
    /// failed.
    pub path: Option<PathBuf>,
    /// Cache identifier; `None` without a cache directory or on failure.
    pub cache_key: Option<String>,
    /// Engine status, verbatim on failure.
    pub metadata: Metadata,
}

/// Convert `src`, going through the cache at `cache_dir` when given.
///
/// A bare filename resolves against the current working directory. The
/// source document is never modified or moved. On a cache hit the cached
/// artifact is returned without touching the converter; on a miss the
/// converter runs into a fresh result directory owned by the caller, and
/// a successful artifact is registered before returning. Engine failures
/// are data (`metadata.error`), not errors; nothing is cached for them.
pub fn convert_doc(
    converter: &dyn Converter,
    src: &Path,
    options: &Options,
    cache_dir: Option<&Path>,
) -> Result<Converted, ConvertError> {
    let src = absolutize(src)?;
    let repr_key = fingerprint(Some(&options.to_option_map()));

    if let Some(dir) = cache_dir {
        let cache = CacheManager::new(dir)?;
        if let Some((path, cache_key)) = cache.cached_file_by_source(&src, Some(&repr_key))? {
            debug!(cache_key, "cache hit");
            return Ok(Converted {
                path: Some(path),
                cache_key: Some(cache_key),
                metadata: Metadata::ok(),
            });
        }
    }

    let workdir = tempfile::Builder::new()
        .prefix("convd-result-")
        .tempdir()
        .map_err(|e| ConvertError::io("create result dir", "<tempdir>", e))?
        .keep();
    let conversion = converter.convert(&src, options, &workdir)?;

    let Some(artifact) = conversion.artifact else {
        return Ok(Converted {
            path: None,
            cache_key: None,
            metadata: conversion.metadata,
        });
    };
    if conversion.metadata.error {
        return Ok(Converted {
            path: Some(artifact),
            cache_key: None,
            metadata: conversion.metadata,
        });
    }

    let mut cache_key = None;
    if let Some(dir) = cache_dir {
        let cache = CacheManager::new(dir)?;
        let key = cache.register_doc(&src, &artifact, ReprKey::from(repr_key))?;
        info!(cache_key = %key, "registered conversion result");
        cache_key = Some(key);
    }

    Ok(Converted {
        path: Some(artifact),
        cache_key,
        metadata: conversion.metadata,
    })
}

fn absolutize(src: &Path) -> Result<PathBuf, ConvertError> {
    if src.is_absolute() {
        return Ok(src.to_path_buf());
    }
    let cwd = env::current_dir().map_err(|e| ConvertError::io("resolve working dir", src, e))?;
    Ok(cwd.join(src))
}

/// Convenience wrapper binding a converter to an optional cache directory.
#[derive(Clone)]
pub struct Client {
    converter: Arc<dyn Converter>,
    cache_dir: Option<PathBuf>,
}

impl Client {
    /// Client without a cache; conversions always run the converter.
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self {
            converter,
            cache_dir: None,
        }
    }

    /// Client caching into `cache_dir`.
    pub fn with_cache_dir(converter: Arc<dyn Converter>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            converter,
            cache_dir: Some(cache_dir.into()),
        }
    }

    /// Configured cache directory, if any.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Convert `src` under `options`.
    pub fn convert(&self, src: &Path, options: &Options) -> Result<Converted, ConvertError> {
        convert_doc(
            self.converter.as_ref(),
            src,
            options,
            self.cache_dir.as_deref(),
        )
    }

    /// Resolve a cache identifier to the stored artifact path.
    pub fn get_cached(&self, cache_key: &str) -> Result<Option<PathBuf>, ConvertError> {
        let Some(ref dir) = self.cache_dir else {
            return Ok(None);
        };
        Ok(CacheManager::new(dir)?.cached_file(cache_key)?)
    }

    /// Look up the cached artifact for a source under `options`.
    pub fn get_cached_by_source(
        &self,
        src: &Path,
        options: &Options,
    ) -> Result<Option<(PathBuf, String)>, ConvertError> {
        let Some(ref dir) = self.cache_dir else {
            return Ok(None);
        };
        let src = absolutize(src)?;
        let repr_key = fingerprint(Some(&options.to_option_map()));
        Ok(CacheManager::new(dir)?.cached_file_by_source(&src, Some(&repr_key))?)
    }
}
