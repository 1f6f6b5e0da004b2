// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cache error taxonomy.
//!
//! Lookup misses are not errors: lookup operations return `Ok(None)`.
//! [`CacheError`] is reserved for the loud failures: I/O problems, a
//! cache root that is not a directory, and unreadable bucket catalogs.

use std::io;
use std::path::{Path, PathBuf};

/// Errors surfaced by cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An underlying file-system operation failed.
    #[error("{op} {path}: {source}")]
    Io {
        /// Short description of the attempted operation.
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The configured cache root exists but is not a directory.
    #[error("cache path {0} exists but is not a directory")]
    NotADirectory(PathBuf),

    /// A bucket catalog exists but cannot be decoded.
    ///
    /// Catalogs are never silently re-initialized; a corrupt catalog means
    /// the bucket state is unknown and must be inspected by an operator.
    #[error("bucket catalog {path} is unreadable: {source}")]
    Catalog {
        /// Path of the catalog file.
        path: PathBuf,
        /// The decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// A path that must name a file has no final component.
    #[error("path {0} has no file name")]
    NoFileName(PathBuf),
}

impl CacheError {
    pub(crate) fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
