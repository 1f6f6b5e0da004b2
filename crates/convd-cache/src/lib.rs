// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-addressed conversion cache.
//!
//! A cache maps `(source bytes, option fingerprint)` pairs to converted
//! artifacts on disk. Sources are addressed by an MD5 content hash; each
//! hash owns a *bucket* directory that resolves collisions by full-content
//! comparison and numbers its sources and representations. The externally
//! visible handle is the cache identifier `<hash>_<source>_<repr>`, stable
//! across runs and usable as a URL path segment.
//!
//! The crate is deliberately synchronous: every operation is plain file
//! I/O guarded by per-bucket advisory locks, so independent buckets never
//! contend and multiple processes can share one cache directory.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod error;
mod fingerprint;
mod hash;
mod manager;

pub use bucket::{Bucket, Catalog};
pub use error::CacheError;
pub use fingerprint::{EMPTY_KEY, OptionMap, OptionValue, fingerprint};
pub use hash::{Md5Hasher, SourceHasher};
pub use manager::{CacheManager, DEFAULT_LEVEL, ReprKey, compose_cache_key, dissolve_cache_key};
