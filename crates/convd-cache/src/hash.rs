// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content hashing of source documents.

use crate::error::CacheError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Block size for streaming a source file through the digest.
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Computes the content hash that addresses a source document.
///
/// The hash is an address, not a security primitive; implementations must
/// produce the 32-char lowercase hex MD5 digest for identifier
/// compatibility with existing caches. The trait exists so tests can force
/// collisions without touching the on-disk layout.
pub trait SourceHasher: Send + Sync {
    /// Hash the file at `path`, streaming its content.
    fn hash(&self, path: &Path) -> Result<String, CacheError>;
}

/// Default streaming MD5 hasher.
#[derive(Clone, Copy, Debug, Default)]
pub struct Md5Hasher;

impl SourceHasher for Md5Hasher {
    fn hash(&self, path: &Path) -> Result<String, CacheError> {
        let mut file =
            File::open(path).map_err(|e| CacheError::io("open source for hashing", path, e))?;
        let mut context = md5::Context::new();
        let mut block = vec![0u8; HASH_BLOCK_SIZE];
        loop {
            let read = file
                .read(&mut block)
                .map_err(|e| CacheError::io("read source for hashing", path, e))?;
            if read == 0 {
                break;
            }
            context.consume(&block[..read]);
        }
        Ok(format!("{:x}", context.compute()))
    }
}
