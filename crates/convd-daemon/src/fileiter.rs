// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunked file iteration for response bodies.
//!
//! Serves artifact bytes in fixed-size chunks and supports `(start, stop)`
//! half-open slices for range reads. `stop <= start` (including a stop of
//! zero) yields an empty sequence rather than an error.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Chunk size of the iterator.
pub const CHUNK_SIZE: usize = 4096;

/// Iterator over a file's bytes in [`CHUNK_SIZE`] blocks.
#[derive(Debug)]
pub struct FileIterator {
    file: File,
    remaining: Option<u64>,
}

impl FileIterator {
    /// Iterate over the whole file.
    pub fn new(path: &Path) -> io::Result<Self> {
        Self::range(path, 0, None)
    }

    /// Iterate over the half-open byte slice `[start, stop)`.
    ///
    /// `stop = None` reads to the end of the file.
    pub fn range(path: &Path, start: u64, stop: Option<u64>) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }
        let remaining = stop.map(|stop| stop.saturating_sub(start));
        Ok(Self { file, remaining })
    }
}

impl Iterator for FileIterator {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let want = match self.remaining {
            Some(0) => return None,
            Some(n) => CHUNK_SIZE.min(usize::try_from(n).unwrap_or(CHUNK_SIZE)),
            None => CHUNK_SIZE,
        };
        let mut chunk = vec![0u8; want];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.file.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) => return Some(Err(err)),
            }
        }
        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        if let Some(ref mut remaining) = self.remaining {
            *remaining -= filled as u64;
        }
        Some(Ok(chunk))
    }
}
