/*!
 * Streaming checksums for manifest entries and bundle digests
 *
 * The server compares payload files against MD5 digests in the manifest.
 * Bundles themselves are identified by SHA-256 in logs and summaries.
 */

use md5::{Digest, Md5};
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, RsconnectError};

const BUFFER_SIZE: usize = 64 * 1024;

/// Streaming hasher that calculates a manifest checksum incrementally
pub struct StreamingHasher {
    hasher: Md5,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self { hasher: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and return the lowercase hex digest
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// MD5 of a file, read in 64 KiB chunks
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut hasher = StreamingHasher::new();
    digest_file(path, |chunk| hasher.update(chunk))?;
    Ok(hasher.finalize_hex())
}

/// MD5 of an in-memory buffer
pub fn buffer_checksum(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// SHA-256 of a file, used to identify finished bundles
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    digest_file(path, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

fn digest_file<F: FnMut(&[u8])>(path: &Path, mut sink: F) -> Result<()> {
    let file = File::open(path).map_err(|e| RsconnectError::filesystem(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| RsconnectError::filesystem(path, e))?;
        if n == 0 {
            break;
        }
        sink(&buffer[..n]);
    }

    Ok(())
}
