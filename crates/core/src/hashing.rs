//! SHA-256 hex digests.
//!
//! [`sha256_hex`] hashes a whole buffer (sticker ETags). [`DigestWriter`]
//! hashes a serialization while it is being written, so the snapshot digest
//! never materializes the canonical JSON. [`shard_prefix`] names the on-disk
//! sticker shard for a cache key.

use std::io;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut writer = DigestWriter::new();
    writer.update(data);
    writer.finish_hex()
}

/// First two hex characters of the key's digest.
pub fn shard_prefix(key: &str) -> String {
    let mut digest = sha256_hex(key.as_bytes());
    digest.truncate(2);
    digest
}

/// An [`io::Write`] sink that feeds everything into SHA-256.
#[derive(Default)]
pub struct DigestWriter {
    hasher: Sha256,
}

impl DigestWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish_hex(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl io::Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
