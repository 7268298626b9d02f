//! Incremental MD5 / SHA-1 / SHA-256 digesting of streamed uploads.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Raw SHA-1 digest.
pub type Sha1Digest = [u8; 20];

/// The three digests recorded for every stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobDigests {
    /// MD5 of the whole blob.
    pub md5: [u8; 16],
    /// SHA-1 of the whole blob.
    pub sha1: Sha1Digest,
    /// SHA-256 of the whole blob.
    pub sha256: [u8; 32],
}

impl BlobDigests {
    /// Computes all three digests over `data` in one pass.
    pub fn of(data: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.update(data);
        digester.finalize()
    }

    /// Lower-case hex MD5.
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    /// Lower-case hex SHA-1.
    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1)
    }

    /// Lower-case hex SHA-256.
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

/// Parses a 40-character hex SHA-1 as declared by a client.
pub fn parse_sha1_hex(s: &str) -> StoreResult<Sha1Digest> {
    let mut out = [0u8; 20];
    hex::decode_to_slice(s.trim(), &mut out)
        .map_err(|e| StoreError::Config(format!("invalid sha1 {:?}: {}", s, e)))?;
    Ok(out)
}

/// Running digest state fed chunk by chunk.
#[derive(Default, Clone)]
pub struct Digester {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    bytes: u64,
}

impl Digester {
    /// Creates a digester with no input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk to all three digests.
    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consumes the state and returns the finished digests.
    pub fn finalize(self) -> BlobDigests {
        let mut digests = BlobDigests {
            md5: [0; 16],
            sha1: [0; 20],
            sha256: [0; 32],
        };
        digests.md5.copy_from_slice(&self.md5.finalize());
        digests.sha1.copy_from_slice(&self.sha1.finalize());
        digests.sha256.copy_from_slice(&self.sha256.finalize());
        digests
    }
}
