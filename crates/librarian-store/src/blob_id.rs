//! Blob identities and the storage locations derived from them.
//!
//! An identity is a 32-bit integer handed out by the catalogue. On local disk
//! it is rendered as eight lower-case hex digits split into four two-digit
//! directory levels (`aa/bb/cc/dd`), so no directory ever holds more than 256
//! entries. On the remote tier it maps to a container/object pair.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Largest raw value an identity may take.
pub const MAX_BLOB_ID: u64 = u32::MAX as u64;

/// Number of consecutive identities stored in one remote container.
pub const CONTAINER_SPAN: u32 = 1_000_000;

/// Default prefix for remote container names.
pub const DEFAULT_CONTAINER_PREFIX: &str = "librarian_";

/// Opaque, immutable identity of one stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(u32);

impl BlobId {
    /// Wraps a raw 32-bit identity.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identity.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Eight-digit lower-case hex rendering.
    pub fn to_hex(self) -> String {
        format!("{:08x}", self.0)
    }

    /// Sharded path relative to the store root, `aa/bb/cc/dd`.
    pub fn relative_path(self) -> PathBuf {
        shard_path(self.0 as u64)
    }

    /// Directory part of the sharded path, `aa/bb/cc`.
    pub fn shard_dir(self) -> PathBuf {
        let hex = self.to_hex();
        let mut dir = PathBuf::new();
        for level in 0..3 {
            dir.push(&hex[level * 2..level * 2 + 2]);
        }
        dir
    }

    /// File name part of the sharded path, `dd`.
    pub fn shard_file_name(self) -> String {
        self.to_hex()[6..].to_string()
    }

    /// Rebuilds an identity from the four segments of a sharded path.
    pub fn from_segments(segments: &[&str]) -> Option<Self> {
        if segments.len() != 4 || segments.iter().any(|s| !is_shard_segment(s)) {
            return None;
        }
        u32::from_str_radix(&segments.concat(), 16).ok().map(Self)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlobId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl TryFrom<u64> for BlobId {
    type Error = StoreError;

    fn try_from(raw: u64) -> StoreResult<Self> {
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| StoreError::IdentityOutOfRange { raw })
    }
}

impl FromStr for BlobId {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|e| StoreError::Config(format!("invalid blob identity {:?}: {}", s, e)))?;
        Self::try_from(raw)
    }
}

/// Maps a raw identity to its sharded relative path.
///
/// # Panics
///
/// Panics if `id` exceeds [`MAX_BLOB_ID`]. Identities come from the
/// allocator, so an out-of-range value is a caller bug rather than input to
/// recover from.
pub fn shard_path(id: u64) -> PathBuf {
    assert!(
        id <= MAX_BLOB_ID,
        "blob identity {} does not fit in 8 hex digits",
        id
    );
    let hex = format!("{:08x}", id);
    let mut path = PathBuf::new();
    for level in 0..4 {
        path.push(&hex[level * 2..level * 2 + 2]);
    }
    path
}

pub(crate) fn is_shard_segment(segment: &str) -> bool {
    segment.len() == 2
        && segment
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Location of a blob on the remote object-storage tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    /// Container holding the object.
    pub container: String,
    /// Object name within the container.
    pub object: String,
}

impl ContainerRef {
    /// Derives the container and object names for `id`.
    ///
    /// Containers are capped at [`CONTAINER_SPAN`] objects each; objects are
    /// named by the decimal identity.
    pub fn for_blob(id: BlobId, prefix: &str) -> Self {
        Self {
            container: format!("{}{}", prefix, id.get() / CONTAINER_SPAN),
            object: id.get().to_string(),
        }
    }
}
