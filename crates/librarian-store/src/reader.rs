//! Streaming read façade over every storage tier.
//!
//! A [`TieredReader`] holds an ordered list of [`ByteSource`]s and asks each
//! in turn: newest remote pool first, then older pools, then local disk.
//! "Not found" from a pool moves on to the next older pool. Any other remote
//! failure is counted and logged, then the remaining pools are skipped and
//! local disk is consulted directly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::blob_id::BlobId;
use crate::error::{StoreError, StoreResult};
use crate::local::{LocalDiskStore, LocalStream};
use crate::metrics::{MetricsSink, StoreCounter};
use crate::remote::{RemotePool, RemoteStream};

/// Default chunk size for whole-blob reads.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Which kind of tier a source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Remote object storage.
    Remote,
    /// Local disk.
    Local,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Remote => write!(f, "remote"),
            Tier::Local => write!(f, "local"),
        }
    }
}

/// A chunked reader over one blob, whichever tier it came from.
pub enum BlobReader {
    /// Served from local disk.
    Local(LocalStream),
    /// Served from a remote pool.
    Remote(RemoteStream),
}

impl BlobReader {
    /// Tier serving this blob.
    pub fn tier(&self) -> Tier {
        match self {
            BlobReader::Local(_) => Tier::Local,
            BlobReader::Remote(_) => Tier::Remote,
        }
    }

    /// Reads up to `max` bytes. Past the end, returns an empty buffer on
    /// every call.
    pub async fn read(&mut self, max: usize) -> StoreResult<Bytes> {
        match self {
            BlobReader::Local(stream) => stream.read_chunk(max).await,
            BlobReader::Remote(stream) => stream.read_chunk(max).await,
        }
    }

    /// Reads the remainder of the blob in `chunk_size` pieces.
    pub async fn read_to_end(&mut self, chunk_size: usize) -> StoreResult<Vec<u8>> {
        let chunk_size = chunk_size.max(1);
        let mut out = Vec::new();
        loop {
            let chunk = self.read(chunk_size).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }
}

/// Result of asking one source for a blob.
pub enum SourceOutcome {
    /// The source has the blob.
    Found(BlobReader),
    /// The source does not have the blob.
    NotFound,
    /// The source could not answer.
    TransientFailure(StoreError),
}

/// One provider in the read chain.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Tier this source belongs to.
    fn tier(&self) -> Tier;

    /// Tries to open `id`.
    async fn try_open(&self, id: BlobId) -> SourceOutcome;
}

#[async_trait]
impl ByteSource for LocalDiskStore {
    fn name(&self) -> &str {
        "local"
    }

    fn tier(&self) -> Tier {
        Tier::Local
    }

    async fn try_open(&self, id: BlobId) -> SourceOutcome {
        match self.open(id).await {
            Ok(Some(stream)) => SourceOutcome::Found(BlobReader::Local(stream)),
            Ok(None) => SourceOutcome::NotFound,
            Err(e) => SourceOutcome::TransientFailure(e),
        }
    }
}

#[async_trait]
impl ByteSource for RemotePool {
    fn name(&self) -> &str {
        RemotePool::name(self)
    }

    fn tier(&self) -> Tier {
        Tier::Remote
    }

    async fn try_open(&self, id: BlobId) -> SourceOutcome {
        match self.open(id).await {
            Ok(Some(stream)) => SourceOutcome::Found(BlobReader::Remote(stream)),
            Ok(None) => SourceOutcome::NotFound,
            Err(e) => SourceOutcome::TransientFailure(e),
        }
    }
}

/// Uniform chunked-read entry point over an ordered chain of sources.
pub struct TieredReader {
    sources: Vec<Arc<dyn ByteSource>>,
    metrics: Arc<dyn MetricsSink>,
}

impl TieredReader {
    /// Creates a reader with no sources.
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            sources: Vec::new(),
            metrics,
        }
    }

    /// Builds the standard chain: remote pools newest first, then local disk.
    ///
    /// `pools` is given oldest first, as configured.
    pub fn for_tiers(
        local: LocalDiskStore,
        pools: Vec<Arc<RemotePool>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let mut reader = Self::new(metrics);
        for pool in pools.into_iter().rev() {
            reader = reader.with_source(pool);
        }
        reader.with_source(Arc::new(local))
    }

    /// Appends a source with lower priority than those already present.
    pub fn with_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Source names in the order they are consulted.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Opens `id` from the first source that has it.
    ///
    /// Fails with [`StoreError::NotFound`] only after every source has been
    /// consulted. A local I/O error is surfaced as-is; remote errors never are.
    pub async fn open(&self, id: BlobId) -> StoreResult<BlobReader> {
        let mut remote_tried = false;
        let mut remote_failed = false;
        let mut local_error = None;

        for source in &self.sources {
            let tier = source.tier();
            if tier == Tier::Remote {
                if remote_failed {
                    continue;
                }
                remote_tried = true;
                self.metrics.increment(StoreCounter::RemoteAttempt);
            }
            match source.try_open(id).await {
                SourceOutcome::Found(reader) => {
                    if tier == Tier::Local && remote_tried {
                        self.metrics.increment(StoreCounter::LocalFallback);
                    }
                    debug!(id = %id, source = source.name(), tier = %tier, "blob opened");
                    return Ok(reader);
                }
                SourceOutcome::NotFound => {
                    if tier == Tier::Remote {
                        self.metrics.increment(StoreCounter::RemoteNotFound);
                    }
                    debug!(id = %id, source = source.name(), "not in source");
                }
                SourceOutcome::TransientFailure(e) => match tier {
                    Tier::Remote => {
                        remote_failed = true;
                        self.metrics.increment(StoreCounter::RemoteFailure);
                        warn!(id = %id, source = source.name(), error = %e, "remote read failed, falling back to local");
                    }
                    Tier::Local => {
                        warn!(id = %id, error = %e, "local read failed");
                        local_error = Some(e);
                    }
                },
            }
        }

        if let Some(e) = local_error {
            return Err(e);
        }
        self.metrics.increment(StoreCounter::NotFound);
        Err(StoreError::NotFound { id })
    }
}
