#![warn(missing_docs)]

//! Librarian: a content-addressable blob store with durable local commits and
//! tiered remote reads.
//!
//! Uploads are streamed into a staging directory while being hashed, verified,
//! and then published under a catalogue-allocated identity with an
//! fsync-ordered rename. Reads go through one chunked façade that tries the
//! remote object-storage pools, newest first, before falling back to local
//! disk.

pub mod blob_id;
pub mod catalogue;
pub mod cli;
pub mod config;
pub mod digest;
pub mod durable;
pub mod error;
pub mod librarian;
pub mod local;
pub mod metrics;
pub mod reader;
pub mod remote;
pub mod upload;

pub use blob_id::{shard_path, BlobId, ContainerRef, CONTAINER_SPAN, MAX_BLOB_ID};
pub use catalogue::{
    AliasId, AliasRecord, Catalogue, CatalogueTxn, ContentRecord, InMemoryCatalogue,
};
pub use config::{LibrarianConfig, RemotePoolConfig, RemoteTierConfig, TierConfig};
pub use digest::{parse_sha1_hex, BlobDigests, Digester, Sha1Digest};
pub use error::{StoreError, StoreResult};
pub use librarian::{Librarian, Namespace};
pub use local::{CommitStage, LocalDiskStore, LocalStream, INCOMING_DIR};
pub use metrics::{MetricsSink, NoopMetrics, StoreCounter, StoreMetrics, StoreMetricsSnapshot};
pub use reader::{BlobReader, ByteSource, SourceOutcome, Tier, TieredReader, DEFAULT_CHUNK_SIZE};
pub use remote::{RemotePool, RemoteStream, SwiftConnectionManager, SwiftSession};
pub use upload::{PendingUpload, StoredBlob, UploadRequest, UploadState};
