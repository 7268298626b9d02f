//! Local disk tier.
//!
//! Committed blobs live at `<root>/aa/bb/cc/dd`; uploads in flight live in
//! `<root>/incoming/`, which shares a filesystem with the sharded tree so the
//! final rename is atomic.
//!
//! Publishing a staged upload follows a fixed order: create missing shard
//! directories one level at a time with a parent fsync after each, hard-link
//! the temp file to the final path, fsync the file, fsync its directory, then
//! unlink the temp file. The link never replaces an existing file, so a
//! second commit to the same identity fails instead of overwriting the first.
//! If any step after the link fails the published file is removed again, so
//! the final path is either absent or complete.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::blob_id::{is_shard_segment, BlobId};
use crate::durable::{ensure_durable_dir, fsync_dir};
use crate::error::{StoreError, StoreResult};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::reader::DEFAULT_CHUNK_SIZE;
use crate::upload::{PendingUpload, UploadRequest};

/// Name of the staging directory below the store root.
pub const INCOMING_DIR: &str = "incoming";

/// Points in the publish sequence where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    /// Shard directories exist, link not yet attempted.
    BeforeLink,
    /// Linked into place, file not yet fsynced.
    AfterLink,
    /// File fsynced, directory not yet fsynced.
    AfterFileSync,
}

/// Durable, byte-exact storage of blobs on a local filesystem.
#[derive(Clone)]
pub struct LocalDiskStore {
    root: PathBuf,
    incoming: PathBuf,
    metrics: Arc<dyn MetricsSink>,
    fault: Option<CommitStage>,
}

impl std::fmt::Debug for LocalDiskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDiskStore")
            .field("root", &self.root)
            .field("fault", &self.fault)
            .finish()
    }
}

impl LocalDiskStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::with_metrics(root, Arc::new(NoopMetrics))
    }

    /// Opens a store that reports upload events to `metrics`.
    pub fn with_metrics(
        root: impl Into<PathBuf>,
        metrics: Arc<dyn MetricsSink>,
    ) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let incoming = ensure_durable_dir(&root, Path::new(INCOMING_DIR))?;
        info!(root = %root.display(), "local disk store opened");
        Ok(Self {
            root,
            incoming,
            metrics,
            fault: None,
        })
    }

    /// Makes the next publish fail at `stage`, for crash-safety tests.
    #[doc(hidden)]
    pub fn inject_fault(&mut self, stage: CommitStage) {
        self.fault = Some(stage);
    }

    /// Root of the sharded tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging directory for uploads in flight.
    pub fn incoming_dir(&self) -> &Path {
        &self.incoming
    }

    /// Absolute path a committed blob lives at.
    pub fn path_for(&self, id: BlobId) -> PathBuf {
        self.root.join(id.relative_path())
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    /// Whether `id` has been committed locally.
    ///
    /// Blocking stat; async callers use [`LocalDiskStore::exists_async`].
    pub fn exists(&self, id: BlobId) -> bool {
        self.path_for(id).is_file()
    }

    /// [`LocalDiskStore::exists`] without blocking the runtime.
    pub async fn exists_async(&self, id: BlobId) -> bool {
        matches!(tokio::fs::metadata(self.path_for(id)).await, Ok(meta) if meta.is_file())
    }

    /// Opens a committed blob for buffered reading.
    ///
    /// Returns `Ok(None)` when the blob was never committed locally.
    pub async fn open(&self, id: BlobId) -> StoreResult<Option<LocalStream>> {
        let path = self.path_for(id);
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                debug!(id = %id, path = %path.display(), "opened local blob");
                Ok(Some(LocalStream::new(file)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Starts a new upload with a uniquely named temp file in the staging
    /// directory.
    pub async fn begin_upload(&self, request: UploadRequest) -> StoreResult<PendingUpload> {
        let temp_path = self.incoming.join(uuid::Uuid::new_v4().simple().to_string());
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(|e| StoreError::from_write(e, &temp_path))?;
        debug!(
            temp = %temp_path.display(),
            filename = ?request.filename,
            size = ?request.expected_size,
            "upload started"
        );
        Ok(PendingUpload::new(self.clone(), request, temp_path, file))
    }

    /// Publishes a fully written, fsynced temp file at the final path of
    /// `id`. On success the temp file is gone; on [`StoreError::DuplicateIdentity`]
    /// it is left in place.
    ///
    /// Blocking; callers on the async runtime go through
    /// `tokio::task::spawn_blocking`.
    pub(crate) fn publish(&self, temp_path: &Path, id: BlobId) -> StoreResult<PathBuf> {
        let dest = self.path_for(id);
        if fs::symlink_metadata(&dest).is_ok() {
            return Err(self.duplicate(id, dest, temp_path));
        }

        let dir = ensure_durable_dir(&self.root, &id.shard_dir())?;
        self.check_fault(CommitStage::BeforeLink)?;
        match fs::hard_link(temp_path, &dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(self.duplicate(id, dest, temp_path));
            }
            Err(e) => return Err(StoreError::Io(e)),
        }

        if let Err(e) = self.sync_published(&dest, &dir) {
            warn!(id = %id, error = %e, "post-link sync failed, unpublishing");
            if let Err(rm) = fs::remove_file(&dest) {
                error!(id = %id, error = %rm, "failed to unpublish partially synced blob");
            }
            if let Err(sync) = fsync_dir(&dir) {
                warn!(id = %id, dir = %dir.display(), error = %sync, "fsync after unpublish failed");
            }
            return Err(e);
        }

        if let Err(e) = fs::remove_file(temp_path) {
            warn!(temp = %temp_path.display(), error = %e, "published blob left its temp file behind");
        }
        info!(id = %id, path = %dest.display(), "blob published");
        Ok(dest)
    }

    fn duplicate(&self, id: BlobId, dest: PathBuf, temp_path: &Path) -> StoreError {
        error!(
            id = %id,
            path = %dest.display(),
            temp = %temp_path.display(),
            "duplicate identity: final path already exists, upload kept for diagnosis"
        );
        StoreError::DuplicateIdentity {
            id,
            path: dest,
            temp_path: temp_path.to_path_buf(),
        }
    }

    fn sync_published(&self, dest: &Path, dir: &Path) -> StoreResult<()> {
        self.check_fault(CommitStage::AfterLink)?;
        File::open(dest)?.sync_all()?;
        self.check_fault(CommitStage::AfterFileSync)?;
        fsync_dir(dir)?;
        Ok(())
    }

    fn check_fault(&self, stage: CommitStage) -> StoreResult<()> {
        if self.fault == Some(stage) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected fault at {:?}", stage),
            )));
        }
        Ok(())
    }

    /// Every identity committed below the root, ascending.
    ///
    /// The staging directory and anything not shaped like a shard segment
    /// are skipped.
    pub fn committed_ids(&self) -> StoreResult<Vec<BlobId>> {
        let mut ids = Vec::new();
        let mut segments = Vec::with_capacity(4);
        collect_ids(&self.root, &mut segments, &mut ids)?;
        ids.sort();
        Ok(ids)
    }
}

fn collect_ids(dir: &Path, segments: &mut Vec<String>, ids: &mut Vec<BlobId>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) if is_shard_segment(&name) => name,
            _ => continue,
        };
        let file_type = entry.file_type()?;
        segments.push(name);
        if segments.len() == 4 {
            if file_type.is_file() {
                let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
                if let Some(id) = BlobId::from_segments(&refs) {
                    ids.push(id);
                }
            }
        } else if file_type.is_dir() {
            collect_ids(&entry.path(), segments, ids)?;
        }
        segments.pop();
    }
    Ok(())
}

/// Buffered reader over a locally committed blob.
#[derive(Debug)]
pub struct LocalStream {
    reader: BufReader<tokio::fs::File>,
    eof: bool,
}

impl LocalStream {
    fn new(file: tokio::fs::File) -> Self {
        Self {
            reader: BufReader::new(file),
            eof: false,
        }
    }

    /// Reads up to `max` bytes; fewer only at the end of the blob. Once the
    /// end is reached every call returns an empty buffer.
    ///
    /// The buffer grows by at most [`DEFAULT_CHUNK_SIZE`] per step, so a huge
    /// `max` costs no more memory than the blob itself.
    pub async fn read_chunk(&mut self, max: usize) -> StoreResult<Bytes> {
        if self.eof || max == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = BytesMut::new();
        while buf.len() < max {
            let filled = buf.len();
            buf.resize(filled + (max - filled).min(DEFAULT_CHUNK_SIZE), 0);
            let n = self.reader.read(&mut buf[filled..]).await?;
            buf.truncate(filled + n);
            if n == 0 {
                self.eof = true;
                break;
            }
        }
        Ok(buf.freeze())
    }
}
