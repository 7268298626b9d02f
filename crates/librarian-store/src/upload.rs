//! Upload pipeline: one pending upload per inbound connection.
//!
//! A [`PendingUpload`] streams bytes into a private temp file while feeding
//! all three digesters, then commits through the catalogue and the local
//! disk store. Its lifecycle is a small state machine:
//!
//! ```text
//! Accumulating --store()--> Committing --> Committed
//!      |                        |
//!      +--abort() / drop--------+--failure / drop--> Aborted
//! ```
//!
//! Only `Accumulating` accepts `append`, and both exits are terminal. An
//! upload is left in `Committing` only when the `store()` future is dropped
//! before it resolves; dropping it then may leave a published file with no
//! catalogue row, which is logged with its final path.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::blob_id::BlobId;
use crate::catalogue::{AliasId, AliasRecord, Catalogue, CatalogueTxn, ContentRecord};
use crate::digest::{BlobDigests, Digester, Sha1Digest};
use crate::error::{StoreError, StoreResult};
use crate::local::LocalDiskStore;
use crate::metrics::StoreCounter;

/// What the client declared when it started the upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Filename for the catalogue alias; no alias is created without one.
    pub filename: Option<String>,
    /// MIME type recorded on the alias.
    pub content_type: Option<String>,
    /// Number of bytes the client promised to send.
    pub expected_size: Option<u64>,
    /// SHA-1 the received bytes must match.
    pub declared_sha1: Option<Sha1Digest>,
    /// Identity the content was already assigned elsewhere.
    pub content_id: Option<BlobId>,
    /// Database the client believes it is writing to.
    pub database_name: Option<String>,
    /// Alias expiry, seconds since the Unix epoch.
    pub expires_at: Option<u64>,
}

impl UploadRequest {
    /// Creates a request for `expected_size` bytes.
    pub fn new(expected_size: u64) -> Self {
        Self {
            expected_size: Some(expected_size),
            ..Default::default()
        }
    }

    /// Sets the alias filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the alias MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Requires the received bytes to hash to `sha1`.
    pub fn with_sha1(mut self, sha1: Sha1Digest) -> Self {
        self.declared_sha1 = Some(sha1);
        self
    }

    /// Attaches the content to an identity reserved in the catalogue.
    pub fn with_content_id(mut self, id: BlobId) -> Self {
        self.content_id = Some(id);
        self
    }

    /// Declares the database the client expects to write to.
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    /// Sets the alias expiry.
    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Lifecycle state of a [`PendingUpload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    /// Accepting bytes.
    Accumulating,
    /// Inside `store()`; no further bytes are accepted.
    Committing,
    /// Durably stored and recorded in the catalogue.
    Committed,
    /// Abandoned; the temp file is gone unless kept for diagnosis.
    Aborted,
}

impl UploadState {
    fn as_str(self) -> &'static str {
        match self {
            UploadState::Accumulating => "accumulating",
            UploadState::Committing => "committing",
            UploadState::Committed => "committed",
            UploadState::Aborted => "aborted",
        }
    }
}

/// Outcome of a successful commit, handed back to the catalogue caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Content identity.
    pub id: BlobId,
    /// Alias identity, when a filename was supplied.
    pub alias: Option<AliasId>,
    /// Digests of the stored bytes.
    pub digests: BlobDigests,
    /// Size in bytes.
    pub size: u64,
    /// Final path on local disk.
    pub path: PathBuf,
}

/// Connection-scoped upload state.
///
/// Not shareable across tasks; drive it from the connection that owns it.
pub struct PendingUpload {
    store: LocalDiskStore,
    request: UploadRequest,
    temp_path: PathBuf,
    file: Option<tokio::fs::File>,
    digester: Digester,
    state: UploadState,
    publishing: Option<BlobId>,
}

impl PendingUpload {
    pub(crate) fn new(
        store: LocalDiskStore,
        request: UploadRequest,
        temp_path: PathBuf,
        file: tokio::fs::File,
    ) -> Self {
        Self {
            store,
            request,
            temp_path,
            file: Some(file),
            digester: Digester::new(),
            state: UploadState::Accumulating,
            publishing: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Temp file in the staging directory.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Bytes appended so far.
    pub fn bytes_written(&self) -> u64 {
        self.digester.bytes()
    }

    /// The request this upload was started with.
    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    /// Writes the next chunk through to the temp file and the digesters.
    ///
    /// A failed write aborts the upload.
    pub async fn append(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.require_accumulating("append")?;
        let written = match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(io::Error::new(io::ErrorKind::Other, "temp file already closed")),
        };
        if let Err(e) = written {
            let err = StoreError::from_write(e, &self.temp_path);
            warn!(temp = %self.temp_path.display(), error = %err, "upload write failed");
            self.discard().await;
            return Err(err);
        }
        self.digester.update(chunk);
        Ok(())
    }

    /// Abandons the upload and removes its temp file.
    pub async fn abort(&mut self) -> StoreResult<()> {
        self.require_accumulating("abort")?;
        self.discard().await;
        debug!(temp = %self.temp_path.display(), "upload aborted");
        Ok(())
    }

    /// Verifies and commits the upload.
    ///
    /// The environment check, size check and SHA-1 check all happen before
    /// an identity is allocated. The blob is published on disk inside the
    /// catalogue transaction, which is committed only after the final fsync.
    pub async fn store(&mut self, catalogue: &dyn Catalogue) -> StoreResult<StoredBlob> {
        self.require_accumulating("store")?;
        self.state = UploadState::Committing;

        if let Some(declared) = &self.request.database_name {
            if declared != catalogue.database_name() {
                let err = StoreError::WrongEnvironment {
                    configured: catalogue.database_name().to_string(),
                    declared: declared.clone(),
                };
                warn!(error = %err, "refusing upload for another environment");
                self.store.metrics().increment(StoreCounter::WrongEnvironment);
                self.discard().await;
                return Err(err);
            }
        }

        if let Some(mut file) = self.file.take() {
            let synced = match file.flush().await {
                Ok(()) => file.sync_all().await,
                Err(e) => Err(e),
            };
            if let Err(e) = synced {
                let err = StoreError::from_write(e, &self.temp_path);
                self.discard().await;
                return Err(err);
            }
        }

        let size = self.digester.bytes();
        if let Some(expected) = self.request.expected_size {
            if expected != size {
                self.discard().await;
                return Err(StoreError::SizeMismatch {
                    expected,
                    actual: size,
                });
            }
        }

        let digests = std::mem::take(&mut self.digester).finalize();
        if let Some(declared) = self.request.declared_sha1 {
            if declared != digests.sha1 {
                let err = StoreError::DigestMismatch {
                    expected: hex::encode(declared),
                    actual: digests.sha1_hex(),
                };
                warn!(error = %err, "upload failed digest verification");
                self.store.metrics().increment(StoreCounter::DigestMismatch);
                self.discard().await;
                return Err(err);
            }
        }

        let record = ContentRecord { size, digests };
        let mut txn = match catalogue.begin().await {
            Ok(txn) => txn,
            Err(e) => {
                self.discard().await;
                return Err(e);
            }
        };

        match self.commit_with(&mut txn, &record).await {
            Ok((id, path, alias)) => {
                if let Err(e) = txn.commit().await {
                    warn!(id = %id, error = %e, "catalogue commit failed after publish");
                    self.discard().await;
                    return Err(e);
                }
                self.state = UploadState::Committed;
                self.store.metrics().increment(StoreCounter::UploadCommitted);
                info!(id = %id, alias = ?alias, size, sha1 = %digests.sha1_hex(), "upload committed");
                Ok(StoredBlob {
                    id,
                    alias,
                    digests,
                    size,
                    path,
                })
            }
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    warn!(error = %rb, "catalogue rollback failed");
                }
                if matches!(e, StoreError::DuplicateIdentity { .. }) {
                    self.store.metrics().increment(StoreCounter::DuplicateIdentity);
                    self.store.metrics().increment(StoreCounter::UploadAborted);
                    self.state = UploadState::Aborted;
                } else {
                    self.discard().await;
                }
                Err(e)
            }
        }
    }

    async fn commit_with<'c>(
        &mut self,
        txn: &mut Box<dyn CatalogueTxn + 'c>,
        record: &ContentRecord,
    ) -> StoreResult<(BlobId, PathBuf, Option<AliasId>)> {
        let id = match self.request.content_id {
            Some(id) => {
                if !txn.claim_content(id, record).await? {
                    warn!(id = %id, "caller-supplied identity not reserved for this content");
                    return Err(StoreError::IdentityRejected { id });
                }
                id
            }
            None => txn.add_content(record).await?,
        };

        self.publishing = Some(id);
        let store = self.store.clone();
        let temp_path = self.temp_path.clone();
        let path = tokio::task::spawn_blocking(move || store.publish(&temp_path, id))
            .await
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        let alias = match &self.request.filename {
            Some(filename) => {
                let record = AliasRecord {
                    filename: filename.clone(),
                    content_type: self.request.content_type.clone(),
                    expires_at: self.request.expires_at,
                };
                Some(txn.add_alias(id, &record).await?)
            }
            None => None,
        };
        Ok((id, path, alias))
    }

    fn require_accumulating(&self, operation: &'static str) -> StoreResult<()> {
        if self.state != UploadState::Accumulating {
            return Err(StoreError::InvalidState {
                operation,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    async fn discard(&mut self) {
        self.file = None;
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(temp = %self.temp_path.display(), error = %e, "failed to remove temp file");
            }
        }
        self.state = UploadState::Aborted;
        self.store.metrics().increment(StoreCounter::UploadAborted);
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        match self.state {
            UploadState::Accumulating => {}
            UploadState::Committing => match self.publishing {
                Some(id) => error!(
                    id = %id,
                    path = %self.store.path_for(id).display(),
                    "upload dropped mid-commit; blob may be published without a catalogue row"
                ),
                None => debug!(temp = %self.temp_path.display(), "upload dropped before publish"),
            },
            UploadState::Committed | UploadState::Aborted => return,
        }
        self.file = None;
        let temp_path = self.temp_path.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_abandoned(&temp_path));
            }
            Err(_) => remove_abandoned(&temp_path),
        }
        self.store.metrics().increment(StoreCounter::UploadAborted);
        debug!(temp = %self.temp_path.display(), "abandoned upload cleaned up");
    }
}

fn remove_abandoned(temp_path: &Path) {
    if let Err(e) = std::fs::remove_file(temp_path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(temp = %temp_path.display(), error = %e, "failed to remove abandoned temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::InMemoryCatalogue;
    use crate::metrics::StoreMetrics;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalDiskStore, Arc<StoreMetrics>) {
        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(StoreMetrics::new());
        let store = LocalDiskStore::with_metrics(dir.path().join("lib"), metrics.clone()).unwrap();
        (dir, store, metrics)
    }

    fn incoming_is_empty(store: &LocalDiskStore) -> bool {
        std::fs::read_dir(store.incoming_dir()).unwrap().next().is_none()
    }

    async fn wait_until_removed(path: &Path) {
        for _ in 0..200 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} was never removed", path.display());
    }

    /// Catalogue whose commit never completes, so `store()` can be cut off
    /// after the blob is on disk.
    struct StalledCommit(InMemoryCatalogue);

    struct StalledTxn<'a>(Box<dyn CatalogueTxn + 'a>);

    #[async_trait]
    impl Catalogue for StalledCommit {
        fn database_name(&self) -> &str {
            self.0.database_name()
        }

        async fn begin<'a>(&'a self) -> StoreResult<Box<dyn CatalogueTxn + 'a>> {
            Ok(Box::new(StalledTxn(self.0.begin().await?)))
        }
    }

    #[async_trait]
    impl<'a> CatalogueTxn for StalledTxn<'a> {
        async fn add_content(&mut self, record: &ContentRecord) -> StoreResult<BlobId> {
            self.0.add_content(record).await
        }

        async fn claim_content(&mut self, id: BlobId, record: &ContentRecord) -> StoreResult<bool> {
            self.0.claim_content(id, record).await
        }

        async fn add_alias(&mut self, content: BlobId, alias: &AliasRecord) -> StoreResult<AliasId> {
            self.0.add_alias(content, alias).await
        }

        async fn commit(self: Box<Self>) -> StoreResult<()> {
            std::future::pending().await
        }

        async fn rollback(self: Box<Self>) -> StoreResult<()> {
            self.0.rollback().await
        }
    }

    #[tokio::test]
    async fn test_hello_world_commit() {
        let (_dir, store, metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let mut upload = store.begin_upload(UploadRequest::new(11)).await.unwrap();
        upload.append(b"hello ").await.unwrap();
        upload.append(b"world").await.unwrap();
        let stored = upload.store(&catalogue).await.unwrap();

        assert_eq!(stored.id, BlobId::new(1));
        assert_eq!(stored.alias, None);
        assert_eq!(stored.size, 11);
        assert_eq!(stored.digests, BlobDigests::of(b"hello world"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello world");
        assert_eq!(upload.state(), UploadState::Committed);
        assert!(incoming_is_empty(&store));
        assert_eq!(metrics.get(StoreCounter::UploadCommitted), 1);
        assert_eq!(catalogue.content(stored.id).unwrap().size, 11);
    }

    #[tokio::test]
    async fn test_alias_created_with_filename() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let request = UploadRequest::new(3)
            .with_filename("abc.txt")
            .with_content_type("text/plain")
            .with_expiry(1_900_000_000);
        let mut upload = store.begin_upload(request).await.unwrap();
        upload.append(b"abc").await.unwrap();
        let stored = upload.store(&catalogue).await.unwrap();

        let alias = stored.alias.unwrap();
        let (content, record) = catalogue.alias(alias).unwrap();
        assert_eq!(content, stored.id);
        assert_eq!(record.filename, "abc.txt");
        assert_eq!(record.content_type.as_deref(), Some("text/plain"));
        assert_eq!(record.expires_at, Some(1_900_000_000));
    }

    #[tokio::test]
    async fn test_digest_mismatch_allocates_nothing() {
        let (_dir, store, metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let wrong = BlobDigests::of(b"something else").sha1;
        let mut upload = store
            .begin_upload(UploadRequest::new(5).with_sha1(wrong))
            .await
            .unwrap();
        upload.append(b"bytes").await.unwrap();
        let err = upload.store(&catalogue).await.unwrap_err();

        assert!(matches!(err, StoreError::DigestMismatch { .. }));
        assert_eq!(upload.state(), UploadState::Aborted);
        assert!(incoming_is_empty(&store));
        assert!(store.committed_ids().unwrap().is_empty());
        assert_eq!(catalogue.content_count(), 0);
        assert_eq!(metrics.get(StoreCounter::DigestMismatch), 1);
    }

    #[tokio::test]
    async fn test_matching_declared_sha1_commits() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let sha1 = BlobDigests::of(b"bytes").sha1;
        let mut upload = store
            .begin_upload(UploadRequest::new(5).with_sha1(sha1))
            .await
            .unwrap();
        upload.append(b"bytes").await.unwrap();
        assert!(upload.store(&catalogue).await.is_ok());
    }

    #[tokio::test]
    async fn test_size_mismatch() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let mut upload = store.begin_upload(UploadRequest::new(10)).await.unwrap();
        upload.append(b"short").await.unwrap();
        let err = upload.store(&catalogue).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::SizeMismatch {
                expected: 10,
                actual: 5
            }
        ));
        assert!(incoming_is_empty(&store));
    }

    #[tokio::test]
    async fn test_wrong_environment_rejected() {
        let (_dir, store, metrics) = setup();
        let catalogue = InMemoryCatalogue::new("production");

        let mut upload = store
            .begin_upload(UploadRequest::new(1).with_database_name("staging"))
            .await
            .unwrap();
        upload.append(b"x").await.unwrap();
        let err = upload.store(&catalogue).await.unwrap_err();

        assert!(matches!(err, StoreError::WrongEnvironment { .. }));
        assert!(incoming_is_empty(&store));
        assert_eq!(catalogue.content_count(), 0);
        assert_eq!(metrics.get(StoreCounter::WrongEnvironment), 1);
    }

    #[tokio::test]
    async fn test_matching_environment_accepted() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("production");

        let mut upload = store
            .begin_upload(UploadRequest::new(1).with_database_name("production"))
            .await
            .unwrap();
        upload.append(b"x").await.unwrap();
        assert!(upload.store(&catalogue).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_identity_preserves_both_files() {
        let (_dir, store, metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let mut first = store.begin_upload(UploadRequest::new(8)).await.unwrap();
        first.append(b"original").await.unwrap();
        let stored = first.store(&catalogue).await.unwrap();

        let rewound = InMemoryCatalogue::starting_at("main", stored.id.get() as u64);
        let mut second = store.begin_upload(UploadRequest::new(8)).await.unwrap();
        second.append(b"intruder").await.unwrap();
        let temp = second.temp_path().to_path_buf();
        let err = second.store(&rewound).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateIdentity { id, .. } if id == stored.id));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"original");
        assert_eq!(std::fs::read(&temp).unwrap(), b"intruder");
        assert_eq!(rewound.content_count(), 0);
        assert_eq!(second.state(), UploadState::Aborted);
        assert_eq!(metrics.get(StoreCounter::DuplicateIdentity), 1);
    }

    #[tokio::test]
    async fn test_append_after_terminal_state_rejected() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");

        let mut upload = store.begin_upload(UploadRequest::default()).await.unwrap();
        upload.append(b"data").await.unwrap();
        upload.store(&catalogue).await.unwrap();

        assert!(matches!(
            upload.append(b"more").await,
            Err(StoreError::InvalidState {
                operation: "append",
                state: "committed"
            })
        ));
        assert!(upload.abort().await.is_err());
        assert!(upload.store(&catalogue).await.is_err());
    }

    #[tokio::test]
    async fn test_abort_removes_temp() {
        let (_dir, store, metrics) = setup();
        let mut upload = store.begin_upload(UploadRequest::new(4)).await.unwrap();
        upload.append(b"data").await.unwrap();
        let temp = upload.temp_path().to_path_buf();
        assert!(temp.exists());

        upload.abort().await.unwrap();
        assert!(!temp.exists());
        assert_eq!(upload.state(), UploadState::Aborted);
        assert!(upload.append(b"x").await.is_err());
        assert_eq!(metrics.get(StoreCounter::UploadAborted), 1);
    }

    #[tokio::test]
    async fn test_drop_cleans_up_abandoned_upload() {
        let (_dir, store, metrics) = setup();
        let mut upload = store.begin_upload(UploadRequest::new(4)).await.unwrap();
        upload.append(b"da").await.unwrap();
        let temp = upload.temp_path().to_path_buf();
        drop(upload);

        wait_until_removed(&temp).await;
        assert_eq!(metrics.get(StoreCounter::UploadAborted), 1);
        assert!(store.committed_ids().unwrap().is_empty());
    }

    #[test]
    fn test_drop_outside_runtime_removes_temp_inline() {
        let (_dir, store, metrics) = setup();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let upload = rt.block_on(async {
            let mut upload = store.begin_upload(UploadRequest::new(4)).await.unwrap();
            upload.append(b"da").await.unwrap();
            upload
        });
        let temp = upload.temp_path().to_path_buf();
        drop(upload);

        assert!(!temp.exists());
        assert_eq!(metrics.get(StoreCounter::UploadAborted), 1);
    }

    #[tokio::test]
    async fn test_store_cancelled_after_publish_is_not_a_clean_abort() {
        let (_dir, store, metrics) = setup();
        let catalogue = StalledCommit(InMemoryCatalogue::new("main"));

        let mut upload = store.begin_upload(UploadRequest::new(4)).await.unwrap();
        upload.append(b"data").await.unwrap();
        let temp = upload.temp_path().to_path_buf();
        let cut_off = tokio::time::timeout(Duration::from_secs(2), upload.store(&catalogue)).await;
        assert!(cut_off.is_err());

        assert_eq!(upload.state(), UploadState::Committing);
        assert!(matches!(
            upload.append(b"x").await,
            Err(StoreError::InvalidState {
                operation: "append",
                state: "committing"
            })
        ));
        let orphan = store.path_for(BlobId::new(1));
        assert_eq!(std::fs::read(&orphan).unwrap(), b"data");
        assert_eq!(catalogue.0.content_count(), 0);

        drop(upload);
        wait_until_removed(&temp).await;
        assert_eq!(metrics.get(StoreCounter::UploadAborted), 1);
        assert_eq!(metrics.get(StoreCounter::UploadCommitted), 0);
        assert!(orphan.exists());
    }

    #[tokio::test]
    async fn test_reserved_content_id_is_claimed() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");
        let id = BlobId::new(4242);
        catalogue.reserve(id, BlobDigests::of(b"shared").sha1).unwrap();

        let mut upload = store
            .begin_upload(UploadRequest::new(6).with_content_id(id))
            .await
            .unwrap();
        upload.append(b"shared").await.unwrap();
        let stored = upload.store(&catalogue).await.unwrap();

        assert_eq!(stored.id, id);
        assert!(store.exists(id));
    }

    #[tokio::test]
    async fn test_unreserved_content_id_rejected() {
        let (_dir, store, _metrics) = setup();
        let catalogue = InMemoryCatalogue::new("main");
        let id = BlobId::new(4242);

        let mut upload = store
            .begin_upload(UploadRequest::new(6).with_content_id(id))
            .await
            .unwrap();
        upload.append(b"shared").await.unwrap();
        let err = upload.store(&catalogue).await.unwrap_err();

        assert!(matches!(err, StoreError::IdentityRejected { .. }));
        assert!(!store.exists(id));
        assert!(incoming_is_empty(&store));
    }
}
