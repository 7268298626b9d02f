//! Top-level handle tying configuration to stores and readers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::blob_id::BlobId;
use crate::config::{LibrarianConfig, TierConfig};
use crate::error::{StoreError, StoreResult};
use crate::local::LocalDiskStore;
use crate::metrics::{MetricsSink, StoreMetrics};
use crate::reader::{BlobReader, TieredReader};
use crate::remote::RemotePool;
use crate::upload::{PendingUpload, UploadRequest};

/// Access-control namespace a blob lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Publicly readable blobs.
    Public,
    /// Blobs behind the restricted boundary.
    Restricted,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Public => write!(f, "public"),
            Namespace::Restricted => write!(f, "restricted"),
        }
    }
}

impl FromStr for Namespace {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "public" => Ok(Namespace::Public),
            "restricted" => Ok(Namespace::Restricted),
            other => Err(StoreError::Config(format!("unknown namespace: {}", other))),
        }
    }
}

struct NamespaceTiers {
    local: LocalDiskStore,
    pools: Vec<Arc<RemotePool>>,
    reader: TieredReader,
}

impl NamespaceTiers {
    async fn build(
        namespace: Namespace,
        config: &TierConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> StoreResult<Self> {
        let local = LocalDiskStore::with_metrics(&config.root, metrics.clone())?;
        let mut pools = Vec::new();
        if config.remote.enabled {
            for pool_config in &config.remote.pools {
                pools.push(Arc::new(RemotePool::new(pool_config).await?));
            }
        }
        info!(
            namespace = %namespace,
            root = %config.root.display(),
            remote_pools = pools.len(),
            "namespace ready"
        );
        let reader = TieredReader::for_tiers(local.clone(), pools.clone(), metrics);
        Ok(Self {
            local,
            pools,
            reader,
        })
    }
}

/// The blob store for one deployment: a public namespace and, optionally, a
/// restricted one, each with its own local root and remote pools.
pub struct Librarian {
    database_name: String,
    read_chunk_size: usize,
    metrics: Arc<StoreMetrics>,
    public: NamespaceTiers,
    restricted: Option<NamespaceTiers>,
}

impl Librarian {
    /// Opens every configured namespace.
    pub async fn from_config(config: &LibrarianConfig) -> StoreResult<Self> {
        config.validate()?;
        let metrics = Arc::new(StoreMetrics::new());
        let sink: Arc<dyn MetricsSink> = metrics.clone();

        let public = NamespaceTiers::build(Namespace::Public, &config.public, sink.clone()).await?;
        let restricted = match &config.restricted {
            Some(tier) => Some(NamespaceTiers::build(Namespace::Restricted, tier, sink).await?),
            None => None,
        };

        Ok(Self {
            database_name: config.database_name.clone(),
            read_chunk_size: config.read_chunk_size,
            metrics,
            public,
            restricted,
        })
    }

    fn tiers(&self, namespace: Namespace) -> StoreResult<&NamespaceTiers> {
        match namespace {
            Namespace::Public => Ok(&self.public),
            Namespace::Restricted => self.restricted.as_ref().ok_or_else(|| {
                StoreError::Config("restricted namespace is not configured".to_string())
            }),
        }
    }

    /// Environment identity this deployment serves.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Chunk size for whole-blob reads.
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    /// Counters shared by every namespace.
    pub fn metrics(&self) -> &Arc<StoreMetrics> {
        &self.metrics
    }

    /// Local store of `namespace`.
    pub fn local(&self, namespace: Namespace) -> StoreResult<&LocalDiskStore> {
        Ok(&self.tiers(namespace)?.local)
    }

    /// Remote pools of `namespace`, oldest first.
    pub fn remote_pools(&self, namespace: Namespace) -> StoreResult<&[Arc<RemotePool>]> {
        Ok(&self.tiers(namespace)?.pools)
    }

    /// Starts an upload into `namespace`.
    pub async fn begin_upload(
        &self,
        namespace: Namespace,
        request: UploadRequest,
    ) -> StoreResult<PendingUpload> {
        self.tiers(namespace)?.local.begin_upload(request).await
    }

    /// Opens `id` for reading from whichever tier of `namespace` has it.
    pub async fn open(&self, namespace: Namespace, id: BlobId) -> StoreResult<BlobReader> {
        self.tiers(namespace)?.reader.open(id).await
    }

    /// Reads the whole blob using the configured chunk size.
    pub async fn read_all(&self, namespace: Namespace, id: BlobId) -> StoreResult<Vec<u8>> {
        let mut reader = self.open(namespace, id).await?;
        reader.read_to_end(self.read_chunk_size).await
    }

    /// Whether `id` is committed on local disk in `namespace`.
    pub async fn exists_locally(&self, namespace: Namespace, id: BlobId) -> StoreResult<bool> {
        Ok(self.tiers(namespace)?.local.exists_async(id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::InMemoryCatalogue;
    use crate::metrics::StoreCounter;
    use tempfile::TempDir;

    fn config(dir: &TempDir, restricted: bool) -> LibrarianConfig {
        let mut config = LibrarianConfig {
            database_name: "test_db".to_string(),
            ..LibrarianConfig::default()
        };
        config.public.root = dir.path().join("public");
        if restricted {
            config.restricted = Some(TierConfig {
                root: dir.path().join("restricted"),
                ..TierConfig::default()
            });
        }
        config
    }

    #[tokio::test]
    async fn test_upload_then_read() {
        let dir = TempDir::new().unwrap();
        let librarian = Librarian::from_config(&config(&dir, false)).await.unwrap();
        let catalogue = InMemoryCatalogue::new("test_db");

        let mut upload = librarian
            .begin_upload(Namespace::Public, UploadRequest::new(11))
            .await
            .unwrap();
        upload.append(b"hello world").await.unwrap();
        let stored = upload.store(&catalogue).await.unwrap();

        assert!(librarian
            .exists_locally(Namespace::Public, stored.id)
            .await
            .unwrap());
        assert!(!librarian
            .exists_locally(Namespace::Public, BlobId::new(stored.id.get() + 1))
            .await
            .unwrap());
        let data = librarian.read_all(Namespace::Public, stored.id).await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(librarian.metrics().get(StoreCounter::UploadCommitted), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_separate() {
        let dir = TempDir::new().unwrap();
        let librarian = Librarian::from_config(&config(&dir, true)).await.unwrap();
        let catalogue = InMemoryCatalogue::new("test_db");

        let mut upload = librarian
            .begin_upload(Namespace::Restricted, UploadRequest::new(6))
            .await
            .unwrap();
        upload.append(b"secret").await.unwrap();
        let stored = upload.store(&catalogue).await.unwrap();

        assert!(stored.path.starts_with(dir.path().join("restricted")));
        let err = librarian.open(Namespace::Public, stored.id).await.err().unwrap();
        assert!(matches!(err, StoreError::NotFound { .. }));
        let data = librarian.read_all(Namespace::Restricted, stored.id).await.unwrap();
        assert_eq!(data, b"secret");
    }

    #[tokio::test]
    async fn test_restricted_not_configured() {
        let dir = TempDir::new().unwrap();
        let librarian = Librarian::from_config(&config(&dir, false)).await.unwrap();
        assert!(matches!(
            librarian.local(Namespace::Restricted),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_namespace_parse() {
        assert_eq!("public".parse::<Namespace>().unwrap(), Namespace::Public);
        assert_eq!("restricted".parse::<Namespace>().unwrap(), Namespace::Restricted);
        assert!("private".parse::<Namespace>().is_err());
    }
}
