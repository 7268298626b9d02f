use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::blob_id::DEFAULT_CONTAINER_PREFIX;
use crate::error::{StoreError, StoreResult};
use crate::reader::DEFAULT_CHUNK_SIZE;

/// Top-level configuration for a librarian instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarianConfig {
    /// Environment identity; uploads naming another database are refused.
    pub database_name: String,
    /// Chunk size used for whole-blob reads.
    pub read_chunk_size: usize,
    /// Public namespace.
    pub public: TierConfig,
    /// Restricted namespace, kept apart from the public one.
    pub restricted: Option<TierConfig>,
}

impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            database_name: String::from("librarian"),
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            public: TierConfig::default(),
            restricted: None,
        }
    }
}

/// Storage for one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Local store root.
    pub root: PathBuf,
    /// Remote object-storage tier.
    pub remote: RemoteTierConfig,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/librarian/public"),
            remote: RemoteTierConfig::default(),
        }
    }
}

/// Remote clusters backing one namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTierConfig {
    /// Whether reads consult the remote tier at all.
    pub enabled: bool,
    /// Clusters, oldest first. Reads try them newest first.
    pub pools: Vec<RemotePoolConfig>,
}

/// One remote cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePoolConfig {
    /// Name used in logs and errors.
    pub name: String,
    /// v1 authentication endpoint.
    pub auth_url: String,
    /// Account user.
    pub user: String,
    /// Account key.
    pub key: String,
    /// Prefix of container names.
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    /// Upper bound on pooled sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connect and session checkout timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-request and per-chunk timeout.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_container_prefix() -> String {
    DEFAULT_CONTAINER_PREFIX.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    30
}

impl RemotePoolConfig {
    /// A pool with default prefix, limits and timeouts.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl Into<String>,
        user: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            auth_url: auth_url.into(),
            user: user.into(),
            key: key.into(),
            container_prefix: default_container_prefix(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl LibrarianConfig {
    /// Loads a TOML or JSON file, chosen by extension, and validates it.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: LibrarianConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?,
            _ => {
                return Err(StoreError::Config(format!(
                    "unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the store cannot run with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.database_name.is_empty() {
            return Err(StoreError::Config("database_name is empty".to_string()));
        }
        if self.read_chunk_size == 0 {
            return Err(StoreError::Config("read_chunk_size must be positive".to_string()));
        }
        self.public.validate("public")?;
        if let Some(restricted) = &self.restricted {
            restricted.validate("restricted")?;
            if restricted.root == self.public.root {
                return Err(StoreError::Config(
                    "restricted root must differ from public root".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl TierConfig {
    fn validate(&self, namespace: &str) -> StoreResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(StoreError::Config(format!("{} root is empty", namespace)));
        }
        if self.remote.enabled && self.remote.pools.is_empty() {
            return Err(StoreError::Config(format!(
                "{} remote tier is enabled with no pools",
                namespace
            )));
        }
        for pool in &self.remote.pools {
            if pool.name.is_empty() || pool.auth_url.is_empty() {
                return Err(StoreError::Config(format!(
                    "{} remote pool needs a name and an auth_url",
                    namespace
                )));
            }
        }
        Ok(())
    }
}
