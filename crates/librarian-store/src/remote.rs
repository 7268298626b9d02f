//! Remote object-storage tier.
//!
//! The remote tier is a Swift-style HTTP object store addressed by
//! container and object name. Each configured cluster gets its own `bb8`
//! pool of authenticated sessions, so a read reuses a token instead of
//! re-authenticating. A session is checked out for one read and goes back to
//! the pool only once its body has been fully drained; a session dropped
//! mid-body is discarded.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection, RunError};
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::blob_id::{BlobId, ContainerRef};
use crate::config::RemotePoolConfig;
use crate::error::{StoreError, StoreResult};
use crate::reader::DEFAULT_CHUNK_SIZE;

/// Request header carrying the account name during authentication.
pub const AUTH_USER_HEADER: &str = "X-Auth-User";
/// Request header carrying the account key during authentication.
pub const AUTH_KEY_HEADER: &str = "X-Auth-Key";
/// Header carrying the session token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
/// Response header naming the account's storage endpoint.
pub const STORAGE_URL_HEADER: &str = "X-Storage-Url";

/// An authenticated session against one remote cluster.
#[derive(Debug)]
pub struct SwiftSession {
    client: reqwest::Client,
    storage_url: String,
    token: String,
    busy: bool,
    expired: bool,
}

impl SwiftSession {
    /// Storage endpoint returned at authentication.
    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }

    fn object_url(&self, location: &ContainerRef) -> String {
        format!(
            "{}/{}/{}",
            self.storage_url.trim_end_matches('/'),
            location.container,
            location.object
        )
    }
}

/// `bb8` manager that authenticates new sessions.
pub struct SwiftConnectionManager {
    pool_name: String,
    auth_url: String,
    user: String,
    key: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl SwiftConnectionManager {
    /// Creates a manager for the cluster described by `config`.
    pub fn new(config: &RemotePoolConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| StoreError::Remote {
                pool: config.name.clone(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(Self {
            pool_name: config.name.clone(),
            auth_url: config.auth_url.clone(),
            user: config.user.clone(),
            key: config.key.clone(),
            client,
            request_timeout: Duration::from_secs(config.read_timeout_secs),
        })
    }

    fn failure(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Remote {
            pool: self.pool_name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ManageConnection for SwiftConnectionManager {
    type Connection = SwiftSession;
    type Error = StoreError;

    async fn connect(&self) -> Result<SwiftSession, StoreError> {
        let request = self
            .client
            .get(&self.auth_url)
            .header(AUTH_USER_HEADER, self.user.as_str())
            .header(AUTH_KEY_HEADER, self.key.as_str());
        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| self.failure("authentication timed out"))?
            .map_err(|e| self.failure(format!("authentication failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.failure(format!(
                "authentication returned HTTP {}",
                response.status()
            )));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let storage_url = header(STORAGE_URL_HEADER)
            .ok_or_else(|| self.failure("authentication response lacks a storage URL"))?;
        let token = header(AUTH_TOKEN_HEADER)
            .ok_or_else(|| self.failure("authentication response lacks a token"))?;

        info!(pool = %self.pool_name, storage_url = %storage_url, "remote session authenticated");
        Ok(SwiftSession {
            client: self.client.clone(),
            storage_url,
            token,
            busy: false,
            expired: false,
        })
    }

    async fn is_valid(&self, conn: &mut SwiftSession) -> Result<(), StoreError> {
        if conn.expired {
            return Err(self.failure("session token expired"));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut SwiftSession) -> bool {
        conn.busy || conn.expired
    }
}

/// Pool of sessions for one remote cluster.
pub struct RemotePool {
    name: String,
    container_prefix: String,
    request_timeout: Duration,
    pool: Pool<SwiftConnectionManager>,
}

impl RemotePool {
    /// Builds a pool; sessions are authenticated lazily on first use.
    ///
    /// Must run inside a Tokio runtime, which hosts the pool's reaper task.
    pub async fn new(config: &RemotePoolConfig) -> StoreResult<Self> {
        let manager = SwiftConnectionManager::new(config)?;
        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .build_unchecked(manager);
        debug!(pool = %config.name, max = config.max_connections, "remote pool created");
        Ok(Self {
            name: config.name.clone(),
            container_prefix: config.container_prefix.clone(),
            request_timeout: Duration::from_secs(config.read_timeout_secs),
            pool,
        })
    }

    /// Pool name from the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sessions currently idle in the pool.
    pub fn idle_sessions(&self) -> u32 {
        self.pool.state().idle_connections
    }

    /// Sessions currently open, idle or checked out.
    pub fn open_sessions(&self) -> u32 {
        self.pool.state().connections
    }

    fn failure(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Remote {
            pool: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Starts a chunked GET for `id`.
    ///
    /// `Ok(None)` means the cluster answered "not found"; the session goes
    /// straight back to the pool in that case.
    pub async fn open(&self, id: BlobId) -> StoreResult<Option<RemoteStream>> {
        let location = ContainerRef::for_blob(id, &self.container_prefix);
        let mut session = self.pool.get_owned().await.map_err(|e| match e {
            RunError::User(e) => e,
            RunError::TimedOut => self.failure("timed out waiting for a session"),
        })?;

        let url = session.object_url(&location);
        let request = session
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, session.token.as_str());
        session.busy = true;

        let response = match timeout(self.request_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.failure(format!("GET {} failed: {}", url, e))),
            Err(_) => return Err(self.failure(format!("GET {} timed out", url))),
        };

        match response.status() {
            StatusCode::NOT_FOUND => {
                session.busy = false;
                debug!(pool = %self.name, id = %id, "object not found");
                Ok(None)
            }
            StatusCode::UNAUTHORIZED => {
                session.expired = true;
                Err(self.failure("token rejected"))
            }
            status if status.is_success() => {
                debug!(pool = %self.name, id = %id, url = %url, "streaming object");
                Ok(Some(RemoteStream {
                    pool: self.name.clone(),
                    session: Some(session),
                    response,
                    pending: Bytes::new(),
                    chunk_timeout: self.request_timeout,
                    eof: false,
                }))
            }
            status => Err(self.failure(format!("GET {} returned HTTP {}", url, status))),
        }
    }
}

/// Lazily pulled body of a remote object.
pub struct RemoteStream {
    pool: String,
    session: Option<PooledConnection<'static, SwiftConnectionManager>>,
    response: reqwest::Response,
    pending: Bytes,
    chunk_timeout: Duration,
    eof: bool,
}

impl RemoteStream {
    /// Reads up to `max` bytes; fewer only at the end of the object. Once
    /// the end is reached every call returns an empty buffer and the session
    /// has been returned to its pool.
    pub async fn read_chunk(&mut self, max: usize) -> StoreResult<Bytes> {
        if max == 0 {
            return Ok(Bytes::new());
        }
        let mut out = BytesMut::with_capacity(max.min(DEFAULT_CHUNK_SIZE));
        while out.len() < max {
            if self.pending.is_empty() {
                if self.eof {
                    break;
                }
                match timeout(self.chunk_timeout, self.response.chunk()).await {
                    Ok(Ok(Some(chunk))) => self.pending = chunk,
                    Ok(Ok(None)) => {
                        self.finish();
                        break;
                    }
                    Ok(Err(e)) => return Err(self.abandon(format!("body read failed: {}", e))),
                    Err(_) => return Err(self.abandon("body read timed out".to_string())),
                }
                continue;
            }
            let take = (max - out.len()).min(self.pending.len());
            out.extend_from_slice(&self.pending.split_to(take));
        }
        Ok(out.freeze())
    }

    /// Whether the body has been read to the end.
    pub fn is_drained(&self) -> bool {
        self.eof && self.pending.is_empty()
    }

    fn finish(&mut self) {
        self.eof = true;
        if let Some(mut session) = self.session.take() {
            session.busy = false;
            debug!(pool = %self.pool, "body drained, session returned");
        }
    }

    fn abandon(&mut self, reason: String) -> StoreError {
        self.eof = true;
        self.pending = Bytes::new();
        self.session = None;
        warn!(pool = %self.pool, reason = %reason, "remote stream abandoned, session discarded");
        StoreError::Remote {
            pool: self.pool.clone(),
            reason,
        }
    }
}

impl Drop for RemoteStream {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!(pool = %self.pool, "remote stream dropped before end, session discarded");
        }
    }
}
