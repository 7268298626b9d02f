//! The catalogue collaborator: identity allocation and alias bookkeeping.
//!
//! The relational catalogue that maps filenames and MIME types to blob
//! identities lives outside this crate. The store only needs a transactional
//! handle to allocate identities and attach aliases, so that allocation and
//! catalogue rows land atomically with each other.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blob_id::BlobId;
use crate::digest::{BlobDigests, Sha1Digest};
use crate::error::{StoreError, StoreResult};

/// Identity of a catalogue alias (filename + content type) for a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasId(pub u64);

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content row recorded for a committed blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Size in bytes.
    pub size: u64,
    /// Digests of the bytes.
    pub digests: BlobDigests,
}

/// Alias row attaching a human-meaningful name to a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Declared filename.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    pub expires_at: Option<u64>,
}

/// A catalogue able to open transactions.
#[async_trait]
pub trait Catalogue: Send + Sync {
    /// Name of the database this catalogue writes to.
    fn database_name(&self) -> &str;

    /// Opens a transaction.
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn CatalogueTxn + 'a>>;
}

/// One catalogue transaction.
///
/// Identities handed out by [`CatalogueTxn::add_content`] are never reused,
/// even if the transaction rolls back.
#[async_trait]
pub trait CatalogueTxn: Send {
    /// Allocates a fresh identity for new content.
    async fn add_content(&mut self, record: &ContentRecord) -> StoreResult<BlobId>;

    /// Attaches content to an identity the caller already holds.
    ///
    /// Returns `false` when the identity was not reserved for exactly this
    /// content, in which case the commit must be refused.
    async fn claim_content(&mut self, id: BlobId, record: &ContentRecord) -> StoreResult<bool>;

    /// Records an alias for committed content.
    async fn add_alias(&mut self, content: BlobId, alias: &AliasRecord) -> StoreResult<AliasId>;

    /// Makes every change of this transaction visible.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every change of this transaction.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct CatalogueState {
    next_content: u64,
    next_alias: u64,
    contents: BTreeMap<BlobId, ContentRecord>,
    aliases: BTreeMap<AliasId, (BlobId, AliasRecord)>,
    reserved: BTreeMap<BlobId, Sha1Digest>,
    claimed: BTreeSet<BlobId>,
}

/// Catalogue kept in process memory.
///
/// Used by tests and by the CLI, which seeds it from the identities already
/// on disk.
pub struct InMemoryCatalogue {
    database_name: String,
    state: Mutex<CatalogueState>,
}

impl InMemoryCatalogue {
    /// Creates an empty catalogue whose first identity is 1.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self::starting_at(database_name, 1)
    }

    /// Creates an empty catalogue whose next identity is `next_id`.
    pub fn starting_at(database_name: impl Into<String>, next_id: u64) -> Self {
        Self {
            database_name: database_name.into(),
            state: Mutex::new(CatalogueState {
                next_content: next_id,
                next_alias: 1,
                ..Default::default()
            }),
        }
    }

    /// Reserves `id` for content with the given SHA-1, for later
    /// [`CatalogueTxn::claim_content`].
    pub fn reserve(&self, id: BlobId, sha1: Sha1Digest) -> StoreResult<()> {
        self.lock()?.reserved.insert(id, sha1);
        Ok(())
    }

    /// Committed content row for `id`.
    pub fn content(&self, id: BlobId) -> Option<ContentRecord> {
        self.lock().ok()?.contents.get(&id).cloned()
    }

    /// Committed alias row.
    pub fn alias(&self, alias: AliasId) -> Option<(BlobId, AliasRecord)> {
        self.lock().ok()?.aliases.get(&alias).cloned()
    }

    /// Number of committed content rows.
    pub fn content_count(&self) -> usize {
        self.lock().map(|s| s.contents.len()).unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, CatalogueState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Catalogue(e.to_string()))
    }
}

#[async_trait]
impl Catalogue for InMemoryCatalogue {
    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn CatalogueTxn + 'a>> {
        Ok(Box::new(InMemoryTxn {
            catalogue: self,
            contents: Vec::new(),
            aliases: Vec::new(),
            claims: Vec::new(),
        }))
    }
}

struct InMemoryTxn<'a> {
    catalogue: &'a InMemoryCatalogue,
    contents: Vec<(BlobId, ContentRecord)>,
    aliases: Vec<(AliasId, BlobId, AliasRecord)>,
    claims: Vec<BlobId>,
}

impl InMemoryTxn<'_> {
    fn release_claims(&mut self) {
        if self.claims.is_empty() {
            return;
        }
        match self.catalogue.lock() {
            Ok(mut state) => {
                for id in self.claims.drain(..) {
                    state.claimed.remove(&id);
                }
            }
            Err(e) => warn!(error = %e, "cannot release content claims"),
        }
    }
}

impl Drop for InMemoryTxn<'_> {
    fn drop(&mut self) {
        self.release_claims();
    }
}

#[async_trait]
impl<'a> CatalogueTxn for InMemoryTxn<'a> {
    async fn add_content(&mut self, record: &ContentRecord) -> StoreResult<BlobId> {
        let id = {
            let mut state = self.catalogue.lock()?;
            let id = BlobId::try_from(state.next_content)?;
            state.next_content += 1;
            id
        };
        debug!(id = %id, size = record.size, "allocated content identity");
        self.contents.push((id, record.clone()));
        Ok(id)
    }

    async fn claim_content(&mut self, id: BlobId, record: &ContentRecord) -> StoreResult<bool> {
        let matches = {
            let mut state = self.catalogue.lock()?;
            let matches = state.reserved.get(&id) == Some(&record.digests.sha1)
                && !state.contents.contains_key(&id)
                && !state.claimed.contains(&id);
            if matches {
                state.claimed.insert(id);
            }
            matches
        };
        if matches {
            self.claims.push(id);
            self.contents.push((id, record.clone()));
        }
        Ok(matches)
    }

    async fn add_alias(&mut self, content: BlobId, alias: &AliasRecord) -> StoreResult<AliasId> {
        let id = {
            let mut state = self.catalogue.lock()?;
            let id = AliasId(state.next_alias);
            state.next_alias += 1;
            id
        };
        self.aliases.push((id, content, alias.clone()));
        Ok(id)
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let mut state = self.catalogue.lock()?;
        for (id, record) in std::mem::take(&mut self.contents) {
            state.reserved.remove(&id);
            state.claimed.remove(&id);
            state.contents.insert(id, record);
        }
        for (alias, content, record) in std::mem::take(&mut self.aliases) {
            state.aliases.insert(alias, (content, record));
        }
        self.claims.clear();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(
            contents = self.contents.len(),
            aliases = self.aliases.len(),
            "catalogue transaction rolled back"
        );
        Ok(())
    }
}
