//! Async session directory: create, list, resolve.
//!
//! The directory owns no state of its own. It generates identifiers, bounds
//! every store call with a timeout, and hands blocking SQLite work to the
//! blocking pool so request tasks only suspend at the store boundary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use jamroom_core::{GenreFilter, SessionDraft, SessionId, SessionRecord};

use crate::database::Database;
use crate::error::StoreError;
use crate::sessions::SessionRepo;

/// Directory and store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// SQLite file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    /// Upper bound on a single store call, in milliseconds.
    pub store_timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            store_timeout_ms: 5_000,
        }
    }
}

impl DirectoryConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Open the configured database.
    pub fn open_database(&self) -> Result<Database, StoreError> {
        match &self.database_path {
            Some(path) => Database::open(path),
            None => Database::in_memory(),
        }
    }
}

/// Persistence seam behind the directory.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: SessionRecord) -> Result<(), StoreError>;

    async fn find_public(&self, filter: GenreFilter) -> Result<Vec<SessionRecord>, StoreError>;

    /// Release the underlying connection.
    async fn close(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl SessionStore for SessionRepo {
    async fn insert(&self, record: SessionRecord) -> Result<(), StoreError> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || SessionRepo::insert(&repo, &record))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    async fn find_public(&self, filter: GenreFilter) -> Result<Vec<SessionRecord>, StoreError> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || SessionRepo::find_public(&repo, &filter))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.database().close()
    }
}

/// Session directory over any [`SessionStore`].
#[derive(Clone)]
pub struct SessionDirectory {
    store: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl SessionDirectory {
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Directory over the SQLite repository described by `config`.
    pub fn open(config: &DirectoryConfig) -> Result<Self, StoreError> {
        let repo = SessionRepo::new(config.open_database()?);
        Ok(Self::new(Arc::new(repo), config.store_timeout()))
    }

    /// Persist a new session and return its generated id. Not retried.
    ///
    /// A timeout only abandons the wait. The SQLite write already handed to
    /// the blocking pool still runs to completion, so a session reported as
    /// [`StoreError::Timeout`] may appear in later listings.
    pub async fn create(&self, draft: SessionDraft) -> Result<SessionId, StoreError> {
        let session_id = SessionId::generate();
        let record = draft.into_record(session_id.clone());
        self.bounded(self.store.insert(record)).await?;
        debug!(session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// Every public session passing `filter`, materialized at once.
    pub async fn list(&self, filter: GenreFilter) -> Result<Vec<SessionRecord>, StoreError> {
        let records = self.bounded(self.store.find_public(filter)).await?;
        debug!(count = records.len(), "public sessions listed");
        Ok(records)
    }

    /// Pass-through for joining a private session by id.
    ///
    /// Performs no existence check: an unknown id resolves to itself.
    pub fn resolve(&self, session_id: SessionId) -> SessionId {
        session_id
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "store call timed out");
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}
