// # Memory Dedup Store
//
// In-memory implementation of DedupStore.
//
// ## Purpose
//
// A fast store with no persistence, for tests and for deployments where
// a restart re-reporting the current stage of live sessions is
// acceptable.
//
// ## Crash Behavior
//
// All state is lost on restart; the first poll after a restart reports
// each session's current stage once more.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::status::NotificationStatus;
use crate::traits::dedup_store::{DedupRecord, DedupStore};

/// In-memory dedup store implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryDedupStore {
    inner: Arc<RwLock<HashMap<String, DedupRecord>>>,
}

impl MemoryDedupStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn status(&self, id: &str) -> Result<NotificationStatus, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(id).map(|r| r.status).unwrap_or_default())
    }

    async fn record(&self, id: &str) -> Result<Option<DedupRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn commit(&self, id: &str, record: DedupRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        match guard.get(id) {
            // Monotonic guard: never lower a stored status.
            Some(existing) if existing.status >= record.status => Ok(()),
            _ => {
                guard.insert(id.to_string(), record);
                Ok(())
            }
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for the memory store
        Ok(())
    }
}
