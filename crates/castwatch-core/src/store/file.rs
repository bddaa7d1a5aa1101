// # File Dedup Store
//
// File-based implementation of DedupStore with crash recovery.
//
// ## Purpose
//
// Persists the per-session notification status across daemon restarts so
// a restart never repeats an already-reported stage.
//
// ## Crash Recovery
//
// - Atomic writes: write-to-temp then rename
// - Corruption detection: JSON validation on load
// - Automatic backup: keeps a `.backup` of the last known good state
// - Recovery: falls back to the backup if corruption is detected
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "sessions": {
//     "1abcdef": {
//       "creator_id": "42",
//       "username": "host",
//       "title": "launch party",
//       "status": "schedule",
//       "scheduled_start": "2026-01-09T12:00:00Z",
//       "notified_at": "2026-01-08T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::status::NotificationStatus;
use crate::traits::dedup_store::{DedupRecord, DedupStore};

/// Store file format version, for future migration if the format changes
const STORE_FILE_VERSION: &str = "1";

/// File-based dedup store with crash recovery
///
/// State is held in memory behind an `RwLock` and written to disk on
/// every commit (write-to-temp + atomic rename, with a `.backup` of the
/// previous good file). A commit that would lower a stored status leaves
/// the entry untouched, keeping the monotonic invariant even if a caller
/// bypasses `should_notify`.
#[derive(Debug)]
pub struct FileDedupStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug)]
struct StoreState {
    sessions: HashMap<String, DedupRecord>,
    dirty: bool,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    sessions: HashMap<String, DedupRecord>,
}

impl FileDedupStore {
    /// Create or load a file dedup store
    ///
    /// Loads the existing state file if present, recovering from the
    /// backup when the main file is corrupted; starts empty when neither
    /// is usable. Parent directories are created as needed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store(format!(
                    "failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let sessions = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(StoreState {
                sessions,
                dirty: false,
            })),
        })
    }

    /// Load state, falling back to the backup on corruption.
    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, DedupRecord>, Error> {
        match Self::load(path).await {
            Ok(sessions) => {
                tracing::debug!(records = sessions.len(), "loaded dedup store");
                Ok(sessions)
            }
            Err(Error::Json(parse_err)) => {
                tracing::warn!(
                    error = %parse_err,
                    "dedup store file corrupted, attempting backup recovery"
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("no backup file found, starting with empty store");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(sessions) => {
                        tracing::info!(records = sessions.len(), "recovered dedup store from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(error = %restore_err, "failed to restore store file from backup");
                        }
                        Ok(sessions)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            error = %backup_err,
                            "backup also unusable, starting with empty store"
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, DedupRecord>, Error> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "dedup store file does not exist");
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::store(format!("failed to read {}: {}", path.display(), e)))?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                expected = STORE_FILE_VERSION,
                got = %file.version,
                "dedup store version mismatch, loading anyway"
            );
        }

        Ok(file.sessions)
    }

    /// Write the current state to disk atomically.
    async fn write_state(&self) -> Result<(), Error> {
        let json = {
            let state = self.state.read().await;
            let file = StoreFileFormat {
                version: STORE_FILE_VERSION.to_string(),
                sessions: state.sessions.clone(),
            };
            serde_json::to_string_pretty(&file)
                .map_err(|e| Error::store(format!("failed to serialize store: {}", e)))?
        };

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!("failed to create {}: {}", temp_path.display(), e))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!("failed to write {}: {}", temp_path.display(), e))
            })?;
            file.flush().await.map_err(|e| {
                Error::store(format!("failed to flush {}: {}", temp_path.display(), e))
            })?;
        }

        // Keep the previous good state around for corruption recovery.
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!(error = %e, "failed to create store backup");
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        {
            let mut state = self.state.write().await;
            state.dirty = false;
        }

        tracing::trace!(path = %self.path.display(), "dedup store written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn status(&self, id: &str) -> Result<NotificationStatus, Error> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(id)
            .map(|r| r.status)
            .unwrap_or_default())
    }

    async fn record(&self, id: &str) -> Result<Option<DedupRecord>, Error> {
        let state = self.state.read().await;
        Ok(state.sessions.get(id).cloned())
    }

    async fn commit(&self, id: &str, record: DedupRecord) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            match state.sessions.get(id) {
                // Monotonic guard: never lower a stored status.
                Some(existing) if existing.status >= record.status => return Ok(()),
                _ => {}
            }
            state.sessions.insert(id.to_string(), record);
            state.dirty = true;
        }

        // Immediate write for durability
        self.write_state().await
    }

    async fn list_ids(&self) -> Result<Vec<String>, Error> {
        let state = self.state.read().await;
        Ok(state.sessions.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let state = self.state.read().await;
        if state.dirty {
            drop(state);
            self.write_state().await
        } else {
            Ok(())
        }
    }
}
