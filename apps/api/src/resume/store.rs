//! Local persistence of the single `{resumeData, settings}` blob.
//!
//! The blob lives in `<DATA_DIR>/resumeBuilderData.json`, is read once at startup and
//! rewritten atomically (temp file in the same directory, then rename) on every save.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::resume::StoredResume;

/// Well-known key the editor stores its state under.
pub const STORAGE_KEY: &str = "resumeBuilderData";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("stored résumé at {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write résumé: {0}")]
    Write(String),
}

pub struct ResumeStore {
    path: PathBuf,
    current: RwLock<Option<StoredResume>>,
}

impl ResumeStore {
    /// Opens the store under `data_dir`, creating the directory if needed.
    /// A missing file means nothing was saved yet; an unreadable one is an error.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Read {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(format!("{STORAGE_KEY}.json"));

        let current = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let stored: StoredResume = serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
                info!("Loaded stored résumé from {}", path.display());
                Some(stored)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored résumé at {}", path.display());
                None
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Option<StoredResume> {
        self.current.read().await.clone()
    }

    /// Persists `resume` and makes it the current value. The write lock is held
    /// across the disk write so saves land in call order.
    pub async fn save(&self, resume: StoredResume) -> Result<(), StoreError> {
        let mut current = self.current.write().await;

        let bytes = serde_json::to_vec_pretty(&resume).map_err(|e| StoreError::Write(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StoreError::Write(format!("write task failed: {e}")))??;

        *current = Some(resume);
        debug!("Saved résumé to {}", self.path.display());
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Write(format!("{} has no parent directory", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::Write(e.to_string()))?;
    tmp.write_all(bytes).map_err(|e| StoreError::Write(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::Write(e.to_string()))?;
    tmp.persist(path).map_err(|e| StoreError::Write(e.error.to_string()))?;
    Ok(())
}
