//! Credential storage and persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;

use super::cipher::EncryptedSecret;
use crate::providers::ProviderKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Storage of encrypted credentials, keyed by (owner, provider).
///
/// Only ciphertext ever reaches an implementation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(
        &self,
        owner: &str,
        provider: ProviderKind,
    ) -> Result<Option<EncryptedSecret>, StoreError>;

    /// Insert or overwrite.
    async fn put(
        &self,
        owner: &str,
        provider: ProviderKind,
        secret: EncryptedSecret,
    ) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    async fn remove(&self, owner: &str, provider: ProviderKind) -> Result<bool, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush to durable storage, if the implementation has any.
    async fn persist(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    owner: String,
    provider: ProviderKind,
    secret: EncryptedSecret,
}

/// DashMap-backed store with optional JSON file persistence.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<DashMap<(String, ProviderKind), EncryptedSecret>>,
    persistence_path: Option<PathBuf>,
    persist_lock: Arc<Mutex<()>>,
}

impl MemoryCredentialStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load from `path` if it exists; later saves go back to the same file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let entries: Vec<StoredCredential> = serde_json::from_reader(reader)?;
            for entry in entries {
                store.inner.insert((entry.owner, entry.provider), entry.secret);
            }
            tracing::info!(
                path = %path.display(),
                count = store.inner.len(),
                "Loaded credentials from file"
            );
        }
        Ok(store)
    }

    fn snapshot(&self) -> Vec<StoredCredential> {
        let mut entries: Vec<StoredCredential> = self
            .inner
            .iter()
            .map(|r| StoredCredential {
                owner: r.key().0.clone(),
                provider: r.key().1,
                secret: r.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.owner, a.provider.as_str()).cmp(&(&b.owner, b.provider.as_str()))
        });
        entries
    }

    /// Snapshot and write the whole store. Writers are serialized; the file
    /// is replaced atomically from a uniquely named temp file.
    pub async fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = self.persistence_path.clone() else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let entries = self.snapshot();
        let count = entries.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &entries))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        tracing::info!(path = %path.display(), count, "Saved credentials to file");
        Ok(())
    }
}

fn write_atomically(path: &Path, entries: &[StoredCredential]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, entries)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(
        &self,
        owner: &str,
        provider: ProviderKind,
    ) -> Result<Option<EncryptedSecret>, StoreError> {
        Ok(self
            .inner
            .get(&(owner.to_string(), provider))
            .map(|r| r.value().clone()))
    }

    async fn put(
        &self,
        owner: &str,
        provider: ProviderKind,
        secret: EncryptedSecret,
    ) -> Result<(), StoreError> {
        self.inner.insert((owner.to_string(), provider), secret);
        Ok(())
    }

    async fn remove(&self, owner: &str, provider: ProviderKind) -> Result<bool, StoreError> {
        Ok(self.inner.remove(&(owner.to_string(), provider)).is_some())
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        self.save_to_file().await
    }
}
