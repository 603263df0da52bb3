use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AppError;

/// Device-local key/value persistence. Multi-key operations are applied as a
/// single unit: either every key is written/removed or none is.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, AppError>;

    async fn multi_set(&self, entries: Vec<(String, String)>) -> Result<(), AppError>;

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, AppError> {
        Ok(keys
            .iter()
            .map(|key| self.entries.get(*key).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn multi_set(&self, entries: Vec<(String, String)>) -> Result<(), AppError> {
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), AppError> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }
}

/// JSON object on disk. Every mutation rewrites the file through a temporary
/// sibling and a rename, so readers never observe a partial update.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, AppError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                AppError::Storage(format!("corrupt storage file {}: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(AppError::Storage(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|err| AppError::Storage(format!("failed to encode storage: {err}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|err| AppError::Storage(format!("failed to write {}: {err}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|err| {
            AppError::Storage(format!("failed to replace {}: {err}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), keys = entries.len(), "storage file written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, AppError> {
        let _guard = self.lock.lock().await;
        let all = self.read_all().await?;
        Ok(keys.iter().map(|key| all.get(*key).cloned()).collect())
    }

    async fn multi_set(&self, entries: Vec<(String, String)>) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.extend(entries);
        self.write_all(&all).await
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        for key in keys {
            all.remove(*key);
        }
        self.write_all(&all).await
    }
}
