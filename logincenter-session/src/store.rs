use crate::KeyValueStore;
use async_trait::async_trait;
use logincenter_core::AuthError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Volatile store, useful for tests and for hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), AuthError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Store keeping one file per key inside a directory.
#[cfg(feature = "store-file")]
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: std::path::PathBuf,
}

#[cfg(feature = "store-file")]
impl FileStore {
    /// Use `dir` for storage. The directory is created on first write.
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> Result<std::path::PathBuf, AuthError> {
        if key.is_empty() || key.contains(|c: char| c == '/' || c == '\\') || key.starts_with('.') {
            return Err(AuthError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }
}

#[cfg(feature = "store-file")]
#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("read {key} failed: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), AuthError> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AuthError::Storage(format!("create {} failed: {e}", self.dir.display())))?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| AuthError::Storage(format!("write {key} failed: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AuthError::Storage(format!("rename {key} failed: {e}")))
    }

    async fn remove(&self, key: &str) -> Result<(), AuthError> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(format!("remove {key} failed: {e}"))),
        }
    }
}
