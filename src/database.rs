use serde::{de::DeserializeOwned, Serialize};
use std::{path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{fs, sync::RwLock, time};
use tracing::error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Codec(String),
    #[error("Database error: {0}")]
    Custom(String),
}

/// Result of an in-memory mutation that was then written to disk.
///
/// The mutation is kept even when `error` is set.
#[derive(Debug)]
pub struct Persisted<R> {
    pub value: R,
    pub error: Option<DbError>,
}

#[derive(Debug)]
struct DatabaseInner<T> {
    data: T,
    path: String,
}

#[derive(Clone, Debug)]
pub struct Database<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> {
    inner: Arc<RwLock<DatabaseInner<T>>>,
}

impl<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> Database<T> {
    pub async fn new(path: impl Into<String>) -> Result<Self, DbError> {
        let path = path.into();

        if let Some(parent) = Path::new(&path).parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create database directory: {}", e);
                DbError::Io(e)
            })?;
        }

        let data = if Path::new(&path).exists() {
            match fs::read(&path).await {
                Ok(bytes) => match bincode::deserialize(&bytes) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to deserialize database {}: {}", path, e);
                        T::default()
                    }
                },
                Err(e) => {
                    error!("Failed to read database {}: {}", path, e);
                    T::default()
                }
            }
        } else {
            T::default()
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(DatabaseInner { data, path })),
        })
    }

    async fn save(path: &str, data: &T) -> Result<(), DbError> {
        let bytes = bincode::serialize(data).map_err(|e| DbError::Codec(e.to_string()))?;

        match time::timeout(Duration::from_secs(5), fs::write(path, bytes)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                error!("Database save operation timed out");
                Err(DbError::Custom("Save operation timed out".into()))
            }
        }
    }

    /// Mutates the data in memory, then rewrites the file.
    ///
    /// Writers are serialized by the write lock, which is held across the save.
    pub async fn apply<F, R>(&self, f: F) -> Persisted<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.inner.write().await;
        let value = f(&mut guard.data);

        let error = match Self::save(&guard.path, &guard.data).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to persist database {}: {}", guard.path, e);
                Some(e)
            }
        };

        Persisted { value, error }
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.read().await;
        f(&guard.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn apply_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/set.db");
        let path = path.to_str().unwrap().to_string();

        let db: Database<HashSet<u64>> = Database::new(path.clone()).await.unwrap();
        let result = db.apply(|set| set.insert(7)).await;
        assert!(result.value);
        assert!(result.error.is_none());

        let reloaded: Database<HashSet<u64>> = Database::new(path).await.unwrap();
        assert!(reloaded.read(|set| set.contains(&7)).await);
    }

    #[tokio::test]
    async fn failed_save_keeps_in_memory_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.db");
        let path = path.to_str().unwrap().to_string();

        let db: Database<HashSet<u64>> = Database::new(path.clone()).await.unwrap();
        // A directory where the file should be makes the write fail.
        std::fs::create_dir(&path).unwrap();

        let result = db.apply(|set| set.insert(42)).await;
        assert!(result.value);
        assert!(matches!(result.error, Some(DbError::Io(_))));
        assert!(db.read(|set| set.contains(&42)).await);
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.db");
        std::fs::write(&path, b"\x01\x02\x03").unwrap();

        let db: Database<HashSet<u64>> =
            Database::new(path.to_str().unwrap().to_string()).await.unwrap();
        assert!(db.read(|set| set.is_empty()).await);
    }
}
