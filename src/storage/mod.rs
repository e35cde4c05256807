//! Durable client-side session state.
//!
//! Holds the bearer token, the last saved shipping details and the
//! resume-checkout draft. Everything stored here outlives a reload of the
//! companion process when a file-backed store is used.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Token,
    DeliveryAddress,
    PhoneNumber,
    TempOrder,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::DeliveryAddress => "deliveryAddress",
            Self::PhoneNumber => "phoneNumber",
            Self::TempOrder => "tempOrder",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: StorageKey) -> Result<(), StorageError>;

    /// Writes several keys together. Stores that can should make this atomic.
    async fn set_many(&self, entries: &[(StorageKey, String)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(*key, value).await?;
        }
        Ok(())
    }
}

/// Process-local storage; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().await.get(&key).cloned())
    }

    async fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        self.values.write().await.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.values.write().await.remove(&key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(StorageKey, String)]) -> Result<(), StorageError> {
        let mut values = self.values.write().await;
        for (key, value) in entries {
            values.insert(*key, value.clone());
        }
        Ok(())
    }
}

/// The stored bearer token.
#[derive(Clone)]
pub struct Credentials {
    storage: Arc<dyn SessionStorage>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("Credentials").finish_non_exhaustive() }
}

impl Credentials {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self { Self { storage } }

    pub async fn token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.storage.get(StorageKey::Token).await?.filter(|t| !t.trim().is_empty()))
    }

    pub async fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(StorageKey::Token, token.trim()).await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(StorageKey::Token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let store = MemoryStorage::new();
        assert_eq!(store.get(StorageKey::TempOrder).await.unwrap(), None);
        store.set(StorageKey::TempOrder, "{}").await.unwrap();
        assert_eq!(store.get(StorageKey::TempOrder).await.unwrap().as_deref(), Some("{}"));
        store.remove(StorageKey::TempOrder).await.unwrap();
        assert_eq!(store.get(StorageKey::TempOrder).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_credentials_ignore_blank_token() {
        let credentials = Credentials::new(Arc::new(MemoryStorage::new()));
        credentials.set_token("   ").await.unwrap();
        assert_eq!(credentials.token().await.unwrap(), None);
        credentials.set_token("abc").await.unwrap();
        assert_eq!(credentials.token().await.unwrap().as_deref(), Some("abc"));
        credentials.clear().await.unwrap();
        assert_eq!(credentials.token().await.unwrap(), None);
    }
}
