//! SQLite-backed session storage

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{SessionStorage, StorageError, StorageKey};

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new().max_connections(4).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) { self.pool.close().await; }
}

#[async_trait]
impl SessionStorage for SqliteStorage {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM session_state WHERE key = ?1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO session_state (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP) ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP")
            .bind(key.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_state WHERE key = ?1").bind(key.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_many(&self, entries: &[(StorageKey, String)]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query("INSERT INTO session_state (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP) ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP")
                .bind(key.as_str())
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_url(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("session.db").display())
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStorage::connect(&db_url(&dir)).await.unwrap();
        store.set_many(&[(StorageKey::DeliveryAddress, "1 Le Loi".into()), (StorageKey::PhoneNumber, "0912345678".into())]).await.unwrap();
        store.set(StorageKey::PhoneNumber, "0987654321").await.unwrap();
        store.close().await;

        let reopened = SqliteStorage::connect(&db_url(&dir)).await.unwrap();
        assert_eq!(reopened.get(StorageKey::DeliveryAddress).await.unwrap().as_deref(), Some("1 Le Loi"));
        assert_eq!(reopened.get(StorageKey::PhoneNumber).await.unwrap().as_deref(), Some("0987654321"));
        reopened.remove(StorageKey::PhoneNumber).await.unwrap();
        assert_eq!(reopened.get(StorageKey::PhoneNumber).await.unwrap(), None);
    }
}
