//! Persisted key-value flags.
//!
//! The host coordinator keeps its loop guards here. `MemoryFlagStore` has
//! session scope (gone with the process); `CacheDb` has local scope.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::format_timestamp;
use crate::Error;

/// Injected key-value capability.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn remove(&self, key: &str) -> Result<(), Error>;

    /// True when the flag holds the string `"true"`.
    async fn is_set(&self, key: &str) -> Result<bool, Error> {
        Ok(self.get(key).await?.as_deref() == Some("true"))
    }
}

/// Session-scoped flag store.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::InvalidInput("flag store poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::InvalidInput("flag store poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::InvalidInput("flag store poisoned".into()))?;
        values.remove(key);
        Ok(())
    }
}

#[async_trait]
impl FlagStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                match conn.query_row("SELECT value FROM flags WHERE key = ?1", params![key], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = format_timestamp(chrono::Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO flags (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM flags WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn FlagStore) {
        assert_eq!(store.get("sessionInitialized").await.unwrap(), None);
        assert!(!store.is_set("sessionInitialized").await.unwrap());

        store.set("sessionInitialized", "true").await.unwrap();
        assert!(store.is_set("sessionInitialized").await.unwrap());

        store.set("swRetryCount", "1").await.unwrap();
        store.set("swRetryCount", "2").await.unwrap();
        assert_eq!(store.get("swRetryCount").await.unwrap().as_deref(), Some("2"));

        store.remove("swRetryCount").await.unwrap();
        assert_eq!(store.get("swRetryCount").await.unwrap(), None);
        store.remove("never-set").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_flag_store() {
        exercise(&MemoryFlagStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_flag_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        exercise(&db).await;
    }

    #[tokio::test]
    async fn test_flags_survive_cache_purge() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set("updateDeclined", "v2").await.unwrap();
        db.purge_all().await.unwrap();
        assert_eq!(FlagStore::get(&db, "updateDeclined").await.unwrap().as_deref(), Some("v2"));
    }
}
