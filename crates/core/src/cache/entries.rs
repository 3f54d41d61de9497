//! Namespaced response entries.
//!
//! A namespace is a named partition of the store (one per resource class).
//! Namespaces are created lazily on first write and keys are unique within one.

use super::connection::CacheDb;
use super::{format_timestamp, parse_timestamp};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub namespace: String,
    pub request_key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        namespace: impl Into<String>, request_key: impl Into<String>, method: impl Into<String>,
        url: impl Into<String>, status: u16, headers: Vec<(String, String)>, body: Vec<u8>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            request_key: request_key.into(),
            method: method.into(),
            url: url.into(),
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }
}

type EntryRow = (String, String, String, u16, String, Vec<u8>, String);

/// Handle to one namespace. Cheap to clone.
#[derive(Clone, Debug)]
pub struct NamespaceHandle {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open a namespace handle. Nothing is written until the first `put`.
    pub fn open_namespace(&self, name: &str) -> NamespaceHandle {
        NamespaceHandle { db: self.clone(), name: name.to_string() }
    }

    /// Names of every namespace that has been written to, sorted.
    pub async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_namespaces ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a namespace and all of its entries.
    ///
    /// Returns false if the namespace did not exist.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM cache_entries WHERE namespace = ?1", params![name])?;
                let removed = tx.execute("DELETE FROM cache_namespaces WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every namespace and entry.
    ///
    /// The retry queue and flags live in separate tables and are untouched.
    /// Returns the number of entries removed.
    pub async fn purge_all(&self) -> Result<u64, Error> {
        let removed = self
            .conn
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let entries = tx.execute("DELETE FROM cache_entries", [])?;
                tx.execute("DELETE FROM cache_namespaces", [])?;
                tx.commit()?;
                Ok(entries as u64)
            })
            .await
            .map_err(Error::from)?;
        tracing::info!(removed, "purged all cache namespaces");
        Ok(removed)
    }
}

impl NamespaceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an entry by request key.
    pub async fn get(&self, request_key: &str) -> Result<Option<CacheEntry>, Error> {
        let namespace = self.name.clone();
        let request_key = request_key.to_string();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let result = conn.query_row(
                    "SELECT request_key, method, url, status, headers_json, body, stored_at
                     FROM cache_entries WHERE namespace = ?1 AND request_key = ?2",
                    params![namespace, request_key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((request_key, method, url, status, headers_json, body, stored_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            namespace: self.name.clone(),
            request_key,
            method,
            url,
            status,
            headers: serde_json::from_str(&headers_json)?,
            body,
            stored_at: parse_timestamp(&stored_at)?,
        }))
    }

    /// Insert or replace an entry, creating the namespace on first write.
    ///
    /// The entry is stored under this handle's namespace regardless of
    /// `entry.namespace`.
    pub async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
        let namespace = self.name.clone();
        let headers_json = serde_json::to_string(&entry.headers)?;
        let entry = entry.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?1, ?2)",
                    params![namespace, format_timestamp(Utc::now())],
                )?;
                tx.execute(
                    "INSERT INTO cache_entries (namespace, request_key, method, url, status, headers_json, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(namespace, request_key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        namespace,
                        entry.request_key,
                        entry.method,
                        entry.url,
                        entry.status,
                        headers_json,
                        entry.body,
                        format_timestamp(entry.stored_at),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it was absent.
    pub async fn delete(&self, request_key: &str) -> Result<bool, Error> {
        let namespace = self.name.clone();
        let request_key = request_key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute(
                    "DELETE FROM cache_entries WHERE namespace = ?1 AND request_key = ?2",
                    params![namespace, request_key],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Request keys in this namespace, oldest first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let namespace = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT request_key FROM cache_entries WHERE namespace = ?1 ORDER BY stored_at, request_key",
                )?;
                let keys = stmt
                    .query_map(params![namespace], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every entry but keep the namespace. Returns the number removed.
    pub async fn clear(&self) -> Result<u64, Error> {
        let namespace = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = conn.execute("DELETE FROM cache_entries WHERE namespace = ?1", params![namespace])?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }
}
