//! Persisted rows of the retry queue.
//!
//! Only storage lives here; replay policy belongs to the client crate.

use super::connection::CacheDb;
use super::{format_timestamp, parse_timestamp};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A mutation about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMutation {
    pub queue: String,
    /// Mutations sharing a resource key are replayed strictly in order.
    pub resource_key: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// A persisted mutation awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: i64,
    pub queue: String,
    pub resource_key: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
}

impl QueuedMutation {
    /// Wall-clock age relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.enqueued_at
    }
}

type MutationRow = (i64, String, String, String, String, String, Option<Vec<u8>>, String, u32);

impl CacheDb {
    /// Persist a mutation stamped with the current time. Returns its id.
    pub async fn enqueue_mutation(&self, mutation: &NewMutation) -> Result<i64, Error> {
        self.enqueue_mutation_at(mutation, Utc::now()).await
    }

    /// Persist a mutation with an explicit enqueue time.
    pub async fn enqueue_mutation_at(&self, mutation: &NewMutation, at: DateTime<Utc>) -> Result<i64, Error> {
        let headers_json = serde_json::to_string(&mutation.headers)?;
        let mutation = mutation.clone();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO queued_mutations (queue, resource_key, method, url, headers_json, body, enqueued_at, attempt_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                    params![
                        mutation.queue,
                        mutation.resource_key,
                        mutation.method,
                        mutation.url,
                        headers_json,
                        mutation.body,
                        format_timestamp(at),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Pending mutations of one queue, oldest first.
    pub async fn queued_mutations(&self, queue: &str) -> Result<Vec<QueuedMutation>, Error> {
        let queue = queue.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<MutationRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, queue, resource_key, method, url, headers_json, body, enqueued_at, attempt_count
                     FROM queued_mutations WHERE queue = ?1 ORDER BY enqueued_at, id",
                )?;
                let rows = stmt
                    .query_map(params![queue], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                        ))
                    })?
                    .collect::<Result<Vec<MutationRow>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(id, queue, resource_key, method, url, headers_json, body, enqueued_at, attempt_count)| {
                Ok(QueuedMutation {
                    id,
                    queue,
                    resource_key,
                    method,
                    url,
                    headers: serde_json::from_str(&headers_json)?,
                    body,
                    enqueued_at: parse_timestamp(&enqueued_at)?,
                    attempt_count,
                })
            })
            .collect()
    }

    /// Names of queues with at least one pending mutation, sorted.
    pub async fn queue_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT queue FROM queued_mutations ORDER BY queue")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a mutation. Returns false if it was already gone.
    pub async fn remove_mutation(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute("DELETE FROM queued_mutations WHERE id = ?1", params![id])?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Increment the attempt counter. Returns the new count.
    pub async fn record_attempt(&self, id: i64) -> Result<u32, Error> {
        self.conn
            .call(move |conn| -> Result<u32, Error> {
                conn.execute(
                    "UPDATE queued_mutations SET attempt_count = attempt_count + 1 WHERE id = ?1",
                    params![id],
                )?;
                let count = conn.query_row(
                    "SELECT attempt_count FROM queued_mutations WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of pending mutations in one queue.
    pub async fn queue_len(&self, queue: &str) -> Result<u64, Error> {
        let queue = queue.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM queued_mutations WHERE queue = ?1", params![queue], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
