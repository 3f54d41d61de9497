//! SQLite-backed durable store.
//!
//! Stands in for the browser's Cache Storage and web storage:
//!
//! - Namespaced response entries keyed by a deterministic request key
//! - The persisted retry queue of failed mutations
//! - Persistent key-value flags
//!
//! Access is async via tokio-rusqlite with WAL mode and automatic migrations.

pub mod connection;
pub mod entries;
pub mod flags;
pub mod hash;
pub mod migrations;
pub mod queue;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, NamespaceHandle};
pub use flags::{FlagStore, MemoryFlagStore};
pub use hash::compute_request_key;
pub use queue::{NewMutation, QueuedMutation};

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("bad timestamp {raw:?}: {e}")))
}
