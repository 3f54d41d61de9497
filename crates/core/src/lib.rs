//! Core types and shared functionality for offgrid.
//!
//! This crate provides:
//! - The durable store (response namespaces, retry queue rows, flags) on SQLite
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, FlagStore, MemoryFlagStore, NamespaceHandle, NewMutation, QueuedMutation};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
