//! SQLite-backed cache stores and offline outbox.
//!
//! This module provides persistent storage using SQLite with async access
//! via tokio-rusqlite. It supports:
//!
//! - Named stores mapping request identity to a response snapshot
//! - Store-level eviction (a store is dropped as a unit, never per entry)
//! - A FIFO outbox of submissions waiting for connectivity
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod outbox;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use outbox::{NewOutboxEntry, OutboxEntry};
pub use stores::{CacheStore, CachedResponse};
