//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Versioned cache stores and the offline outbox, backed by SQLite
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStore, CachedResponse, NewOutboxEntry, OutboxEntry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
