//! In-memory storage backend for the project management server.
//!
//! This crate provides an implementation of the `ProjectStore` trait from
//! `pms-storage`, using papaya lock-free HashMaps for concurrent reads.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pms_db_memory::InMemoryProjectStore;
//! use pms_storage::DynProjectStore;
//!
//! let store: DynProjectStore = Arc::new(InMemoryProjectStore::new());
//! pms_db_memory::seed::seed_if_empty(&store).await?;
//! ```

pub mod seed;
pub mod storage;

pub use pms_storage::{ProjectStore, StorageError};
pub use storage::InMemoryProjectStore;
