//! # pms-storage
//!
//! Persistence abstraction for the project management server.
//!
//! This crate defines the contract the application layer reads and writes
//! through. It does not contain any implementations; those live in separate
//! crates such as `pms-db-memory`.
//!
//! ## Overview
//!
//! The main trait is [`ProjectStore`], which provides:
//! - lookups by id, optionally expanding a project's tasks
//! - filtered, sorted and paginated project listings
//! - applying a batch of staged changes, reporting how many were persisted
//!
//! Mutations are staged on a [`UnitOfWork`] and committed with
//! [`UnitOfWork::save`]. A save that reports zero persisted changes means the
//! mutation did not take effect.
//!
//! ## Example
//!
//! ```ignore
//! use pms_storage::{DynProjectStore, UnitOfWork};
//!
//! async fn rename(store: DynProjectStore, id: Uuid, name: &str) -> StorageResult<usize> {
//!     let mut project = store
//!         .get_project(id, false)
//!         .await?
//!         .ok_or_else(|| StorageError::not_found("Project", id))?;
//!     project.name = name.to_string();
//!
//!     let mut uow = UnitOfWork::new(store);
//!     uow.update_project(project);
//!     uow.save().await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::StorageError;
pub use traits::ProjectStore;
pub use types::{Change, Page, PageQuery, ProjectFilter, UnitOfWork};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynProjectStore = std::sync::Arc<dyn ProjectStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Change, DynProjectStore, Page, PageQuery, ProjectFilter, ProjectStore, StorageError,
        StorageResult, UnitOfWork,
    };
}
