//! Storage traits.

use async_trait::async_trait;
use pms_core::{Project, ProjectTask};
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::{Change, Page, PageQuery};

/// The storage contract for projects and their tasks.
///
/// Implementations must be thread-safe (`Send + Sync`). Batches are applied
/// one at a time; a batch that fails validation applies nothing.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Reads a project by id.
    ///
    /// When `include_tasks` is set the returned project carries its tasks;
    /// otherwise `Project::tasks` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing projects.
    async fn get_project(
        &self,
        id: Uuid,
        include_tasks: bool,
    ) -> Result<Option<Project>, StorageError>;

    /// Reads a task by id, regardless of which project it belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn get_task(&self, id: Uuid) -> Result<Option<ProjectTask>, StorageError>;

    /// Returns one page of projects matching the query plus the total number
    /// of matches across all pages.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn get_page(&self, query: &PageQuery) -> Result<Page<Project>, StorageError>;

    /// Applies staged changes as one batch and returns how many entities were
    /// actually persisted. Updates that leave an entity unchanged do not count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if an update or removal targets a
    /// missing entity, `StorageError::AlreadyExists` on duplicate inserts.
    /// Nothing is applied when an error is returned.
    async fn apply(&self, changes: Vec<Change>) -> Result<usize, StorageError>;

    /// Number of stored projects.
    async fn project_count(&self) -> Result<usize, StorageError>;
}
