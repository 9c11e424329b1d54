//! Application operations dispatched through the cache pipeline.
//!
//! Queries implement [`Cacheable`](pms_cache::Cacheable) and commands
//! implement [`Invalidating`](pms_cache::Invalidating); every request type
//! has exactly one `Handler` impl on [`AppServices`].

pub mod dto;
pub mod projects;
pub mod tasks;
pub mod token;

use std::sync::Arc;

use pms_auth::TokenProvider;
use pms_cache::{entity_key, versioned_key};
use pms_core::{CoreError, Project, ProjectTask, ValidationErrors};
use pms_storage::DynProjectStore;
use uuid::Uuid;

pub use dto::{ProjectCurrencyDto, ProjectDto, ProjectTaskDto};
pub use projects::{
    CreateProject, DeleteProject, EndProject, GetProjectByIdV1, GetProjectByIdV2, GetProjectsV1,
    GetProjectsV2, UpdateProject, UpdateProjectBudget,
};
pub use tasks::{
    AssignUserToProjectTask, CreateProjectTask, DeleteProjectTask, GetProjectTaskById,
    UpdateProjectTask, UpdateProjectTaskStatus,
};
pub use token::{GenerateToken, RefreshToken};

pub const NAME_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
pub const TITLE_MAX_LEN: usize = 100;

/// Collaborators every handler reads and writes through.
#[derive(Clone)]
pub struct AppServices {
    pub store: DynProjectStore,
    pub tokens: Arc<TokenProvider>,
}

impl AppServices {
    pub fn new(store: DynProjectStore, tokens: Arc<TokenProvider>) -> Self {
        Self { store, tokens }
    }

    async fn load_project(&self, id: Uuid, include_tasks: bool) -> Result<Project, CoreError> {
        self.store
            .get_project(id, include_tasks)
            .await?
            .ok_or_else(|| CoreError::not_found("Project", id))
    }

    /// Loads a task addressed through its project, plus that project.
    async fn load_task(&self, project_id: Uuid, task_id: Uuid) -> Result<(ProjectTask, Project), CoreError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ProjectTask", task_id))?;
        if task.project_id != project_id {
            return Err(CoreError::business_rule(
                format!("Task {task_id} does not belong to project {project_id}"),
                404,
            ));
        }
        let project = self.load_project(project_id, false).await?;
        Ok((task, project))
    }
}

/// Cache keys a write on project `id` makes stale.
pub(crate) fn project_keys(id: Uuid) -> Vec<String> {
    vec![entity_key("project", id), versioned_key("project", "v2", id)]
}

/// Tags of every project listing.
pub(crate) fn project_list_tags() -> Vec<String> {
    vec!["projects:v1".to_string(), "projects:v2".to_string()]
}

pub(crate) fn task_key(project_id: Uuid, task_id: Uuid) -> String {
    format!("projecttask:{project_id}:{task_id}")
}

/// Tag shared by every cached task of one project.
pub(crate) fn project_task_tag(project_id: Uuid) -> String {
    format!("projecttask:{project_id}")
}

/// Zero persisted changes means the mutation did not take effect.
pub(crate) fn ensure_saved(count: usize, operation: &str) -> Result<(), CoreError> {
    if count == 0 {
        tracing::error!(operation, "no changes were saved");
        return Err(CoreError::nothing_saved(operation));
    }
    Ok(())
}

pub(crate) fn check_required_text(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, format!("'{field}' must not be empty."));
    } else if value.chars().count() > max {
        errors.add(field, format!("'{field}' must be {max} characters or fewer."));
    }
}

pub(crate) fn check_description(errors: &mut ValidationErrors, value: Option<&str>) {
    errors.check(
        value.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_LEN),
        "description",
        format!("'description' must be {DESCRIPTION_MAX_LEN} characters or fewer."),
    );
}
