//! Task queries and commands. Tasks are always addressed through their
//! project; a task reached through the wrong project is reported missing.

use async_trait::async_trait;
use pms_cache::{CacheDuration, CachePolicy, Cacheable, ENTITY_TTL, Handler, Invalidating, Request};
use pms_core::{CoreError, Project, ProjectTask, ProjectTaskStatus, ValidationErrors};
use pms_storage::UnitOfWork;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    AppServices, ProjectTaskDto, TITLE_MAX_LEN, check_description, check_required_text,
    ensure_saved, project_keys, project_list_tags, project_task_tag, task_key,
};

fn check_status_target(errors: &mut ValidationErrors, status: ProjectTaskStatus) {
    errors.check(
        !status.is_valid_transition_target(),
        "status",
        format!("'status' cannot be set to {status}."),
    );
}

fn ensure_open(project: &Project, message: &str) -> Result<(), CoreError> {
    if project.is_ended() {
        return Err(CoreError::conflict(message));
    }
    Ok(())
}

/// Keys a write on one task makes stale: the task itself and both
/// projections of its project, which embed the task list.
fn task_write_keys(project_id: Uuid, task_id: Uuid) -> Vec<String> {
    let mut keys = vec![task_key(project_id, task_id)];
    keys.extend(project_keys(project_id));
    keys
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GetProjectTaskById {
    pub project_id: Uuid,
    pub task_id: Uuid,
}

impl Cacheable for GetProjectTaskById {
    fn cache_key(&self) -> String {
        task_key(self.project_id, self.task_id)
    }

    fn cache_duration(&self) -> CacheDuration {
        ENTITY_TTL
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["projecttask".to_string(), project_task_tag(self.project_id)]
    }
}

impl Request for GetProjectTaskById {
    type Response = ProjectTaskDto;

    fn name(&self) -> &'static str {
        "GetProjectTaskById"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

#[async_trait]
impl Handler<GetProjectTaskById> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &GetProjectTaskById,
        _cancel: &CancellationToken,
    ) -> Result<ProjectTaskDto, CoreError> {
        tracing::info!(task_id = %request.task_id, "retrieving project task");
        match self.store.get_task(request.task_id).await? {
            Some(task) if task.project_id == request.project_id => Ok(ProjectTaskDto::from(&task)),
            _ => {
                tracing::warn!(
                    task_id = %request.task_id,
                    project_id = %request.project_id,
                    "task not found in project"
                );
                Err(CoreError::not_found("ProjectTask", request.task_id))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateProjectTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_user_id: Option<Uuid>,
    pub current_user: Uuid,
}

impl CreateProjectTask {
    fn validate(&self) -> Result<Uuid, CoreError> {
        let mut errors = ValidationErrors::new();
        check_required_text(&mut errors, "title", &self.title, TITLE_MAX_LEN);
        check_description(&mut errors, self.description.as_deref());
        let assignee = self.assigned_user_id.filter(|id| !id.is_nil());
        errors.check(
            assignee.is_none(),
            "assignedUserId",
            "'assignedUserId' must not be empty.",
        );
        errors.into_result()?;
        Ok(assignee.unwrap_or_default())
    }
}

impl Invalidating for CreateProjectTask {
    fn cache_keys(&self) -> Vec<String> {
        project_keys(self.project_id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for CreateProjectTask {
    type Response = ProjectTaskDto;

    fn name(&self) -> &'static str {
        "CreateProjectTask"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<CreateProjectTask> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &CreateProjectTask,
        _cancel: &CancellationToken,
    ) -> Result<ProjectTaskDto, CoreError> {
        let assignee = request.validate()?;
        tracing::info!(title = %request.title, project_id = %request.project_id, "creating project task");

        let project = self.load_project(request.project_id, false).await?;
        if !project.is_owned_by(request.current_user) {
            return Err(CoreError::forbidden("Only the project owner can create tasks."));
        }
        ensure_open(&project, "Cannot modify tasks on an ended project.")?;

        let task = ProjectTask {
            id: Uuid::new_v4(),
            title: request.title.clone(),
            description: request.description.clone(),
            project_id: request.project_id,
            assigned_user_id: assignee,
            status: ProjectTaskStatus::NotStarted,
            created_at: OffsetDateTime::now_utc(),
        };
        let dto = ProjectTaskDto::from(&task);

        let mut uow = UnitOfWork::new(self.store.clone());
        uow.add_task(task);
        ensure_saved(uow.save().await?, "create project task")?;
        tracing::info!(task_id = %dto.id, "project task created");
        Ok(dto)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateProjectTask {
    pub project_id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectTaskStatus,
    pub current_user: Uuid,
}

impl Invalidating for UpdateProjectTask {
    fn cache_keys(&self) -> Vec<String> {
        task_write_keys(self.project_id, self.task_id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for UpdateProjectTask {
    type Response = ProjectTaskDto;

    fn name(&self) -> &'static str {
        "UpdateProjectTask"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<UpdateProjectTask> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &UpdateProjectTask,
        _cancel: &CancellationToken,
    ) -> Result<ProjectTaskDto, CoreError> {
        let mut errors = ValidationErrors::new();
        check_required_text(&mut errors, "title", &request.title, TITLE_MAX_LEN);
        check_description(&mut errors, request.description.as_deref());
        check_status_target(&mut errors, request.status);
        errors.into_result()?;

        tracing::info!(task_id = %request.task_id, title = %request.title, "updating project task");
        let (mut task, project) = self.load_task(request.project_id, request.task_id).await?;
        if task.assigned_user_id != request.current_user && !project.is_owned_by(request.current_user) {
            return Err(CoreError::forbidden(
                "Only assigned user or project owner can update the task.",
            ));
        }
        ensure_open(&project, "Cannot update tasks in an ended project.")?;

        task.title = request.title.clone();
        task.description = request.description.clone();
        task.status = request.status;
        let dto = ProjectTaskDto::from(&task);

        let mut uow = UnitOfWork::new(self.store.clone());
        uow.update_task(task);
        ensure_saved(uow.save().await?, "update project task")?;
        tracing::info!(task_id = %request.task_id, "project task updated");
        Ok(dto)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateProjectTaskStatus {
    pub project_id: Uuid,
    pub task_id: Uuid,
    pub status: ProjectTaskStatus,
}

impl Invalidating for UpdateProjectTaskStatus {
    fn cache_keys(&self) -> Vec<String> {
        task_write_keys(self.project_id, self.task_id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for UpdateProjectTaskStatus {
    type Response = ();

    fn name(&self) -> &'static str {
        "UpdateProjectTaskStatus"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<UpdateProjectTaskStatus> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &UpdateProjectTaskStatus,
        _cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        let mut errors = ValidationErrors::new();
        check_status_target(&mut errors, request.status);
        errors.into_result()?;

        tracing::info!(task_id = %request.task_id, status = %request.status, "updating project task status");
        let (mut task, project) = self.load_task(request.project_id, request.task_id).await?;
        ensure_open(&project, "Cannot modify tasks on an ended project.")?;

        task.status = request.status;
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.update_task(task);
        ensure_saved(uow.save().await?, "update project task status")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AssignUserToProjectTask {
    pub project_id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
}

impl Invalidating for AssignUserToProjectTask {
    fn cache_keys(&self) -> Vec<String> {
        task_write_keys(self.project_id, self.task_id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for AssignUserToProjectTask {
    type Response = ();

    fn name(&self) -> &'static str {
        "AssignUserToProjectTask"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<AssignUserToProjectTask> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &AssignUserToProjectTask,
        _cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        let mut errors = ValidationErrors::new();
        errors.check(request.user_id.is_nil(), "userId", "'userId' must not be empty.");
        errors.into_result()?;

        tracing::info!(user = %request.user_id, task_id = %request.task_id, "assigning user to task");
        let (mut task, project) = self.load_task(request.project_id, request.task_id).await?;
        ensure_open(&project, "Cannot modify tasks on an ended project.")?;

        task.assigned_user_id = request.user_id;
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.update_task(task);
        ensure_saved(uow.save().await?, "assign user to project task")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeleteProjectTask {
    pub project_id: Uuid,
    pub task_id: Uuid,
    pub current_user: Uuid,
}

impl Invalidating for DeleteProjectTask {
    fn cache_keys(&self) -> Vec<String> {
        task_write_keys(self.project_id, self.task_id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for DeleteProjectTask {
    type Response = ();

    fn name(&self) -> &'static str {
        "DeleteProjectTask"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<DeleteProjectTask> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &DeleteProjectTask, _cancel: &CancellationToken) -> Result<(), CoreError> {
        tracing::info!(task_id = %request.task_id, "deleting project task");
        let (_, project) = self.load_task(request.project_id, request.task_id).await?;
        if !project.is_owned_by(request.current_user) {
            return Err(CoreError::forbidden("Only the project owner can delete the task."));
        }
        ensure_open(&project, "Cannot delete tasks from an ended project.")?;

        let mut uow = UnitOfWork::new(self.store.clone());
        uow.remove_task(request.task_id);
        ensure_saved(uow.save().await?, "delete project task")?;
        Ok(())
    }
}
