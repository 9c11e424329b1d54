//! Project queries and commands.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use pms_cache::{
    CacheDuration, CachePolicy, Cacheable, ENTITY_TTL, Handler, Invalidating, LIST_TTL, ListKey,
    Request, entity_key, versioned_key,
};
use pms_core::{CoreError, PagedResult, Project, SortColumn, SortDirection, ValidationErrors};
use pms_storage::{PageQuery, ProjectFilter, UnitOfWork};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    AppServices, NAME_MAX_LEN, ProjectCurrencyDto, ProjectDto, check_description,
    check_required_text, ensure_saved, project_keys, project_list_tags, project_task_tag,
};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GetProjectByIdV1 {
    pub id: Uuid,
}

impl Cacheable for GetProjectByIdV1 {
    fn cache_key(&self) -> String {
        entity_key("project", self.id)
    }

    fn cache_duration(&self) -> CacheDuration {
        ENTITY_TTL
    }
}

impl Request for GetProjectByIdV1 {
    type Response = ProjectDto;

    fn name(&self) -> &'static str {
        "GetProjectByIdV1"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

#[async_trait]
impl Handler<GetProjectByIdV1> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &GetProjectByIdV1, _cancel: &CancellationToken) -> Result<ProjectDto, CoreError> {
        tracing::info!(project_id = %request.id, "retrieving project");
        let project = self.load_project(request.id, true).await?;
        Ok(ProjectDto::from(&project))
    }
}

#[derive(Debug, Clone)]
pub struct GetProjectByIdV2 {
    pub id: Uuid,
}

impl Cacheable for GetProjectByIdV2 {
    fn cache_key(&self) -> String {
        versioned_key("project", "v2", self.id)
    }

    fn cache_duration(&self) -> CacheDuration {
        ENTITY_TTL
    }
}

impl Request for GetProjectByIdV2 {
    type Response = ProjectCurrencyDto;

    fn name(&self) -> &'static str {
        "GetProjectByIdV2"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

#[async_trait]
impl Handler<GetProjectByIdV2> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &GetProjectByIdV2,
        _cancel: &CancellationToken,
    ) -> Result<ProjectCurrencyDto, CoreError> {
        tracing::info!(project_id = %request.id, "retrieving project with currency");
        let project = self.load_project(request.id, true).await?;
        Ok(ProjectCurrencyDto::from(&project))
    }
}

/// Listing parameters shared by both list versions. Page number and size are
/// expected already normalized, so equivalent requests share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListProjects {
    pub search: Option<String>,
    pub page: u32,
    pub size: u32,
    pub sort_by: Option<SortColumn>,
    pub sort_direction: SortDirection,
}

impl ListProjects {
    fn cache_key(&self, version: &str) -> String {
        let mut key = ListKey::new("projects", version)
            .search(self.search.as_deref())
            .page(self.page, self.size);
        if let Some(column) = self.sort_by {
            key = key.sort(column, self.sort_direction);
        }
        key.build()
    }

    fn page_query(&self, include_currency: bool) -> PageQuery {
        PageQuery {
            filter: ProjectFilter {
                search: self.search.clone(),
                include_currency,
            },
            page_size: self.size,
            page_number: self.page,
            sort_column: self.sort_by.unwrap_or_default(),
            sort_direction: self.sort_direction,
        }
    }

    async fn fetch(&self, services: &AppServices, include_currency: bool) -> Result<PagedResult<Project>, CoreError> {
        let page = services.store.get_page(&self.page_query(include_currency)).await?;
        Ok(PagedResult::new(page.items, page.total_count, self.size, self.page))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetProjectsV1(pub ListProjects);

impl Cacheable for GetProjectsV1 {
    fn cache_key(&self) -> String {
        self.0.cache_key("v1")
    }

    fn cache_duration(&self) -> CacheDuration {
        LIST_TTL
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["projects:v1".to_string()]
    }
}

impl Request for GetProjectsV1 {
    type Response = PagedResult<ProjectDto>;

    fn name(&self) -> &'static str {
        "GetProjectsV1"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

#[async_trait]
impl Handler<GetProjectsV1> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &GetProjectsV1,
        _cancel: &CancellationToken,
    ) -> Result<PagedResult<ProjectDto>, CoreError> {
        if request.0.sort_by == Some(SortColumn::Currency) {
            let mut errors = ValidationErrors::new();
            errors.add("sortBy", "Sorting by Currency requires API version 2.");
            return Err(errors.into());
        }
        tracing::info!(search = ?request.0.search, page = request.0.page, "listing projects");
        let page = request.0.fetch(self, false).await?;
        Ok(page.map(|project| ProjectDto::from(&project)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetProjectsV2(pub ListProjects);

impl Cacheable for GetProjectsV2 {
    fn cache_key(&self) -> String {
        self.0.cache_key("v2")
    }

    fn cache_duration(&self) -> CacheDuration {
        LIST_TTL
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["projects:v2".to_string()]
    }
}

impl Request for GetProjectsV2 {
    type Response = PagedResult<ProjectCurrencyDto>;

    fn name(&self) -> &'static str {
        "GetProjectsV2"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

#[async_trait]
impl Handler<GetProjectsV2> for AppServices {
    type Error = CoreError;

    async fn handle(
        &self,
        request: &GetProjectsV2,
        _cancel: &CancellationToken,
    ) -> Result<PagedResult<ProjectCurrencyDto>, CoreError> {
        tracing::info!(search = ?request.0.search, page = request.0.page, "listing projects with currency");
        let page = request.0.fetch(self, true).await?;
        Ok(page.map(|project| ProjectCurrencyDto::from(&project)))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn check_budget(errors: &mut ValidationErrors, budget: &BigDecimal) {
    errors.check(
        *budget <= BigDecimal::zero(),
        "budget",
        "'budget' must be greater than '0'.",
    );
}

/// Creates a project owned by the calling user.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub expected_start_date: OffsetDateTime,
    pub budget: BigDecimal,
    pub currency: Option<String>,
    pub owner_id: Uuid,
}

impl CreateProject {
    fn validate(&self) -> Result<(), CoreError> {
        let mut errors = ValidationErrors::new();
        check_required_text(&mut errors, "name", &self.name, NAME_MAX_LEN);
        check_description(&mut errors, self.description.as_deref());
        check_budget(&mut errors, &self.budget);
        errors.into_result()
    }
}

// A new project has no cached entity entries yet, only listings.
impl Invalidating for CreateProject {
    fn cache_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for CreateProject {
    type Response = Uuid;

    fn name(&self) -> &'static str {
        "CreateProject"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<CreateProject> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &CreateProject, _cancel: &CancellationToken) -> Result<Uuid, CoreError> {
        request.validate()?;
        tracing::info!(name = %request.name, "creating project");

        let project = Project {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            description: request.description.clone(),
            owner_id: request.owner_id,
            created_at: OffsetDateTime::now_utc(),
            expected_start_date: request.expected_start_date,
            actual_end_date: None,
            budget: request.budget.clone(),
            currency: request.currency.clone(),
            tasks: Vec::new(),
        };
        let id = project.id;

        let mut uow = UnitOfWork::new(self.store.clone());
        uow.add_project(project);
        ensure_saved(uow.save().await?, "create project")?;

        tracing::info!(project_id = %id, "project created");
        Ok(id)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateProject {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub expected_start_date: OffsetDateTime,
}

impl Invalidating for UpdateProject {
    fn cache_keys(&self) -> Vec<String> {
        project_keys(self.id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for UpdateProject {
    type Response = ();

    fn name(&self) -> &'static str {
        "UpdateProject"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<UpdateProject> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &UpdateProject, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let mut errors = ValidationErrors::new();
        check_required_text(&mut errors, "name", &request.name, NAME_MAX_LEN);
        check_description(&mut errors, request.description.as_deref());
        errors.into_result()?;

        tracing::info!(project_id = %request.id, "updating project");
        let mut project = self.load_project(request.id, false).await?;
        project.name = request.name.clone();
        project.description = request.description.clone();
        project.expected_start_date = request.expected_start_date;

        let mut uow = UnitOfWork::new(self.store.clone());
        uow.update_project(project);
        ensure_saved(uow.save().await?, "update project")?;
        tracing::info!(project_id = %request.id, "project updated");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeleteProject {
    pub id: Uuid,
}

impl Invalidating for DeleteProject {
    fn cache_keys(&self) -> Vec<String> {
        project_keys(self.id)
    }

    /// Deleting a project removes its tasks too.
    fn cache_tags(&self) -> Vec<String> {
        let mut tags = project_list_tags();
        tags.push(project_task_tag(self.id));
        tags
    }
}

impl Request for DeleteProject {
    type Response = ();

    fn name(&self) -> &'static str {
        "DeleteProject"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<DeleteProject> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &DeleteProject, _cancel: &CancellationToken) -> Result<(), CoreError> {
        tracing::info!(project_id = %request.id, "deleting project");
        self.load_project(request.id, false).await?;

        let mut uow = UnitOfWork::new(self.store.clone());
        uow.remove_project(request.id);
        ensure_saved(uow.save().await?, "delete project")?;
        tracing::info!(project_id = %request.id, "project deleted");
        Ok(())
    }
}

/// Marks a project as ended. Only the owner may do so, and only once every
/// task is completed or cancelled.
#[derive(Debug, Clone)]
pub struct EndProject {
    pub id: Uuid,
    pub current_user: Uuid,
}

impl Invalidating for EndProject {
    fn cache_keys(&self) -> Vec<String> {
        project_keys(self.id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for EndProject {
    type Response = ();

    fn name(&self) -> &'static str {
        "EndProject"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<EndProject> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &EndProject, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let mut project = self.load_project(request.id, true).await?;
        if !project.is_owned_by(request.current_user) {
            tracing::warn!(project_id = %request.id, user = %request.current_user, "non-owner tried to end project");
            return Err(CoreError::forbidden("Only the project owner can end the project."));
        }
        if project.is_ended() {
            return Err(CoreError::conflict("Project is already ended."));
        }
        if !project.has_no_active_tasks() {
            return Err(CoreError::conflict("Cannot end project with active tasks."));
        }

        project.actual_end_date = Some(OffsetDateTime::now_utc());
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.update_project(project);
        ensure_saved(uow.save().await?, "end project")?;
        tracing::info!(project_id = %request.id, "project ended");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateProjectBudget {
    pub id: Uuid,
    pub budget: BigDecimal,
    pub current_user: Uuid,
}

impl Invalidating for UpdateProjectBudget {
    fn cache_keys(&self) -> Vec<String> {
        project_keys(self.id)
    }

    fn cache_tags(&self) -> Vec<String> {
        project_list_tags()
    }
}

impl Request for UpdateProjectBudget {
    type Response = ();

    fn name(&self) -> &'static str {
        "UpdateProjectBudget"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

#[async_trait]
impl Handler<UpdateProjectBudget> for AppServices {
    type Error = CoreError;

    async fn handle(&self, request: &UpdateProjectBudget, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let mut errors = ValidationErrors::new();
        check_budget(&mut errors, &request.budget);
        errors.into_result()?;

        tracing::info!(project_id = %request.id, budget = %request.budget, "updating project budget");
        let mut project = self.load_project(request.id, false).await?;
        if !project.is_owned_by(request.current_user) {
            return Err(CoreError::forbidden("Only the project owner can manage the budget."));
        }

        project.budget = request.budget.clone();
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.update_project(project);
        ensure_saved(uow.save().await?, "update project budget")?;
        Ok(())
    }
}
