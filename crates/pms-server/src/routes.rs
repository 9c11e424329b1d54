//! HTTP routes. Handlers translate requests into operations and send them
//! through the mediator; they hold no business logic.

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router, middleware};
use bigdecimal::BigDecimal;
use pms_api::{ApiError, ApiResult};
use pms_core::{PagedResult, ProjectTaskStatus, SortColumn, SortDirection, paging::normalize_page, permission};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::middleware::{CurrentUser, authenticate};
use crate::operations::{
    AssignUserToProjectTask, CreateProject, CreateProjectTask, DeleteProject, DeleteProjectTask, EndProject,
    GenerateToken, GetProjectByIdV1, GetProjectByIdV2, GetProjectTaskById, GetProjectsV1, GetProjectsV2,
    ProjectCurrencyDto, ProjectDto, ProjectTaskDto, RefreshToken, UpdateProject, UpdateProjectBudget,
    UpdateProjectTask, UpdateProjectTaskStatus, projects::ListProjects,
};
use crate::server::AppState;

pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/v1/projects", get(list_projects_v1).post(create_project))
        .route("/api/v2/projects", get(list_projects_v2))
        .route(
            "/api/v1/projects/{id}",
            get(get_project_v1).put(update_project).delete(delete_project),
        )
        .route("/api/v2/projects/{id}", get(get_project_v2))
        .route("/api/v1/projects/{id}/budget", put(update_budget))
        .route("/api/v1/projects/{id}/completion", put(end_project))
        .route("/api/v1/projects/{id}/tasks", post(create_task))
        .route(
            "/api/v1/projects/{id}/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/v1/projects/{id}/tasks/{task_id}/status", put(update_task_status))
        .route("/api/v1/projects/{id}/tasks/{task_id}/assignment", put(assign_task))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/token/generate", post(generate_token))
        .route("/api/token/refresh-token", post(refresh_token))
        .merge(protected)
}

// ---------------------------------------------------------------------------
// Extraction helpers
// ---------------------------------------------------------------------------

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn path<T>(params: Result<Path<T>, PathRejection>) -> ApiResult<T> {
    params
        .map(|Path(value)| value)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(alias = "searchPhrase")]
    pub search: Option<String>,
    #[serde(alias = "pageNumber")]
    pub page: Option<u32>,
    #[serde(alias = "pageSize")]
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

impl ListParams {
    fn into_list(self) -> ApiResult<ListProjects> {
        let (page, size) = normalize_page(self.page.unwrap_or(0), self.size.unwrap_or(0));
        let sort_by = self
            .sort_by
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(SortColumn::from_str)
            .transpose()
            .map_err(ApiError::bad_request)?;
        let sort_direction = self
            .sort_direction
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(SortDirection::from_str)
            .transpose()
            .map_err(ApiError::bad_request)?
            .unwrap_or_default();
        Ok(ListProjects {
            search: self.search.filter(|s| !s.trim().is_empty()),
            page,
            size,
            sort_by,
            sort_direction,
        })
    }
}

fn list_params(params: Result<Query<ListParams>, QueryRejection>) -> ApiResult<ListProjects> {
    params
        .map_err(|e| ApiError::bad_request(e.body_text()))?
        .0
        .into_list()
}

async fn list_projects_v1(
    State(state): State<AppState>,
    user: CurrentUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<PagedResult<ProjectDto>>> {
    user.require(permission::project::READ)?;
    let list = list_params(params)?;
    Ok(Json(state.send(GetProjectsV1(list)).await?))
}

async fn list_projects_v2(
    State(state): State<AppState>,
    user: CurrentUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<PagedResult<ProjectCurrencyDto>>> {
    user.require(permission::project::READ)?;
    let list = list_params(params)?;
    Ok(Json(state.send(GetProjectsV2(list)).await?))
}

async fn get_project_v1(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ProjectDto>> {
    user.require(permission::project::READ)?;
    let id = path(id)?;
    Ok(Json(state.send(GetProjectByIdV1 { id }).await?))
}

async fn get_project_v2(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ProjectCurrencyDto>> {
    user.require(permission::project::READ)?;
    let id = path(id)?;
    Ok(Json(state.send(GetProjectByIdV2 { id }).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody {
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expected_start_date: OffsetDateTime,
    pub budget: BigDecimal,
    pub currency: Option<String>,
}

async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<CreateProjectBody>, JsonRejection>,
) -> ApiResult<Response> {
    user.require(permission::project::CREATE)?;
    let payload = body(payload)?;
    let id = state
        .send(CreateProject {
            name: payload.name,
            description: payload.description,
            expected_start_date: payload.expected_start_date,
            budget: payload.budget,
            currency: payload.currency,
            owner_id: user.id()?,
        })
        .await?;

    let project = state.send(GetProjectByIdV1 { id }).await?;
    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/projects/{id}")) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(project)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectBody {
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expected_start_date: OffsetDateTime,
}

async fn update_project(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateProjectBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::project::UPDATE)?;
    let id = path(id)?;
    let payload = body(payload)?;
    state
        .send(UpdateProject {
            id,
            name: payload.name,
            description: payload.description,
            expected_start_date: payload.expected_start_date,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_project(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::project::DELETE)?;
    let id = path(id)?;
    state.send(DeleteProject { id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UpdateBudgetBody {
    pub budget: BigDecimal,
}

async fn update_budget(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateBudgetBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::project::MANAGE_BUDGET)?;
    let id = path(id)?;
    let payload = body(payload)?;
    state
        .send(UpdateProjectBudget {
            id,
            budget: payload.budget,
            current_user: user.id()?,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn end_project(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::project::UPDATE)?;
    let id = path(id)?;
    state
        .send(EndProject {
            id,
            current_user: user.id()?,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskBody {
    pub title: String,
    pub description: Option<String>,
    pub assigned_user_id: Option<Uuid>,
}

async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CreateTaskBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProjectTaskDto>)> {
    user.require(permission::task::CREATE)?;
    let project_id = path(id)?;
    let payload = body(payload)?;
    let task = state
        .send(CreateProjectTask {
            project_id,
            title: payload.title,
            description: payload.description,
            assigned_user_id: payload.assigned_user_id,
            current_user: user.id()?,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> ApiResult<Json<ProjectTaskDto>> {
    user.require(permission::task::READ)?;
    let (project_id, task_id) = path(ids)?;
    Ok(Json(state.send(GetProjectTaskById { project_id, task_id }).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskBody {
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectTaskStatus,
}

async fn update_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<UpdateTaskBody>, JsonRejection>,
) -> ApiResult<Json<ProjectTaskDto>> {
    user.require(permission::task::UPDATE)?;
    let (project_id, task_id) = path(ids)?;
    let payload = body(payload)?;
    let task = state
        .send(UpdateProjectTask {
            project_id,
            task_id,
            title: payload.title,
            description: payload.description,
            status: payload.status,
            current_user: user.id()?,
        })
        .await?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusBody {
    pub status: ProjectTaskStatus,
}

async fn update_task_status(
    State(state): State<AppState>,
    user: CurrentUser,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<UpdateTaskStatusBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::task::UPDATE_STATUS)?;
    let (project_id, task_id) = path(ids)?;
    let payload = body(payload)?;
    state
        .send(UpdateProjectTaskStatus {
            project_id,
            task_id,
            status: payload.status,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignUserBody {
    pub user_id: Uuid,
}

async fn assign_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<AssignUserBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::task::ASSIGN_USER)?;
    let (project_id, task_id) = path(ids)?;
    let payload = body(payload)?;
    state
        .send(AssignUserToProjectTask {
            project_id,
            task_id,
            user_id: payload.user_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> ApiResult<StatusCode> {
    user.require(permission::task::DELETE)?;
    let (project_id, task_id) = path(ids)?;
    state
        .send(DeleteProjectTask {
            project_id,
            task_id,
            current_user: user.id()?,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenBody {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

async fn generate_token(
    State(state): State<AppState>,
    payload: Result<Json<GenerateTokenBody>, JsonRejection>,
) -> ApiResult<Response> {
    let payload = body(payload)?;
    let token = state
        .send(GenerateToken {
            id: payload.id,
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            permissions: payload.permissions,
            roles: payload.roles,
        })
        .await?;
    Ok(Json(token).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenBody {
    pub refresh_token: String,
}

async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenBody>, JsonRejection>,
) -> ApiResult<Response> {
    let payload = body(payload)?;
    let token = state
        .send(RefreshToken {
            refresh_token: payload.refresh_token,
        })
        .await?;
    Ok(Json(token).into_response())
}

// ---------------------------------------------------------------------------
// Operational endpoints
// ---------------------------------------------------------------------------

async fn healthz(State(state): State<AppState>) -> Response {
    let l2_available = state.cache.is_l2_available().await;
    Json(json!({
        "status": "ok",
        "cache": {
            "mode": state.cache.mode(),
            "enabled": state.cache.is_enabled(),
            "l2Available": l2_available,
        }
    }))
    .into_response()
}

async fn metrics() -> Response {
    match crate::metrics::render_metrics() {
        Some(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        None => ApiError::service_unavailable("Metrics are not initialized").into_response(),
    }
}

async fn cache_stats(State(state): State<AppState>) -> Response {
    Json(json!({
        "mode": state.cache.mode(),
        "l1Entries": state.cache.l1().len(),
        "stats": state.cache.stats().snapshot(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_are_normalized() {
        let list = ListParams::default().into_list().unwrap();
        assert_eq!((list.page, list.size), (1, 10));
        assert_eq!(list.sort_by, None);
        assert_eq!(list.sort_direction, SortDirection::Ascending);
    }

    #[test]
    fn list_params_parse_sorting() {
        let params = ListParams {
            search: Some("  ".into()),
            page: Some(2),
            size: Some(25),
            sort_by: Some("budget".into()),
            sort_direction: Some("desc".into()),
        };
        let list = params.into_list().unwrap();
        assert_eq!(list.search, None);
        assert_eq!((list.page, list.size), (2, 25));
        assert_eq!(list.sort_by, Some(SortColumn::Budget));
        assert_eq!(list.sort_direction, SortDirection::Descending);
    }

    #[test]
    fn unknown_sort_column_is_a_bad_request() {
        let params = ListParams {
            sort_by: Some("Colour".into()),
            ..Default::default()
        };
        let err = params.into_list().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
