//! Operations dispatched through the full pipeline against the in-memory
//! store and an L1-only cache.

use std::str::FromStr;

use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use pms_api::ApiError;
use pms_core::ProjectTaskStatus;
use pms_server::operations::{
    AssignUserToProjectTask, CreateProject, CreateProjectTask, DeleteProject, DeleteProjectTask,
    EndProject, GenerateToken, GetProjectByIdV1, GetProjectByIdV2, GetProjectTaskById, GetProjectsV1,
    RefreshToken, UpdateProject, UpdateProjectBudget, UpdateProjectTask, UpdateProjectTaskStatus,
    projects::ListProjects,
};
use pms_server::{AppConfig, AppState};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const OWNER: Uuid = Uuid::from_u128(0x1111);
const OTHER: Uuid = Uuid::from_u128(0x2222);
const ASSIGNEE: Uuid = Uuid::from_u128(0x3333);

async fn state() -> AppState {
    let mut cfg = AppConfig::default();
    cfg.auth.secret = "integration-test-secret-0123456789abcdef".into();
    cfg.storage.seed = false;
    AppState::build(&cfg, CancellationToken::new()).await.unwrap()
}

async fn create_project(state: &AppState, name: &str) -> Uuid {
    state
        .send(CreateProject {
            name: name.into(),
            description: Some("integration".into()),
            expected_start_date: OffsetDateTime::now_utc(),
            budget: BigDecimal::from(1000),
            currency: Some("USD".into()),
            owner_id: OWNER,
        })
        .await
        .unwrap()
}

async fn create_task(state: &AppState, project_id: Uuid) -> Uuid {
    state
        .send(CreateProjectTask {
            project_id,
            title: "Write docs".into(),
            description: None,
            assigned_user_id: Some(ASSIGNEE),
            current_user: OWNER,
        })
        .await
        .unwrap()
        .id
}

fn list() -> ListProjects {
    ListProjects {
        page: 1,
        size: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn repeated_reads_are_served_from_cache() {
    let state = state().await;
    let id = create_project(&state, "Cached").await;

    let first = state.send(GetProjectByIdV1 { id }).await.unwrap();
    let before = state.cache.stats().snapshot();
    let second = state.send(GetProjectByIdV1 { id }).await.unwrap();
    let after = state.cache.stats().snapshot();

    assert_eq!(first, second);
    assert_eq!(after.l1_hits, before.l1_hits + 1);
}

#[tokio::test]
async fn update_is_visible_on_next_read() {
    let state = state().await;
    let id = create_project(&state, "Before").await;
    assert_eq!(state.send(GetProjectByIdV1 { id }).await.unwrap().name, "Before");
    assert_eq!(state.send(GetProjectByIdV2 { id }).await.unwrap().name, "Before");

    state
        .send(UpdateProject {
            id,
            name: "After".into(),
            description: None,
            expected_start_date: OffsetDateTime::now_utc(),
        })
        .await
        .unwrap();

    assert_eq!(state.send(GetProjectByIdV1 { id }).await.unwrap().name, "After");
    assert_eq!(state.send(GetProjectByIdV2 { id }).await.unwrap().name, "After");
}

#[tokio::test]
async fn new_projects_appear_in_cached_lists() {
    let state = state().await;
    create_project(&state, "First").await;
    assert_eq!(state.send(GetProjectsV1(list())).await.unwrap().total_items_count, 1);

    create_project(&state, "Second").await;
    assert_eq!(state.send(GetProjectsV1(list())).await.unwrap().total_items_count, 2);
}

#[tokio::test]
async fn task_writes_refresh_the_project_view() {
    let state = state().await;
    let project_id = create_project(&state, "Tasks").await;
    assert!(state.send(GetProjectByIdV1 { id: project_id }).await.unwrap().tasks.is_empty());

    let task_id = create_task(&state, project_id).await;
    let project = state.send(GetProjectByIdV1 { id: project_id }).await.unwrap();
    assert_eq!(project.tasks.len(), 1);
    assert_eq!(project.tasks[0].status, ProjectTaskStatus::NotStarted);

    let task = state.send(GetProjectTaskById { project_id, task_id }).await.unwrap();
    assert_eq!(task.assigned_user_id, ASSIGNEE);

    state
        .send(UpdateProjectTaskStatus {
            project_id,
            task_id,
            status: ProjectTaskStatus::InProgress,
        })
        .await
        .unwrap();
    state
        .send(AssignUserToProjectTask {
            project_id,
            task_id,
            user_id: OTHER,
        })
        .await
        .unwrap();

    let task = state.send(GetProjectTaskById { project_id, task_id }).await.unwrap();
    assert_eq!(task.status, ProjectTaskStatus::InProgress);
    assert_eq!(task.assigned_user_id, OTHER);
    let project = state.send(GetProjectByIdV2 { id: project_id }).await.unwrap();
    assert_eq!(project.tasks[0].assigned_user_id, OTHER);

    state
        .send(DeleteProjectTask {
            project_id,
            task_id,
            current_user: OWNER,
        })
        .await
        .unwrap();
    let err = state.send(GetProjectTaskById { project_id, task_id }).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_project_evicts_its_cached_tasks() {
    let state = state().await;
    let project_id = create_project(&state, "Doomed").await;
    let task_id = create_task(&state, project_id).await;
    let survivor = create_project(&state, "Survivor").await;
    let survivor_task = create_task(&state, survivor).await;

    state.send(GetProjectTaskById { project_id, task_id }).await.unwrap();
    state
        .send(GetProjectTaskById {
            project_id: survivor,
            task_id: survivor_task,
        })
        .await
        .unwrap();

    state.send(DeleteProject { id: project_id }).await.unwrap();

    let err = state.send(GetProjectTaskById { project_id, task_id }).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    let before = state.cache.stats().snapshot();
    state
        .send(GetProjectTaskById {
            project_id: survivor,
            task_id: survivor_task,
        })
        .await
        .unwrap();
    assert_eq!(state.cache.stats().snapshot().l1_hits, before.l1_hits + 1);
}

#[tokio::test]
async fn task_of_another_project_is_not_found() {
    let state = state().await;
    let home = create_project(&state, "Home").await;
    let elsewhere = create_project(&state, "Elsewhere").await;
    let task_id = create_task(&state, home).await;

    let err = state
        .send(UpdateProjectTaskStatus {
            project_id: elsewhere,
            task_id,
            status: ProjectTaskStatus::Blocked,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        err.to_problem_details().detail,
        Some(format!("Task {task_id} does not belong to project {elsewhere}"))
    );
}

#[tokio::test]
async fn only_assignee_or_owner_updates_a_task() {
    let state = state().await;
    let project_id = create_project(&state, "Permissions").await;
    let task_id = create_task(&state, project_id).await;
    let update = |current_user| UpdateProjectTask {
        project_id,
        task_id,
        title: "Renamed".into(),
        description: None,
        status: ProjectTaskStatus::Completed,
        current_user,
    };

    let err = state.send(update(OTHER)).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let task = state.send(update(ASSIGNEE)).await.unwrap();
    assert_eq!(task.title, "Renamed");
    assert_eq!(task.status, ProjectTaskStatus::Completed);
}

#[tokio::test]
async fn ending_a_project_enforces_its_rules() {
    let state = state().await;
    let id = create_project(&state, "Ending").await;
    let task_id = create_task(&state, id).await;

    let err = state.send(EndProject { id, current_user: OTHER }).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

    let err = state.send(EndProject { id, current_user: OWNER }).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    state
        .send(UpdateProjectTaskStatus {
            project_id: id,
            task_id,
            status: ProjectTaskStatus::Cancelled,
        })
        .await
        .unwrap();
    state.send(EndProject { id, current_user: OWNER }).await.unwrap();
    assert!(state.send(GetProjectByIdV1 { id }).await.unwrap().actual_end_date.is_some());

    let err = state.send(EndProject { id, current_user: OWNER }).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(ref m) if m == "Project is already ended."));

    let err = state
        .send(CreateProjectTask {
            project_id: id,
            title: "Too late".into(),
            description: None,
            assigned_user_id: Some(ASSIGNEE),
            current_user: OWNER,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn budget_updates_are_validated_and_owner_only() {
    let state = state().await;
    let id = create_project(&state, "Budget").await;

    let err = state
        .send(UpdateProjectBudget {
            id,
            budget: BigDecimal::from(0),
            current_user: OWNER,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = state
        .send(UpdateProjectBudget {
            id,
            budget: BigDecimal::from(10),
            current_user: OTHER,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

    let budget = BigDecimal::from_str("2500.50").unwrap();
    state
        .send(UpdateProjectBudget {
            id,
            budget: budget.clone(),
            current_user: OWNER,
        })
        .await
        .unwrap();
    assert_eq!(state.send(GetProjectByIdV1 { id }).await.unwrap().budget, budget);
}

#[tokio::test]
async fn missing_project_is_not_found() {
    let state = state().await;
    let id = Uuid::from_u128(42);
    let err = state.send(GetProjectByIdV1 { id }).await.unwrap_err();
    assert_eq!(
        err.to_problem_details().detail,
        Some(format!("Project with id: {id} doesn't exist"))
    );
}

#[tokio::test]
async fn refresh_tokens_are_single_use() {
    let state = state().await;
    let issued = state
        .send(GenerateToken {
            id: OWNER,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            permissions: vec!["project:read".into()],
            roles: vec![],
        })
        .await
        .unwrap();

    let claims = state.tokens.validate(&issued.access_token).unwrap();
    assert!(claims.has_permission("project:read"));

    let refreshed = state
        .send(RefreshToken {
            refresh_token: issued.refresh_token.clone(),
        })
        .await
        .unwrap();
    assert_ne!(refreshed.refresh_token, issued.refresh_token);

    let err = state
        .send(RefreshToken {
            refresh_token: issued.refresh_token,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}
