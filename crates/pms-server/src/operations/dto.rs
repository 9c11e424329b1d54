//! Response shapes. Cached payloads are these types, not the entities.

use bigdecimal::BigDecimal;
use pms_core::{Project, ProjectTask, ProjectTaskStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTaskDto {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_user_id: Uuid,
    pub status: ProjectTaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&ProjectTask> for ProjectTaskDto {
    fn from(task: &ProjectTask) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            assigned_user_id: task.assigned_user_id,
            status: task.status,
            created_at: task.created_at,
        }
    }
}

/// v1 projection; carries no currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDto {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expected_start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub actual_end_date: Option<OffsetDateTime>,
    pub budget: BigDecimal,
    pub tasks: Vec<ProjectTaskDto>,
}

impl From<&Project> for ProjectDto {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            owner_id: project.owner_id,
            created_at: project.created_at,
            expected_start_date: project.expected_start_date,
            actual_end_date: project.actual_end_date,
            budget: project.budget.clone(),
            tasks: project.tasks.iter().map(ProjectTaskDto::from).collect(),
        }
    }
}

/// v2 projection: the v1 fields plus the currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCurrencyDto {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expected_start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub actual_end_date: Option<OffsetDateTime>,
    pub budget: BigDecimal,
    pub currency: Option<String>,
    pub tasks: Vec<ProjectTaskDto>,
}

impl From<&Project> for ProjectCurrencyDto {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            owner_id: project.owner_id,
            created_at: project.created_at,
            expected_start_date: project.expected_start_date,
            actual_end_date: project.actual_end_date,
            budget: project.budget.clone(),
            currency: project.currency.clone(),
            tasks: project.tasks.iter().map(ProjectTaskDto::from).collect(),
        }
    }
}
