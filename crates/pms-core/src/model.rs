//! Domain entities.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A project owned by a single user, holding a budget and a set of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
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
    /// Populated only when the project is loaded with its tasks.
    #[serde(default)]
    pub tasks: Vec<ProjectTask>,
}

impl Project {
    pub fn is_ended(&self) -> bool {
        self.actual_end_date.is_some()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// True when every task is either completed or cancelled.
    pub fn has_no_active_tasks(&self) -> bool {
        self.tasks.iter().all(|task| task.status.is_closed())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTask {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub project_id: Uuid,
    pub assigned_user_id: Uuid,
    pub status: ProjectTaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectTaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl ProjectTaskStatus {
    pub const ALL: [ProjectTaskStatus; 5] = [
        Self::NotStarted,
        Self::InProgress,
        Self::Blocked,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::InProgress => "InProgress",
            Self::Blocked => "Blocked",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Completed and cancelled tasks do not block ending a project.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses a task may be moved to through a status update.
    pub fn is_valid_transition_target(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }
}

impl fmt::Display for ProjectTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn task(status: ProjectTaskStatus) -> ProjectTask {
        ProjectTask {
            id: Uuid::new_v4(),
            title: "Write docs".into(),
            description: None,
            project_id: Uuid::nil(),
            assigned_user_id: Uuid::nil(),
            status,
            created_at: datetime!(2025-01-01 0:00 UTC),
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ProjectTaskStatus::ALL {
            assert_eq!(status.to_string().parse::<ProjectTaskStatus>(), Ok(status));
        }
        assert_eq!("inprogress".parse(), Ok(ProjectTaskStatus::InProgress));
        assert!("Done".parse::<ProjectTaskStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_variant_name() {
        let json = serde_json::to_string(&ProjectTaskStatus::Blocked).unwrap();
        assert_eq!(json, "\"Blocked\"");
    }

    #[test]
    fn test_active_task_detection() {
        let mut project = Project {
            id: Uuid::new_v4(),
            name: "Platform".into(),
            description: None,
            owner_id: Uuid::nil(),
            created_at: datetime!(2025-01-01 0:00 UTC),
            expected_start_date: datetime!(2025-02-01 0:00 UTC),
            actual_end_date: None,
            budget: BigDecimal::from(1000),
            currency: Some("USD".into()),
            tasks: vec![
                task(ProjectTaskStatus::Completed),
                task(ProjectTaskStatus::Cancelled),
            ],
        };
        assert!(project.has_no_active_tasks());

        project.tasks.push(task(ProjectTaskStatus::Blocked));
        assert!(!project.has_no_active_tasks());
        assert!(!project.is_ended());
    }
}
