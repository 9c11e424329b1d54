use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use pms_core::{Project, ProjectTask, SortColumn, SortDirection};
use pms_storage::{Change, Page, PageQuery, ProjectStore, StorageError, StorageResult};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory project storage using papaya lock-free HashMaps.
///
/// Projects are stored without their tasks; tasks live in their own map and
/// are attached on read when requested. Writers are serialized so a batch is
/// validated against a stable state before any of it is applied.
#[derive(Debug)]
pub struct InMemoryProjectStore {
    projects: PapayaHashMap<Uuid, Project>,
    tasks: PapayaHashMap<Uuid, ProjectTask>,
    write_lock: Mutex<()>,
}

impl Default for InMemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self {
            projects: PapayaHashMap::new(),
            tasks: PapayaHashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    fn tasks_of(&self, project_id: Uuid) -> Vec<ProjectTask> {
        let tasks = self.tasks.pin();
        let mut owned: Vec<ProjectTask> = tasks
            .values()
            .filter(|task| task.project_id == project_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        owned
    }

    /// Checks every change against the current state plus the effect of the
    /// changes staged before it.
    fn validate(&self, changes: &[Change]) -> StorageResult<()> {
        let projects = self.projects.pin();
        let tasks = self.tasks.pin();
        let mut project_exists: HashMap<Uuid, bool> = HashMap::new();
        let mut task_exists: HashMap<Uuid, bool> = HashMap::new();

        let project_present = |overlay: &HashMap<Uuid, bool>, id: &Uuid| {
            overlay
                .get(id)
                .copied()
                .unwrap_or_else(|| projects.contains_key(id))
        };
        let task_present = |overlay: &HashMap<Uuid, bool>, id: &Uuid| {
            overlay
                .get(id)
                .copied()
                .unwrap_or_else(|| tasks.contains_key(id))
        };

        for change in changes {
            match change {
                Change::AddProject(project) => {
                    if project_present(&project_exists, &project.id) {
                        return Err(StorageError::already_exists("Project", project.id));
                    }
                    project_exists.insert(project.id, true);
                    for task in &project.tasks {
                        task_exists.insert(task.id, true);
                    }
                }
                Change::UpdateProject(project) => {
                    if !project_present(&project_exists, &project.id) {
                        return Err(StorageError::not_found("Project", project.id));
                    }
                }
                Change::RemoveProject(id) => {
                    if !project_present(&project_exists, id) {
                        return Err(StorageError::not_found("Project", id));
                    }
                    project_exists.insert(*id, false);
                    for task in tasks.values().filter(|task| task.project_id == *id) {
                        task_exists.insert(task.id, false);
                    }
                }
                Change::AddTask(task) => {
                    if !project_present(&project_exists, &task.project_id) {
                        return Err(StorageError::not_found("Project", task.project_id));
                    }
                    if task_present(&task_exists, &task.id) {
                        return Err(StorageError::already_exists("ProjectTask", task.id));
                    }
                    task_exists.insert(task.id, true);
                }
                Change::UpdateTask(task) => {
                    if !task_present(&task_exists, &task.id) {
                        return Err(StorageError::not_found("ProjectTask", task.id));
                    }
                }
                Change::RemoveTask(id) => {
                    if !task_present(&task_exists, id) {
                        return Err(StorageError::not_found("ProjectTask", id));
                    }
                    task_exists.insert(*id, false);
                }
            }
        }
        Ok(())
    }
}

fn compare(column: SortColumn, a: &Project, b: &Project) -> Ordering {
    match column {
        SortColumn::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
        SortColumn::ExpectedStartDate => a.expected_start_date.cmp(&b.expected_start_date),
        SortColumn::Budget => a.budget.cmp(&b.budget),
        SortColumn::OwnerId => a.owner_id.cmp(&b.owner_id),
        SortColumn::Currency => a.currency.cmp(&b.currency),
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get_project(&self, id: Uuid, include_tasks: bool) -> StorageResult<Option<Project>> {
        let project = self.projects.pin().get(&id).cloned();
        Ok(project.map(|mut project| {
            if include_tasks {
                project.tasks = self.tasks_of(id);
            }
            project
        }))
    }

    async fn get_task(&self, id: Uuid) -> StorageResult<Option<ProjectTask>> {
        Ok(self.tasks.pin().get(&id).cloned())
    }

    async fn get_page(&self, query: &PageQuery) -> StorageResult<Page<Project>> {
        let mut matches: Vec<Project> = self
            .projects
            .pin()
            .values()
            .filter(|project| query.filter.matches(project))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            let ord = compare(query.sort_column, a, b).then_with(|| a.id.cmp(&b.id));
            match query.sort_direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });

        let total_count = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(query.offset())
            .take(query.page_size as usize)
            .map(|mut project| {
                project.tasks = self.tasks_of(project.id);
                project
            })
            .collect();

        Ok(Page { items, total_count })
    }

    async fn apply(&self, changes: Vec<Change>) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().await;
        self.validate(&changes)?;

        let projects = self.projects.pin();
        let tasks = self.tasks.pin();
        let mut persisted = 0;

        for change in changes {
            persisted += match change {
                Change::AddProject(mut project) => {
                    let owned = std::mem::take(&mut project.tasks);
                    let count = 1 + owned.len();
                    projects.insert(project.id, project);
                    for task in owned {
                        tasks.insert(task.id, task);
                    }
                    count
                }
                Change::UpdateProject(mut project) => {
                    project.tasks.clear();
                    if projects.get(&project.id) == Some(&project) {
                        0
                    } else {
                        projects.insert(project.id, project);
                        1
                    }
                }
                Change::RemoveProject(id) => {
                    let owned: Vec<Uuid> = tasks
                        .iter()
                        .filter(|(_, task)| task.project_id == id)
                        .map(|(task_id, _)| *task_id)
                        .collect();
                    for task_id in &owned {
                        tasks.remove(task_id);
                    }
                    projects.remove(&id).map_or(0, |_| 1) + owned.len()
                }
                Change::AddTask(task) => {
                    tasks.insert(task.id, task);
                    1
                }
                Change::UpdateTask(task) => {
                    if tasks.get(&task.id) == Some(&task) {
                        0
                    } else {
                        tasks.insert(task.id, task);
                        1
                    }
                }
                Change::RemoveTask(id) => tasks.remove(&id).map_or(0, |_| 1),
            };
        }

        tracing::debug!(persisted, "applied change batch");
        Ok(persisted)
    }

    async fn project_count(&self) -> StorageResult<usize> {
        Ok(self.projects.pin().len())
    }
}
