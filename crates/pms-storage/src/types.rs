//! Query and change-set types.

use pms_core::paging::{DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE};
use pms_core::{Project, ProjectTask, SortColumn, SortDirection};
use uuid::Uuid;

use crate::{DynProjectStore, StorageResult};

/// Free-text filter applied to project listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    /// Case-insensitive "contains" match against name and description.
    pub search: Option<String>,
    /// Also match the search phrase against the currency code.
    pub include_currency: bool,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        let Some(phrase) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        let phrase = phrase.to_lowercase();
        let contains = |value: Option<&str>| {
            value.is_some_and(|v| v.to_lowercase().contains(&phrase))
        };

        contains(Some(&project.name))
            || contains(project.description.as_deref())
            || (self.include_currency && contains(project.currency.as_deref()))
    }
}

/// A paginated, sorted listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub filter: ProjectFilter,
    pub page_size: u32,
    pub page_number: u32,
    pub sort_column: SortColumn,
    pub sort_direction: SortDirection,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            filter: ProjectFilter::default(),
            page_size: DEFAULT_PAGE_SIZE,
            page_number: DEFAULT_PAGE_NUMBER,
            sort_column: SortColumn::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

impl PageQuery {
    /// Number of items preceding the requested page.
    pub fn offset(&self) -> usize {
        (self.page_number.max(1) as usize - 1) * self.page_size as usize
    }
}

/// A page of results plus the unpaged match count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// A single staged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    AddProject(Project),
    UpdateProject(Project),
    /// Removes the project and every task it owns.
    RemoveProject(Uuid),
    AddTask(ProjectTask),
    UpdateTask(ProjectTask),
    RemoveTask(Uuid),
}

/// Collects changes and commits them to a store in one batch.
pub struct UnitOfWork {
    store: DynProjectStore,
    changes: Vec<Change>,
}

impl UnitOfWork {
    pub fn new(store: DynProjectStore) -> Self {
        Self {
            store,
            changes: Vec::new(),
        }
    }

    pub fn add_project(&mut self, project: Project) {
        self.changes.push(Change::AddProject(project));
    }

    pub fn update_project(&mut self, project: Project) {
        self.changes.push(Change::UpdateProject(project));
    }

    pub fn remove_project(&mut self, id: Uuid) {
        self.changes.push(Change::RemoveProject(id));
    }

    pub fn add_task(&mut self, task: ProjectTask) {
        self.changes.push(Change::AddTask(task));
    }

    pub fn update_task(&mut self, task: ProjectTask) {
        self.changes.push(Change::UpdateTask(task));
    }

    pub fn remove_task(&mut self, id: Uuid) {
        self.changes.push(Change::RemoveTask(id));
    }

    pub fn pending(&self) -> &[Change] {
        &self.changes
    }

    /// Commits the staged changes, returning the number persisted.
    pub async fn save(self) -> StorageResult<usize> {
        if self.changes.is_empty() {
            return Ok(0);
        }
        self.store.apply(self.changes).await
    }
}
