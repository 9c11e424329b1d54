pub mod error;
pub mod model;
pub mod paging;
pub mod permission;

pub use error::{CoreError, ErrorCategory, Result, ValidationErrors};
pub use model::{Project, ProjectTask, ProjectTaskStatus};
pub use paging::{PagedResult, SortColumn, SortDirection};
