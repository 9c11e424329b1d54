//! Permission claim values carried in access tokens.

pub mod project {
    pub const CREATE: &str = "project:create";
    pub const READ: &str = "project:read";
    pub const UPDATE: &str = "project:update";
    pub const DELETE: &str = "project:delete";
    pub const ASSIGN_MEMBER: &str = "project:assign_member";
    pub const MANAGE_BUDGET: &str = "project:manage_budget";
}

pub mod task {
    pub const CREATE: &str = "task:create";
    pub const READ: &str = "task:read";
    pub const UPDATE: &str = "task:update";
    pub const DELETE: &str = "task:delete";
    pub const ASSIGN_USER: &str = "task:assign_user";
    pub const UPDATE_STATUS: &str = "task:update_status";
}

/// Every permission, as granted to a project manager.
pub const ALL: [&str; 12] = [
    project::CREATE,
    project::READ,
    project::UPDATE,
    project::DELETE,
    project::ASSIGN_MEMBER,
    project::MANAGE_BUDGET,
    task::CREATE,
    task::READ,
    task::UPDATE,
    task::DELETE,
    task::ASSIGN_USER,
    task::UPDATE_STATUS,
];
