//! Authorization module - role resolution, policy table and query scoping
//!
//! The policy is a matrix of roles crossed against resource types. Every
//! grant carries a scoping predicate (branch isolation, ownership, public
//! visibility); anything not granted is denied. Checks run at two points:
//! coarse (`can_perform`, before any data access) and fine-grained
//! (`can_access`, against one loaded record). List endpoints pre-filter via
//! `read_scopes`, which must stay consistent with `can_access` for reads.

mod policy;
mod principal;

pub use policy::{can_access, can_perform, deny_reason, read_scopes, Scope, ScopeFilter};
pub use principal::{Principal, ResourceRef};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The six account roles. Exactly one per principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    SuperAdmin,
    BranchManager,
    Counsellor,
    Receptionist,
    BankManager,
    Student,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::BranchManager,
        Role::Counsellor,
        Role::Receptionist,
        Role::BankManager,
        Role::Student,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::BranchManager => "BranchManager",
            Role::Counsellor => "Counsellor",
            Role::Receptionist => "Receptionist",
            Role::BankManager => "BankManager",
            Role::Student => "Student",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|role| role.as_str() == value)
    }

    /// Roles that hold an employee profile (and therefore a home branch).
    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            Role::BranchManager | Role::Counsellor | Role::Receptionist | Role::BankManager
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Resource types the policy matrix covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Branch,
    Employee,
    Student,
    Lead,
    Job,
    JobResponse,
    Blog,
    Attendance,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::User,
        ResourceKind::Branch,
        ResourceKind::Employee,
        ResourceKind::Student,
        ResourceKind::Lead,
        ResourceKind::Job,
        ResourceKind::JobResponse,
        ResourceKind::Blog,
        ResourceKind::Attendance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Branch => "branch",
            ResourceKind::Employee => "employee",
            ResourceKind::Student => "student",
            ResourceKind::Lead => "lead",
            ResourceKind::Job => "job",
            ResourceKind::JobResponse => "job_response",
            ResourceKind::Blog => "blog",
            ResourceKind::Attendance => "attendance",
        }
    }
}
