use sqlx::SqlitePool;
use uuid::Uuid;

use super::{ResourceKind, Role};
use crate::errors::AppError;

/// The resolved requesting actor: identity, role and home branch.
///
/// Resolution happens fresh on every request; nothing here is cached across
/// requests. SuperAdmin never has a home branch, and a staff or student
/// principal without a profile resolves to `home_branch: None`, which fails
/// closed for every branch-scoped grant.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub home_branch: Option<Uuid>,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role, home_branch: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            home_branch,
        }
    }

    /// Resolve role and home branch for an authenticated user id.
    pub async fn resolve(pool: &SqlitePool, user_id: Uuid) -> Result<Self, AppError> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        let role = role.ok_or_else(|| AppError::unauthorized("account no longer exists"))?;
        let role = Role::parse(&role)
            .ok_or_else(|| AppError::internal(format!("unknown role '{role}' on user {user_id}")))?;

        let home_branch = match role {
            Role::SuperAdmin => None,
            Role::Student => {
                sqlx::query_scalar("SELECT branch_id FROM students WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await?
            }
            _ => {
                sqlx::query_scalar("SELECT branch_id FROM employees WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await?
            }
        };

        Ok(Self {
            user_id,
            role,
            home_branch,
        })
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

/// The policy-relevant shape of one loaded (or about-to-be-created) record.
///
/// Routes build one of these from the row they fetched and hand it to
/// `can_access`; the policy never touches the database itself.
#[derive(Debug, Clone, Default)]
pub struct ResourceRef {
    pub kind: Option<ResourceKind>,
    /// Owning branch. For a `Branch` record this is its own id; for a
    /// `JobResponse` it is the parent job's branch (derived, never stored).
    pub branch_id: Option<Uuid>,
    /// Creator, where the resource records one. For a `JobResponse` this is
    /// the parent job's creator, which is what manager ownership checks need.
    pub created_by: Option<Uuid>,
    /// The user account behind the record: profile owner for
    /// Employee/Student/User records, applicant for a JobResponse.
    pub owner_user_id: Option<Uuid>,
    pub is_active: bool,
    pub is_published: bool,
}

impl ResourceRef {
    pub fn user(user_id: Uuid, profile_branch: Option<Uuid>) -> Self {
        Self {
            kind: Some(ResourceKind::User),
            branch_id: profile_branch,
            owner_user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn branch(branch_id: Uuid) -> Self {
        Self {
            kind: Some(ResourceKind::Branch),
            branch_id: Some(branch_id),
            ..Default::default()
        }
    }

    pub fn employee(branch_id: Uuid, user_id: Uuid) -> Self {
        Self {
            kind: Some(ResourceKind::Employee),
            branch_id: Some(branch_id),
            owner_user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn student(branch_id: Uuid, user_id: Uuid) -> Self {
        Self {
            kind: Some(ResourceKind::Student),
            branch_id: Some(branch_id),
            owner_user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn lead(branch_id: Uuid, created_by: Option<Uuid>) -> Self {
        Self {
            kind: Some(ResourceKind::Lead),
            branch_id: Some(branch_id),
            created_by,
            ..Default::default()
        }
    }

    pub fn job(branch_id: Uuid, created_by: Uuid, is_active: bool) -> Self {
        Self {
            kind: Some(ResourceKind::Job),
            branch_id: Some(branch_id),
            created_by: Some(created_by),
            is_active,
            ..Default::default()
        }
    }

    pub fn job_response(job_branch: Uuid, job_created_by: Uuid, applicant_id: Option<Uuid>) -> Self {
        Self {
            kind: Some(ResourceKind::JobResponse),
            branch_id: Some(job_branch),
            created_by: Some(job_created_by),
            owner_user_id: applicant_id,
            ..Default::default()
        }
    }

    pub fn blog(branch_id: Uuid, author_id: Uuid, is_published: bool) -> Self {
        Self {
            kind: Some(ResourceKind::Blog),
            branch_id: Some(branch_id),
            created_by: Some(author_id),
            is_published,
            ..Default::default()
        }
    }

    pub fn attendance(branch_id: Uuid) -> Self {
        Self {
            kind: Some(ResourceKind::Attendance),
            branch_id: Some(branch_id),
            ..Default::default()
        }
    }
}
