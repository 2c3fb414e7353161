use crate::authz::{self, Action, Principal, ResourceKind, ResourceRef};
use crate::errors::{AppError, AppResult};

pub mod attendance;
pub mod auth;
pub mod blogs;
pub mod branches;
pub mod employees;
pub mod health;
pub mod jobs;
pub mod leads;
pub mod students;
pub mod users;

/// Coarse permission gate; runs before any data access.
pub(crate) fn require(
    principal: Option<&Principal>,
    action: Action,
    resource: ResourceKind,
) -> AppResult<()> {
    if authz::can_perform(principal, action, resource) {
        Ok(())
    } else {
        Err(AppError::forbidden(authz::deny_reason(principal, action, resource)))
    }
}

/// Object-level gate against one loaded record.
pub(crate) fn require_access(
    principal: Option<&Principal>,
    action: Action,
    resource: &ResourceRef,
) -> AppResult<()> {
    if authz::can_access(principal, action, resource) {
        Ok(())
    } else {
        let kind = resource.kind.ok_or_else(|| AppError::internal("resource kind missing"))?;
        Err(AppError::forbidden(authz::deny_reason(principal, action, kind)))
    }
}
