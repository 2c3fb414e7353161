use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_old};
use crate::jwt::AuthUser;
use crate::models::user::{DbUser, User, UserCreateRequest, UserUpdateRequest};
use crate::routes::employees::{ensure_branch_unmanaged, manager_conflict};
use crate::routes::{auth::fetch_user, require, require_access};
use crate::utils::{hash_password, utc_now, DEFAULT_PASSWORD};

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses((status = 200, description = "List visible user accounts", body = [User]))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::User);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to user accounts"));
    }

    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let branches = profile_branches(&state.pool).await?;

    // The same predicate object-level reads use; list visibility and
    // get-by-id visibility cannot drift apart.
    let users: Vec<User> = users
        .into_iter()
        .filter(|u| filter.matches(&ResourceRef::user(u.id, branches.get(&u.id).copied())))
        .map(User::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::User)?;

    let (password, is_default) = issue_password(payload.role, payload.password.as_deref())?;
    let password_hash = hash_password(&password)?;

    ensure_email_free(&state.pool, &payload.email, None).await?;

    let user_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(payload.role.as_str())
    .bind(is_default)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user(&state.pool, user_id).await?.try_into()?;
    log_activity(&state.events, "created", Some(principal.user_id), &user);

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "User detail", body = User))
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let user = fetch_user(&state.pool, id).await?;
    let branch = profile_branch(&state.pool, id).await?;
    require_access(Some(&principal), Action::Read, &ResourceRef::user(id, branch))?;

    let user: User = user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses((status = 200, description = "User updated", body = User))
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::User)?;

    let mut user = fetch_user(&state.pool, id).await?;
    let before: User = user.clone().try_into()?;

    if let Some(first_name) = payload.first_name.as_ref() {
        user.first_name = first_name.clone();
    }
    if let Some(last_name) = payload.last_name.as_ref() {
        user.last_name = last_name.clone();
    }
    if let Some(email) = payload.email.as_ref() {
        ensure_email_free(&state.pool, email, Some(id)).await?;
        user.email = email.clone();
    }

    let previous_role = Role::parse(&user.role)
        .ok_or_else(|| AppError::internal(format!("unknown role '{}' on user {id}", user.role)))?;
    let new_role = payload.role.unwrap_or(previous_role);
    user.role = new_role.as_str().to_string();

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE users SET first_name = ?, last_name = ?, email = ?, role = ?, updated_at = ? WHERE id = ?")
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.role)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if new_role != previous_role {
        apply_role_change(&mut tx, id, previous_role, new_role).await?;
    }

    tx.commit().await?;

    user.updated_at = now;
    let user: User = user.try_into()?;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &user, Some(&before));

    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 204, description = "User deleted"))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::User)?;

    if id == principal.user_id {
        return Err(AppError::bad_request("cannot delete your own account"));
    }

    let user: User = fetch_user(&state.pool, id).await?.try_into()?;

    // Profiles cascade with the account.
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &user);

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordResetSummary {
    pub reset: u64,
}

#[utoipa::path(
    post,
    path = "/users/reset-passwords",
    tag = "Users",
    responses((status = 200, description = "All non-SuperAdmin accounts reset to the default credential", body = PasswordResetSummary))
)]
pub async fn reset_passwords(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<PasswordResetSummary>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    if !principal.is_super_admin() {
        return Err(AppError::forbidden("only SuperAdmin may bulk-reset passwords"));
    }

    let password_hash = hash_password(DEFAULT_PASSWORD)?;
    let now = utc_now();

    // SuperAdmin accounts never carry the default credential.
    let result = sqlx::query(
        "UPDATE users SET password_hash = ?, is_default_password = 1, updated_at = ? WHERE role != ?",
    )
    .bind(&password_hash)
    .bind(now)
    .bind(Role::SuperAdmin.as_str())
    .execute(&state.pool)
    .await?;

    tracing::info!(count = result.rows_affected(), "bulk password reset");

    Ok(Json(PasswordResetSummary {
        reset: result.rows_affected(),
    }))
}

/// Resolve the credential for a new account. SuperAdmin accounts must come
/// with an explicit password; everyone else falls back to the issued default.
pub(crate) fn issue_password(role: Role, password: Option<&str>) -> AppResult<(String, bool)> {
    match password {
        Some(explicit) => Ok((explicit.to_string(), false)),
        None if role == Role::SuperAdmin => {
            Err(AppError::bad_request("SuperAdmin accounts require an explicit password"))
        }
        None => Ok((DEFAULT_PASSWORD.to_string(), true)),
    }
}

/// The manager slot follows the role. Promoting a profile-holder to
/// BranchManager claims their home branch's slot (conflicting with any
/// sitting manager); demoting a manager releases it. Profiles pin the role
/// family: staff roles for employees, Student for students.
async fn apply_role_change(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: Uuid,
    previous_role: Role,
    new_role: Role,
) -> AppResult<()> {
    let profile: Option<(Uuid, Uuid)> =
        sqlx::query_as("SELECT id, branch_id FROM employees WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;

    let Some((employee_id, branch_id)) = profile else {
        let student: Option<Uuid> = sqlx::query_scalar("SELECT id FROM students WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
        if student.is_some() && new_role != Role::Student {
            return Err(AppError::bad_request(format!(
                "role {new_role} cannot hold a student profile"
            )));
        }
        return Ok(());
    };

    if !new_role.is_staff() {
        return Err(AppError::bad_request(format!(
            "role {new_role} cannot hold an employee profile"
        )));
    }

    if new_role == Role::BranchManager {
        ensure_branch_unmanaged(tx, branch_id, Some(employee_id)).await?;
        let claimed = sqlx::query("UPDATE employees SET manages_branch_id = ? WHERE id = ?")
            .bind(branch_id)
            .bind(employee_id)
            .execute(&mut **tx)
            .await;
        if let Err(err) = claimed {
            return Err(manager_conflict(tx, branch_id, err).await);
        }
    } else if previous_role == Role::BranchManager {
        sqlx::query("UPDATE employees SET manages_branch_id = NULL WHERE id = ?")
            .bind(employee_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

pub(crate) async fn ensure_email_free(
    pool: &SqlitePool,
    email: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(id) if Some(id) != exclude => Err(AppError::conflict("email already in use")),
        _ => Ok(()),
    }
}

/// Home branch of every user that has a profile, keyed by user id.
async fn profile_branches(pool: &SqlitePool) -> AppResult<HashMap<Uuid, Uuid>> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT user_id, branch_id FROM employees UNION ALL SELECT user_id, branch_id FROM students",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

pub(crate) async fn profile_branch(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<Uuid>> {
    let branch: Option<Uuid> = sqlx::query_scalar(
        "SELECT branch_id FROM employees WHERE user_id = ? UNION ALL SELECT branch_id FROM students WHERE user_id = ?",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(branch)
}
