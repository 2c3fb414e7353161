use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_old};
use crate::jwt::AuthUser;
use crate::models::employee::{DbEmployee, Employee, EmployeeCreateRequest, EmployeeUpdateRequest};
use crate::models::user::DbUser;
use crate::routes::branches::fetch_branch;
use crate::routes::users::{ensure_email_free, issue_password};
use crate::routes::{auth::fetch_user, require, require_access};
use crate::utils::{hash_password, utc_now};

const EMPLOYEE_COLUMNS: &str = "id, user_id, branch_id, employee_code, gender, nationality, dob, salary, contact_number, address, emergency_contact, joining_date, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/employees",
    tag = "Employees",
    responses((status = 200, description = "List visible employees", body = [Employee]))
)]
pub async fn list_employees(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Employee>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::Employee);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to employees"));
    }

    let profiles = sqlx::query_as::<_, DbEmployee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    let users: Vec<DbUser> = sqlx::query_as(
        "SELECT id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at FROM users",
    )
    .fetch_all(&state.pool)
    .await?;
    let mut users: HashMap<Uuid, DbUser> = users.into_iter().map(|u| (u.id, u)).collect();

    let mut visible = Vec::new();
    for profile in profiles {
        if !filter.matches(&ResourceRef::employee(profile.branch_id, profile.user_id)) {
            continue;
        }
        let user = users
            .remove(&profile.user_id)
            .ok_or_else(|| AppError::internal("employee profile without user account"))?;
        visible.push(Employee::from_parts(profile, user)?);
    }

    Ok(Json(visible))
}

#[utoipa::path(
    post,
    path = "/employees",
    tag = "Employees",
    request_body = EmployeeCreateRequest,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 409, description = "Duplicate email, code or branch manager")
    )
)]
pub async fn create_employee(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<EmployeeCreateRequest>,
) -> AppResult<(StatusCode, Json<Employee>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::Employee)?;

    if !payload.user.role.is_staff() {
        return Err(AppError::bad_request(format!(
            "role {} cannot hold an employee profile",
            payload.user.role
        )));
    }

    let user_id = Uuid::new_v4();
    require_access(
        Some(&principal),
        Action::Create,
        &ResourceRef::employee(payload.branch_id, user_id),
    )?;

    fetch_branch(&state.pool, payload.branch_id).await?;
    ensure_email_free(&state.pool, &payload.user.email, None).await?;
    ensure_code_free(&state.pool, &payload.employee_code, None).await?;

    let (password, is_default) = issue_password(payload.user.role, payload.user.password.as_deref())?;
    let password_hash = hash_password(&password)?;

    let employee_id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&payload.user.first_name)
    .bind(&payload.user.last_name)
    .bind(&payload.user.email)
    .bind(&password_hash)
    .bind(payload.user.role.as_str())
    .bind(is_default)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // Only a BranchManager claims the manager slot; the unique column is the
    // storage-level backstop behind this diagnostic pre-check.
    let manages = if payload.user.role == Role::BranchManager {
        ensure_branch_unmanaged(&mut tx, payload.branch_id, None).await?;
        Some(payload.branch_id)
    } else {
        None
    };

    let inserted = sqlx::query(
        "INSERT INTO employees (id, user_id, branch_id, employee_code, gender, nationality, dob, salary, contact_number, address, emergency_contact, joining_date, manages_branch_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(employee_id)
    .bind(user_id)
    .bind(payload.branch_id)
    .bind(&payload.employee_code)
    .bind(&payload.gender)
    .bind(&payload.nationality)
    .bind(payload.dob)
    .bind(payload.salary)
    .bind(&payload.contact_number)
    .bind(&payload.address)
    .bind(&payload.emergency_contact)
    .bind(payload.joining_date)
    .bind(manages)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;
    if let Err(err) = inserted {
        return Err(manager_conflict(&mut tx, payload.branch_id, err).await);
    }

    tx.commit().await?;

    let (profile, user) = fetch_employee(&state.pool, employee_id).await?;
    let employee = Employee::from_parts(profile, user)?;
    log_activity(&state.events, "created", Some(principal.user_id), &employee);

    Ok((StatusCode::CREATED, Json(employee)))
}

#[utoipa::path(
    get,
    path = "/employees/{id}",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses((status = 200, description = "Employee detail", body = Employee))
)]
pub async fn get_employee(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Employee>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let (profile, user) = fetch_employee(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Read,
        &ResourceRef::employee(profile.branch_id, profile.user_id),
    )?;

    Ok(Json(Employee::from_parts(profile, user)?))
}

#[utoipa::path(
    put,
    path = "/employees/{id}",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    request_body = EmployeeUpdateRequest,
    responses((status = 200, description = "Employee updated", body = Employee))
)]
pub async fn update_employee(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<EmployeeUpdateRequest>,
) -> AppResult<Json<Employee>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::Employee)?;

    let (mut profile, mut user) = fetch_employee(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Update,
        &ResourceRef::employee(profile.branch_id, profile.user_id),
    )?;

    let before = Employee::from_parts(profile.clone(), user.clone())?;

    let new_branch = match payload.branch_id {
        Some(branch) if branch != profile.branch_id => {
            if !principal.is_super_admin() {
                return Err(AppError::forbidden("branch moves require SuperAdmin"));
            }
            fetch_branch(&state.pool, branch).await?;
            Some(branch)
        }
        _ => None,
    };

    if let Some(first_name) = payload.first_name.as_ref() {
        user.first_name = first_name.clone();
    }
    if let Some(last_name) = payload.last_name.as_ref() {
        user.last_name = last_name.clone();
    }
    if let Some(email) = payload.email.as_ref() {
        ensure_email_free(&state.pool, email, Some(user.id)).await?;
        user.email = email.clone();
    }
    if payload.gender.is_some() {
        profile.gender = payload.gender.clone();
    }
    if payload.nationality.is_some() {
        profile.nationality = payload.nationality.clone();
    }
    if payload.dob.is_some() {
        profile.dob = payload.dob;
    }
    if payload.salary.is_some() {
        profile.salary = payload.salary;
    }
    if let Some(contact_number) = payload.contact_number.as_ref() {
        profile.contact_number = contact_number.clone();
    }
    if let Some(address) = payload.address.as_ref() {
        profile.address = address.clone();
    }
    if payload.emergency_contact.is_some() {
        profile.emergency_contact = payload.emergency_contact.clone();
    }
    if payload.joining_date.is_some() {
        profile.joining_date = payload.joining_date;
    }

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE users SET first_name = ?, last_name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    if let Some(branch) = new_branch {
        // A manager keeps the manager slot of whichever branch they run.
        let manages = if user.role == Role::BranchManager.as_str() {
            ensure_branch_unmanaged(&mut tx, branch, Some(id)).await?;
            Some(branch)
        } else {
            None
        };

        let moved = sqlx::query("UPDATE employees SET branch_id = ?, manages_branch_id = ? WHERE id = ?")
            .bind(branch)
            .bind(manages)
            .bind(id)
            .execute(&mut *tx)
            .await;
        if let Err(err) = moved {
            return Err(manager_conflict(&mut tx, branch, err).await);
        }
        profile.branch_id = branch;
    }

    sqlx::query(
        "UPDATE employees SET gender = ?, nationality = ?, dob = ?, salary = ?, contact_number = ?, address = ?, emergency_contact = ?, joining_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&profile.gender)
    .bind(&profile.nationality)
    .bind(profile.dob)
    .bind(profile.salary)
    .bind(&profile.contact_number)
    .bind(&profile.address)
    .bind(&profile.emergency_contact)
    .bind(profile.joining_date)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let (profile, user) = fetch_employee(&state.pool, id).await?;
    let employee = Employee::from_parts(profile, user)?;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &employee, Some(&before));

    Ok(Json(employee))
}

#[utoipa::path(
    delete,
    path = "/employees/{id}",
    tag = "Employees",
    params(("id" = Uuid, Path, description = "Employee id")),
    responses((status = 204, description = "Employee and account deleted"))
)]
pub async fn delete_employee(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::Employee)?;

    let (profile, user) = fetch_employee(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Delete,
        &ResourceRef::employee(profile.branch_id, profile.user_id),
    )?;

    let employee = Employee::from_parts(profile, user)?;

    // Removing the account cascades into the profile.
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(employee.user.id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &employee);

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_employee(pool: &SqlitePool, employee_id: Uuid) -> AppResult<(DbEmployee, DbUser)> {
    let profile = sqlx::query_as::<_, DbEmployee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("employee not found"))?;

    let user = fetch_user(pool, profile.user_id).await?;
    Ok((profile, user))
}

async fn ensure_code_free(pool: &SqlitePool, code: &str, exclude: Option<Uuid>) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM employees WHERE employee_code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(id) if Some(id) != exclude => Err(AppError::conflict("employee code already in use")),
        _ => Ok(()),
    }
}

/// Pre-check the one-manager-per-branch rule inside the write transaction so
/// the 409 can name the branch and the sitting manager. The unique index on
/// `manages_branch_id` still decides races at commit.
pub(crate) async fn ensure_branch_unmanaged(
    tx: &mut Transaction<'_, Sqlite>,
    branch_id: Uuid,
    exclude_employee: Option<Uuid>,
) -> AppResult<()> {
    let existing: Option<(Uuid, String, String, String)> = sqlx::query_as(
        "SELECT e.id, u.first_name, u.last_name, b.name FROM employees e \
         JOIN users u ON u.id = e.user_id \
         JOIN branches b ON b.id = e.manages_branch_id \
         WHERE e.manages_branch_id = ?",
    )
    .bind(branch_id)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some((id, first_name, last_name, branch_name)) if Some(id) != exclude_employee => {
            Err(AppError::conflict(format!(
                "branch '{branch_name}' is already managed by {first_name} {last_name}"
            )))
        }
        _ => Ok(()),
    }
}

/// A write racing the pre-check loses against the unique index; re-query the
/// sitting manager so the race path reports the same named conflict instead
/// of a 500.
pub(crate) async fn manager_conflict(
    tx: &mut Transaction<'_, Sqlite>,
    branch_id: Uuid,
    err: sqlx::Error,
) -> AppError {
    let is_slot_violation = matches!(
        &err,
        sqlx::Error::Database(db_err) if db_err.message().contains("manages_branch_id")
    );
    if !is_slot_violation {
        return AppError::Database(err);
    }

    match ensure_branch_unmanaged(tx, branch_id, None).await {
        Err(conflict) => conflict,
        // The winning row is outside this transaction's snapshot.
        Ok(()) => AppError::conflict("branch already has a manager"),
    }
}
