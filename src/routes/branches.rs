use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_old};
use crate::jwt::AuthUser;
use crate::models::branch::{Branch, BranchCreateRequest, BranchUpdateRequest};
use crate::routes::{require, require_access};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/branches",
    tag = "Branches",
    responses((status = 200, description = "List visible branches", body = [Branch]))
)]
pub async fn list_branches(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Branch>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::Branch);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to branches"));
    }

    let branches = sqlx::query_as::<_, Branch>(
        "SELECT id, name, country, city, address, created_at, updated_at FROM branches ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let branches: Vec<Branch> = branches
        .into_iter()
        .filter(|b| filter.matches(&ResourceRef::branch(b.id)))
        .collect();

    Ok(Json(branches))
}

#[utoipa::path(
    post,
    path = "/branches",
    tag = "Branches",
    request_body = BranchCreateRequest,
    responses((status = 201, description = "Branch created", body = Branch))
)]
pub async fn create_branch(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BranchCreateRequest>,
) -> AppResult<(StatusCode, Json<Branch>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::Branch)?;

    let branch_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO branches (id, name, country, city, address, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(branch_id)
    .bind(&payload.name)
    .bind(&payload.country)
    .bind(&payload.city)
    .bind(&payload.address)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let branch = fetch_branch(&state.pool, branch_id).await?;
    log_activity(&state.events, "created", Some(principal.user_id), &branch);

    Ok((StatusCode::CREATED, Json(branch)))
}

#[utoipa::path(
    get,
    path = "/branches/{id}",
    tag = "Branches",
    params(("id" = Uuid, Path, description = "Branch id")),
    responses((status = 200, description = "Branch detail", body = Branch))
)]
pub async fn get_branch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Branch>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let branch = fetch_branch(&state.pool, id).await?;
    require_access(Some(&principal), Action::Read, &ResourceRef::branch(id))?;

    Ok(Json(branch))
}

#[utoipa::path(
    put,
    path = "/branches/{id}",
    tag = "Branches",
    params(("id" = Uuid, Path, description = "Branch id")),
    request_body = BranchUpdateRequest,
    responses((status = 200, description = "Branch updated", body = Branch))
)]
pub async fn update_branch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BranchUpdateRequest>,
) -> AppResult<Json<Branch>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::Branch)?;

    let mut branch = fetch_branch(&state.pool, id).await?;
    let before = branch.clone();

    if let Some(name) = payload.name.as_ref() {
        branch.name = name.clone();
    }
    if payload.country.is_some() {
        branch.country = payload.country.clone();
    }
    if payload.city.is_some() {
        branch.city = payload.city.clone();
    }
    if let Some(address) = payload.address.as_ref() {
        branch.address = address.clone();
    }

    let now = utc_now();
    sqlx::query("UPDATE branches SET name = ?, country = ?, city = ?, address = ?, updated_at = ? WHERE id = ?")
        .bind(&branch.name)
        .bind(&branch.country)
        .bind(&branch.city)
        .bind(&branch.address)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    branch.updated_at = now;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &branch, Some(&before));

    Ok(Json(branch))
}

#[utoipa::path(
    delete,
    path = "/branches/{id}",
    tag = "Branches",
    params(("id" = Uuid, Path, description = "Branch id")),
    responses(
        (status = 204, description = "Branch deleted"),
        (status = 409, description = "Branch still has dependent records")
    )
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::Branch)?;

    let branch = fetch_branch(&state.pool, id).await?;

    // A branch with people attached cannot be removed; the caller has to
    // move or delete the dependents first.
    let employees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE branch_id = ?")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    let students: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE branch_id = ?")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    if employees > 0 || students > 0 {
        return Err(AppError::conflict(format!(
            "branch '{}' still has {} employee(s) and {} student(s)",
            branch.name, employees, students
        )));
    }

    sqlx::query("DELETE FROM branches WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &branch);

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_branch(pool: &SqlitePool, branch_id: Uuid) -> AppResult<Branch> {
    sqlx::query_as::<_, Branch>(
        "SELECT id, name, country, city, address, created_at, updated_at FROM branches WHERE id = ?",
    )
    .bind(branch_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("branch not found"))
}
