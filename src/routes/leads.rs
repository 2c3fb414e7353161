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
use crate::models::lead::{Lead, LeadCreateRequest, LeadUpdateRequest};
use crate::routes::branches::fetch_branch;
use crate::routes::{require, require_access};
use crate::utils::utc_now;

const LEAD_COLUMNS: &str = "id, name, email, phone, nationality, branch_id, interested_country, interested_degree, language_test, language_score, lead_source, notes, created_by, assigned_to, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/leads",
    tag = "Leads",
    responses((status = 200, description = "List visible leads", body = [Lead]))
)]
pub async fn list_leads(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Lead>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::Lead);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to leads"));
    }

    let leads = sqlx::query_as::<_, Lead>(&format!(
        "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    let leads: Vec<Lead> = leads
        .into_iter()
        .filter(|l| filter.matches(&ResourceRef::lead(l.branch_id, l.created_by)))
        .collect();

    Ok(Json(leads))
}

#[utoipa::path(
    post,
    path = "/leads",
    tag = "Leads",
    request_body = LeadCreateRequest,
    responses((status = 201, description = "Lead created", body = Lead))
)]
pub async fn create_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<LeadCreateRequest>,
) -> AppResult<(StatusCode, Json<Lead>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::Lead)?;

    // Branch-scoped staff always write into their own branch; only
    // SuperAdmin picks one explicitly.
    let branch_id = resolve_branch(&principal, payload.branch_id)?;
    require_access(Some(&principal), Action::Create, &ResourceRef::lead(branch_id, None))?;
    fetch_branch(&state.pool, branch_id).await?;

    let lead_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO leads (id, name, email, phone, nationality, branch_id, interested_country, interested_degree, language_test, language_score, lead_source, notes, created_by, assigned_to, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(lead_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.nationality)
    .bind(branch_id)
    .bind(&payload.interested_country)
    .bind(&payload.interested_degree)
    .bind(payload.language_test.as_deref().unwrap_or("None"))
    .bind(payload.language_score)
    .bind(payload.lead_source.as_deref().unwrap_or("Walk-in"))
    .bind(&payload.notes)
    .bind(principal.user_id)
    .bind(payload.assigned_to)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let lead = fetch_lead(&state.pool, lead_id).await?;
    log_activity(&state.events, "created", Some(principal.user_id), &lead);

    Ok((StatusCode::CREATED, Json(lead)))
}

#[utoipa::path(
    get,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses((status = 200, description = "Lead detail", body = Lead))
)]
pub async fn get_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Lead>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let lead = fetch_lead(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Read,
        &ResourceRef::lead(lead.branch_id, lead.created_by),
    )?;

    Ok(Json(lead))
}

#[utoipa::path(
    put,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead id")),
    request_body = LeadUpdateRequest,
    responses((status = 200, description = "Lead updated", body = Lead))
)]
pub async fn update_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<LeadUpdateRequest>,
) -> AppResult<Json<Lead>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::Lead)?;

    let mut lead = fetch_lead(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Update,
        &ResourceRef::lead(lead.branch_id, lead.created_by),
    )?;

    let before = lead.clone();

    if let Some(name) = payload.name.as_ref() {
        lead.name = name.clone();
    }
    if let Some(email) = payload.email.as_ref() {
        lead.email = email.clone();
    }
    if let Some(phone) = payload.phone.as_ref() {
        lead.phone = phone.clone();
    }
    if let Some(nationality) = payload.nationality.as_ref() {
        lead.nationality = nationality.clone();
    }
    if payload.interested_country.is_some() {
        lead.interested_country = payload.interested_country.clone();
    }
    if payload.interested_degree.is_some() {
        lead.interested_degree = payload.interested_degree.clone();
    }
    if let Some(language_test) = payload.language_test.as_ref() {
        lead.language_test = language_test.clone();
    }
    if payload.language_score.is_some() {
        lead.language_score = payload.language_score;
    }
    if let Some(lead_source) = payload.lead_source.as_ref() {
        lead.lead_source = lead_source.clone();
    }
    if payload.notes.is_some() {
        lead.notes = payload.notes.clone();
    }
    if payload.assigned_to.is_some() {
        lead.assigned_to = payload.assigned_to;
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE leads SET name = ?, email = ?, phone = ?, nationality = ?, interested_country = ?, interested_degree = ?, language_test = ?, language_score = ?, lead_source = ?, notes = ?, assigned_to = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&lead.name)
    .bind(&lead.email)
    .bind(&lead.phone)
    .bind(&lead.nationality)
    .bind(&lead.interested_country)
    .bind(&lead.interested_degree)
    .bind(&lead.language_test)
    .bind(lead.language_score)
    .bind(&lead.lead_source)
    .bind(&lead.notes)
    .bind(lead.assigned_to)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    lead.updated_at = now;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &lead, Some(&before));

    Ok(Json(lead))
}

#[utoipa::path(
    delete,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 204, description = "Lead deleted"),
        (status = 403, description = "Lead deletion is SuperAdmin-only")
    )
)]
pub async fn delete_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::Lead)?;

    let lead = fetch_lead(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Delete,
        &ResourceRef::lead(lead.branch_id, lead.created_by),
    )?;

    sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &lead);

    Ok(StatusCode::NO_CONTENT)
}

/// Pick the branch a write lands in. Non-SuperAdmin staff are pinned to
/// their home branch; a request naming another branch is rejected object
/// level rather than silently rewritten.
pub(crate) fn resolve_branch(principal: &Principal, requested: Option<Uuid>) -> AppResult<Uuid> {
    if principal.is_super_admin() {
        return requested.ok_or_else(|| AppError::bad_request("branch_id is required"));
    }

    match (principal.home_branch, requested) {
        (Some(home), None) => Ok(home),
        (Some(home), Some(explicit)) if explicit == home => Ok(home),
        (Some(_), Some(explicit)) => Ok(explicit),
        (None, _) => Err(AppError::forbidden("no home branch on record")),
    }
}

pub(crate) async fn fetch_lead(pool: &SqlitePool, lead_id: Uuid) -> AppResult<Lead> {
    sqlx::query_as::<_, Lead>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
        .bind(lead_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("lead not found"))
}
