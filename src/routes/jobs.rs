use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_old};
use crate::jwt::{AuthUser, MaybeAuthUser};
use crate::models::job::{
    Job, JobCreateRequest, JobResponse, JobResponseCreateRequest, JobResponseUpdateRequest,
    JobUpdateRequest,
};
use crate::routes::branches::fetch_branch;
use crate::routes::leads::resolve_branch;
use crate::routes::{require, require_access};
use crate::utils::utc_now;

const JOB_COLUMNS: &str = "id, title, description, requirements, branch_id, job_type, salary_range, location, required_experience, is_active, created_by, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    responses((status = 200, description = "List visible job postings", body = [Job]))
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    maybe_auth: MaybeAuthUser,
) -> AppResult<Json<Vec<Job>>> {
    let principal = resolve_maybe(&state.pool, &maybe_auth).await?;

    let filter = read_scopes(principal.as_ref(), ResourceKind::Job);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to job postings"));
    }

    let jobs = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    let jobs: Vec<Job> = jobs
        .into_iter()
        .filter(|j| filter.matches(&ResourceRef::job(j.branch_id, j.created_by, j.is_active)))
        .collect();

    Ok(Json(jobs))
}

#[utoipa::path(
    post,
    path = "/jobs",
    tag = "Jobs",
    request_body = JobCreateRequest,
    responses((status = 201, description = "Job created", body = Job))
)]
pub async fn create_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<JobCreateRequest>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::Job)?;

    let branch_id = resolve_branch(&principal, payload.branch_id)?;
    require_access(
        Some(&principal),
        Action::Create,
        &ResourceRef::job(branch_id, principal.user_id, true),
    )?;
    fetch_branch(&state.pool, branch_id).await?;

    let job_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO jobs (id, title, description, requirements, branch_id, job_type, salary_range, location, required_experience, is_active, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.requirements)
    .bind(branch_id)
    .bind(payload.job_type.as_deref().unwrap_or("Full Time"))
    .bind(&payload.salary_range)
    .bind(payload.location.as_deref().unwrap_or(""))
    .bind(payload.required_experience.as_deref().unwrap_or("None"))
    .bind(payload.is_active.unwrap_or(true))
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let job = fetch_job(&state.pool, job_id).await?;
    log_activity(&state.events, "created", Some(principal.user_id), &job);

    Ok((StatusCode::CREATED, Json(job)))
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses((status = 200, description = "Job detail", body = Job))
)]
pub async fn get_job(
    State(state): State<AppState>,
    maybe_auth: MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    let principal = resolve_maybe(&state.pool, &maybe_auth).await?;

    let job = fetch_job(&state.pool, id).await?;
    require_access(
        principal.as_ref(),
        Action::Read,
        &ResourceRef::job(job.branch_id, job.created_by, job.is_active),
    )?;

    Ok(Json(job))
}

#[utoipa::path(
    put,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = JobUpdateRequest,
    responses((status = 200, description = "Job updated", body = Job))
)]
pub async fn update_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<JobUpdateRequest>,
) -> AppResult<Json<Job>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::Job)?;

    let mut job = fetch_job(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Update,
        &ResourceRef::job(job.branch_id, job.created_by, job.is_active),
    )?;

    let before = job.clone();

    if let Some(title) = payload.title.as_ref() {
        job.title = title.clone();
    }
    if let Some(description) = payload.description.as_ref() {
        job.description = description.clone();
    }
    if let Some(requirements) = payload.requirements.as_ref() {
        job.requirements = requirements.clone();
    }
    if let Some(job_type) = payload.job_type.as_ref() {
        job.job_type = job_type.clone();
    }
    if payload.salary_range.is_some() {
        job.salary_range = payload.salary_range.clone();
    }
    if let Some(location) = payload.location.as_ref() {
        job.location = location.clone();
    }
    if let Some(required_experience) = payload.required_experience.as_ref() {
        job.required_experience = required_experience.clone();
    }
    if let Some(is_active) = payload.is_active {
        job.is_active = is_active;
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE jobs SET title = ?, description = ?, requirements = ?, job_type = ?, salary_range = ?, location = ?, required_experience = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.requirements)
    .bind(&job.job_type)
    .bind(&job.salary_range)
    .bind(&job.location)
    .bind(&job.required_experience)
    .bind(job.is_active)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    job.updated_at = now;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &job, Some(&before));

    Ok(Json(job))
}

#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses((status = 204, description = "Job deleted"))
)]
pub async fn delete_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::Job)?;

    let job = fetch_job(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Delete,
        &ResourceRef::job(job.branch_id, job.created_by, job.is_active),
    )?;

    // Applications cascade with the posting.
    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &job);

    Ok(StatusCode::NO_CONTENT)
}

/// Application row joined with the policy-relevant facts of its parent job.
#[derive(Debug, Clone, FromRow)]
struct JobResponseRow {
    id: Uuid,
    job_id: Uuid,
    name: String,
    email: String,
    phone: String,
    cover_letter: Option<String>,
    status: String,
    applicant_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    job_branch_id: Uuid,
    job_created_by: Uuid,
}

const JOB_RESPONSE_COLUMNS: &str = "r.id, r.job_id, r.name, r.email, r.phone, r.cover_letter, r.status, r.applicant_id, r.created_at, r.updated_at, j.branch_id AS job_branch_id, j.created_by AS job_created_by";

impl JobResponseRow {
    fn resource_ref(&self) -> ResourceRef {
        ResourceRef::job_response(self.job_branch_id, self.job_created_by, self.applicant_id)
    }

    fn into_response(self) -> JobResponse {
        JobResponse {
            id: self.id,
            job_id: self.job_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            cover_letter: self.cover_letter,
            status: self.status,
            applicant_id: self.applicant_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/job-responses",
    tag = "Jobs",
    responses((status = 200, description = "List visible job applications", body = [JobResponse]))
)]
pub async fn list_job_responses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<JobResponse>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::JobResponse);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to job applications"));
    }

    let rows = sqlx::query_as::<_, JobResponseRow>(&format!(
        "SELECT {JOB_RESPONSE_COLUMNS} FROM job_responses r JOIN jobs j ON j.id = r.job_id ORDER BY r.created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    let responses: Vec<JobResponse> = rows
        .into_iter()
        .filter(|row| filter.matches(&row.resource_ref()))
        .map(JobResponseRow::into_response)
        .collect();

    Ok(Json(responses))
}

#[utoipa::path(
    post,
    path = "/job-responses",
    tag = "Jobs",
    request_body = JobResponseCreateRequest,
    responses(
        (status = 201, description = "Application submitted", body = JobResponse),
        (status = 400, description = "Job is not accepting applications")
    )
)]
pub async fn create_job_response(
    State(state): State<AppState>,
    maybe_auth: MaybeAuthUser,
    Json(payload): Json<JobResponseCreateRequest>,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let principal = resolve_maybe(&state.pool, &maybe_auth).await?;
    require(principal.as_ref(), Action::Create, ResourceKind::JobResponse)?;

    let job = fetch_job(&state.pool, payload.job_id).await?;
    if !job.is_active {
        return Err(AppError::bad_request("job is not accepting applications"));
    }

    // Authenticated student applications get stamped so the student can see
    // their own submissions later.
    let applicant_id = principal
        .as_ref()
        .filter(|p| p.role == Role::Student)
        .map(|p| p.user_id);

    let response_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO job_responses (id, job_id, name, email, phone, cover_letter, status, applicant_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 'New', ?, ?, ?)",
    )
    .bind(response_id)
    .bind(job.id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.cover_letter)
    .bind(applicant_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let row = fetch_job_response(&state.pool, response_id).await?;
    let response = row.into_response();
    log_activity(&state.events, "created", principal.map(|p| p.user_id), &response);

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/job-responses/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Application id")),
    responses((status = 200, description = "Application detail", body = JobResponse))
)]
pub async fn get_job_response(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<JobResponse>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let row = fetch_job_response(&state.pool, id).await?;
    require_access(Some(&principal), Action::Read, &row.resource_ref())?;

    Ok(Json(row.into_response()))
}

#[utoipa::path(
    put,
    path = "/job-responses/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Application id")),
    request_body = JobResponseUpdateRequest,
    responses((status = 200, description = "Application updated", body = JobResponse))
)]
pub async fn update_job_response(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<JobResponseUpdateRequest>,
) -> AppResult<Json<JobResponse>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::JobResponse)?;

    let row = fetch_job_response(&state.pool, id).await?;
    require_access(Some(&principal), Action::Update, &row.resource_ref())?;

    let before = row.clone().into_response();
    let status = payload.status.unwrap_or_else(|| row.status.clone());

    let now = utc_now();
    sqlx::query("UPDATE job_responses SET status = ?, updated_at = ? WHERE id = ?")
        .bind(&status)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    let row = fetch_job_response(&state.pool, id).await?;
    let response = row.into_response();
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &response, Some(&before));

    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/job-responses/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Application id")),
    responses((status = 204, description = "Application deleted"))
)]
pub async fn delete_job_response(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::JobResponse)?;

    let row = fetch_job_response(&state.pool, id).await?;
    require_access(Some(&principal), Action::Delete, &row.resource_ref())?;

    let response = row.into_response();
    sqlx::query("DELETE FROM job_responses WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &response);

    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a principal for endpoints on the public surface. Anonymous
/// callers stay anonymous; a bearer token must still resolve cleanly.
pub(crate) async fn resolve_maybe(
    pool: &SqlitePool,
    maybe_auth: &MaybeAuthUser,
) -> AppResult<Option<Principal>> {
    match &maybe_auth.0 {
        Some(auth) => Ok(Some(Principal::resolve(pool, auth.user_id).await?)),
        None => Ok(None),
    }
}

pub(crate) async fn fetch_job(pool: &SqlitePool, job_id: Uuid) -> AppResult<Job> {
    sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("job not found"))
}

async fn fetch_job_response(pool: &SqlitePool, response_id: Uuid) -> AppResult<JobResponseRow> {
    sqlx::query_as::<_, JobResponseRow>(&format!(
        "SELECT {JOB_RESPONSE_COLUMNS} FROM job_responses r JOIN jobs j ON j.id = r.job_id WHERE r.id = ?"
    ))
    .bind(response_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("job application not found"))
}
