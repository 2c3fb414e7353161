use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_old};
use crate::jwt::AuthUser;
use crate::models::student::{DbStudent, Student, StudentCreateRequest, StudentUpdateRequest};
use crate::models::user::DbUser;
use crate::routes::branches::fetch_branch;
use crate::routes::users::{ensure_email_free, issue_password};
use crate::routes::{auth::fetch_user, require, require_access};
use crate::utils::{hash_password, utc_now};

const STUDENT_COLUMNS: &str = "id, user_id, branch_id, student_code, age, gender, nationality, contact_number, address, institution_name, language_test, emergency_contact, enrollment_date, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/students",
    tag = "Students",
    responses((status = 200, description = "List visible students", body = [Student]))
)]
pub async fn list_students(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Student>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::Student);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to students"));
    }

    let profiles = sqlx::query_as::<_, DbStudent>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students ORDER BY created_at DESC"
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
        if !filter.matches(&ResourceRef::student(profile.branch_id, profile.user_id)) {
            continue;
        }
        let user = users
            .remove(&profile.user_id)
            .ok_or_else(|| AppError::internal("student profile without user account"))?;
        visible.push(Student::from_parts(profile, user)?);
    }

    Ok(Json(visible))
}

#[utoipa::path(
    post,
    path = "/students",
    tag = "Students",
    request_body = StudentCreateRequest,
    responses(
        (status = 201, description = "Student created", body = Student),
        (status = 409, description = "Duplicate email or student code")
    )
)]
pub async fn create_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<StudentCreateRequest>,
) -> AppResult<(StatusCode, Json<Student>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::Student)?;

    let user_id = Uuid::new_v4();
    require_access(
        Some(&principal),
        Action::Create,
        &ResourceRef::student(payload.branch_id, user_id),
    )?;

    fetch_branch(&state.pool, payload.branch_id).await?;
    ensure_email_free(&state.pool, &payload.user.email, None).await?;
    ensure_code_free(&state.pool, &payload.student_code).await?;

    let (password, is_default) = issue_password(Role::Student, payload.user.password.as_deref())?;
    let password_hash = hash_password(&password)?;

    let student_id = Uuid::new_v4();
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
    .bind(Role::Student.as_str())
    .bind(is_default)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO students (id, user_id, branch_id, student_code, age, gender, nationality, contact_number, address, institution_name, language_test, emergency_contact, enrollment_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(user_id)
    .bind(payload.branch_id)
    .bind(&payload.student_code)
    .bind(payload.age.unwrap_or(0))
    .bind(payload.gender.as_deref().unwrap_or("Unspecified"))
    .bind(payload.nationality.as_deref().unwrap_or("Nepalese"))
    .bind(&payload.contact_number)
    .bind(&payload.address)
    .bind(payload.institution_name.as_deref().unwrap_or(""))
    .bind(payload.language_test.as_deref().unwrap_or("None"))
    .bind(&payload.emergency_contact)
    .bind(now.date_naive())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let (profile, user) = fetch_student(&state.pool, student_id).await?;
    let student = Student::from_parts(profile, user)?;
    log_activity(&state.events, "created", Some(principal.user_id), &student);

    Ok((StatusCode::CREATED, Json(student)))
}

#[utoipa::path(
    get,
    path = "/students/{id}",
    tag = "Students",
    params(("id" = Uuid, Path, description = "Student id")),
    responses((status = 200, description = "Student detail", body = Student))
)]
pub async fn get_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Student>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let (profile, user) = fetch_student(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Read,
        &ResourceRef::student(profile.branch_id, profile.user_id),
    )?;

    Ok(Json(Student::from_parts(profile, user)?))
}

#[utoipa::path(
    put,
    path = "/students/{id}",
    tag = "Students",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = StudentUpdateRequest,
    responses((status = 200, description = "Student updated", body = Student))
)]
pub async fn update_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StudentUpdateRequest>,
) -> AppResult<Json<Student>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::Student)?;

    let (mut profile, mut user) = fetch_student(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Update,
        &ResourceRef::student(profile.branch_id, profile.user_id),
    )?;

    let before = Student::from_parts(profile.clone(), user.clone())?;

    if let Some(branch) = payload.branch_id {
        if branch != profile.branch_id {
            if !principal.is_super_admin() {
                return Err(AppError::forbidden("branch moves require SuperAdmin"));
            }
            fetch_branch(&state.pool, branch).await?;
            profile.branch_id = branch;
        }
    }

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
    if let Some(age) = payload.age {
        profile.age = age;
    }
    if let Some(gender) = payload.gender.as_ref() {
        profile.gender = gender.clone();
    }
    if let Some(nationality) = payload.nationality.as_ref() {
        profile.nationality = nationality.clone();
    }
    if let Some(contact_number) = payload.contact_number.as_ref() {
        profile.contact_number = contact_number.clone();
    }
    if let Some(address) = payload.address.as_ref() {
        profile.address = address.clone();
    }
    if let Some(institution_name) = payload.institution_name.as_ref() {
        profile.institution_name = institution_name.clone();
    }
    if let Some(language_test) = payload.language_test.as_ref() {
        profile.language_test = language_test.clone();
    }
    if payload.emergency_contact.is_some() {
        profile.emergency_contact = payload.emergency_contact.clone();
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

    sqlx::query(
        "UPDATE students SET branch_id = ?, age = ?, gender = ?, nationality = ?, contact_number = ?, address = ?, institution_name = ?, language_test = ?, emergency_contact = ?, updated_at = ? WHERE id = ?",
    )
    .bind(profile.branch_id)
    .bind(profile.age)
    .bind(&profile.gender)
    .bind(&profile.nationality)
    .bind(&profile.contact_number)
    .bind(&profile.address)
    .bind(&profile.institution_name)
    .bind(&profile.language_test)
    .bind(&profile.emergency_contact)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let (profile, user) = fetch_student(&state.pool, id).await?;
    let student = Student::from_parts(profile, user)?;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &student, Some(&before));

    Ok(Json(student))
}

#[utoipa::path(
    delete,
    path = "/students/{id}",
    tag = "Students",
    params(("id" = Uuid, Path, description = "Student id")),
    responses((status = 204, description = "Student and account deleted"))
)]
pub async fn delete_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::Student)?;

    let (profile, user) = fetch_student(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Delete,
        &ResourceRef::student(profile.branch_id, profile.user_id),
    )?;

    let student = Student::from_parts(profile, user)?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(student.user.id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &student);

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_student(pool: &SqlitePool, student_id: Uuid) -> AppResult<(DbStudent, DbUser)> {
    let profile = sqlx::query_as::<_, DbStudent>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"
    ))
    .bind(student_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("student not found"))?;

    let user = fetch_user(pool, profile.user_id).await?;
    Ok((profile, user))
}

async fn ensure_code_free(pool: &SqlitePool, code: &str) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM students WHERE student_code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::conflict("student code already in use"));
    }
    Ok(())
}
