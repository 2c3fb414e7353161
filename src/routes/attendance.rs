use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::attendance::{
    AttendanceListQuery, AttendanceMarkRequest, EmployeeAttendance, StudentAttendance,
};
use crate::routes::{require, require_access};
use crate::utils::{parse_date, utc_now};

const ATTENDANCE_COLUMNS: &str = "id, date, time_in, time_out, status, remarks, created_by, updated_by, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/attendance/employees",
    tag = "Attendance",
    params(("date" = Option<String>, Query, description = "Filter to one day, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Employee attendance records", body = [EmployeeAttendance]),
        (status = 400, description = "Malformed date filter")
    )
)]
pub async fn list_employee_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AttendanceListQuery>,
) -> AppResult<Json<Vec<EmployeeAttendance>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::Attendance);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to attendance"));
    }

    // Malformed filters are a 400, never a silent full-table answer.
    let date = query.date.as_deref().map(parse_date).transpose()?;

    let mut sql = format!(
        "SELECT {ATTENDANCE_COLUMNS}, employee_id FROM employee_attendance"
    );
    if date.is_some() {
        sql.push_str(" WHERE date = ?");
    }
    sql.push_str(" ORDER BY date DESC, created_at DESC");

    let mut q = sqlx::query_as::<_, EmployeeAttendance>(&sql);
    if let Some(date) = date {
        q = q.bind(date);
    }
    let records = q.fetch_all(&state.pool).await?;

    let branches = employee_branches(&state.pool).await?;
    let records: Vec<EmployeeAttendance> = records
        .into_iter()
        .filter(|r| {
            branches
                .get(&r.employee_id)
                .map(|branch| filter.matches(&ResourceRef::attendance(*branch)))
                .unwrap_or(false)
        })
        .collect();

    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/attendance/employees",
    tag = "Attendance",
    request_body = AttendanceMarkRequest,
    responses((status = 200, description = "Attendance marked (upserted for the day)", body = EmployeeAttendance))
)]
pub async fn mark_employee_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AttendanceMarkRequest>,
) -> AppResult<Json<EmployeeAttendance>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let branch: Uuid = sqlx::query_scalar("SELECT branch_id FROM employees WHERE id = ?")
        .bind(payload.person_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("employee not found"))?;

    // Marking twice on the same day is an update, which needs the update
    // grant rather than the create one.
    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM employee_attendance WHERE employee_id = ? AND date = ?",
    )
    .bind(payload.person_id)
    .bind(payload.date)
    .fetch_optional(&state.pool)
    .await?;

    let action = if existing.is_some() { Action::Update } else { Action::Create };
    require(Some(&principal), action, ResourceKind::Attendance)?;
    require_access(Some(&principal), action, &ResourceRef::attendance(branch))?;

    let now = utc_now();
    let status = payload.status.as_deref().unwrap_or("Present");

    sqlx::query(
        "INSERT INTO employee_attendance (id, employee_id, date, time_in, time_out, status, remarks, created_by, updated_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(employee_id, date) DO UPDATE SET time_in = excluded.time_in, time_out = excluded.time_out, status = excluded.status, remarks = excluded.remarks, updated_by = excluded.updated_by, updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(payload.person_id)
    .bind(payload.date)
    .bind(payload.time_in)
    .bind(payload.time_out)
    .bind(status)
    .bind(&payload.remarks)
    .bind(principal.user_id)
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let record = sqlx::query_as::<_, EmployeeAttendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS}, employee_id FROM employee_attendance WHERE employee_id = ? AND date = ?"
    ))
    .bind(payload.person_id)
    .bind(payload.date)
    .fetch_one(&state.pool)
    .await?;

    log_activity(&state.events, "marked", Some(principal.user_id), &record);

    Ok(Json(record))
}

#[utoipa::path(
    get,
    path = "/attendance/students",
    tag = "Attendance",
    params(("date" = Option<String>, Query, description = "Filter to one day, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Student attendance records", body = [StudentAttendance]),
        (status = 400, description = "Malformed date filter")
    )
)]
pub async fn list_student_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AttendanceListQuery>,
) -> AppResult<Json<Vec<StudentAttendance>>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let filter = read_scopes(Some(&principal), ResourceKind::Attendance);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to attendance"));
    }

    let date = query.date.as_deref().map(parse_date).transpose()?;

    let mut sql = format!(
        "SELECT {ATTENDANCE_COLUMNS}, student_id FROM student_attendance"
    );
    if date.is_some() {
        sql.push_str(" WHERE date = ?");
    }
    sql.push_str(" ORDER BY date DESC, created_at DESC");

    let mut q = sqlx::query_as::<_, StudentAttendance>(&sql);
    if let Some(date) = date {
        q = q.bind(date);
    }
    let records = q.fetch_all(&state.pool).await?;

    let branches = student_branches(&state.pool).await?;
    let records: Vec<StudentAttendance> = records
        .into_iter()
        .filter(|r| {
            branches
                .get(&r.student_id)
                .map(|branch| filter.matches(&ResourceRef::attendance(*branch)))
                .unwrap_or(false)
        })
        .collect();

    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/attendance/students",
    tag = "Attendance",
    request_body = AttendanceMarkRequest,
    responses((status = 200, description = "Attendance marked (upserted for the day)", body = StudentAttendance))
)]
pub async fn mark_student_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AttendanceMarkRequest>,
) -> AppResult<Json<StudentAttendance>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;

    let branch: Uuid = sqlx::query_scalar("SELECT branch_id FROM students WHERE id = ?")
        .bind(payload.person_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))?;

    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM student_attendance WHERE student_id = ? AND date = ?",
    )
    .bind(payload.person_id)
    .bind(payload.date)
    .fetch_optional(&state.pool)
    .await?;

    let action = if existing.is_some() { Action::Update } else { Action::Create };
    require(Some(&principal), action, ResourceKind::Attendance)?;
    require_access(Some(&principal), action, &ResourceRef::attendance(branch))?;

    let now = utc_now();
    let status = payload.status.as_deref().unwrap_or("Present");

    sqlx::query(
        "INSERT INTO student_attendance (id, student_id, date, time_in, time_out, status, remarks, created_by, updated_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(student_id, date) DO UPDATE SET time_in = excluded.time_in, time_out = excluded.time_out, status = excluded.status, remarks = excluded.remarks, updated_by = excluded.updated_by, updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(payload.person_id)
    .bind(payload.date)
    .bind(payload.time_in)
    .bind(payload.time_out)
    .bind(status)
    .bind(&payload.remarks)
    .bind(principal.user_id)
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let record = sqlx::query_as::<_, StudentAttendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS}, student_id FROM student_attendance WHERE student_id = ? AND date = ?"
    ))
    .bind(payload.person_id)
    .bind(payload.date)
    .fetch_one(&state.pool)
    .await?;

    log_activity(&state.events, "marked", Some(principal.user_id), &record);

    Ok(Json(record))
}

async fn employee_branches(pool: &SqlitePool) -> AppResult<HashMap<Uuid, Uuid>> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as("SELECT id, branch_id FROM employees")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

async fn student_branches(pool: &SqlitePool) -> AppResult<HashMap<Uuid, Uuid>> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as("SELECT id, branch_id FROM students")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}
