use axum::extract::State;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, ChangePasswordRequest, DbUser, LoginRequest, User};
use crate::utils::{hash_password, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(user.id)?;
    let user: User = user.try_into()?;

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user = fetch_user(&state.pool, auth.user_id).await?;
    let user: User = user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = User),
        (status = 401, description = "Current password incorrect")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<User>> {
    let user = fetch_user(&state.pool, auth.user_id).await?;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AppError::unauthorized("current password incorrect"));
    }

    let password_hash = hash_password(&payload.new_password)?;
    let now = utc_now();

    // Rotating the credential clears the default-password flag.
    sqlx::query(
        "UPDATE users SET password_hash = ?, is_default_password = 0, updated_at = ? WHERE id = ?",
    )
    .bind(&password_hash)
    .bind(now)
    .bind(user.id)
    .execute(&state.pool)
    .await?;

    let user = fetch_user(&state.pool, auth.user_id).await?;
    let user: User = user.try_into()?;

    log_activity(&state.events, "password_changed", Some(auth.user_id), &user);

    Ok(Json(user))
}

pub(crate) async fn fetch_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
