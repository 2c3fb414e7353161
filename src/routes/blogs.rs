use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{read_scopes, Action, Principal, ResourceKind, ResourceRef};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_old};
use crate::jwt::{AuthUser, MaybeAuthUser};
use crate::models::blog::{Blog, BlogCreateRequest, BlogUpdateRequest};
use crate::routes::branches::fetch_branch;
use crate::routes::jobs::resolve_maybe;
use crate::routes::leads::resolve_branch;
use crate::routes::{require, require_access};
use crate::utils::utc_now;

const BLOG_COLUMNS: &str = "id, title, content, branch_id, author_id, is_published, published_date, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/blogs",
    tag = "Blogs",
    responses((status = 200, description = "List visible blog posts", body = [Blog]))
)]
pub async fn list_blogs(
    State(state): State<AppState>,
    maybe_auth: MaybeAuthUser,
) -> AppResult<Json<Vec<Blog>>> {
    let principal = resolve_maybe(&state.pool, &maybe_auth).await?;

    let filter = read_scopes(principal.as_ref(), ResourceKind::Blog);
    if filter.is_deny_all() {
        return Err(AppError::forbidden("no read access to blog posts"));
    }

    let blogs = sqlx::query_as::<_, Blog>(&format!(
        "SELECT {BLOG_COLUMNS} FROM blogs ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    let blogs: Vec<Blog> = blogs
        .into_iter()
        .filter(|b| filter.matches(&ResourceRef::blog(b.branch_id, b.author_id, b.is_published)))
        .collect();

    Ok(Json(blogs))
}

#[utoipa::path(
    post,
    path = "/blogs",
    tag = "Blogs",
    request_body = BlogCreateRequest,
    responses((status = 201, description = "Blog post created", body = Blog))
)]
pub async fn create_blog(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BlogCreateRequest>,
) -> AppResult<(StatusCode, Json<Blog>)> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Create, ResourceKind::Blog)?;

    let branch_id = resolve_branch(&principal, payload.branch_id)?;
    require_access(
        Some(&principal),
        Action::Create,
        &ResourceRef::blog(branch_id, principal.user_id, true),
    )?;
    fetch_branch(&state.pool, branch_id).await?;

    let blog_id = Uuid::new_v4();
    let now = utc_now();
    let is_published = payload.is_published.unwrap_or(false);
    let published_date = is_published.then_some(now);

    sqlx::query(
        "INSERT INTO blogs (id, title, content, branch_id, author_id, is_published, published_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(blog_id)
    .bind(&payload.title)
    .bind(&payload.content)
    .bind(branch_id)
    .bind(principal.user_id)
    .bind(is_published)
    .bind(published_date)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let blog = fetch_blog(&state.pool, blog_id).await?;
    log_activity(&state.events, "created", Some(principal.user_id), &blog);

    Ok((StatusCode::CREATED, Json(blog)))
}

#[utoipa::path(
    get,
    path = "/blogs/{id}",
    tag = "Blogs",
    params(("id" = Uuid, Path, description = "Blog id")),
    responses((status = 200, description = "Blog detail", body = Blog))
)]
pub async fn get_blog(
    State(state): State<AppState>,
    maybe_auth: MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Blog>> {
    let principal = resolve_maybe(&state.pool, &maybe_auth).await?;

    let blog = fetch_blog(&state.pool, id).await?;
    require_access(
        principal.as_ref(),
        Action::Read,
        &ResourceRef::blog(blog.branch_id, blog.author_id, blog.is_published),
    )?;

    Ok(Json(blog))
}

#[utoipa::path(
    put,
    path = "/blogs/{id}",
    tag = "Blogs",
    params(("id" = Uuid, Path, description = "Blog id")),
    request_body = BlogUpdateRequest,
    responses((status = 200, description = "Blog updated", body = Blog))
)]
pub async fn update_blog(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BlogUpdateRequest>,
) -> AppResult<Json<Blog>> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Update, ResourceKind::Blog)?;

    let mut blog = fetch_blog(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Update,
        &ResourceRef::blog(blog.branch_id, blog.author_id, blog.is_published),
    )?;

    let before = blog.clone();
    let now = utc_now();

    if let Some(title) = payload.title.as_ref() {
        blog.title = title.clone();
    }
    if let Some(content) = payload.content.as_ref() {
        blog.content = content.clone();
    }
    if let Some(is_published) = payload.is_published {
        // First publish stamps the date; unpublishing clears it.
        if is_published && !blog.is_published {
            blog.published_date = Some(now);
        } else if !is_published {
            blog.published_date = None;
        }
        blog.is_published = is_published;
    }

    sqlx::query(
        "UPDATE blogs SET title = ?, content = ?, is_published = ?, published_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(blog.is_published)
    .bind(blog.published_date)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    blog.updated_at = now;
    log_activity_with_old(&state.events, "updated", Some(principal.user_id), &blog, Some(&before));

    Ok(Json(blog))
}

#[utoipa::path(
    delete,
    path = "/blogs/{id}",
    tag = "Blogs",
    params(("id" = Uuid, Path, description = "Blog id")),
    responses((status = 204, description = "Blog deleted"))
)]
pub async fn delete_blog(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = Principal::resolve(&state.pool, auth.user_id).await?;
    require(Some(&principal), Action::Delete, ResourceKind::Blog)?;

    let blog = fetch_blog(&state.pool, id).await?;
    require_access(
        Some(&principal),
        Action::Delete,
        &ResourceRef::blog(blog.branch_id, blog.author_id, blog.is_published),
    )?;

    sqlx::query("DELETE FROM blogs WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.events, "deleted", Some(principal.user_id), &blog);

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_blog(pool: &SqlitePool, blog_id: Uuid) -> AppResult<Blog> {
    sqlx::query_as::<_, Blog>(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = ?"))
        .bind(blog_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("blog not found"))
}
