//! Login, default credentials and password rotation.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use consult_admin::authz::Role;
use consult_admin::create_app;
use consult_admin::jwt::JwtConfig;
use consult_admin::utils::hash_password;

async fn setup() -> Result<(axum::Router, SqlitePool, TempDir)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;
    Ok((app, pool, dir))
}

async fn seed_super_admin(pool: &SqlitePool) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let hash = hash_password("password123")?;
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at) VALUES (?, 'Super', 'Admin', 'root@example.com', ?, ?, 0, ?, ?)",
    )
    .bind(id)
    .bind(&hash)
    .bind(Role::SuperAdmin.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    Ok(req)
}

async fn body_json(resp: axum::response::Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn login(app: &axum::Router, email: &str, password: &str) -> Result<axum::response::Response> {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        )?)
        .await?;
    Ok(resp)
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_super_admin(&pool).await?;

    // Wrong password and unknown account fail identically.
    let resp = login(&app, "root@example.com", "wrong-password").await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = login(&app, "nobody@example.com", "password123").await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = login(&app, "root@example.com", "password123").await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["email"], json!("root@example.com"));

    Ok(())
}

#[tokio::test]
async fn protected_routes_need_a_token() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    for uri in ["/auth/me", "/users", "/students", "/leads"] {
        let resp = app.clone().oneshot(request("GET", uri, None, None)?).await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "uri {uri}");
    }

    // A garbage token is rejected, not treated as anonymous.
    let resp = app
        .clone()
        .oneshot(request("GET", "/auth/me", Some("not-a-jwt"), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn default_credential_and_rotation() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = JwtConfig::from_env()?.encode(admin)?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/branches",
            Some(&admin_token),
            Some(json!({"name": "Kathmandu", "address": "Putalisadak"})),
        )?)
        .await?;
    let branch = body_json(resp).await?;

    // Created without a password: the shared default is issued and flagged.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/employees",
            Some(&admin_token),
            Some(json!({
                "user": {"first_name": "Anita", "last_name": "Rai", "email": "anita@example.com", "role": "Counsellor"},
                "branch_id": branch["id"],
                "employee_code": "EMP-001",
                "contact_number": "9800000001",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let employee = body_json(resp).await?;
    assert_eq!(employee["user"]["is_default_password"], json!(true));

    let resp = login(&app, "anita@example.com", "Nepal@123").await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let auth = body_json(resp).await?;
    let token = auth["user"]["id"].as_str().unwrap();
    let token = JwtConfig::from_env()?.encode(Uuid::parse_str(token)?)?;

    // Too-short replacement is refused before anything is written.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/auth/change-password",
            Some(&token),
            Some(json!({"current_password": "Nepal@123", "new_password": "short"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Wrong current password is refused.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/auth/change-password",
            Some(&token),
            Some(json!({"current_password": "guess", "new_password": "much-better-pass"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/auth/change-password",
            Some(&token),
            Some(json!({"current_password": "Nepal@123", "new_password": "much-better-pass"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await?;
    assert_eq!(updated["is_default_password"], json!(false));

    // Old credential is dead, the new one works.
    let resp = login(&app, "anita@example.com", "Nepal@123").await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = login(&app, "anita@example.com", "much-better-pass").await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn super_admin_creation_requires_explicit_password() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = JwtConfig::from_env()?.encode(admin)?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/users",
            Some(&admin_token),
            Some(json!({
                "first_name": "Second",
                "last_name": "Admin",
                "email": "admin2@example.com",
                "role": "SuperAdmin"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/users",
            Some(&admin_token),
            Some(json!({
                "first_name": "Second",
                "last_name": "Admin",
                "email": "admin2@example.com",
                "role": "SuperAdmin",
                "password": "strong-enough"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    assert_eq!(created["is_default_password"], json!(false));

    Ok(())
}
