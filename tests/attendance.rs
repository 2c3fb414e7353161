//! Attendance marking: the per-day upsert, the date filter and branch
//! scoping of the registers.

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

fn token_for(user: Uuid) -> Result<String> {
    Ok(JwtConfig::from_env()?.encode(user)?)
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

async fn create_branch(app: &axum::Router, token: &str, name: &str) -> Result<Value> {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/branches",
            Some(token),
            Some(json!({"name": name, "address": "Main Road"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

async fn create_employee(
    app: &axum::Router,
    token: &str,
    branch: &Value,
    role: &str,
    code: &str,
    email: &str,
) -> Result<Value> {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/employees",
            Some(token),
            Some(json!({
                "user": {"first_name": "Staff", "last_name": "Member", "email": email, "role": role},
                "branch_id": branch["id"],
                "employee_code": code,
                "contact_number": "9800000000",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

#[tokio::test]
async fn malformed_date_filter_is_rejected() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let token = token_for(admin)?;

    for uri in [
        "/attendance/employees?date=not-a-date",
        "/attendance/students?date=2026-13-40",
    ] {
        let resp = app.clone().oneshot(request("GET", uri, Some(&token), None)?).await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri {uri}");
    }

    let resp = app
        .clone()
        .oneshot(request("GET", "/attendance/employees?date=2026-08-29", Some(&token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn marking_twice_on_one_day_updates_in_place() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch = create_branch(&app, &admin_token, "Kathmandu").await?;
    let manager =
        create_employee(&app, &admin_token, &branch, "BranchManager", "EMP-001", "mgr@example.com")
            .await?;
    let staff =
        create_employee(&app, &admin_token, &branch, "Counsellor", "EMP-002", "cns@example.com")
            .await?;
    let manager_token = token_for(Uuid::parse_str(manager["user"]["id"].as_str().unwrap())?)?;
    let staff_id = staff["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/attendance/employees",
            Some(&manager_token),
            Some(json!({
                "person_id": staff_id,
                "date": "2026-08-29",
                "time_in": "09:00:00",
                "status": "Present"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let first = body_json(resp).await?;
    assert_eq!(first["status"], json!("Present"));
    assert!(first["time_out"].is_null());

    // Second mark for the same person and day folds into the existing row.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/attendance/employees",
            Some(&manager_token),
            Some(json!({
                "person_id": staff_id,
                "date": "2026-08-29",
                "time_in": "09:00:00",
                "time_out": "17:30:00",
                "status": "Present",
                "remarks": "left on time"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let second = body_json(resp).await?;
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["time_out"], json!("17:30:00"));

    let resp = app
        .clone()
        .oneshot(request("GET", "/attendance/employees?date=2026-08-29", Some(&manager_token), None)?)
        .await?;
    let list = body_json(resp).await?;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employee_attendance")
        .fetch_one(&pool)
        .await?;
    assert_eq!(rows, 1);

    Ok(())
}

#[tokio::test]
async fn counsellors_read_but_never_mark() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch = create_branch(&app, &admin_token, "Kathmandu").await?;
    let counsellor =
        create_employee(&app, &admin_token, &branch, "Counsellor", "EMP-001", "cns@example.com")
            .await?;
    let counsellor_token = token_for(Uuid::parse_str(counsellor["user"]["id"].as_str().unwrap())?)?;
    let counsellor_id = counsellor["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/attendance/employees",
            Some(&counsellor_token),
            Some(json!({
                "person_id": counsellor_id,
                "date": "2026-08-29",
                "status": "Present"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request("GET", "/attendance/employees", Some(&counsellor_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn registers_are_branch_scoped() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch_x = create_branch(&app, &admin_token, "Kathmandu").await?;
    let branch_y = create_branch(&app, &admin_token, "Pokhara").await?;
    let manager_x =
        create_employee(&app, &admin_token, &branch_x, "BranchManager", "EMP-001", "mgrx@example.com")
            .await?;
    let manager_y =
        create_employee(&app, &admin_token, &branch_y, "BranchManager", "EMP-002", "mgry@example.com")
            .await?;
    let token_x = token_for(Uuid::parse_str(manager_x["user"]["id"].as_str().unwrap())?)?;
    let token_y = token_for(Uuid::parse_str(manager_y["user"]["id"].as_str().unwrap())?)?;

    // Each manager marks themselves present.
    for (token, profile) in [(&token_x, &manager_x), (&token_y, &manager_y)] {
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/attendance/employees",
                Some(token),
                Some(json!({
                    "person_id": profile["id"],
                    "date": "2026-08-29",
                    "status": "Present"
                })),
            )?)
            .await?;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // A manager cannot mark a person from another branch.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/attendance/employees",
            Some(&token_x),
            Some(json!({
                "person_id": manager_y["id"],
                "date": "2026-08-29",
                "status": "Present"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Each register shows only the home-branch rows; SuperAdmin sees all.
    let resp = app
        .clone()
        .oneshot(request("GET", "/attendance/employees", Some(&token_x), None)?)
        .await?;
    let list = body_json(resp).await?;
    let visible = list.as_array().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["employee_id"], manager_x["id"]);

    let resp = app
        .clone()
        .oneshot(request("GET", "/attendance/employees", Some(&admin_token), None)?)
        .await?;
    let list = body_json(resp).await?;
    assert_eq!(list.as_array().unwrap().len(), 2);

    Ok(())
}
