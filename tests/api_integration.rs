//! End-to-end branch isolation: records created under one branch are visible
//! to that branch's staff and SuperAdmin, and invisible to other branches.

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

async fn seed_super_admin(pool: &SqlitePool, email: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let hash = hash_password("password123")?;
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, role, is_default_password, created_at, updated_at) VALUES (?, 'Super', 'Admin', ?, ?, ?, 0, ?, ?)",
    )
    .bind(id)
    .bind(email)
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

#[tokio::test]
async fn branch_isolation_end_to_end() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    let admin = seed_super_admin(&pool, "root@example.com").await?;
    let admin_token = token_for(admin)?;

    // SuperAdmin provisions two branches.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/branches",
            Some(&admin_token),
            Some(json!({"name": "Kathmandu", "address": "Putalisadak"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let branch_x = body_json(resp).await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/branches",
            Some(&admin_token),
            Some(json!({"name": "Pokhara", "address": "Lakeside"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let branch_y = body_json(resp).await?;

    // One manager per branch, created through the API with nested accounts.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/employees",
            Some(&admin_token),
            Some(json!({
                "user": {"first_name": "Anita", "last_name": "Rai", "email": "anita@example.com", "role": "BranchManager"},
                "branch_id": branch_x["id"],
                "employee_code": "EMP-001",
                "contact_number": "9800000001",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let manager_a = body_json(resp).await?;
    // No explicit password: the default credential is issued and flagged.
    assert_eq!(manager_a["user"]["is_default_password"], json!(true));

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/employees",
            Some(&admin_token),
            Some(json!({
                "user": {"first_name": "Bikash", "last_name": "KC", "email": "bikash@example.com", "role": "BranchManager"},
                "branch_id": branch_y["id"],
                "employee_code": "EMP-002",
                "contact_number": "9800000002",
                "address": "Pokhara"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let manager_b = body_json(resp).await?;

    let token_a = token_for(Uuid::parse_str(manager_a["user"]["id"].as_str().unwrap())?)?;
    let token_b = token_for(Uuid::parse_str(manager_b["user"]["id"].as_str().unwrap())?)?;

    // Manager A enrolls a student in their own branch.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/students",
            Some(&token_a),
            Some(json!({
                "user": {"first_name": "Sita", "last_name": "Gurung", "email": "sita@example.com"},
                "branch_id": branch_x["id"],
                "student_code": "STU-001",
                "contact_number": "9800000010",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let student = body_json(resp).await?;
    let student_id = student["id"].as_str().unwrap().to_string();

    // Visible to its own manager and to SuperAdmin.
    for token in [&token_a, &admin_token] {
        let resp = app
            .clone()
            .oneshot(request("GET", "/students", Some(token), None)?)
            .await?;
        assert_eq!(resp.status(), StatusCode::OK);
        let list = body_json(resp).await?;
        assert!(list
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["id"].as_str() == Some(&student_id)));
    }

    // Invisible to the other branch: filtered from the list, 403 on direct get.
    let resp = app
        .clone()
        .oneshot(request("GET", "/students", Some(&token_b), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await?;
    assert!(list.as_array().unwrap().is_empty());

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/students/{student_id}"), Some(&token_b), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/students/{student_id}"), Some(&token_a), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Manager A cannot write into the other branch either.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/students",
            Some(&token_a),
            Some(json!({
                "user": {"first_name": "Hari", "last_name": "Shrestha", "email": "hari@example.com"},
                "branch_id": branch_y["id"],
                "student_code": "STU-002",
                "contact_number": "9800000011",
                "address": "Pokhara"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Branch listings are scoped the same way.
    let resp = app
        .clone()
        .oneshot(request("GET", "/branches", Some(&token_a), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await?;
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Kathmandu"]);

    // The student sees exactly their own record.
    let student_token = token_for(Uuid::parse_str(student["user"]["id"].as_str().unwrap())?)?;
    let resp = app
        .clone()
        .oneshot(request("GET", "/students", Some(&student_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await?;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/students/{student_id}"), Some(&student_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn branch_moves_require_super_admin() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    let admin = seed_super_admin(&pool, "root@example.com").await?;
    let admin_token = token_for(admin)?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/branches",
            Some(&admin_token),
            Some(json!({"name": "Kathmandu", "address": "Putalisadak"})),
        )?)
        .await?;
    let branch_x = body_json(resp).await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/branches",
            Some(&admin_token),
            Some(json!({"name": "Pokhara", "address": "Lakeside"})),
        )?)
        .await?;
    let branch_y = body_json(resp).await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/employees",
            Some(&admin_token),
            Some(json!({
                "user": {"first_name": "Anita", "last_name": "Rai", "email": "anita@example.com", "role": "BranchManager"},
                "branch_id": branch_x["id"],
                "employee_code": "EMP-001",
                "contact_number": "9800000001",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    let manager = body_json(resp).await?;
    let manager_token = token_for(Uuid::parse_str(manager["user"]["id"].as_str().unwrap())?)?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/students",
            Some(&manager_token),
            Some(json!({
                "user": {"first_name": "Sita", "last_name": "Gurung", "email": "sita@example.com"},
                "branch_id": branch_x["id"],
                "student_code": "STU-001",
                "contact_number": "9800000010",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    let student = body_json(resp).await?;
    let student_id = student["id"].as_str().unwrap();

    // The manager can edit the student but cannot move them across branches.
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/students/{student_id}"),
            Some(&manager_token),
            Some(json!({"branch_id": branch_y["id"]})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/students/{student_id}"),
            Some(&manager_token),
            Some(json!({"address": "Baneshwor"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // SuperAdmin can.
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/students/{student_id}"),
            Some(&admin_token),
            Some(json!({"branch_id": branch_y["id"]})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let moved = body_json(resp).await?;
    assert_eq!(moved["branch_id"], branch_y["id"]);

    // After the move the old manager no longer sees the student.
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/students/{student_id}"), Some(&manager_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}
