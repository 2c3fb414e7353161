//! The unauthenticated surface: active jobs, published blogs and open
//! application submission.

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

#[tokio::test]
async fn anonymous_sees_active_jobs_and_published_blogs_only() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch = create_branch(&app, &admin_token, "Kathmandu").await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/jobs",
            Some(&admin_token),
            Some(json!({
                "title": "Open role",
                "description": "Counselling",
                "requirements": "2 years",
                "branch_id": branch["id"]
            })),
        )?)
        .await?;
    let active_job = body_json(resp).await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/jobs",
            Some(&admin_token),
            Some(json!({
                "title": "Closed role",
                "description": "Filled",
                "requirements": "None",
                "branch_id": branch["id"],
                "is_active": false
            })),
        )?)
        .await?;
    let inactive_job = body_json(resp).await?;

    let resp = app
        .clone()
        .oneshot(request("GET", "/jobs", None, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await?;
    let titles: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|j| j["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Open role"]);

    let active_id = active_job["id"].as_str().unwrap();
    let inactive_id = inactive_job["id"].as_str().unwrap();
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/jobs/{active_id}"), None, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/jobs/{inactive_id}"), None, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/blogs",
            Some(&admin_token),
            Some(json!({
                "title": "Visible post",
                "content": "Visa deadlines for the spring intake.",
                "branch_id": branch["id"],
                "is_published": true
            })),
        )?)
        .await?;
    let published = body_json(resp).await?;
    assert!(published["published_date"].is_string());

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/blogs",
            Some(&admin_token),
            Some(json!({
                "title": "Draft post",
                "content": "Unfinished.",
                "branch_id": branch["id"]
            })),
        )?)
        .await?;
    let draft = body_json(resp).await?;

    let resp = app
        .clone()
        .oneshot(request("GET", "/blogs", None, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await?;
    let titles: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Visible post"]);

    let draft_id = draft["id"].as_str().unwrap();
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/blogs/{draft_id}"), None, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn anonymous_can_apply_but_not_browse_applications() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch = create_branch(&app, &admin_token, "Kathmandu").await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/jobs",
            Some(&admin_token),
            Some(json!({
                "title": "Open role",
                "description": "Counselling",
                "requirements": "2 years",
                "branch_id": branch["id"]
            })),
        )?)
        .await?;
    let job = body_json(resp).await?;
    let job_id = job["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/job-responses",
            None,
            Some(json!({
                "job_id": job_id,
                "name": "Walk-in Applicant",
                "email": "walkin@example.com",
                "phone": "9822222222"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    assert_eq!(created["status"], json!("New"));
    assert!(created.get("applicant_id").is_none());

    // Submissions are write-only for the public.
    let resp = app
        .clone()
        .oneshot(request("GET", "/job-responses", None, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Closed postings take no applications.
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/jobs/{job_id}"),
            Some(&admin_token),
            Some(json!({"is_active": false})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/job-responses",
            None,
            Some(json!({
                "job_id": job_id,
                "name": "Too Late",
                "email": "late@example.com",
                "phone": "9833333333"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn student_applications_are_stamped_and_self_visible() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch = create_branch(&app, &admin_token, "Kathmandu").await?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/students",
            Some(&admin_token),
            Some(json!({
                "user": {"first_name": "Sita", "last_name": "Gurung", "email": "sita@example.com"},
                "branch_id": branch["id"],
                "student_code": "STU-001",
                "contact_number": "9800000010",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let student = body_json(resp).await?;
    let student_user = Uuid::parse_str(student["user"]["id"].as_str().unwrap())?;
    let student_token = token_for(student_user)?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/jobs",
            Some(&admin_token),
            Some(json!({
                "title": "Open role",
                "description": "Counselling",
                "requirements": "2 years",
                "branch_id": branch["id"]
            })),
        )?)
        .await?;
    let job = body_json(resp).await?;

    // An anonymous application and the student's own.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/job-responses",
            None,
            Some(json!({
                "job_id": job["id"],
                "name": "Walk-in Applicant",
                "email": "walkin@example.com",
                "phone": "9822222222"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/job-responses",
            Some(&student_token),
            Some(json!({
                "job_id": job["id"],
                "name": "Sita Gurung",
                "email": "sita@example.com",
                "phone": "9800000010"
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let own = body_json(resp).await?;
    assert_eq!(own["applicant_id"], json!(student_user.to_string()));

    // The student sees exactly their own submission, never the stranger's.
    let resp = app
        .clone()
        .oneshot(request("GET", "/job-responses", Some(&student_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await?;
    let visible = list.as_array().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["id"], own["id"]);

    Ok(())
}

#[tokio::test]
async fn staff_without_a_job_grant_are_refused_outright() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let admin = seed_super_admin(&pool).await?;
    let admin_token = token_for(admin)?;

    let branch = create_branch(&app, &admin_token, "Kathmandu").await?;
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/employees",
            Some(&admin_token),
            Some(json!({
                "user": {"first_name": "Cira", "last_name": "Lama", "email": "cira@example.com", "role": "Counsellor"},
                "branch_id": branch["id"],
                "employee_code": "EMP-001",
                "contact_number": "9800000001",
                "address": "Kathmandu"
            })),
        )?)
        .await?;
    let counsellor = body_json(resp).await?;
    let token = token_for(Uuid::parse_str(counsellor["user"]["id"].as_str().unwrap())?)?;

    // An authenticated role with no grant gets a hard 403, not an empty
    // list like the anonymous public would.
    for uri in ["/jobs", "/blogs", "/job-responses"] {
        let resp = app
            .clone()
            .oneshot(request("GET", uri, Some(&token), None)?)
            .await?;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "uri {uri}");
    }

    Ok(())
}
