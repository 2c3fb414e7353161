use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::login,
        routes::auth::me,
        routes::auth::change_password,
        routes::users::list_users,
        routes::users::create_user,
        routes::users::get_user,
        routes::users::update_user,
        routes::users::delete_user,
        routes::users::reset_passwords,
        routes::branches::list_branches,
        routes::branches::create_branch,
        routes::branches::get_branch,
        routes::branches::update_branch,
        routes::branches::delete_branch,
        routes::employees::list_employees,
        routes::employees::create_employee,
        routes::employees::get_employee,
        routes::employees::update_employee,
        routes::employees::delete_employee,
        routes::students::list_students,
        routes::students::create_student,
        routes::students::get_student,
        routes::students::update_student,
        routes::students::delete_student,
        routes::leads::list_leads,
        routes::leads::create_lead,
        routes::leads::get_lead,
        routes::leads::update_lead,
        routes::leads::delete_lead,
        routes::jobs::list_jobs,
        routes::jobs::create_job,
        routes::jobs::get_job,
        routes::jobs::update_job,
        routes::jobs::delete_job,
        routes::jobs::list_job_responses,
        routes::jobs::create_job_response,
        routes::jobs::get_job_response,
        routes::jobs::update_job_response,
        routes::jobs::delete_job_response,
        routes::blogs::list_blogs,
        routes::blogs::create_blog,
        routes::blogs::get_blog,
        routes::blogs::update_blog,
        routes::blogs::delete_blog,
        routes::attendance::list_employee_attendance,
        routes::attendance::mark_employee_attendance,
        routes::attendance::list_student_attendance,
        routes::attendance::mark_student_attendance,
        routes::health::health
    ),
    components(
        schemas(
            authz::Role,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::UserCreateRequest,
            models::user::UserUpdateRequest,
            models::user::ChangePasswordRequest,
            models::branch::Branch,
            models::branch::BranchCreateRequest,
            models::branch::BranchUpdateRequest,
            models::employee::Employee,
            models::employee::EmployeeCreateRequest,
            models::employee::EmployeeUpdateRequest,
            models::student::Student,
            models::student::StudentCreateRequest,
            models::student::StudentUpdateRequest,
            models::lead::Lead,
            models::lead::LeadCreateRequest,
            models::lead::LeadUpdateRequest,
            models::job::Job,
            models::job::JobCreateRequest,
            models::job::JobUpdateRequest,
            models::job::JobResponse,
            models::job::JobResponseCreateRequest,
            models::job::JobResponseUpdateRequest,
            models::blog::Blog,
            models::blog::BlogCreateRequest,
            models::blog::BlogUpdateRequest,
            models::attendance::EmployeeAttendance,
            models::attendance::StudentAttendance,
            models::attendance::AttendanceMarkRequest,
            routes::users::PasswordResetSummary,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Authentication and credential rotation"),
        (name = "Users", description = "Account management"),
        (name = "Branches", description = "Branch management"),
        (name = "Employees", description = "Employee profiles"),
        (name = "Students", description = "Student profiles"),
        (name = "Leads", description = "Enquiry pipeline"),
        (name = "Jobs", description = "Job postings and applications"),
        (name = "Blogs", description = "Blog posts"),
        (name = "Attendance", description = "Daily attendance"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

    normalize_path_operations(&mut doc);
    ensure_security_components(&mut doc);
    ensure_global_security(&mut doc);
    ensure_openapi_version(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}

/// Lowercase and dedupe method keys so the Swagger parser never sees a
/// duplicated mapping key.
fn normalize_path_operations(doc: &mut Value) {
    if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
        let snapshot = paths.clone();
        for (path, item) in snapshot {
            if let Some(ops) = item.as_object() {
                let mut normalized = Map::new();
                for (method, val) in ops {
                    let key = method.to_lowercase();
                    if let Some(existing) = normalized.get_mut(&key) {
                        merge_values(existing, val);
                    } else {
                        normalized.insert(key, val.clone());
                    }
                }
                paths.insert(path, Value::Object(normalized));
            }
        }
    }
}

fn ensure_security_components(doc: &mut Value) {
    let components = doc
        .as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("components must be an object");

    let schemes = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("securitySchemes must be an object");

    schemes.insert(
        "bearerAuth".to_string(),
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }),
    );
}

fn ensure_global_security(doc: &mut Value) {
    doc.as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("security")
        .or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn ensure_openapi_version(doc: &mut Value) {
    doc.as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("openapi")
        .or_insert_with(|| Value::String("3.1.0".to_string()));
}

fn ensure_servers(doc: &mut Value, port: u16) {
    let server_url = format!("http://localhost:{}", port);

    match doc.get_mut("servers") {
        Some(Value::Array(arr)) => {
            let has = arr
                .iter()
                .any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
            if !has {
                arr.push(json!({ "url": server_url }));
            }
        }
        _ => {
            doc["servers"] = json!([{ "url": server_url }]);
        }
    }
}

fn merge_values(target: &mut Value, addition: &Value) {
    match (target, addition) {
        (Value::Object(dest), Value::Object(src)) => {
            for (key, value) in src {
                if let Some(existing) = dest.get_mut(key) {
                    merge_values(existing, value);
                } else {
                    dest.insert(key.clone(), value.clone());
                }
            }
        }
        (Value::Array(dest), Value::Array(src)) => {
            for item in src {
                if !dest.contains(item) {
                    dest.push(item.clone());
                }
            }
        }
        _ => {}
    }
}
