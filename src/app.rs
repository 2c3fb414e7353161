use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{attendance, auth, blogs, branches, employees, health, jobs, leads, students, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub events: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, events: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            events,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/change-password", post(auth::change_password));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/", post(users::create_user))
        .route("/reset-passwords", post(users::reset_passwords))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id", delete(users::delete_user));

    let branch_routes = Router::new()
        .route("/", get(branches::list_branches))
        .route("/", post(branches::create_branch))
        .route("/:id", get(branches::get_branch))
        .route("/:id", put(branches::update_branch))
        .route("/:id", delete(branches::delete_branch));

    let employee_routes = Router::new()
        .route("/", get(employees::list_employees))
        .route("/", post(employees::create_employee))
        .route("/:id", get(employees::get_employee))
        .route("/:id", put(employees::update_employee))
        .route("/:id", delete(employees::delete_employee));

    let student_routes = Router::new()
        .route("/", get(students::list_students))
        .route("/", post(students::create_student))
        .route("/:id", get(students::get_student))
        .route("/:id", put(students::update_student))
        .route("/:id", delete(students::delete_student));

    let lead_routes = Router::new()
        .route("/", get(leads::list_leads))
        .route("/", post(leads::create_lead))
        .route("/:id", get(leads::get_lead))
        .route("/:id", put(leads::update_lead))
        .route("/:id", delete(leads::delete_lead));

    let job_routes = Router::new()
        .route("/", get(jobs::list_jobs))
        .route("/", post(jobs::create_job))
        .route("/:id", get(jobs::get_job))
        .route("/:id", put(jobs::update_job))
        .route("/:id", delete(jobs::delete_job));

    let job_response_routes = Router::new()
        .route("/", get(jobs::list_job_responses))
        .route("/", post(jobs::create_job_response))
        .route("/:id", get(jobs::get_job_response))
        .route("/:id", put(jobs::update_job_response))
        .route("/:id", delete(jobs::delete_job_response));

    let blog_routes = Router::new()
        .route("/", get(blogs::list_blogs))
        .route("/", post(blogs::create_blog))
        .route("/:id", get(blogs::get_blog))
        .route("/:id", put(blogs::update_blog))
        .route("/:id", delete(blogs::delete_blog));

    let attendance_routes = Router::new()
        .route("/employees", get(attendance::list_employee_attendance))
        .route("/employees", post(attendance::mark_employee_attendance))
        .route("/students", get(attendance::list_student_attendance))
        .route("/students", post(attendance::mark_student_attendance));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/branches", branch_routes)
        .nest("/employees", employee_routes)
        .nest("/students", student_routes)
        .nest("/leads", lead_routes)
        .nest("/jobs", job_routes)
        .nest("/job-responses", job_response_routes)
        .nest("/blogs", blog_routes)
        .nest("/attendance", attendance_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
