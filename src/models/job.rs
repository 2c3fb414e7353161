use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub requirements: String,
    pub branch_id: Uuid,
    pub job_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
    pub location: String,
    pub required_experience: String,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Job {
    fn entity_type() -> &'static str { "job" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobCreateRequest {
    #[schema(example = "Education Counsellor")]
    pub title: String,
    pub description: String,
    pub requirements: String,
    /// Ignored for branch managers; their home branch is used.
    pub branch_id: Option<Uuid>,
    pub job_type: Option<String>,
    pub salary_range: Option<String>,
    pub location: Option<String>,
    pub required_experience: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub job_type: Option<String>,
    pub salary_range: Option<String>,
    pub location: Option<String>,
    pub required_experience: Option<String>,
    pub is_active: Option<bool>,
}

/// A job application. Branch ownership is derived from the parent job.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for JobResponse {
    fn entity_type() -> &'static str { "job_response" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobResponseCreateRequest {
    pub job_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub cover_letter: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobResponseUpdateRequest {
    /// Screening status, e.g. "New", "Shortlisted", "Rejected".
    pub status: Option<String>,
}
