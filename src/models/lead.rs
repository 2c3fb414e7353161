use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub nationality: String,
    pub branch_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interested_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interested_degree: Option<String>,
    pub language_test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_score: Option<f64>,
    pub lead_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Lead {
    fn entity_type() -> &'static str { "lead" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeadCreateRequest {
    #[schema(example = "Ram Thapa")]
    pub name: String,
    pub email: String,
    pub phone: String,
    pub nationality: String,
    /// Ignored for branch-scoped staff; their home branch is used.
    pub branch_id: Option<Uuid>,
    pub interested_country: Option<String>,
    pub interested_degree: Option<String>,
    pub language_test: Option<String>,
    pub language_score: Option<f64>,
    pub lead_source: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeadUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nationality: Option<String>,
    pub interested_country: Option<String>,
    pub interested_degree: Option<String>,
    pub language_test: Option<String>,
    pub language_score: Option<f64>,
    pub lead_source: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
}
