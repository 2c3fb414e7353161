use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub branch_id: Uuid,
    pub author_id: Uuid,
    pub is_published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Blog {
    fn entity_type() -> &'static str { "blog" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BlogCreateRequest {
    #[schema(example = "Studying in Australia: 2026 intake")]
    pub title: String,
    pub content: String,
    /// Ignored for branch managers; their home branch is used.
    pub branch_id: Option<Uuid>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BlogUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
}
