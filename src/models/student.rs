use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::Loggable;
use crate::models::user::{DbUser, User};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Student {
    pub id: Uuid,
    pub user: User,
    pub branch_id: Uuid,
    pub student_code: String,
    pub age: i64,
    pub gender: String,
    pub nationality: String,
    pub contact_number: String,
    pub address: String,
    pub institution_name: String,
    pub language_test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    pub enrollment_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Student {
    fn entity_type() -> &'static str { "student" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbStudent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub branch_id: Uuid,
    pub student_code: String,
    pub age: i64,
    pub gender: String,
    pub nationality: String,
    pub contact_number: String,
    pub address: String,
    pub institution_name: String,
    pub language_test: String,
    pub emergency_contact: Option<String>,
    pub enrollment_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn from_parts(profile: DbStudent, user: DbUser) -> Result<Self, AppError> {
        Ok(Student {
            id: profile.id,
            user: user.try_into()?,
            branch_id: profile.branch_id,
            student_code: profile.student_code,
            age: profile.age,
            gender: profile.gender,
            nationality: profile.nationality,
            contact_number: profile.contact_number,
            address: profile.address,
            institution_name: profile.institution_name,
            language_test: profile.language_test,
            emergency_contact: profile.emergency_contact,
            enrollment_date: profile.enrollment_date,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StudentUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Default credential is issued when omitted; the account role is always
    /// Student.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StudentCreateRequest {
    pub user: StudentUserRequest,
    pub branch_id: Uuid,
    pub student_code: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub contact_number: String,
    pub address: String,
    pub institution_name: Option<String>,
    pub language_test: Option<String>,
    pub emergency_contact: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StudentUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Branch moves are SuperAdmin-only.
    pub branch_id: Option<Uuid>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub institution_name: Option<String>,
    pub language_test: Option<String>,
    pub emergency_contact: Option<String>,
}
