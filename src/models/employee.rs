use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::user::{DbUser, User};

/// Employee profile joined with its user account.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Employee {
    pub id: Uuid,
    pub user: User,
    pub branch_id: Uuid,
    pub employee_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    pub contact_number: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joining_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Employee {
    fn entity_type() -> &'static str { "employee" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbEmployee {
    pub id: Uuid,
    pub user_id: Uuid,
    pub branch_id: Uuid,
    pub employee_code: String,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub dob: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub contact_number: String,
    pub address: String,
    pub emergency_contact: Option<String>,
    pub joining_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn from_parts(profile: DbEmployee, user: DbUser) -> Result<Self, AppError> {
        Ok(Employee {
            id: profile.id,
            user: user.try_into()?,
            branch_id: profile.branch_id,
            employee_code: profile.employee_code,
            gender: profile.gender,
            nationality: profile.nationality,
            dob: profile.dob,
            salary: profile.salary,
            contact_number: profile.contact_number,
            address: profile.address,
            emergency_contact: profile.emergency_contact,
            joining_date: profile.joining_date,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        })
    }
}

/// Account details for an employee being created; profile and account are
/// written in one transaction.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EmployeeUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Must be a staff role (BranchManager, Counsellor, Receptionist,
    /// BankManager).
    pub role: Role,
    /// Default credential is issued when omitted.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmployeeCreateRequest {
    pub user: EmployeeUserRequest,
    pub branch_id: Uuid,
    pub employee_code: String,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub dob: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub contact_number: String,
    pub address: String,
    pub emergency_contact: Option<String>,
    pub joining_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmployeeUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Branch moves are SuperAdmin-only.
    pub branch_id: Option<Uuid>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub dob: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub joining_date: Option<NaiveDate>,
}
