use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

/// One attendance row per employee per day; marking twice on the same day
/// updates the existing row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EmployeeAttendance {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_out: Option<NaiveTime>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for EmployeeAttendance {
    fn entity_type() -> &'static str { "employee_attendance" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StudentAttendance {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_out: Option<NaiveTime>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for StudentAttendance {
    fn entity_type() -> &'static str { "student_attendance" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttendanceMarkRequest {
    /// Employee or student profile id, depending on the endpoint.
    pub person_id: Uuid,
    pub date: NaiveDate,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
    /// "Present", "Absent", "Late", "Half Day" or "On Leave".
    pub status: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttendanceListQuery {
    /// Filter to one day, `YYYY-MM-DD`.
    pub date: Option<String>,
}
