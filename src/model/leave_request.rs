use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, mysql::MySqlRow};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Funding of a leave request, fixed when it is submitted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Paid,
    Unpaid,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

/// What a reviewer may decide. Parsing anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl From<ReviewDecision> for LeaveStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approved => LeaveStatus::Approved,
            ReviewDecision::Rejected => LeaveStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 31,
    "employee_id": 4,
    "leave_type": "paid",
    "start_date": "2025-03-03",
    "end_date": "2025-03-05",
    "total_days": 3,
    "reason": "Family function",
    "status": "pending",
    "reviewed_by": null,
    "reviewed_at": null,
    "review_remarks": null,
    "created_at": "2025-02-20T06:12:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    /// Business days covered by the request.
    pub total_days: i32,
    pub reason: String,
    pub status: LeaveStatus,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_remarks: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

fn decode_enum<T>(row: &MySqlRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = strum::ParseError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, MySqlRow> for LeaveRequest {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            employee_id: row.try_get("employee_id")?,
            leave_type: decode_enum(row, "leave_type")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            total_days: row.try_get("total_days")?,
            reason: row.try_get("reason")?,
            status: decode_enum(row, "status")?,
            reviewed_by: row.try_get("reviewed_by")?,
            reviewed_at: row.try_get("reviewed_at")?,
            review_remarks: row.try_get("review_remarks")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLeaveRequest {
    pub employee_id: u64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i32,
    pub reason: String,
}
