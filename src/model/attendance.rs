use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, mysql::MySqlRow};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    Late,
    HalfDay,
    Absent,
    OnLeave,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 12,
    "employee_id": 4,
    "attendance_date": "2025-03-03",
    "check_in_time": "2025-03-03T03:41:00Z",
    "check_out_time": "2025-03-03T12:02:00Z",
    "total_hours": "8.35",
    "status": "present",
    "is_late": true,
    "late_by_minutes": 11
}))]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub attendance_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub total_hours: Option<Decimal>,
    /// Null only on legacy rows awaiting repair.
    pub status: Option<AttendanceStatus>,
    pub is_late: bool,
    pub late_by_minutes: i32,
}

impl<'r> FromRow<'r, MySqlRow> for AttendanceRecord {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        let status: Option<String> = row.try_get("status")?;
        let status = status
            .map(|s| s.parse::<AttendanceStatus>())
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            employee_id: row.try_get("employee_id")?,
            attendance_date: row.try_get("attendance_date")?,
            check_in_time: row.try_get("check_in_time")?,
            check_out_time: row.try_get("check_out_time")?,
            total_hours: row.try_get("total_hours")?,
            status,
            is_late: row.try_get("is_late")?,
            late_by_minutes: row.try_get("late_by_minutes")?,
        })
    }
}

/// A row about to be created by check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub employee_id: u64,
    pub attendance_date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub is_late: bool,
    pub late_by_minutes: i32,
}

/// Result of re-deriving a row's status from its timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStatus {
    pub status: AttendanceStatus,
    pub is_late: bool,
    pub late_by_minutes: i32,
    pub total_hours: Option<Decimal>,
}
