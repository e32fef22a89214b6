use crate::{
    auth::auth::AuthUser,
    config::AttendancePolicy,
    model::attendance::{AttendanceRecord, AttendanceStatus},
    services::attendance_service::AttendanceService,
    utils::{
        client_info::RequestOrigin,
        db_utils::{SqlFilter, SqlValue, bind_values},
        response::{Pagination, db_error, failure, success},
        time_utils::format_local_time,
    },
};
use actix_web::{HttpResponse, Responder, http::StatusCode, http::header, web};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, Row, mysql::MySqlRow};
use utoipa::{IntoParams, ToSchema};

const ATTENDANCE_COLUMNS: &str = r#"
    a.id, a.employee_id, a.attendance_date, a.check_in_time, a.check_out_time,
    a.total_hours, a.status, a.is_late, a.late_by_minutes
"#;

#[derive(Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Inclusive lower bound (YYYY-MM-DD)
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound (YYYY-MM-DD)
    pub end_date: Option<NaiveDate>,
    /// present | late | half-day | absent | on-leave
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct AllAttendanceQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<String>,
    pub department: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendancePage {
    pub records: Vec<AttendanceRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct AttendanceStats {
    pub total_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub late_days: i64,
    pub half_days: i64,
    pub leave_days: i64,
    #[schema(value_type = Option<String>, example = "8.12")]
    pub avg_hours: Option<Decimal>,
}

/// An attendance row joined with the employee it belongs to.
#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeAttendance {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub designation: String,
}

impl<'r> FromRow<'r, MySqlRow> for EmployeeAttendance {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            record: AttendanceRecord::from_row(row)?,
            employee_code: row.try_get("employee_code")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            department: row.try_get("department")?,
            designation: row.try_get("designation")?,
        })
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<AttendanceStatus>, HttpResponse> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<AttendanceStatus>().map_err(|_| {
                failure(
                    StatusCode::BAD_REQUEST,
                    "Invalid status. Use present, late, half-day, absent or on-leave",
                )
            })
        })
        .transpose()
}

fn status_value(status: AttendanceStatus) -> SqlValue {
    SqlValue::String(status.as_ref().to_string())
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "success": true,
            "message": "Checked in successfully",
            "data": {
                "id": 12,
                "employee_id": 4,
                "attendance_date": "2025-03-03",
                "check_in_time": "2025-03-03T03:41:00Z",
                "check_out_time": null,
                "total_hours": null,
                "status": "present",
                "is_late": true,
                "late_by_minutes": 11
            }
        })),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "success": false,
            "message": "You have already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    let record = service
        .check_in(auth.employee_id, Utc::now(), &origin)
        .await?;

    Ok(success("Checked in successfully", record))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceRecord),
        (status = 404, description = "No check-in record found for today", body = Object, example = json!({
            "success": false,
            "message": "No check-in record found for today. Please check in first."
        })),
        (status = 409, description = "Already checked out today"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    let record = service
        .check_out(auth.employee_id, Utc::now(), &origin)
        .await?;

    Ok(success("Checked out successfully", record))
}

/// Today's attendance for the caller, `data` is null before check-in.
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record or null", body = AttendanceRecord),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<impl Responder> {
    let record = service.today(auth.employee_id, Utc::now()).await?;
    Ok(success("Today's attendance retrieved", record))
}

/// The caller's attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Paginated history", body = AttendancePage),
        (status = 400, description = "Invalid filter")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryQuery>,
) -> actix_web::Result<impl Responder> {
    let status = match parse_status(query.status.as_deref()) {
        Ok(s) => s,
        Err(resp) => return Ok(resp),
    };
    let page = Pagination::new(query.page, query.limit, 20, 100);

    let mut filter = SqlFilter::new();
    filter.push("a.employee_id = ?", SqlValue::U64(auth.employee_id));
    filter.push_opt("a.attendance_date >= ?", query.start_date, SqlValue::Date);
    filter.push_opt("a.attendance_date <= ?", query.end_date, SqlValue::Date);
    filter.push_opt("a.status = ?", status, status_value);
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM attendance a {where_clause}");
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count attendance history"))?;

    let data_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance a {where_clause} \
         ORDER BY a.attendance_date DESC LIMIT ? OFFSET ?"
    );
    let records = bind_values!(sqlx::query_as::<_, AttendanceRecord>(&data_sql), &filter.values)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch attendance history"))?;

    Ok(success(
        "Attendance history retrieved",
        AttendancePage {
            records,
            pagination: page.with_total(total),
        },
    ))
}

/// The caller's attendance statistics
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    responses(
        (status = 200, description = "Counts per status and average hours", body = AttendanceStats)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    let stats = sqlx::query_as::<_, AttendanceStats>(
        r#"
        SELECT
            COUNT(*) AS total_days,
            COUNT(CASE WHEN status = 'present' THEN 1 END) AS present_days,
            COUNT(CASE WHEN status = 'absent' THEN 1 END) AS absent_days,
            COUNT(CASE WHEN status = 'late' THEN 1 END) AS late_days,
            COUNT(CASE WHEN status = 'half-day' THEN 1 END) AS half_days,
            COUNT(CASE WHEN status = 'on-leave' THEN 1 END) AS leave_days,
            ROUND(AVG(total_hours), 2) AS avg_hours
        FROM attendance
        WHERE employee_id = ?
        "#,
    )
    .bind(auth.employee_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to compute attendance stats"))?;

    Ok(success("Attendance statistics retrieved", stats))
}

fn all_attendance_filter(query: &AllAttendanceQuery) -> Result<SqlFilter, HttpResponse> {
    let status = parse_status(query.status.as_deref())?;

    let mut filter = SqlFilter::new();
    filter.push_opt("a.attendance_date = ?", query.date, SqlValue::Date);
    filter.push_opt("a.status = ?", status, status_value);
    filter.push_opt(
        "e.department = ?",
        query.department.clone().filter(|d| !d.is_empty()),
        SqlValue::String,
    );
    Ok(filter)
}

async fn fetch_employee_attendance(
    pool: &MySqlPool,
    filter: &SqlFilter,
    page: Option<&Pagination>,
) -> actix_web::Result<Vec<EmployeeAttendance>> {
    let mut sql = format!(
        "SELECT {ATTENDANCE_COLUMNS}, e.employee_code, e.first_name, e.last_name, \
                e.department, e.designation \
         FROM attendance a \
         JOIN employees e ON a.employee_id = e.id \
         {} \
         ORDER BY a.attendance_date DESC, e.employee_code ASC",
        filter.where_clause()
    );
    if page.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
    }

    let mut query = bind_values!(sqlx::query_as::<_, EmployeeAttendance>(&sql), &filter.values);
    if let Some(page) = page {
        query = query.bind(i64::from(page.limit)).bind(page.offset());
    }

    query
        .fetch_all(pool)
        .await
        .map_err(db_error("Failed to fetch attendance records"))
}

/// Every employee's attendance (admin)
#[utoipa::path(
    get,
    path = "/api/attendance/all",
    params(AllAttendanceQuery),
    responses(
        (status = 200, description = "Attendance joined with employee details", body = [EmployeeAttendance]),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn all(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AllAttendanceQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let filter = match all_attendance_filter(&query) {
        Ok(f) => f,
        Err(resp) => return Ok(resp),
    };
    let page = Pagination::new(query.page, query.limit, 50, 500);

    let records = fetch_employee_attendance(pool.get_ref(), &filter, Some(&page)).await?;

    Ok(success("Attendance records retrieved", records))
}

/// Renders attendance rows as CSV, times in office-local `HH:MM`.
pub fn render_csv(
    rows: &[EmployeeAttendance],
    policy: &AttendancePolicy,
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Date",
        "Employee Code",
        "Name",
        "Department",
        "Check In",
        "Check Out",
        "Total Hours",
        "Status",
        "Late By (min)",
    ])?;

    for row in rows {
        let r = &row.record;
        writer.write_record([
            r.attendance_date.to_string(),
            row.employee_code.clone(),
            format!("{} {}", row.first_name, row.last_name),
            row.department.clone(),
            format_local_time(r.check_in_time, policy),
            format_local_time(r.check_out_time, policy),
            r.total_hours.map(|h| h.to_string()).unwrap_or_default(),
            r.status.map(|s| s.to_string()).unwrap_or_default(),
            r.late_by_minutes.to_string(),
        ])?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

/// CSV export of every employee's attendance (admin)
#[utoipa::path(
    get,
    path = "/api/attendance/export",
    params(AllAttendanceQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn export(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    service: web::Data<AttendanceService>,
    query: web::Query<AllAttendanceQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let filter = match all_attendance_filter(&query) {
        Ok(f) => f,
        Err(resp) => return Ok(resp),
    };

    let rows = fetch_employee_attendance(pool.get_ref(), &filter, None).await?;

    let body = render_csv(&rows, service.policy()).map_err(|e| {
        tracing::error!(error = %e, "Failed to render attendance CSV");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let filename = format!(
        "attendance_{}.csv",
        query.date.map(|d| d.to_string()).unwrap_or_else(|| "all".to_string())
    );

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(body))
}

/// Derives statuses for rows stored without one (admin)
#[utoipa::path(
    post,
    path = "/api/attendance/repair",
    responses(
        (status = 200, description = "Repair summary", body = RepairReport),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn repair(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let report = service.repair_unresolved(auth.employee_id, &origin).await?;

    Ok(success("Attendance repair completed", report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use rust_decimal_macros::dec;

    fn row() -> EmployeeAttendance {
        EmployeeAttendance {
            record: AttendanceRecord {
                id: 1,
                employee_id: 4,
                attendance_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
                check_in_time: Some(Utc.with_ymd_and_hms(2025, 3, 3, 9, 5, 0).unwrap()),
                check_out_time: None,
                total_hours: None,
                status: Some(AttendanceStatus::Present),
                is_late: true,
                late_by_minutes: 5,
            },
            employee_code: "EMP004".into(),
            first_name: "John".into(),
            last_name: "Doe, Jr".into(),
            department: "Platform".into(),
            designation: "Engineer".into(),
        }
    }

    #[test]
    fn csv_has_header_and_quoted_fields() {
        let policy = AttendancePolicy {
            utc_offset: FixedOffset::east_opt(0).unwrap(),
            ..AttendancePolicy::default()
        };
        let mut closed = row();
        closed.record.check_out_time = Some(Utc.with_ymd_and_hms(2025, 3, 3, 17, 35, 0).unwrap());
        closed.record.total_hours = Some(dec!(8.5));

        let body = render_csv(&[row(), closed], &policy).unwrap();
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Date,Employee Code,Name"));
        assert_eq!(lines[1], "2025-03-03,EMP004,\"John Doe, Jr\",Platform,09:05,,,present,5");
        assert_eq!(lines[2], "2025-03-03,EMP004,\"John Doe, Jr\",Platform,09:05,17:35,8.5,present,5");
    }

    #[test]
    fn unknown_status_filter_is_rejected() {
        assert!(parse_status(Some("sleeping")).is_err());
        assert_eq!(parse_status(Some("half-day")).unwrap(), Some(AttendanceStatus::HalfDay));
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert_eq!(parse_status(None).unwrap(), None);
    }
}
