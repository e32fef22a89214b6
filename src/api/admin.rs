use crate::{
    auth::auth::AuthUser,
    config::Config,
    model::leave_request::LeaveStatus,
    utils::{
        db_utils::{SqlFilter, SqlValue, bind_values},
        response::{db_error, failure, success},
        time_utils::local_date,
    },
};
use actix_web::{Responder, http::StatusCode, web};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Serialize, FromRow, ToSchema)]
pub struct TodayCounts {
    pub present_today: i64,
    pub late_today: i64,
    pub on_leave_today: i64,
    pub absent_today: i64,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct DepartmentCount {
    #[schema(example = "Platform")]
    pub department: String,
    #[schema(example = 12)]
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub total_employees: i64,
    #[serde(flatten)]
    pub today: TodayCounts,
    pub pending_leave_requests: i64,
    pub departments: Vec<DepartmentCount>,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub department: Option<String>,
    /// Employee code, e.g. EMP004
    pub employee_code: Option<String>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct AttendanceReportRow {
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub total_days: i64,
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub half_day: i64,
    pub on_leave: i64,
    #[schema(value_type = Option<String>, example = "7.85")]
    pub avg_hours: Option<Decimal>,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveReportQuery {
    /// pending | approved | rejected
    pub status: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct LeaveReportRow {
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    #[schema(value_type = String, example = "5.00")]
    pub paid_leaves_balance: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub unpaid_leaves_taken: Decimal,
    pub total_requests: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/* =========================
Dashboard
========================= */
#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Headcount, today's attendance and pending leave", body = Dashboard),
        (status = 403, description = "Admin or HR only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let today = local_date(Utc::now(), &config.policy);

    let total_employees: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE is_active = TRUE")
            .fetch_one(pool.get_ref())
            .await
            .map_err(db_error("Failed to count employees"))?;

    let counts = sqlx::query_as::<_, TodayCounts>(
        r#"
        SELECT
            CAST(COALESCE(SUM(status IN ('present', 'late')), 0) AS SIGNED) AS present_today,
            CAST(COALESCE(SUM(status = 'late'), 0) AS SIGNED) AS late_today,
            CAST(COALESCE(SUM(status = 'on-leave'), 0) AS SIGNED) AS on_leave_today,
            CAST(COALESCE(SUM(status = 'absent'), 0) AS SIGNED) AS absent_today
        FROM attendance
        WHERE attendance_date = ?
        "#,
    )
    .bind(today)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to count today's attendance"))?;

    let pending_leave_requests: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM leave_requests WHERE status = ?")
            .bind(LeaveStatus::Pending.as_ref())
            .fetch_one(pool.get_ref())
            .await
            .map_err(db_error("Failed to count pending leave"))?;

    let departments = sqlx::query_as::<_, DepartmentCount>(
        r#"
        SELECT department, COUNT(*) AS count
        FROM employees
        WHERE is_active = TRUE
        GROUP BY department
        ORDER BY department
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to group employees by department"))?;

    Ok(success(
        "Dashboard stats retrieved",
        Dashboard {
            date: today,
            total_employees,
            today: counts,
            pending_leave_requests,
            departments,
        },
    ))
}

/* =========================
Attendance report
========================= */
#[utoipa::path(
    get,
    path = "/api/admin/reports/attendance",
    params(AttendanceReportQuery),
    responses(
        (status = 200, description = "Per-employee attendance counts", body = [AttendanceReportRow]),
        (status = 400, description = "End date before start date"),
        (status = 403, description = "Admin or HR only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn attendance_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceReportQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if end < start {
            return Ok(failure(
                StatusCode::BAD_REQUEST,
                "End date must be after or same as start date",
            ));
        }
    }

    // Date bounds sit in the join so employees without rows still appear.
    let mut join = SqlFilter::new();
    join.push_opt("a.attendance_date >= ?", query.start_date, SqlValue::Date);
    join.push_opt("a.attendance_date <= ?", query.end_date, SqlValue::Date);
    let join_extra = join_conditions(&join);

    let mut filter = SqlFilter::new();
    filter.push("e.is_active = ?", SqlValue::Bool(true));
    filter.push_opt(
        "e.department = ?",
        query.department.clone().filter(|d| !d.is_empty()),
        SqlValue::String,
    );
    filter.push_opt(
        "e.employee_code = ?",
        query.employee_code.clone().filter(|c| !c.is_empty()),
        SqlValue::String,
    );
    let where_clause = filter.where_clause();

    let sql = format!(
        r#"
        SELECT e.employee_code, e.first_name, e.last_name, e.department,
               COUNT(a.id) AS total_days,
               CAST(COALESCE(SUM(a.status = 'present'), 0) AS SIGNED) AS present,
               CAST(COALESCE(SUM(a.status = 'late'), 0) AS SIGNED) AS late,
               CAST(COALESCE(SUM(a.status = 'absent'), 0) AS SIGNED) AS absent,
               CAST(COALESCE(SUM(a.status = 'half-day'), 0) AS SIGNED) AS half_day,
               CAST(COALESCE(SUM(a.status = 'on-leave'), 0) AS SIGNED) AS on_leave,
               CAST(AVG(a.total_hours) AS DECIMAL(5,2)) AS avg_hours
        FROM employees e
        LEFT JOIN attendance a ON e.id = a.employee_id{join_extra}
        {where_clause}
        GROUP BY e.id, e.employee_code, e.first_name, e.last_name, e.department
        ORDER BY e.employee_code
        "#
    );

    let rows = bind_values!(
        bind_values!(sqlx::query_as::<_, AttendanceReportRow>(&sql), &join.values),
        &filter.values
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to build attendance report"))?;

    Ok(success("Attendance report generated", rows))
}

/* =========================
Leave report
========================= */
#[utoipa::path(
    get,
    path = "/api/admin/reports/leave",
    params(LeaveReportQuery),
    responses(
        (status = 200, description = "Per-employee leave balances and request counts", body = [LeaveReportRow]),
        (status = 400, description = "Invalid status filter"),
        (status = 403, description = "Admin or HR only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn leave_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveReportQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<LeaveStatus>() {
            Ok(s) => Some(s),
            Err(_) => {
                return Ok(failure(
                    StatusCode::BAD_REQUEST,
                    "Invalid status. Use pending, approved or rejected",
                ));
            }
        },
    };

    let mut join = SqlFilter::new();
    join.push_opt("lr.status = ?", status, leave_status_value);
    let join_extra = join_conditions(&join);

    let mut filter = SqlFilter::new();
    filter.push("e.is_active = ?", SqlValue::Bool(true));
    filter.push_opt(
        "e.department = ?",
        query.department.clone().filter(|d| !d.is_empty()),
        SqlValue::String,
    );
    let where_clause = filter.where_clause();

    let sql = format!(
        r#"
        SELECT e.employee_code, e.first_name, e.last_name, e.department,
               e.paid_leaves_balance, e.unpaid_leaves_taken,
               COUNT(lr.id) AS total_requests,
               CAST(COALESCE(SUM(lr.status = 'pending'), 0) AS SIGNED) AS pending,
               CAST(COALESCE(SUM(lr.status = 'approved'), 0) AS SIGNED) AS approved,
               CAST(COALESCE(SUM(lr.status = 'rejected'), 0) AS SIGNED) AS rejected
        FROM employees e
        LEFT JOIN leave_requests lr ON e.id = lr.employee_id{join_extra}
        {where_clause}
        GROUP BY e.id, e.employee_code, e.first_name, e.last_name, e.department,
                 e.paid_leaves_balance, e.unpaid_leaves_taken
        ORDER BY e.employee_code
        "#
    );

    let rows = bind_values!(
        bind_values!(sqlx::query_as::<_, LeaveReportRow>(&sql), &join.values),
        &filter.values
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to build leave report"))?;

    Ok(success("Leave report generated", rows))
}

fn leave_status_value(status: LeaveStatus) -> SqlValue {
    SqlValue::String(status.as_ref().to_string())
}

/// Extra `AND ...` terms for an `ON` clause.
fn join_conditions(filter: &SqlFilter) -> String {
    filter
        .where_clause()
        .strip_prefix("WHERE ")
        .map(|c| format!(" AND {c}"))
        .unwrap_or_default()
}
