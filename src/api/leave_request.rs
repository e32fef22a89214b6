use crate::{
    auth::auth::AuthUser,
    model::leave_request::{LeaveRequest, LeaveStatus},
    services::leave_service::LeaveService,
    utils::{
        client_info::RequestOrigin,
        db_utils::{SqlFilter, SqlValue, bind_values},
        response::{Pagination, created, db_error, failure, message, success},
        time_utils::calendar_days,
    },
};
use actix_web::{HttpResponse, Responder, http::StatusCode, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, Row, mysql::MySqlRow};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ApplyLeave {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Family function")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewLeave {
    /// approved | rejected
    #[schema(example = "approved")]
    pub status: String,
    #[schema(example = "Enjoy your time off", nullable = true)]
    pub remarks: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct MyLeaveQuery {
    /// pending | approved | rejected
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct AllLeaveQuery {
    /// pending | approved | rejected
    pub status: Option<String>,
    pub department: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A leave request with the names of its owner and reviewer.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaveRequestView {
    #[serde(flatten)]
    pub request: LeaveRequest,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub reviewer_name: Option<String>,
    /// Span including weekends; `total_days` counts business days only.
    #[schema(example = 3)]
    pub calendar_days: i64,
}

impl<'r> FromRow<'r, MySqlRow> for LeaveRequestView {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        let request = LeaveRequest::from_row(row)?;
        Ok(Self {
            calendar_days: calendar_days(request.start_date, request.end_date),
            request,
            employee_code: row.try_get("employee_code")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            department: row.try_get("department")?,
            reviewer_name: row.try_get("reviewer_name")?,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeavePage {
    pub requests: Vec<LeaveRequestView>,
    pub pagination: Pagination,
}

fn parse_status(raw: Option<&str>) -> Result<Option<LeaveStatus>, HttpResponse> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<LeaveStatus>().map_err(|_| {
                failure(
                    StatusCode::BAD_REQUEST,
                    "Invalid status. Use pending, approved or rejected",
                )
            })
        })
        .transpose()
}

fn status_value(status: LeaveStatus) -> SqlValue {
    SqlValue::String(status.as_ref().to_string())
}

async fn fetch_leave_page(
    pool: &MySqlPool,
    filter: &SqlFilter,
    page: Pagination,
) -> actix_web::Result<LeavePage> {
    let where_clause = filter.where_clause();

    let count_sql = format!(
        "SELECT COUNT(*) FROM leave_requests lr \
         JOIN employees e ON lr.employee_id = e.id {where_clause}"
    );
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool)
        .await
        .map_err(db_error("Failed to count leave requests"))?;

    let data_sql = format!(
        r#"
        SELECT lr.id, lr.employee_id, lr.leave_type, lr.start_date, lr.end_date,
               lr.total_days, lr.reason, lr.status, lr.reviewed_by, lr.reviewed_at,
               lr.review_remarks, lr.created_at,
               e.employee_code, e.first_name, e.last_name, e.department,
               CONCAT(reviewer.first_name, ' ', reviewer.last_name) AS reviewer_name
        FROM leave_requests lr
        JOIN employees e ON lr.employee_id = e.id
        LEFT JOIN employees reviewer ON lr.reviewed_by = reviewer.id
        {where_clause}
        ORDER BY lr.created_at DESC
        LIMIT ? OFFSET ?
        "#
    );
    let requests = bind_values!(sqlx::query_as::<_, LeaveRequestView>(&data_sql), &filter.values)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .map_err(db_error("Failed to fetch leave requests"))?;

    Ok(LeavePage {
        requests,
        pagination: page.with_total(total),
    })
}

/* =========================
Apply for leave
========================= */
#[utoipa::path(
    post,
    path = "/api/leave/apply",
    request_body(
        content = ApplyLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "End date before start date, or empty reason", body = Object, example = json!({
            "success": false,
            "message": "End date must be after or same as start date"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn apply(
    auth: AuthUser,
    service: web::Data<LeaveService>,
    payload: web::Json<ApplyLeave>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    let leave = service
        .apply_leave(
            auth.employee_id,
            payload.start_date,
            payload.end_date,
            &payload.reason,
            &origin,
        )
        .await?;

    Ok(created("Leave request submitted successfully", leave))
}

/* =========================
Own leave requests
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/my-requests",
    params(MyLeaveQuery),
    responses(
        (status = 200, description = "Paginated leave requests", body = LeavePage),
        (status = 400, description = "Invalid status filter")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn my_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MyLeaveQuery>,
) -> actix_web::Result<impl Responder> {
    let status = match parse_status(query.status.as_deref()) {
        Ok(s) => s,
        Err(resp) => return Ok(resp),
    };

    let mut filter = SqlFilter::new();
    filter.push("lr.employee_id = ?", SqlValue::U64(auth.employee_id));
    filter.push_opt("lr.status = ?", status, status_value);

    let page = Pagination::new(query.page, query.limit, 20, 100);
    let result = fetch_leave_page(pool.get_ref(), &filter, page).await?;

    Ok(success("Leave requests retrieved", result))
}

/* =========================
Leave balance
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/balance",
    responses(
        (status = 200, description = "Balance and request counts", body = LeaveBalance),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn balance(
    auth: AuthUser,
    service: web::Data<LeaveService>,
) -> actix_web::Result<impl Responder> {
    let balance = service.balance(auth.employee_id).await?;
    Ok(success("Leave balance retrieved", balance))
}

/* =========================
All leave requests (Admin)
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/all-requests",
    params(AllLeaveQuery),
    responses(
        (status = 200, description = "Paginated leave requests", body = LeavePage),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn all_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AllLeaveQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let status = match parse_status(query.status.as_deref()) {
        Ok(s) => s,
        Err(resp) => return Ok(resp),
    };

    let mut filter = SqlFilter::new();
    filter.push_opt("lr.status = ?", status, status_value);
    filter.push_opt(
        "e.department = ?",
        query.department.clone().filter(|d| !d.is_empty()),
        SqlValue::String,
    );

    let page = Pagination::new(query.page, query.limit, 50, 200);
    let result = fetch_leave_page(pool.get_ref(), &filter, page).await?;

    Ok(success("Leave requests retrieved", result))
}

/* =========================
Review leave (Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/review",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to review")
    ),
    request_body = ReviewLeave,
    responses(
        (status = 200, description = "Leave reviewed", body = Object, example = json!({
            "success": true,
            "message": "Leave request approved successfully"
        })),
        (status = 400, description = "Invalid decision"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Already reviewed", body = Object, example = json!({
            "success": false,
            "message": "This leave request has already been reviewed"
        })),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn review(
    auth: AuthUser,
    service: web::Data<LeaveService>,
    path: web::Path<u64>,
    payload: web::Json<ReviewLeave>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let leave_id = path.into_inner();
    let ReviewLeave { status, remarks } = payload.into_inner();

    service
        .review_leave(leave_id, auth.employee_id, &status, remarks, Utc::now(), &origin)
        .await?;

    Ok(message(&format!(
        "Leave request {} successfully",
        status.trim()
    )))
}

/* =========================
Cancel own pending leave
========================= */
#[utoipa::path(
    delete,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to cancel")
    ),
    responses(
        (status = 200, description = "Leave request cancelled"),
        (status = 403, description = "Not the caller's request"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Only pending requests can be cancelled")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn cancel(
    auth: AuthUser,
    service: web::Data<LeaveService>,
    path: web::Path<u64>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    service
        .cancel_leave(leave_id, auth.employee_id, &origin)
        .await?;

    Ok(message("Leave request cancelled successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_accepts_the_three_states() {
        assert_eq!(parse_status(Some("pending")).unwrap(), Some(LeaveStatus::Pending));
        assert_eq!(parse_status(Some("rejected")).unwrap(), Some(LeaveStatus::Rejected));
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert!(parse_status(Some("cancelled")).is_err());
    }

    #[test]
    fn review_body_allows_missing_remarks() {
        let body: ReviewLeave = serde_json::from_str(r#"{"status": "approved"}"#).unwrap();
        assert_eq!(body.status, "approved");
        assert!(body.remarks.is_none());
    }
}
