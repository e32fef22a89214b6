use crate::api::admin::{AttendanceReportRow, Dashboard, DepartmentCount, LeaveReportRow, TodayCounts};
use crate::api::attendance::{AttendancePage, AttendanceStats, EmployeeAttendance};
use crate::api::employee::{CreateEmployee, CreatedEmployee, EmployeePage, EmployeeView};
use crate::api::leave_request::{ApplyLeave, LeavePage, LeaveRequestView, ReviewLeave};
use crate::auth::handlers::TokenPair;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::employee::Employee;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::models::{ChangePasswordReqDto, LoginReqDto};
use crate::services::attendance_service::RepairReport;
use crate::services::leave_service::LeaveBalance;
use crate::utils::response::Pagination;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance & Leave Management

Employees check in and out once per day, apply for leave and cancel pending requests.
Admins review leave, manage employees and read attendance and leave reports.

### Key rules
- A check-in after the start time plus the grace period is marked **late**.
- Check-out derives **present**, **half-day** or **absent** from hours worked.
- Leave days are counted as business days (Saturday and Sunday are free).
- A request fully covered by the paid balance is **paid**, otherwise **unpaid**.
- Approving a request adjusts the balance and marks every covered day **on-leave**, in one transaction.

### Security
Protected endpoints take a **JWT Bearer** access token. Refresh tokens are single use.

### Response format
`{"success": bool, "message": string, "data"?: any}`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::change_password,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::history,
        crate::api::attendance::stats,
        crate::api::attendance::all,
        crate::api::attendance::export,
        crate::api::attendance::repair,

        crate::api::leave_request::apply,
        crate::api::leave_request::my_requests,
        crate::api::leave_request::balance,
        crate::api::leave_request::all_requests,
        crate::api::leave_request::review,
        crate::api::leave_request::cancel,

        crate::api::admin::dashboard,
        crate::api::admin::attendance_report,
        crate::api::admin::leave_report,

        crate::api::employee::list_employees,
        crate::api::employee::create_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee
    ),
    components(
        schemas(
            LoginReqDto,
            ChangePasswordReqDto,
            TokenPair,
            AttendanceStatus,
            AttendanceRecord,
            AttendancePage,
            AttendanceStats,
            EmployeeAttendance,
            RepairReport,
            LeaveType,
            LeaveStatus,
            LeaveRequest,
            LeaveRequestView,
            LeavePage,
            LeaveBalance,
            ApplyLeave,
            ReviewLeave,
            Employee,
            EmployeeView,
            EmployeePage,
            CreateEmployee,
            CreatedEmployee,
            Dashboard,
            TodayCounts,
            DepartmentCount,
            AttendanceReportRow,
            LeaveReportRow,
            Pagination
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and password APIs"),
        (name = "Attendance", description = "Check-in, check-out and attendance history APIs"),
        (name = "Leave", description = "Leave application and review APIs"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Admin", description = "Dashboard and report APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/api/attendance/check-in",
            "/api/attendance/repair",
            "/api/leave/{leave_id}/review",
            "/api/admin/employees/{employee_id}",
            "/api/admin/reports/leave",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
