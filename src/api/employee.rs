use crate::{
    auth::{auth::AuthUser, password::hash_password},
    config::Config,
    model::{
        audit_log::{AuditAction, EntityType},
        employee::Employee,
        role::Role,
    },
    repository::RepoError,
    services::audit_service::AuditLogger,
    utils::{
        client_info::RequestOrigin,
        db_utils::{ColumnKind, SqlFilter, SqlValue, bind_values, build_update_sql, execute_update},
        response::{Pagination, created, db_error, failure, message, success},
        time_utils::local_date,
    },
};
use actix_web::{Responder, error::ErrorInternalServerError, http::StatusCode, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{FromRow, MySqlPool, Row, mysql::MySqlRow};
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const CODE_PREFIX: &str = "EMP";
const TEMP_PASSWORD_LEN: usize = 10;

/// Columns an admin may change through `PUT /admin/employees/{id}`.
const UPDATABLE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("first_name", ColumnKind::Text),
    ("last_name", ColumnKind::Text),
    ("phone", ColumnKind::OptionalText),
    ("designation", ColumnKind::Text),
    ("department", ColumnKind::Text),
    ("role_id", ColumnKind::RoleId),
    ("reporting_manager_id", ColumnKind::OptionalId),
    ("date_of_joining", ColumnKind::Date),
    ("is_active", ColumnKind::Bool),
    ("paid_leaves_balance", ColumnKind::Decimal),
];

const EMPLOYEE_COLUMNS: &str = r#"
    e.id, e.employee_code, e.first_name, e.last_name, e.email, e.phone,
    e.designation, e.department, e.role_id, e.reporting_manager_id,
    e.date_of_joining, e.is_active, e.paid_leaves_balance, e.unpaid_leaves_taken
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "jane.roe@company.com", format = "email")]
    pub email: String,
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Roe")]
    pub last_name: String,
    #[schema(example = "+8801712345678", nullable = true)]
    pub phone: Option<String>,
    #[schema(example = "Engineer")]
    pub designation: String,
    #[schema(example = "Platform")]
    pub department: String,
    /// 1 admin, 2 hr, 3 employee
    #[schema(example = 3)]
    pub role_id: u8,
    #[schema(example = 1, nullable = true)]
    pub reporting_manager_id: Option<u64>,
    /// Defaults to today
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub date_of_joining: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub department: Option<String>,
    /// active | inactive
    pub status: Option<String>,
    /// Matches code, first name, last name or email
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// An employee with its role name and manager's name.
#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeView {
    #[serde(flatten)]
    pub employee: Employee,
    #[schema(example = "employee")]
    pub role: String,
    #[schema(example = "Ada Admin", nullable = true)]
    pub reporting_manager_name: Option<String>,
}

impl<'r> FromRow<'r, MySqlRow> for EmployeeView {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            employee: Employee::from_row(row)?,
            role: row.try_get("role")?,
            reporting_manager_name: row.try_get("reporting_manager_name")?,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct EmployeePage {
    pub employees: Vec<EmployeeView>,
    pub pagination: Pagination,
}

#[derive(Serialize, ToSchema)]
pub struct CreatedEmployee {
    pub employee: Employee,
    /// Shown once. Only the hash is stored.
    #[serde(rename = "temporaryPassword")]
    #[schema(example = "5f2c9a1e0b")]
    pub temporary_password: String,
}

/// `EMP007` follows `EMP006`. The first code is `EMP001`.
pub fn next_employee_code(last: Option<&str>) -> String {
    let next = last
        .and_then(|code| code.strip_prefix(CODE_PREFIX))
        .and_then(|digits| digits.parse::<u64>().ok())
        .map_or(1, |n| n + 1);
    format!("{CODE_PREFIX}{next:03}")
}

fn temporary_password() -> String {
    Uuid::new_v4()
        .to_simple()
        .to_string()
        .chars()
        .take(TEMP_PASSWORD_LEN)
        .collect()
}

/// Turns a constraint violation on `employees` into a client error.
fn write_failure(err: RepoError) -> actix_web::Result<actix_web::HttpResponse> {
    match err {
        RepoError::Duplicate(msg) if msg.contains("employee_code") => Ok(failure(
            StatusCode::CONFLICT,
            "Employee code already taken, please retry",
        )),
        RepoError::Duplicate(_) => Ok(failure(StatusCode::CONFLICT, "Email already exists")),
        RepoError::MissingReference(_) => {
            Ok(failure(StatusCode::BAD_REQUEST, "Reporting manager not found"))
        }
        other => {
            error!(error = %other, "Failed to write employee");
            Err(ErrorInternalServerError("Internal Server Error"))
        }
    }
}

fn parse_active(raw: Option<&str>) -> Result<Option<bool>, actix_web::HttpResponse> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some("active") => Ok(Some(true)),
        Some("inactive") => Ok(Some(false)),
        Some(_) => Err(failure(
            StatusCode::BAD_REQUEST,
            "Invalid status. Use active or inactive",
        )),
    }
}

async fn fetch_employee(pool: &MySqlPool, employee_id: u64) -> Result<Option<Employee>, sqlx::Error> {
    let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees e WHERE e.id = ?");
    sqlx::query_as::<_, Employee>(&sql)
        .bind(employee_id)
        .fetch_optional(pool)
        .await
}

/// List Employees
#[utoipa::path(
    get,
    path = "/api/admin/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeePage),
        (status = 400, description = "Invalid status filter"),
        (status = 403, description = "Admin or HR only")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let active = match parse_active(query.status.as_deref()) {
        Ok(a) => a,
        Err(resp) => return Ok(resp),
    };

    let mut filter = SqlFilter::new();
    filter.push_opt(
        "e.department = ?",
        query.department.clone().filter(|d| !d.is_empty()),
        SqlValue::String,
    );
    filter.push_opt("e.is_active = ?", active, SqlValue::Bool);
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = SqlValue::String(format!("%{search}%"));
        filter.push_group(
            "(e.employee_code LIKE ? OR e.first_name LIKE ? OR e.last_name LIKE ? OR e.email LIKE ?)",
            vec![like; 4],
        );
    }
    let where_clause = filter.where_clause();

    let page = Pagination::new(query.page, query.limit, 50, 200);

    let count_sql = format!("SELECT COUNT(*) FROM employees e {where_clause}");
    debug!(sql = %count_sql, "Counting employees");
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count employees"))?;

    let data_sql = format!(
        r#"
        SELECT {EMPLOYEE_COLUMNS},
               r.name AS role,
               CONCAT(manager.first_name, ' ', manager.last_name) AS reporting_manager_name
        FROM employees e
        JOIN roles r ON e.role_id = r.id
        LEFT JOIN employees manager ON e.reporting_manager_id = manager.id
        {where_clause}
        ORDER BY e.created_at DESC
        LIMIT ? OFFSET ?
        "#
    );
    debug!(sql = %data_sql, page = page.page, limit = page.limit, "Fetching employees");
    let employees = bind_values!(sqlx::query_as::<_, EmployeeView>(&data_sql), &filter.values)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch employees"))?;

    Ok(success(
        "Employees retrieved",
        EmployeePage {
            employees,
            pagination: page.with_total(total),
        },
    ))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/admin/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created with a one-time temporary password", body = CreatedEmployee),
        (status = 400, description = "Missing or invalid fields", body = Object, example = json!({
            "success": false,
            "message": "Please provide all required fields"
        })),
        (status = 409, description = "Email already exists", body = Object, example = json!({
            "success": false,
            "message": "Email already exists"
        })),
        (status = 403, description = "Admin or HR only")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    audit: web::Data<AuditLogger>,
    payload: web::Json<CreateEmployee>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let body = payload.into_inner();
    let required = [
        &body.email,
        &body.first_name,
        &body.last_name,
        &body.designation,
        &body.department,
    ];
    if required.iter().any(|v| v.trim().is_empty()) {
        return Ok(failure(
            StatusCode::BAD_REQUEST,
            "Please provide all required fields",
        ));
    }
    if Role::from_id(body.role_id).is_none() {
        return Ok(failure(StatusCode::BAD_REQUEST, "Invalid role"));
    }

    let last_code: Option<String> = sqlx::query_scalar(
        r#"
        SELECT employee_code FROM employees
        WHERE employee_code LIKE 'EMP%'
        ORDER BY CAST(SUBSTRING(employee_code, 4) AS UNSIGNED) DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to read last employee code"))?;
    let employee_code = next_employee_code(last_code.as_deref());

    let temp_password = temporary_password();
    let password_hash = hash_password(&temp_password).map_err(|e| {
        error!(error = %e, "Failed to hash temporary password");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let date_of_joining = body
        .date_of_joining
        .unwrap_or_else(|| local_date(Utc::now(), &config.policy));

    let inserted = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_code, email, password_hash, first_name, last_name, phone,
         designation, department, role_id, reporting_manager_id, date_of_joining,
         is_active, paid_leaves_balance)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?)
        "#,
    )
    .bind(&employee_code)
    .bind(body.email.trim())
    .bind(&password_hash)
    .bind(body.first_name.trim())
    .bind(body.last_name.trim())
    .bind(body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
    .bind(body.designation.trim())
    .bind(body.department.trim())
    .bind(body.role_id)
    .bind(body.reporting_manager_id)
    .bind(date_of_joining)
    .bind(config.policy.annual_paid_leaves)
    .execute(pool.get_ref())
    .await;

    let employee_id = match inserted {
        Ok(res) => res.last_insert_id(),
        Err(e) => return write_failure(RepoError::from(e)),
    };

    let employee = fetch_employee(pool.get_ref(), employee_id)
        .await
        .map_err(db_error("Failed to read created employee"))?
        .ok_or_else(|| ErrorInternalServerError("Internal Server Error"))?;

    info!(employee_id, employee_code = %employee_code, created_by = auth.employee_id, "Employee created");

    audit.record(
        Some(auth.employee_id),
        AuditAction::EmployeeCreated,
        EntityType::Employee,
        Some(employee_id),
        json!({ "employee_code": employee_code }),
        &origin,
    );

    Ok(created(
        "Employee created successfully",
        CreatedEmployee {
            employee,
            temporary_password: temp_password,
        },
    ))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/admin/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    request_body(
        content = Object,
        description = "Any of: first_name, last_name, phone, designation, department, role_id, reporting_manager_id, date_of_joining, is_active, paid_leaves_balance",
        example = json!({ "designation": "Senior Engineer", "paid_leaves_balance": "5.5" })
    ),
    responses(
        (status = 200, description = "Employee updated successfully", body = Employee),
        (status = 400, description = "Field not updatable or has the wrong type"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "success": false,
            "message": "Employee not found"
        })),
        (status = 403, description = "Admin or HR only")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    audit: web::Data<AuditLogger>,
    path: web::Path<u64>,
    body: web::Json<Value>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let employee_id = path.into_inner();
    let update = build_update_sql("employees", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    // MySQL counts unchanged rows as unaffected.
    let existing = fetch_employee(pool.get_ref(), employee_id)
        .await
        .map_err(db_error("Failed to fetch employee"))?;
    if existing.is_none() {
        return Ok(failure(StatusCode::NOT_FOUND, "Employee not found"));
    }

    if let Err(e) = execute_update(pool.get_ref(), &update).await {
        return write_failure(RepoError::from(e));
    }

    let employee = fetch_employee(pool.get_ref(), employee_id)
        .await
        .map_err(db_error("Failed to fetch employee"))?
        .ok_or_else(|| ErrorInternalServerError("Internal Server Error"))?;

    info!(employee_id, columns = ?update.columns, updated_by = auth.employee_id, "Employee updated");

    audit.record(
        Some(auth.employee_id),
        AuditAction::EmployeeUpdated,
        EntityType::Employee,
        Some(employee_id),
        body.into_inner(),
        &origin,
    );

    Ok(success("Employee updated successfully", employee))
}

/// Deactivate Employee
#[utoipa::path(
    delete,
    path = "/api/admin/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee deactivated", body = Object, example = json!({
            "success": true,
            "message": "Employee deactivated successfully"
        })),
        (status = 404, description = "Employee not found"),
        (status = 403, description = "Admin only")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    audit: web::Data<AuditLogger>,
    path: web::Path<u64>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let employee_id = path.into_inner();
    if employee_id == auth.employee_id {
        return Ok(failure(
            StatusCode::BAD_REQUEST,
            "You cannot deactivate your own account",
        ));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    let result = sqlx::query("UPDATE employees SET is_active = FALSE WHERE id = ?")
        .bind(employee_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to deactivate employee"))?;

    let exists: Option<u64> = if result.rows_affected() == 0 {
        sqlx::query_scalar("SELECT id FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to fetch employee"))?
    } else {
        Some(employee_id)
    };
    if exists.is_none() {
        return Ok(failure(StatusCode::NOT_FOUND, "Employee not found"));
    }

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE employee_id = ?")
        .bind(employee_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to revoke refresh tokens"))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit deactivation"))?;

    info!(employee_id, deactivated_by = auth.employee_id, "Employee deactivated");

    audit.record(
        Some(auth.employee_id),
        AuditAction::EmployeeDeactivated,
        EntityType::Employee,
        Some(employee_id),
        json!({}),
        &origin,
    );

    Ok(message("Employee deactivated successfully"))
}
