use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 4,
        "employee_code": "EMP004",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "phone": "+8801712345678",
        "designation": "Engineer",
        "department": "Platform",
        "role_id": 3,
        "reporting_manager_id": 1,
        "date_of_joining": "2024-01-01",
        "is_active": true,
        "paid_leaves_balance": "7.00",
        "unpaid_leaves_taken": "0.00"
    })
)]
pub struct Employee {
    #[schema(example = 4)]
    pub id: u64,

    #[schema(example = "EMP004")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "john.doe@company.com")]
    pub email: String,

    #[schema(example = "+8801712345678", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = "Engineer")]
    pub designation: String,

    #[schema(example = "Platform")]
    pub department: String,

    #[schema(example = 3)]
    pub role_id: u8,

    #[schema(example = 1, nullable = true)]
    pub reporting_manager_id: Option<u64>,

    #[schema(
        example = "2024-01-01",
        value_type = String,
        format = "date"
    )]
    pub date_of_joining: NaiveDate,

    pub is_active: bool,

    #[schema(value_type = String, example = "7.00")]
    pub paid_leaves_balance: Decimal,

    #[schema(value_type = String, example = "0.00")]
    pub unpaid_leaves_taken: Decimal,
}

/// The two leave counters the ledger reads and mutates.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EmployeeBalance {
    pub employee_id: u64,
    pub paid_leaves_balance: Decimal,
    pub unpaid_leaves_taken: Decimal,
}

/// Credentials row used by login and password changes.
#[derive(Debug, sqlx::FromRow)]
pub struct EmployeeCredentials {
    pub id: u64,
    pub employee_code: String,
    pub password_hash: String,
    pub role_id: u8,
    pub is_active: bool,
}

/// Identity and standing checked by the auth middleware.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AccountStatus {
    pub id: u64,
    pub employee_code: String,
    pub role_id: u8,
    pub is_active: bool,
}
