use chrono::{DateTime, Utc};
use serde_json::Value;
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CheckIn,
    CheckOut,
    AttendanceRepaired,
    LeaveApplied,
    LeaveApproved,
    LeaveRejected,
    LeaveCancelled,
    EmployeeCreated,
    EmployeeUpdated,
    EmployeeDeactivated,
    Login,
    PasswordChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EntityType {
    Attendance,
    Leave,
    Employee,
}

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor_id: Option<u64>,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<u64>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
