//! Persistence gateway used by the attendance and leave services.
//!
//! The services only see these traits. `mysql::MySqlStore` backs them in the
//! running server; `memory::MemoryStore` backs them in tests.

pub mod mysql;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus, DerivedStatus, NewAttendance};
use crate::model::audit_log::AuditEntry;
use crate::model::employee::{AccountStatus, EmployeeBalance};
use crate::model::leave_request::{LeaveRequest, LeaveStatus, NewLeaveRequest};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// A foreign key pointed at a row that does not exist.
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// A guarded write found the row in an unexpected state.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepoError::Duplicate(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return RepoError::MissingReference(db_err.message().to_string());
            }
        }
        RepoError::Database(err.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Balance change applied when a leave request is approved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BalanceAdjustment {
    None,
    DebitPaid(Decimal),
    CreditUnpaid(Decimal),
}

/// Everything a review writes, applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPlan {
    pub request_id: u64,
    pub employee_id: u64,
    pub status: LeaveStatus,
    pub reviewed_by: u64,
    pub reviewed_at: DateTime<Utc>,
    pub remarks: Option<String>,
    pub adjustment: BalanceAdjustment,
    /// Dates whose attendance rows become `on-leave`.
    pub backfill: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestCounts {
    pub pending: i64,
    pub approved: i64,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_attendance(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> RepoResult<Option<AttendanceRecord>>;

    /// Fails with `Duplicate` when the (employee, date) row already exists.
    async fn insert_attendance(&self, new: NewAttendance) -> RepoResult<AttendanceRecord>;

    /// Sets the check-out fields; `Conflict` if the row is already checked out.
    async fn record_check_out(
        &self,
        id: u64,
        check_out_time: DateTime<Utc>,
        total_hours: Decimal,
        status: AttendanceStatus,
    ) -> RepoResult<AttendanceRecord>;

    /// Rows whose status was never derived.
    async fn find_unresolved(&self) -> RepoResult<Vec<AttendanceRecord>>;

    async fn update_derived_status(&self, id: u64, derived: &DerivedStatus) -> RepoResult<()>;
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    async fn find_employee_balance(&self, employee_id: u64) -> RepoResult<Option<EmployeeBalance>>;

    async fn insert_leave(&self, new: NewLeaveRequest) -> RepoResult<LeaveRequest>;

    async fn find_leave(&self, id: u64) -> RepoResult<Option<LeaveRequest>>;

    /// Deletes only while pending; `Ok(false)` when nothing was removed.
    async fn delete_pending_leave(&self, id: u64) -> RepoResult<bool>;

    /// Status update, balance change and on-leave backfill, all or nothing.
    /// `Conflict` when the request is no longer pending.
    async fn apply_review(&self, plan: &ReviewPlan) -> RepoResult<()>;

    async fn count_requests(&self, employee_id: u64) -> RepoResult<RequestCounts>;
}

/// Re-read on every authenticated request so deactivation and role changes
/// apply before the access token expires.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_account(&self, employee_id: u64) -> RepoResult<Option<AccountStatus>>;
}

#[async_trait]
pub trait AuditStorage: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> RepoResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::fmt;

    /// MySQL reports every integrity violation as SQLSTATE 23000.
    #[derive(Debug)]
    struct IntegrityError {
        kind: ErrorKind,
        message: &'static str,
    }

    impl fmt::Display for IntegrityError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for IntegrityError {}

    impl DatabaseError for IntegrityError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23000"))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.kind {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                ErrorKind::NotNullViolation => ErrorKind::NotNullViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn integrity(kind: ErrorKind, message: &'static str) -> RepoError {
        RepoError::from(sqlx::Error::Database(Box::new(IntegrityError { kind, message })))
    }

    #[test]
    fn only_unique_violations_are_duplicates() {
        assert!(matches!(
            integrity(ErrorKind::UniqueViolation, "Duplicate entry for key 'uq_attendance_employee_date'"),
            RepoError::Duplicate(_)
        ));
        assert!(matches!(
            integrity(ErrorKind::ForeignKeyViolation, "a foreign key constraint fails"),
            RepoError::MissingReference(_)
        ));
        assert!(matches!(
            integrity(ErrorKind::NotNullViolation, "Column 'reason' cannot be null"),
            RepoError::Database(_)
        ));
    }
}
