use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tracing::debug;

use super::{
    AccountStore, AttendanceStore, AuditStorage, BalanceAdjustment, LeaveStore, RepoError, RepoResult,
    RequestCounts, ReviewPlan,
};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, DerivedStatus, NewAttendance};
use crate::model::audit_log::AuditEntry;
use crate::model::employee::{AccountStatus, EmployeeBalance};
use crate::model::leave_request::{LeaveRequest, LeaveStatus, NewLeaveRequest};

const ATTENDANCE_COLUMNS: &str = r#"
    id, employee_id, attendance_date, check_in_time, check_out_time,
    total_hours, status, is_late, late_by_minutes
"#;

const LEAVE_COLUMNS: &str = r#"
    id, employee_id, leave_type, start_date, end_date, total_days, reason,
    status, reviewed_by, reviewed_at, review_remarks, created_at
"#;

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn attendance_by_id(&self, id: u64) -> RepoResult<AttendanceRecord> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
        sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("attendance {id}")))
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find_attendance(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> RepoResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_id = ? AND attendance_date = ?"
        );
        let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn insert_attendance(&self, new: NewAttendance) -> RepoResult<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, attendance_date, check_in_time, status, is_late, late_by_minutes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.attendance_date)
        .bind(new.check_in_time)
        .bind(new.status.as_ref())
        .bind(new.is_late)
        .bind(new.late_by_minutes)
        .execute(&self.pool)
        .await?;

        self.attendance_by_id(result.last_insert_id()).await
    }

    async fn record_check_out(
        &self,
        id: u64,
        check_out_time: DateTime<Utc>,
        total_hours: Decimal,
        status: AttendanceStatus,
    ) -> RepoResult<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET check_out_time = ?, total_hours = ?, status = ?
            WHERE id = ?
            AND check_out_time IS NULL
            "#,
        )
        .bind(check_out_time)
        .bind(total_hours)
        .bind(status.as_ref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!("attendance {id} already checked out")));
        }

        self.attendance_by_id(id).await
    }

    async fn find_unresolved(&self) -> RepoResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE status IS NULL ORDER BY attendance_date DESC"
        );
        let rows = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_derived_status(&self, id: u64, derived: &DerivedStatus) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET status = ?, is_late = ?, late_by_minutes = ?,
                total_hours = COALESCE(total_hours, ?)
            WHERE id = ?
            "#,
        )
        .bind(derived.status.as_ref())
        .bind(derived.is_late)
        .bind(derived.late_by_minutes)
        .bind(derived.total_hours)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LeaveStore for MySqlStore {
    async fn find_employee_balance(&self, employee_id: u64) -> RepoResult<Option<EmployeeBalance>> {
        let balance = sqlx::query_as::<_, EmployeeBalance>(
            r#"
            SELECT id AS employee_id, paid_leaves_balance, unpaid_leaves_taken
            FROM employees
            WHERE id = ?
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn insert_leave(&self, new: NewLeaveRequest) -> RepoResult<LeaveRequest> {
        let result = sqlx::query(
            r#"
            INSERT INTO leave_requests
                (employee_id, leave_type, start_date, end_date, total_days, reason, status)
            VALUES (?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(new.employee_id)
        .bind(new.leave_type.as_ref())
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.total_days)
        .bind(&new.reason)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id();
        self.find_leave(id)
            .await?
            .ok_or_else(|| RepoError::Database(format!("leave request {id} vanished after insert")))
    }

    async fn find_leave(&self, id: u64) -> RepoResult<Option<LeaveRequest>> {
        let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?");
        let leave = sqlx::query_as::<_, LeaveRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(leave)
    }

    async fn delete_pending_leave(&self, id: u64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM leave_requests WHERE id = ? AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_review(&self, plan: &ReviewPlan) -> RepoResult<()> {
        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?, reviewed_by = ?, reviewed_at = ?, review_remarks = ?
            WHERE id = ?
            AND status = 'pending'
            "#,
        )
        .bind(plan.status.as_ref())
        .bind(plan.reviewed_by)
        .bind(plan.reviewed_at)
        .bind(plan.remarks.as_deref())
        .bind(plan.request_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "leave request {} is no longer pending",
                plan.request_id
            )));
        }

        match plan.adjustment {
            BalanceAdjustment::None => {}
            BalanceAdjustment::DebitPaid(days) => {
                sqlx::query(
                    "UPDATE employees SET paid_leaves_balance = paid_leaves_balance - ? WHERE id = ?",
                )
                .bind(days)
                .bind(plan.employee_id)
                .execute(&mut *tx)
                .await?;
            }
            BalanceAdjustment::CreditUnpaid(days) => {
                sqlx::query(
                    "UPDATE employees SET unpaid_leaves_taken = unpaid_leaves_taken + ? WHERE id = ?",
                )
                .bind(days)
                .bind(plan.employee_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        for date in &plan.backfill {
            sqlx::query(
                r#"
                INSERT INTO attendance (employee_id, attendance_date, status, is_late, late_by_minutes)
                VALUES (?, ?, ?, FALSE, 0)
                ON DUPLICATE KEY UPDATE status = VALUES(status)
                "#,
            )
            .bind(plan.employee_id)
            .bind(*date)
            .bind(AttendanceStatus::OnLeave.as_ref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            leave_id = plan.request_id,
            status = %plan.status,
            backfilled = plan.backfill.len(),
            "Review committed"
        );
        Ok(())
    }

    async fn count_requests(&self, employee_id: u64) -> RepoResult<RequestCounts> {
        let (pending, approved) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                CAST(COALESCE(SUM(status = ?), 0) AS SIGNED),
                CAST(COALESCE(SUM(status = ?), 0) AS SIGNED)
            FROM leave_requests
            WHERE employee_id = ?
            "#,
        )
        .bind(LeaveStatus::Pending.as_ref())
        .bind(LeaveStatus::Approved.as_ref())
        .bind(employee_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RequestCounts { pending, approved })
    }
}

#[async_trait]
impl AccountStore for MySqlStore {
    async fn find_account(&self, employee_id: u64) -> RepoResult<Option<AccountStatus>> {
        let account = sqlx::query_as::<_, AccountStatus>(
            "SELECT id, employee_code, role_id, is_active FROM employees WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }
}

#[async_trait]
impl AuditStorage for MySqlStore {
    async fn append(&self, entry: &AuditEntry) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (actor_id, action, entity_type, entity_id, details, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.action.as_ref())
        .bind(entry.entity_type.as_ref())
        .bind(entry.entity_id)
        .bind(sqlx::types::Json(&entry.details))
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
