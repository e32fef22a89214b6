//! In-process store for service tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{
    AccountStore, AttendanceStore, AuditStorage, BalanceAdjustment, LeaveStore, RepoError, RepoResult,
    RequestCounts, ReviewPlan,
};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, DerivedStatus, NewAttendance};
use crate::model::audit_log::AuditEntry;
use crate::model::employee::{AccountStatus, EmployeeBalance};
use crate::model::role::Role;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, NewLeaveRequest};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub accounts: BTreeMap<u64, AccountStatus>,
    pub employees: BTreeMap<u64, EmployeeBalance>,
    pub attendance: BTreeMap<u64, AttendanceRecord>,
    pub leaves: BTreeMap<u64, LeaveRequest>,
    pub audit: Vec<AuditEntry>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Stores `record` under a fresh id.
    pub fn push_attendance(&mut self, mut record: AttendanceRecord) -> AttendanceRecord {
        record.id = self.next_id();
        self.attendance.insert(record.id, record.clone());
        record
    }

    fn attendance_for(&self, employee_id: u64, date: NaiveDate) -> Option<&AttendanceRecord> {
        self.attendance
            .values()
            .find(|r| r.employee_id == employee_id && r.attendance_date == date)
    }
}

type Interleave = Box<dyn FnOnce(&mut MemoryState) + Send>;

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_backfill_on: Mutex<Option<NaiveDate>>,
    fail_audit: Mutex<bool>,
    after_next_read: Mutex<Option<Interleave>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_employee(self, employee_id: u64, paid: Decimal, unpaid: Decimal) -> Self {
        self.lock().employees.insert(
            employee_id,
            EmployeeBalance {
                employee_id,
                paid_leaves_balance: paid,
                unpaid_leaves_taken: unpaid,
            },
        );
        self
    }

    pub fn with_account(self, employee_id: u64, role: Role, is_active: bool) -> Self {
        self.lock().accounts.insert(
            employee_id,
            AccountStatus {
                id: employee_id,
                employee_code: format!("EMP{employee_id:03}"),
                role_id: role as u8,
                is_active,
            },
        );
        self
    }

    /// Runs `write` right after the next `find_*` read has produced its
    /// result, as a concurrent request would.
    pub fn after_next_read(&self, write: impl FnOnce(&mut MemoryState) + Send + 'static) {
        *self.after_next_read.lock().unwrap() = Some(Box::new(write));
    }

    /// Makes the backfill of `date` fail inside `apply_review`.
    pub fn fail_backfill_on(&self, date: NaiveDate) {
        *self.fail_backfill_on.lock().unwrap() = Some(date);
    }

    pub fn fail_audit_writes(&self) {
        *self.fail_audit.lock().unwrap() = true;
    }

    /// Inserts a raw attendance row, bypassing check-in rules.
    pub fn seed_attendance(&self, record: AttendanceRecord) -> AttendanceRecord {
        self.lock().push_attendance(record)
    }

    pub fn snapshot(&self) -> MemoryState {
        self.lock().clone()
    }

    pub fn balance(&self, employee_id: u64) -> EmployeeBalance {
        self.lock().employees[&employee_id].clone()
    }

    pub fn attendance_on(&self, employee_id: u64, date: NaiveDate) -> Option<AttendanceRecord> {
        self.lock().attendance_for(employee_id, date).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    fn interleave(&self) {
        let pending = self.after_next_read.lock().unwrap().take();
        if let Some(write) = pending {
            let mut state = self.lock();
            write(&mut *state);
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_attendance(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> RepoResult<Option<AttendanceRecord>> {
        let found = self.lock().attendance_for(employee_id, date).cloned();
        self.interleave();
        Ok(found)
    }

    async fn insert_attendance(&self, new: NewAttendance) -> RepoResult<AttendanceRecord> {
        let mut state = self.lock();
        if state.attendance_for(new.employee_id, new.attendance_date).is_some() {
            return Err(RepoError::Duplicate("attendance (employee, date)".into()));
        }
        let record = AttendanceRecord {
            id: state.next_id(),
            employee_id: new.employee_id,
            attendance_date: new.attendance_date,
            check_in_time: Some(new.check_in_time),
            check_out_time: None,
            total_hours: None,
            status: Some(new.status),
            is_late: new.is_late,
            late_by_minutes: new.late_by_minutes,
        };
        state.attendance.insert(record.id, record.clone());
        Ok(record)
    }

    async fn record_check_out(
        &self,
        id: u64,
        check_out_time: DateTime<Utc>,
        total_hours: Decimal,
        status: AttendanceStatus,
    ) -> RepoResult<AttendanceRecord> {
        let mut state = self.lock();
        let record = state
            .attendance
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("attendance {id}")))?;
        if record.check_out_time.is_some() {
            return Err(RepoError::Conflict(format!("attendance {id} already checked out")));
        }
        record.check_out_time = Some(check_out_time);
        record.total_hours = Some(total_hours);
        record.status = Some(status);
        Ok(record.clone())
    }

    async fn find_unresolved(&self) -> RepoResult<Vec<AttendanceRecord>> {
        Ok(self
            .lock()
            .attendance
            .values()
            .filter(|r| r.status.is_none())
            .cloned()
            .collect())
    }

    async fn update_derived_status(&self, id: u64, derived: &DerivedStatus) -> RepoResult<()> {
        let mut state = self.lock();
        let record = state
            .attendance
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("attendance {id}")))?;
        record.status = Some(derived.status);
        record.is_late = derived.is_late;
        record.late_by_minutes = derived.late_by_minutes;
        if record.total_hours.is_none() {
            record.total_hours = derived.total_hours;
        }
        Ok(())
    }
}

#[async_trait]
impl LeaveStore for MemoryStore {
    async fn find_employee_balance(&self, employee_id: u64) -> RepoResult<Option<EmployeeBalance>> {
        let found = self.lock().employees.get(&employee_id).cloned();
        self.interleave();
        Ok(found)
    }

    async fn insert_leave(&self, new: NewLeaveRequest) -> RepoResult<LeaveRequest> {
        let mut state = self.lock();
        if !state.employees.contains_key(&new.employee_id) {
            return Err(RepoError::MissingReference(format!("employee {}", new.employee_id)));
        }
        let leave = LeaveRequest {
            id: state.next_id(),
            employee_id: new.employee_id,
            leave_type: new.leave_type,
            start_date: new.start_date,
            end_date: new.end_date,
            total_days: new.total_days,
            reason: new.reason,
            status: LeaveStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_remarks: None,
            created_at: Utc::now(),
        };
        state.leaves.insert(leave.id, leave.clone());
        Ok(leave)
    }

    async fn find_leave(&self, id: u64) -> RepoResult<Option<LeaveRequest>> {
        let found = self.lock().leaves.get(&id).cloned();
        self.interleave();
        Ok(found)
    }

    async fn delete_pending_leave(&self, id: u64) -> RepoResult<bool> {
        let mut state = self.lock();
        match state.leaves.get(&id) {
            Some(leave) if leave.status == LeaveStatus::Pending => {
                state.leaves.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_review(&self, plan: &ReviewPlan) -> RepoResult<()> {
        let fail_on = *self.fail_backfill_on.lock().unwrap();
        let mut state = self.lock();

        // Work on a copy and swap it in only when every step succeeded.
        let mut draft = state.clone();

        let leave = draft
            .leaves
            .get_mut(&plan.request_id)
            .filter(|l| l.status == LeaveStatus::Pending)
            .ok_or_else(|| {
                RepoError::Conflict(format!("leave request {} is no longer pending", plan.request_id))
            })?;
        leave.status = plan.status;
        leave.reviewed_by = Some(plan.reviewed_by);
        leave.reviewed_at = Some(plan.reviewed_at);
        leave.review_remarks = plan.remarks.clone();

        let employee = draft
            .employees
            .get_mut(&plan.employee_id)
            .ok_or_else(|| RepoError::NotFound(format!("employee {}", plan.employee_id)))?;
        match plan.adjustment {
            BalanceAdjustment::None => {}
            BalanceAdjustment::DebitPaid(days) => employee.paid_leaves_balance -= days,
            BalanceAdjustment::CreditUnpaid(days) => employee.unpaid_leaves_taken += days,
        }

        for date in &plan.backfill {
            if fail_on == Some(*date) {
                return Err(RepoError::Database(format!("injected failure on {date}")));
            }
            let existing = draft
                .attendance_for(plan.employee_id, *date)
                .map(|r| r.id);
            match existing {
                Some(id) => {
                    if let Some(record) = draft.attendance.get_mut(&id) {
                        record.status = Some(AttendanceStatus::OnLeave);
                    }
                }
                None => {
                    let id = draft.next_id();
                    draft.attendance.insert(
                        id,
                        AttendanceRecord {
                            id,
                            employee_id: plan.employee_id,
                            attendance_date: *date,
                            check_in_time: None,
                            check_out_time: None,
                            total_hours: None,
                            status: Some(AttendanceStatus::OnLeave),
                            is_late: false,
                            late_by_minutes: 0,
                        },
                    );
                }
            }
        }

        *state = draft;
        Ok(())
    }

    async fn count_requests(&self, employee_id: u64) -> RepoResult<RequestCounts> {
        let state = self.lock();
        let mut counts = RequestCounts::default();
        for leave in state.leaves.values().filter(|l| l.employee_id == employee_id) {
            match leave.status {
                LeaveStatus::Pending => counts.pending += 1,
                LeaveStatus::Approved => counts.approved += 1,
                LeaveStatus::Rejected => {}
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_account(&self, employee_id: u64) -> RepoResult<Option<AccountStatus>> {
        Ok(self.lock().accounts.get(&employee_id).cloned())
    }
}

#[async_trait]
impl AuditStorage for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> RepoResult<()> {
        if *self.fail_audit.lock().unwrap() {
            return Err(RepoError::Database("audit table unavailable".into()));
        }
        self.lock().audit.push(entry.clone());
        Ok(())
    }
}
