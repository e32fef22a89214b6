//! Attendance status engine.
//!
//! A day's row moves from "no record" to checked-in (`present` or `late`) and
//! then to checked-out, where the status is re-evaluated against the hours
//! worked. Leave approval can force `on-leave` without either transition.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::AttendancePolicy;
use crate::error::AttendanceError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, DerivedStatus, NewAttendance};
use crate::model::audit_log::{AuditAction, EntityType};
use crate::repository::{AttendanceStore, RepoError};
use crate::services::audit_service::AuditLogger;
use crate::utils::client_info::RequestOrigin;
use crate::utils::time_utils::{hours_between, local_date, minutes_between, threshold_for};

/// Lateness and status for a check-in at `at` on the office-local `date`.
pub fn status_at_check_in(
    date: NaiveDate,
    at: DateTime<Utc>,
    policy: &AttendancePolicy,
) -> DerivedStatus {
    let threshold = threshold_for(date, policy);
    let is_late = at > threshold;
    let late_by_minutes = if is_late {
        minutes_between(threshold, at).max(0)
    } else {
        0
    };

    let status = if is_late && late_by_minutes > policy.late_threshold_minutes {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    };

    DerivedStatus {
        status,
        is_late,
        late_by_minutes: i32::try_from(late_by_minutes).unwrap_or(i32::MAX),
        total_hours: None,
    }
}

/// Status after check-out. Short days become `half-day`; full days become
/// `present` even when the check-in was `late`.
pub fn status_at_check_out(
    current: AttendanceStatus,
    total_hours: Decimal,
    policy: &AttendancePolicy,
) -> AttendanceStatus {
    if total_hours < policy.half_day_hours {
        AttendanceStatus::HalfDay
    } else if total_hours >= policy.full_day_hours {
        AttendanceStatus::Present
    } else {
        current
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RepairReport {
    /// Rows found without a status.
    pub examined: usize,
    pub repaired: usize,
    /// Rows with no check-in to derive from.
    pub skipped: usize,
}

pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    audit: AuditLogger,
    policy: AttendancePolicy,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn AttendanceStore>, audit: AuditLogger, policy: AttendancePolicy) -> Self {
        Self {
            store,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    pub async fn today(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        let today = local_date(now, &self.policy);
        Ok(self.store.find_attendance(employee_id, today).await?)
    }

    pub async fn check_in(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
        origin: &RequestOrigin,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let today = local_date(now, &self.policy);

        if self.store.find_attendance(employee_id, today).await?.is_some() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }

        let derived = status_at_check_in(today, now, &self.policy);
        let new = NewAttendance {
            employee_id,
            attendance_date: today,
            check_in_time: now,
            status: derived.status,
            is_late: derived.is_late,
            late_by_minutes: derived.late_by_minutes,
        };

        // A concurrent check-in loses on the (employee, date) key.
        let record = self.store.insert_attendance(new).await.map_err(|e| match e {
            RepoError::Duplicate(_) => AttendanceError::AlreadyCheckedIn,
            other => AttendanceError::Store(other),
        })?;

        tracing::info!(
            employee_id,
            attendance_id = record.id,
            status = %derived.status,
            late_by_minutes = derived.late_by_minutes,
            "Checked in"
        );

        self.audit.record(
            Some(employee_id),
            AuditAction::CheckIn,
            EntityType::Attendance,
            Some(record.id),
            json!({
                "date": today,
                "status": derived.status,
                "is_late": derived.is_late,
                "late_by_minutes": derived.late_by_minutes,
            }),
            origin,
        );

        Ok(record)
    }

    pub async fn check_out(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
        origin: &RequestOrigin,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let today = local_date(now, &self.policy);

        let record = self
            .store
            .find_attendance(employee_id, today)
            .await?
            .ok_or(AttendanceError::NoCheckIn)?;

        // An on-leave row has no check-in to close.
        let Some(check_in_time) = record.check_in_time else {
            return Err(AttendanceError::NoCheckIn);
        };

        if record.check_out_time.is_some() {
            return Err(AttendanceError::AlreadyCheckedOut);
        }

        let total_hours = hours_between(Some(check_in_time), Some(now));
        let current = record
            .status
            .unwrap_or_else(|| status_at_check_in(today, check_in_time, &self.policy).status);
        let status = status_at_check_out(current, total_hours, &self.policy);

        let updated = self
            .store
            .record_check_out(record.id, now, total_hours, status)
            .await
            .map_err(|e| match e {
                RepoError::Conflict(_) => AttendanceError::AlreadyCheckedOut,
                other => AttendanceError::Store(other),
            })?;

        tracing::info!(
            employee_id,
            attendance_id = updated.id,
            %total_hours,
            status = %status,
            "Checked out"
        );

        self.audit.record(
            Some(employee_id),
            AuditAction::CheckOut,
            EntityType::Attendance,
            Some(updated.id),
            json!({
                "date": today,
                "total_hours": total_hours,
                "status": status,
            }),
            origin,
        );

        Ok(updated)
    }

    /// Derives a status for every row stored without one. Rows are only
    /// selected while their status is null, so a second run finds nothing.
    pub async fn repair_unresolved(
        &self,
        actor_id: u64,
        origin: &RequestOrigin,
    ) -> Result<RepairReport, AttendanceError> {
        let rows = self.store.find_unresolved().await?;
        let mut report = RepairReport {
            examined: rows.len(),
            ..RepairReport::default()
        };

        for row in rows {
            let Some(derived) = self.derive(&row) else {
                tracing::warn!(
                    attendance_id = row.id,
                    employee_id = row.employee_id,
                    date = %row.attendance_date,
                    "No check-in time, cannot derive status"
                );
                report.skipped += 1;
                continue;
            };

            self.store.update_derived_status(row.id, &derived).await?;
            report.repaired += 1;
        }

        tracing::info!(
            examined = report.examined,
            repaired = report.repaired,
            skipped = report.skipped,
            "Attendance repair finished"
        );

        if report.examined > 0 {
            self.audit.record(
                Some(actor_id),
                AuditAction::AttendanceRepaired,
                EntityType::Attendance,
                None,
                json!({
                    "examined": report.examined,
                    "repaired": report.repaired,
                    "skipped": report.skipped,
                }),
                origin,
            );
        }

        Ok(report)
    }

    fn derive(&self, row: &AttendanceRecord) -> Option<DerivedStatus> {
        let check_in_time = row.check_in_time?;
        let mut derived = status_at_check_in(row.attendance_date, check_in_time, &self.policy);

        if let Some(check_out_time) = row.check_out_time {
            let hours = row
                .total_hours
                .unwrap_or_else(|| hours_between(Some(check_in_time), Some(check_out_time)));
            derived.status = status_at_check_out(derived.status, hours, &self.policy);
            derived.total_hours = Some(hours);
        }

        Some(derived)
    }
}
