//! Leave balance ledger.
//!
//! Funding (paid or unpaid) is fixed when a request is submitted. Balances and
//! attendance only change on approval, through a single `ReviewPlan` that the
//! store applies atomically under a pending-status guard.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::AttendancePolicy;
use crate::error::LeaveError;
use crate::model::audit_log::{AuditAction, EntityType};
use crate::model::leave_request::{
    LeaveRequest, LeaveStatus, LeaveType, NewLeaveRequest, ReviewDecision,
};
use crate::repository::{BalanceAdjustment, LeaveStore, RepoError, ReviewPlan};
use crate::services::audit_service::AuditLogger;
use crate::utils::client_info::RequestOrigin;
use crate::utils::time_utils::{business_days, dates_in_range};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaveBalance {
    #[schema(value_type = String, example = "5.00")]
    pub paid_leaves_balance: Decimal,
    #[schema(example = 7)]
    pub annual_paid_leaves: i32,
    #[schema(value_type = String, example = "2.00")]
    pub unpaid_leaves_taken: Decimal,
    pub pending_requests: i64,
    pub approved_requests: i64,
}

/// Paid when the balance covers every chargeable day. A range with no
/// business days is never paid.
pub fn funding_for(chargeable_days: i64, paid_balance: Decimal) -> LeaveType {
    if chargeable_days > 0 && paid_balance >= Decimal::from(chargeable_days) {
        LeaveType::Paid
    } else {
        LeaveType::Unpaid
    }
}

pub struct LeaveService {
    store: Arc<dyn LeaveStore>,
    audit: AuditLogger,
    policy: AttendancePolicy,
}

impl LeaveService {
    pub fn new(store: Arc<dyn LeaveStore>, audit: AuditLogger, policy: AttendancePolicy) -> Self {
        Self {
            store,
            audit,
            policy,
        }
    }

    pub async fn apply_leave(
        &self,
        employee_id: u64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: &str,
        origin: &RequestOrigin,
    ) -> Result<LeaveRequest, LeaveError> {
        if end_date < start_date {
            return Err(LeaveError::InvalidRange);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LeaveError::EmptyReason);
        }

        let balance = self
            .store
            .find_employee_balance(employee_id)
            .await?
            .ok_or(LeaveError::EmployeeNotFound)?;

        let total_days = business_days(start_date, end_date);
        let leave_type = funding_for(total_days, balance.paid_leaves_balance);

        let leave = self
            .store
            .insert_leave(NewLeaveRequest {
                employee_id,
                leave_type,
                start_date,
                end_date,
                total_days: i32::try_from(total_days).unwrap_or(i32::MAX),
                reason: reason.to_string(),
            })
            .await
            .map_err(|e| match e {
                RepoError::MissingReference(_) => LeaveError::EmployeeNotFound,
                other => LeaveError::Store(other),
            })?;

        tracing::info!(
            employee_id,
            leave_id = leave.id,
            leave_type = %leave_type,
            total_days,
            "Leave applied"
        );

        self.audit.record(
            Some(employee_id),
            AuditAction::LeaveApplied,
            EntityType::Leave,
            Some(leave.id),
            json!({
                "leave_type": leave_type,
                "start_date": start_date,
                "end_date": end_date,
                "total_days": total_days,
            }),
            origin,
        );

        Ok(leave)
    }

    pub async fn review_leave(
        &self,
        request_id: u64,
        reviewer_id: u64,
        decision: &str,
        remarks: Option<String>,
        now: DateTime<Utc>,
        origin: &RequestOrigin,
    ) -> Result<(), LeaveError> {
        let decision: ReviewDecision = decision
            .trim()
            .parse()
            .map_err(|_| LeaveError::InvalidDecision)?;

        let leave = self
            .store
            .find_leave(request_id)
            .await?
            .ok_or(LeaveError::NotFound)?;

        if leave.status != LeaveStatus::Pending {
            return Err(LeaveError::AlreadyReviewed);
        }

        let plan = self.plan_review(&leave, decision, reviewer_id, remarks, now).await?;

        self.store.apply_review(&plan).await.map_err(|e| match e {
            RepoError::Conflict(_) => LeaveError::AlreadyReviewed,
            other => {
                tracing::error!(leave_id = request_id, error = %other, "Review rolled back");
                LeaveError::Store(other)
            }
        })?;

        tracing::info!(
            leave_id = request_id,
            employee_id = leave.employee_id,
            reviewer_id,
            status = %plan.status,
            backfilled = plan.backfill.len(),
            "Leave reviewed"
        );

        let action = match decision {
            ReviewDecision::Approved => AuditAction::LeaveApproved,
            ReviewDecision::Rejected => AuditAction::LeaveRejected,
        };
        self.audit.record(
            Some(reviewer_id),
            action,
            EntityType::Leave,
            Some(request_id),
            json!({
                "employee_id": leave.employee_id,
                "leave_type": leave.leave_type,
                "status": plan.status,
                "remarks": plan.remarks,
            }),
            origin,
        );

        Ok(())
    }

    async fn plan_review(
        &self,
        leave: &LeaveRequest,
        decision: ReviewDecision,
        reviewer_id: u64,
        remarks: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReviewPlan, LeaveError> {
        let mut plan = ReviewPlan {
            request_id: leave.id,
            employee_id: leave.employee_id,
            status: decision.into(),
            reviewed_by: reviewer_id,
            reviewed_at: now,
            remarks: remarks.filter(|r| !r.trim().is_empty()),
            adjustment: BalanceAdjustment::None,
            backfill: Vec::new(),
        };

        if decision == ReviewDecision::Rejected {
            return Ok(plan);
        }

        let chargeable = Decimal::from(business_days(leave.start_date, leave.end_date));
        plan.adjustment = match leave.leave_type {
            _ if chargeable.is_zero() => BalanceAdjustment::None,
            LeaveType::Paid => BalanceAdjustment::DebitPaid(chargeable),
            LeaveType::Unpaid => BalanceAdjustment::CreditUnpaid(chargeable),
        };
        plan.backfill = dates_in_range(leave.start_date, leave.end_date).collect();

        if let BalanceAdjustment::DebitPaid(days) = plan.adjustment {
            if let Some(balance) = self.store.find_employee_balance(leave.employee_id).await? {
                let remaining = balance.paid_leaves_balance - days;
                if remaining < Decimal::ZERO {
                    tracing::warn!(
                        employee_id = leave.employee_id,
                        leave_id = leave.id,
                        %remaining,
                        "Approval drives paid leave balance negative"
                    );
                }
            }
        }

        Ok(plan)
    }

    pub async fn cancel_leave(
        &self,
        request_id: u64,
        employee_id: u64,
        origin: &RequestOrigin,
    ) -> Result<(), LeaveError> {
        let leave = self
            .store
            .find_leave(request_id)
            .await?
            .ok_or(LeaveError::NotFound)?;

        if leave.employee_id != employee_id {
            return Err(LeaveError::NotOwner);
        }
        if leave.status != LeaveStatus::Pending {
            return Err(LeaveError::NotPending);
        }

        // Reviewed between the read and the delete.
        if !self.store.delete_pending_leave(request_id).await? {
            return Err(LeaveError::NotPending);
        }

        tracing::info!(employee_id, leave_id = request_id, "Leave cancelled");

        self.audit.record(
            Some(employee_id),
            AuditAction::LeaveCancelled,
            EntityType::Leave,
            Some(request_id),
            json!({
                "start_date": leave.start_date,
                "end_date": leave.end_date,
            }),
            origin,
        );

        Ok(())
    }

    pub async fn balance(&self, employee_id: u64) -> Result<LeaveBalance, LeaveError> {
        let balance = self
            .store
            .find_employee_balance(employee_id)
            .await?
            .ok_or(LeaveError::EmployeeNotFound)?;
        let counts = self.store.count_requests(employee_id).await?;

        Ok(LeaveBalance {
            paid_leaves_balance: balance.paid_leaves_balance,
            annual_paid_leaves: self.policy.annual_paid_leaves,
            unpaid_leaves_taken: balance.unpaid_leaves_taken,
            pending_requests: counts.pending,
            approved_requests: counts.approved,
        })
    }
}
