//! Errors raised by the attendance and leave services and their HTTP mapping.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::repository::RepoError;

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StateConflict,
    NotFound,
    Validation,
    Infrastructure,
}

impl ErrorKind {
    fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("You have already checked in today")]
    AlreadyCheckedIn,

    #[error("No check-in record found for today. Please check in first.")]
    NoCheckIn,

    #[error("You have already checked out today")]
    AlreadyCheckedOut,

    #[error("Storage failure: {0}")]
    Store(#[from] RepoError),
}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::AlreadyCheckedIn | AttendanceError::AlreadyCheckedOut => {
                ErrorKind::StateConflict
            }
            AttendanceError::NoCheckIn => ErrorKind::NotFound,
            AttendanceError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

#[derive(Debug, Error)]
pub enum LeaveError {
    #[error("End date must be after or same as start date")]
    InvalidRange,

    #[error("Reason is required")]
    EmptyReason,

    #[error("Invalid status. Must be \"approved\" or \"rejected\"")]
    InvalidDecision,

    #[error("Leave request not found")]
    NotFound,

    #[error("Leave request belongs to another employee")]
    NotOwner,

    #[error("Only pending leave requests can be cancelled")]
    NotPending,

    #[error("This leave request has already been reviewed")]
    AlreadyReviewed,

    #[error("Employee not found")]
    EmployeeNotFound,

    #[error("Storage failure: {0}")]
    Store(#[from] RepoError),
}

impl LeaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaveError::InvalidRange | LeaveError::EmptyReason | LeaveError::InvalidDecision => {
                ErrorKind::Validation
            }
            LeaveError::NotFound | LeaveError::NotOwner | LeaveError::EmployeeNotFound => {
                ErrorKind::NotFound
            }
            LeaveError::NotPending | LeaveError::AlreadyReviewed => ErrorKind::StateConflict,
            LeaveError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

fn error_response(kind: ErrorKind, status: StatusCode, message: String) -> HttpResponse {
    // Storage details stay in the logs.
    let message = if kind == ErrorKind::Infrastructure {
        tracing::error!(error = %message, "Request failed");
        "Internal Server Error".to_string()
    } else {
        message
    };

    HttpResponse::build(status).json(json!({
        "success": false,
        "message": message,
    }))
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    fn error_response(&self) -> HttpResponse {
        error_response(self.kind(), self.status_code(), self.to_string())
    }
}

impl ResponseError for LeaveError {
    fn status_code(&self) -> StatusCode {
        match self {
            // The request exists; the caller just may not touch it.
            LeaveError::NotOwner => StatusCode::FORBIDDEN,
            other => other.kind().status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_response(self.kind(), self.status_code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(AttendanceError::AlreadyCheckedIn.kind(), ErrorKind::StateConflict);
        assert_eq!(AttendanceError::AlreadyCheckedOut.kind(), ErrorKind::StateConflict);
        assert_eq!(AttendanceError::NoCheckIn.kind(), ErrorKind::NotFound);
        assert_eq!(LeaveError::AlreadyReviewed.kind(), ErrorKind::StateConflict);
        assert_eq!(LeaveError::NotPending.kind(), ErrorKind::StateConflict);
        assert_eq!(LeaveError::NotOwner.kind(), ErrorKind::NotFound);
        assert_eq!(LeaveError::InvalidDecision.kind(), ErrorKind::Validation);
        assert_eq!(
            LeaveError::Store(RepoError::Database("boom".into())).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(AttendanceError::AlreadyCheckedIn.status_code(), StatusCode::CONFLICT);
        assert_eq!(AttendanceError::NoCheckIn.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(LeaveError::EmptyReason.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(LeaveError::NotOwner.status_code(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn infrastructure_details_are_not_leaked() {
        let err = AttendanceError::Store(RepoError::Database("connection reset by peer".into()));
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Internal Server Error");
        assert_eq!(body["success"], false);
    }
}
