pub mod attendance_service;
pub mod audit_service;
pub mod leave_service;
