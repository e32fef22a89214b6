use actix_web::{HttpResponse, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

/// `{"success": true, "message": .., "data": ..}`
pub fn success<T: Serialize>(message: &str, data: T) -> HttpResponse {
    success_with_status(StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    success_with_status(StatusCode::CREATED, message, data)
}

pub fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
    }))
}

pub fn failure(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "success": false,
        "message": message,
    }))
}

fn success_with_status<T: Serialize>(status: StatusCode, message: &str, data: T) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "success": true,
        "message": message,
        "data": data,
    }))
}

/// Logs a database failure and hides it behind a generic 500.
pub fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> actix_web::Error {
    move |e| {
        tracing::error!(error = %e, "{context}");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Pagination {
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub limit: u32,
    #[schema(example = 42)]
    pub total: i64,
    #[schema(example = 3)]
    pub total_pages: i64,
}

impl Pagination {
    /// 1-based page, limit clamped to `1..=max_limit`.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
            total: 0,
            total_pages: 0,
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn with_total(self, total: i64) -> Self {
        let limit = i64::from(self.limit);
        Self {
            total,
            total_pages: (total + limit - 1) / limit,
            ..self
        }
    }
}
