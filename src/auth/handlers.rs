use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::{
        audit_log::{AuditAction, EntityType},
        employee::{Employee, EmployeeCredentials},
        role::Role,
    },
    models::{ChangePasswordReqDto, Claims, LoginReqDto, TokenType},
    services::audit_service::AuditLogger,
    utils::{
        client_info::RequestOrigin,
        response::{db_error, failure, message, success},
    },
};
use actix_web::{HttpRequest, HttpResponse, Responder, http::StatusCode, web};
use serde::Serialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize, ToSchema)]
pub struct TokenPair {
    access_token: String,
    refresh_token: String,
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (employee_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.employee_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Issues an access token and a stored refresh token.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    employee_id: u64,
    employee_code: &str,
    role_id: u8,
) -> actix_web::Result<TokenPair> {
    let internal = |e: jsonwebtoken::errors::Error| {
        error!(error = %e, employee_id, "Failed to sign token");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    };

    let access_token = generate_access_token(
        employee_id,
        employee_code.to_string(),
        role_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(internal)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        employee_id,
        employee_code.to_string(),
        role_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(internal)?;

    debug!(employee_id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool, &refresh_claims)
        .await
        .map_err(db_error("Failed to store refresh token"))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Login successful", body = Object, example = json!({
            "success": true,
            "message": "Login successful",
            "data": {
                "access_token": "eyJ...",
                "refresh_token": "eyJ...",
                "employee": { "id": 4, "employee_code": "EMP004", "role": "employee" }
            }
        })),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, audit, origin, user),
    fields(employee_code = %user.employee_code)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    audit: web::Data<AuditLogger>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    info!("Login request received");

    if user.employee_code.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty employee code or password");
        return Ok(failure(
            StatusCode::BAD_REQUEST,
            "Employee code and password are required",
        ));
    }

    let creds = sqlx::query_as::<_, EmployeeCredentials>(
        r#"
        SELECT id, employee_code, password_hash, role_id, is_active
        FROM employees
        WHERE employee_code = ?
        "#,
    )
    .bind(user.employee_code.trim())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Database error while fetching employee"))?;

    let Some(creds) = creds else {
        info!("Invalid credentials: employee not found");
        return Ok(failure(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    };

    if let Err(e) = verify_password(&user.password, &creds.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Ok(failure(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }

    if !creds.is_active {
        info!(employee_id = creds.id, "Login refused: account deactivated");
        return Ok(failure(
            StatusCode::FORBIDDEN,
            "Your account has been deactivated. Please contact HR.",
        ));
    }

    let tokens = issue_tokens(
        pool.get_ref(),
        &config,
        creds.id,
        &creds.employee_code,
        creds.role_id,
    )
    .await?;

    if let Err(e) = sqlx::query("UPDATE employees SET last_login_at = NOW() WHERE id = ?")
        .bind(creds.id)
        .execute(pool.get_ref())
        .await
    {
        // not fatal
        error!(error = %e, "Failed to update last_login_at");
    }

    audit.record(
        Some(creds.id),
        AuditAction::Login,
        EntityType::Employee,
        Some(creds.id),
        json!({ "employee_code": creds.employee_code }),
        &origin,
    );

    info!(employee_id = creds.id, "Login successful");

    Ok(success(
        "Login successful",
        json!({
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "employee": {
                "id": creds.id,
                "employee_code": creds.employee_code,
                "role": Role::from_id(creds.role_id),
            }
        }),
    ))
}

/// Rotates the refresh token sent as `Authorization: Bearer <refresh_token>`.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid, expired or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let unauthorized = || failure(StatusCode::UNAUTHORIZED, "Invalid refresh token");

    let Some(token) = bearer(&req) else {
        return Ok(unauthorized());
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return Ok(unauthorized()),
    };

    // Revoking first makes a replayed token lose the race.
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ?
        AND revoked = FALSE
        AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to revoke refresh token"))?;

    if revoked.rows_affected() == 0 {
        info!(employee_id = claims.employee_id, "Refresh token reused or expired");
        return Ok(unauthorized());
    }

    // Role or active flag may have changed since the token was issued.
    let current = sqlx::query_as::<_, EmployeeCredentials>(
        r#"
        SELECT id, employee_code, password_hash, role_id, is_active
        FROM employees
        WHERE id = ?
        "#,
    )
    .bind(claims.employee_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to load employee for refresh"))?;

    let current = match current {
        Some(c) if c.is_active => c,
        _ => return Ok(unauthorized()),
    };

    let tokens = issue_tokens(
        pool.get_ref(),
        &config,
        current.id,
        &current.employee_code,
        current.role_id,
    )
    .await?;

    Ok(success("Token refreshed", tokens))
}

/// Revokes the refresh token sent as bearer. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Current employee profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Profile", body = Employee),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let employee = sqlx::query_as::<_, Employee>(
        r#"
        SELECT id, employee_code, first_name, last_name, email, phone, designation,
               department, role_id, reporting_manager_id, date_of_joining, is_active,
               paid_leaves_balance, unpaid_leaves_taken
        FROM employees
        WHERE id = ?
        "#,
    )
    .bind(auth.employee_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to fetch profile"))?;

    match employee {
        Some(e) => Ok(success("Profile retrieved", e)),
        None => Ok(failure(StatusCode::NOT_FOUND, "Employee not found")),
    }
}

/// Change own password
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordReqDto,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password is incorrect")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    auth: AuthUser,
    body: web::Json<ChangePasswordReqDto>,
    pool: web::Data<MySqlPool>,
    audit: web::Data<AuditLogger>,
    origin: RequestOrigin,
) -> actix_web::Result<impl Responder> {
    if body.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Ok(failure(
            StatusCode::BAD_REQUEST,
            "New password must be at least 8 characters",
        ));
    }

    let creds = sqlx::query_as::<_, EmployeeCredentials>(
        r#"
        SELECT id, employee_code, password_hash, role_id, is_active
        FROM employees
        WHERE id = ?
        "#,
    )
    .bind(auth.employee_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to load credentials"))?
    .ok_or_else(|| actix_web::error::ErrorNotFound("Employee not found"))?;

    if verify_password(&body.current_password, &creds.password_hash).is_err() {
        return Ok(failure(
            StatusCode::UNAUTHORIZED,
            "Current password is incorrect",
        ));
    }

    let hashed = hash_password(&body.new_password).map_err(|e| {
        error!(error = %e, employee_id = auth.employee_id, "Failed to hash password");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    sqlx::query("UPDATE employees SET password_hash = ? WHERE id = ?")
        .bind(&hashed)
        .bind(auth.employee_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update password"))?;

    // Sign out every other session.
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE employee_id = ?")
        .bind(auth.employee_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to revoke refresh tokens"))?;

    tx.commit().await.map_err(db_error("Failed to commit password change"))?;

    audit.record(
        Some(auth.employee_id),
        AuditAction::PasswordChanged,
        EntityType::Employee,
        Some(auth.employee_id),
        json!({}),
        &origin,
    );

    info!(employee_id = auth.employee_id, "Password changed");

    Ok(message("Password changed successfully"))
}
