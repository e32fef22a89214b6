use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::repository::AccountStore;
use crate::utils::client_info::client_ip_addr;
use crate::utils::ip_filter::is_allowed;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

fn reject(req: ServiceRequest, resp: HttpResponse) -> Result<ServiceResponse<BoxBody>, Error> {
    Ok(req.into_response(resp.map_into_boxed_body()))
}

fn unauthorized(req: ServiceRequest, message: &str) -> Result<ServiceResponse<BoxBody>, Error> {
    let resp = HttpResponse::Unauthorized().json(json!({"success": false, "message": message}));
    reject(req, resp)
}

async fn forward(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    next.call(req).await.map(ServiceResponse::map_into_boxed_body)
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;
    let accounts = req
        .app_data::<Data<dyn AccountStore>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Account store missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => h.to_str().map_err(|_| {
            actix_web::error::ErrorUnauthorized(
                json!({"success": false, "message": "Invalid Authorization header encoding"}),
            )
        })?,
        None => return unauthorized(req, "Missing Authorization header"),
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return unauthorized(req, "Authorization header must start with Bearer"),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            return unauthorized(req, "Invalid or expired token");
        }
    };

    let token_user = match AuthUser::try_from(claims) {
        Ok(user) => user,
        Err(reason) => return unauthorized(req, reason),
    };

    // The token only names the employee; standing and role come from storage.
    let account = match accounts.find_account(token_user.employee_id).await {
        Ok(Some(account)) => account,
        Ok(None) => return unauthorized(req, "Employee not found"),
        Err(e) => {
            tracing::error!(error = %e, employee_id = token_user.employee_id, "Failed to load account");
            return Err(actix_web::error::ErrorInternalServerError("Internal Server Error"));
        }
    };

    let auth_user = match AuthUser::from_account(&account) {
        Ok(user) => user,
        Err(reason) => {
            tracing::info!(employee_id = account.id, reason, "Rejected stored account");
            return unauthorized(req, reason);
        }
    };

    req.extensions_mut().insert(auth_user);

    forward(req, next).await
}

/// Refuses callers outside `ALLOWED_IPS` when `ENABLE_IP_RESTRICTION` is set.
pub async fn ip_restriction(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    if config.enable_ip_restriction {
        let ip = client_ip_addr(req.headers(), req.peer_addr(), config.trust_proxy);
        let permitted = ip.is_some_and(|ip| is_allowed(&config.allowed_ips, ip));

        if !permitted {
            tracing::warn!(ip = ?ip, path = %req.path(), "Request blocked by IP restriction");
            let resp = HttpResponse::Forbidden().json(json!({
                "success": false,
                "message": "Access denied. Please connect from an authorized network."
            }));
            return reject(req, resp);
        }
    }

    forward(req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use crate::model::role::Role;
    use crate::repository::memory::MemoryStore;
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};
    use std::sync::Arc;

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.role.to_string())
    }

    fn bearer(employee_id: u64, role: Role, config: &Config) -> String {
        let token = generate_access_token(
            employee_id,
            format!("EMP{employee_id:03}"),
            role as u8,
            &config.jwt_secret,
            60,
        )
        .unwrap();
        format!("Bearer {token}")
    }

    async fn call(store: MemoryStore, authorization: String) -> (StatusCode, String) {
        let config = Config::for_tests();
        let accounts: Arc<dyn AccountStore> = Arc::new(store);
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config))
                .app_data(Data::from(accounts))
                .service(
                    web::scope("/api")
                        .wrap(actix_web::middleware::from_fn(auth_middleware))
                        .route("/whoami", web::get().to(whoami)),
                ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", authorization))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[actix_web::test]
    async fn role_comes_from_the_stored_account() {
        let config = Config::for_tests();
        let store = MemoryStore::new().with_account(4, Role::Employee, true);

        // Signed while still an admin, since demoted.
        let (status, body) = call(store, bearer(4, Role::Admin, &config)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "employee");
    }

    #[actix_web::test]
    async fn deactivated_account_is_refused_with_a_live_token() {
        let config = Config::for_tests();
        let store = MemoryStore::new().with_account(4, Role::Employee, false);

        let (status, body) = call(store, bearer(4, Role::Employee, &config)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Your account has been deactivated"));
    }

    #[actix_web::test]
    async fn unknown_employee_is_refused() {
        let config = Config::for_tests();
        let store = MemoryStore::new().with_account(4, Role::Employee, true);

        let (status, body) = call(store, bearer(42, Role::Employee, &config)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Employee not found"));
    }
}
