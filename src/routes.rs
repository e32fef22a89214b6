use crate::{
    api::{admin, attendance, employee, leave_request},
    auth::{
        handlers,
        middleware::{auth_middleware, ip_restriction},
    },
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// One token every `60_000 / requests_per_min` ms, bursting up to the full minute.
fn limiter_config(requests_per_min: u32) -> GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / u64::from(requests_per_min)).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            tracing::warn!(requests_per_min, "Invalid rate limit, using the default limiter");
            GovernorConfig::default()
        })
}

fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    Governor::new(&limiter_config(requests_per_min))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = build_limiter(config.rate_protected_per_min);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .wrap(from_fn(ip_restriction))
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .wrap(from_fn(ip_restriction)) // outermost: network check first
            .configure(protected_routes),
    );
}

fn protected_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/me", web::get().to(handlers::me))
            .route("/change-password", web::post().to(handlers::change_password)),
    )
    .service(
        web::scope("/attendance")
            .route("/check-in", web::post().to(attendance::check_in))
            .route("/check-out", web::post().to(attendance::check_out))
            .route("/today", web::get().to(attendance::today))
            .route("/history", web::get().to(attendance::history))
            .route("/stats", web::get().to(attendance::stats))
            .route("/all", web::get().to(attendance::all))
            .route("/export", web::get().to(attendance::export))
            .route("/repair", web::post().to(attendance::repair)),
    )
    .service(
        web::scope("/leave")
            .route("/apply", web::post().to(leave_request::apply))
            .route("/my-requests", web::get().to(leave_request::my_requests))
            .route("/balance", web::get().to(leave_request::balance))
            .route("/all-requests", web::get().to(leave_request::all_requests))
            .route("/{id}/review", web::put().to(leave_request::review))
            // /leave/{id} last so it never shadows the fixed paths above
            .route("/{id}", web::delete().to(leave_request::cancel)),
    )
    .service(
        web::scope("/admin")
            .route("/dashboard", web::get().to(admin::dashboard))
            .service(
                web::resource("/employees")
                    .route(web::get().to(employee::list_employees))
                    .route(web::post().to(employee::create_employee)),
            )
            .service(
                web::resource("/employees/{id}")
                    .route(web::put().to(employee::update_employee))
                    .route(web::delete().to(employee::delete_employee)),
            )
            .route("/reports/attendance", web::get().to(admin::attendance_report))
            .route("/reports/leave", web::get().to(admin::leave_report)),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with the refresh token as bearer
//       └─ returns a new token pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ip_filter::AllowedNetwork;
    use crate::repository::{AccountStore, memory::MemoryStore};
    use actix_web::{App, HttpResponse, http::StatusCode, test, web::Data};

    fn accounts() -> Data<dyn AccountStore> {
        let store: Arc<dyn AccountStore> = Arc::new(MemoryStore::new());
        Data::from(store)
    }

    fn config(enable_ip_restriction: bool, allowed_ips: Vec<AllowedNetwork>) -> Config {
        Config {
            enable_ip_restriction,
            allowed_ips,
            ..Config::for_tests()
        }
    }

    #[actix_web::test]
    async fn protected_routes_require_a_bearer_token() {
        let config = config(false, Vec::new());
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config.clone()))
                .app_data(accounts())
                .configure(|cfg| configure(cfg, &config)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/attendance/today")
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing Authorization header");
    }

    #[actix_web::test]
    async fn ip_restriction_blocks_unlisted_networks() {
        let allowed = vec!["10.0.0.0/8".parse().unwrap()];
        let config = config(true, allowed);
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config.clone()))
                .app_data(accounts())
                .configure(|cfg| configure(cfg, &config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/attendance/check-in")
            .peer_addr("192.168.1.20:5000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // A spoofed forwarding header does not help without a trusted proxy.
        let req = test::TestRequest::post()
            .uri("/api/attendance/check-in")
            .insert_header(("x-forwarded-for", "10.9.9.9"))
            .peer_addr("192.168.1.20:5000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // Allowed network gets past the IP check and stops at authentication.
        let req = test::TestRequest::post()
            .uri("/api/attendance/check-in")
            .peer_addr("10.1.2.3:5000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn zero_rate_is_clamped_to_one_per_minute() {
        let app = test::init_service(
            App::new().service(
                web::resource("/ping")
                    .wrap(build_limiter(0))
                    .route(web::get().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let ping = || {
            test::TestRequest::get()
                .uri("/ping")
                .peer_addr("127.0.0.1:5000".parse().unwrap())
                .to_request()
        };
        assert_eq!(test::call_service(&app, ping()).await.status(), StatusCode::OK);
        assert_eq!(
            test::call_service(&app, ping()).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
