use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod repository;
mod routes;
mod services;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::repository::{AccountStore, mysql::MySqlStore};
use crate::services::{
    attendance_service::AttendanceService,
    audit_service::{AuditLogger, AuditWorker},
    leave_service::LeaveService,
};
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HRM attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;

    // Rolling daily log, mirrored to stdout
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .with(fmt::layer().with_target(false))
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url, config.db_max_connections).await?;
    let store = Arc::new(MySqlStore::new(pool.clone()));

    let (audit, audit_rx) = AuditLogger::channel(config.audit_queue_capacity);
    let worker = AuditWorker::new(store.clone());
    actix_web::rt::spawn(worker.run(audit_rx));

    let attendance_service = Data::new(AttendanceService::new(
        store.clone(),
        audit.clone(),
        config.policy.clone(),
    ));
    let leave_service = Data::new(LeaveService::new(
        store.clone(),
        audit.clone(),
        config.policy.clone(),
    ));
    let accounts: Arc<dyn AccountStore> = store.clone();
    let accounts_data = Data::from(accounts);
    let pool_data = Data::new(pool);
    let config_data = Data::new(config.clone());
    let audit_data = Data::new(audit);

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard matches the JS/CSS assets
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool_data.clone())
            .app_data(config_data.clone())
            .app_data(accounts_data.clone())
            .app_data(audit_data.clone())
            .app_data(attendance_service.clone())
            .app_data(leave_service.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await
    .context("Server terminated with an error")
}
