use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;

mod analytics;
mod api;
mod auth;
mod config;
mod db;
mod docs;
mod engine;
mod error;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use analytics::Analytics;
use config::{Config, StoreBackend};
use db::init_db;
use engine::{AttendancePolicy, JobEngine};
use store::{JobStore, MemoryStore, MySqlStore, memory::Seed};
use utils::member_names::MemberNames;

use crate::docs::ApiDoc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Field operations service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = ?config.store_backend, "Server starting...");

    let store: Arc<dyn JobStore> = match config.store_backend {
        StoreBackend::MySql => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when STORE_BACKEND=mysql")?;
            let pool = init_db(database_url, config.run_migrations).await?;
            Arc::new(MySqlStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            let store = MemoryStore::new();
            match config.memory_seed_file.as_deref() {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read MEMORY_SEED_FILE {}", path))?;
                    let seed = Seed::from_json(&raw)
                        .with_context(|| format!("Invalid seed file {}", path))?;
                    info!(
                        members = seed.members.len(),
                        clients = seed.clients.len(),
                        sites = seed.sites.len(),
                        "Loaded memory store seed"
                    );
                    store.load_seed(seed, Utc::now());
                }
                None => warn!("MEMORY_SEED_FILE not set; no members, clients or sites exist"),
            }
            Arc::new(store)
        }
    };

    let policy = AttendancePolicy {
        punch_out_completes: config.punch_out_completes,
    };
    let engine = JobEngine::new(store.clone(), policy);
    let names = MemberNames::new(
        store.clone(),
        Duration::from_secs(config.member_name_cache_ttl_secs),
    );
    let analytics = Analytics::new(store, names.clone(), config.report_offset()?);

    actix_web::rt::spawn(async move {
        // Warm up member names in batches of 250
        if let Err(e) = names.warmup(250).await {
            error!(error = %e, "Failed to warmup member name cache");
        }
    });

    let server_addr = config.server_addr.clone();
    let engine = Data::new(engine);
    let analytics = Data::new(analytics);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} matches JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(engine.clone())
            .app_data(analytics.clone())
            .app_data(Data::new(config.clone()))
            .service(index)
            // Protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {}", server_addr))?
    .run()
    .await?;

    Ok(())
}
