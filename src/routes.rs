use crate::{
    api::{analytics, job},
    auth::middleware::auth_middleware,
    config::Config,
    error::payload_error,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-scope limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / requests_per_min as u64).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_default();
        Governor::new(&cfg)
    }

    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));
    let analytics_limiter = Arc::new(build_limiter(config.rate_analytics_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            // Extractor failures use the same JSON error body as the engine
            .app_data(web::JsonConfig::default().error_handler(payload_error))
            .app_data(web::QueryConfig::default().error_handler(payload_error))
            .app_data(web::PathConfig::default().error_handler(payload_error))
            .service(
                web::scope("/jobs")
                    // /jobs
                    .service(web::resource("").route(web::post().to(job::create_job)))
                    // /jobs/active
                    .service(web::resource("/active").route(web::get().to(job::active_jobs)))
                    // /jobs/{id}
                    .service(web::resource("/{id}").route(web::get().to(job::get_job)))
                    .service(
                        web::resource("/{id}/status").route(web::put().to(job::change_status)),
                    )
                    .service(web::resource("/{id}/punch-in").route(web::post().to(job::punch_in)))
                    .service(
                        web::resource("/{id}/punch-out").route(web::post().to(job::punch_out)),
                    )
                    .service(
                        web::resource("/{id}/reconcile").route(web::post().to(job::reconcile)),
                    )
                    .service(web::resource("/{id}/notes").route(web::put().to(job::update_notes)))
                    .service(
                        web::resource("/{id}/attachments")
                            .route(web::post().to(job::add_attachments))
                            .route(web::delete().to(job::remove_attachment)),
                    ),
            )
            .service(
                web::scope("/analytics")
                    .wrap(analytics_limiter)
                    .service(web::resource("/jobs/graph").route(web::get().to(analytics::job_graph)))
                    .service(
                        web::resource("/jobs/overview").route(web::get().to(analytics::jobs_overview)),
                    )
                    .service(
                        web::resource("/sites/graph").route(web::get().to(analytics::site_graph)),
                    )
                    .service(
                        web::resource("/sites/overview")
                            .route(web::get().to(analytics::sites_overview)),
                    )
                    .service(
                        web::resource("/team/activity")
                            .route(web::get().to(analytics::team_activity)),
                    )
                    .service(
                        web::resource("/team/overview")
                            .route(web::get().to(analytics::team_overview)),
                    )
                    .service(
                        web::resource("/dashboard")
                            .route(web::get().to(analytics::dashboard_summary)),
                    )
                    .service(
                        web::resource("/series/{entity}")
                            .route(web::get().to(analytics::daily_series)),
                    ),
            ),
    );
}
