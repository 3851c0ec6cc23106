pub mod analytics;
pub mod job;

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use actix_web::{
        App, Error,
        body::MessageBody,
        dev::{ServiceFactory, ServiceRequest, ServiceResponse},
        http::StatusCode,
        test,
        web::Data,
    };
    use chrono::FixedOffset;
    use serde_json::{Value, json};

    use crate::{
        analytics::Analytics,
        auth::jwt::tests::{SECRET, mint},
        config::{Config, StoreBackend},
        engine::{AttendancePolicy, JobEngine, tests::seeded_store},
        model::role::Role,
        models::TokenType,
        routes,
        store::MemoryStore,
        utils::member_names::MemberNames,
    };

    fn test_config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            jwt_secret: SECRET.into(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            memory_seed_file: None,
            run_migrations: false,
            rate_protected_per_min: 1000,
            rate_analytics_per_min: 1000,
            api_prefix: "/api".into(),
            report_utc_offset_minutes: 0,
            punch_out_completes: true,
            member_name_cache_ttl_secs: 60,
        }
    }

    fn build_app(
        store: Arc<MemoryStore>,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        let config = test_config();
        let engine = JobEngine::new(store.clone(), AttendancePolicy::default());
        let names = MemberNames::new(store.clone(), Duration::from_secs(60));
        let analytics = Analytics::new(store, names, FixedOffset::east_opt(0).unwrap());

        App::new()
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(engine))
            .app_data(Data::new(analytics))
            .configure(|cfg| routes::configure(cfg, config))
    }

    fn admin() -> String {
        mint(Role::Admin, None, None, TokenType::Access)
    }

    fn member(id: u64) -> String {
        mint(Role::Member, Some(id), None, TokenType::Access)
    }

    fn authed(req: test::TestRequest, token: &str) -> test::TestRequest {
        req.peer_addr("127.0.0.1:50000".parse().unwrap())
            .insert_header(("Authorization", format!("Bearer {}", token)))
    }

    fn job_body() -> Value {
        json!({
            "assignedTo": 10,
            "siteIds": [1],
            "clientId": 20,
            "notes": "Check the compressor",
            "startDate": "2026-03-10",
            "endDate": "2026-03-10",
            "startTime": "09:00",
            "endTime": "17:00"
        })
    }

    #[actix_web::test]
    async fn requests_without_valid_tokens_are_rejected() {
        let app = test::init_service(build_app(seeded_store())).await;

        let req = test::TestRequest::get()
            .uri("/api/jobs/1")
            .peer_addr("127.0.0.1:50000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let refresh = mint(Role::Admin, None, None, TokenType::Refresh);
        let req = authed(test::TestRequest::get().uri("/api/jobs/1"), &refresh).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn job_lifecycle_over_http() {
        let app = test::init_service(build_app(seeded_store())).await;

        // Members cannot create jobs.
        let req = authed(test::TestRequest::post().uri("/api/jobs"), &member(10))
            .set_json(job_body())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = authed(test::TestRequest::post().uri("/api/jobs"), &admin())
            .set_json(job_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let job: Value = test::read_body_json(resp).await;
        assert_eq!(job["status"], "pending");
        let id = job["id"].as_u64().unwrap();

        // Only the assignee may punch in.
        let uri = format!("/api/jobs/{}/punch-in", id);
        let req = authed(test::TestRequest::post().uri(&uri), &member(11))
            .set_json(json!({ "images": [] }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = authed(test::TestRequest::post().uri(&uri), &member(10))
            .set_json(json!({ "images": ["/uploads/in.jpg"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let receipt: Value = test::read_body_json(resp).await;
        assert_eq!(receipt["status"], "active");

        let req = authed(test::TestRequest::post().uri(&uri), &member(10))
            .set_json(json!({ "images": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "AlreadyPunchedIn");

        // Immediately punching out closes a sub-minute window.
        let req = authed(
            test::TestRequest::post().uri(&format!("/api/jobs/{}/punch-out", id)),
            &member(10),
        )
        .set_json(json!({ "images": [] }))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "InvalidDuration");

        let req = authed(test::TestRequest::get().uri("/api/jobs/active"), &admin()).to_request();
        let active: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(active.as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn engine_errors_map_to_status_codes() {
        let app = test::init_service(build_app(seeded_store())).await;

        let req = authed(test::TestRequest::get().uri("/api/jobs/404"), &admin()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "NotFound");

        let req = authed(test::TestRequest::post().uri("/api/jobs"), &admin())
            .set_json(job_body())
            .to_request();
        let job: Value = test::call_and_read_body_json(&app, req).await;
        let req = authed(
            test::TestRequest::put().uri(&format!("/api/jobs/{}/status", job["id"])),
            &admin(),
        )
        .set_json(json!({ "status": "finished" }))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "InvalidStatus");

        let req = authed(test::TestRequest::get().uri("/api/jobs/abc"), &admin()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "ValidationError");

        let req = authed(test::TestRequest::post().uri("/api/jobs"), &admin())
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"assignedTo\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "ValidationError");

        let req = authed(test::TestRequest::post().uri("/api/jobs"), &member(10))
            .set_json(job_body())
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["error"], "Forbidden");

        let mut missing_client = job_body();
        missing_client["clientId"] = Value::Null;
        let req = authed(test::TestRequest::post().uri("/api/jobs"), &admin())
            .set_json(missing_client)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "ValidationError");
    }

    #[actix_web::test]
    async fn analytics_endpoints_respect_scope() {
        let app = test::init_service(build_app(seeded_store())).await;

        let req = authed(
            test::TestRequest::get().uri("/api/analytics/jobs/graph?filter=week"),
            &member(10),
        )
        .to_request();
        let graph: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(graph["memberId"], 10);
        assert_eq!(graph["filter"], "week");
        assert_eq!(graph["data"].as_array().unwrap().len(), 8);

        let req = authed(
            test::TestRequest::get().uri("/api/analytics/jobs/graph?filter=decade"),
            &admin(),
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "ValidationError");

        let req = authed(
            test::TestRequest::get().uri("/api/analytics/team/activity"),
            &member(10),
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Forbidden");
        assert_eq!(body["message"], "Admin only");

        let req = authed(
            test::TestRequest::get().uri("/api/analytics/series/sites?days=3"),
            &admin(),
        )
        .to_request();
        let series: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(series.as_array().unwrap().len(), 3);

        let req = authed(
            test::TestRequest::get().uri("/api/analytics/series/visits"),
            &admin(),
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "NotFound");
        assert_eq!(body["message"], "unknown series 'visits'");

        let req = authed(
            test::TestRequest::get().uri("/api/analytics/dashboard?period=week"),
            &admin(),
        )
        .to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary["breakdown"].as_array().unwrap().len(), 7);
        assert_eq!(summary["summary"]["totalCompletedJobs"], 0);
    }
}
