use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::EngineError;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

fn reject(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    let resp = EngineError::Unauthorized(message.to_string()).error_response();
    req.into_response(resp)
}

/// Verifies the bearer access token and attaches the caller as an [`AuthUser`].
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header_value = match req.headers().get("Authorization").map(|h| h.to_str()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => return Ok(reject(req, "Invalid Authorization header encoding")),
        None => return Ok(reject(req, "Missing Authorization header")),
    };

    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return Ok(reject(req, "Authorization header must start with Bearer"));
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            return Ok(reject(req, "Invalid or expired token"));
        }
    };

    let Some(role) = Role::from_id(claims.role) else {
        tracing::debug!(role = claims.role, user_id = claims.user_id, "Unknown role id");
        return Ok(reject(req, "Invalid role"));
    };

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        member_id: claims.member_id,
        client_id: claims.client_id,
    });

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use actix_web::{
        App, HttpResponse,
        http::StatusCode,
        middleware::from_fn,
        test,
        web::{self, Data},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        auth::jwt::tests::{SECRET, mint},
        config::StoreBackend,
        models::TokenType,
    };

    fn config() -> Config {
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

    async fn whoami(auth: AuthUser) -> HttpResponse {
        HttpResponse::Ok().json(json!({
            "userId": auth.user_id,
            "username": auth.username,
            "memberId": auth.member_id,
        }))
    }

    #[actix_web::test]
    async fn valid_token_attaches_the_caller() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config()))
                .wrap(from_fn(auth_middleware))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let token = mint(Role::Member, Some(10), None, TokenType::Access);
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["userId"], 1);
        assert_eq!(body["username"], "tester");
        assert_eq!(body["memberId"], 10);
    }

    #[actix_web::test]
    async fn rejections_do_not_leak_token_errors() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config()))
                .wrap(from_fn(auth_middleware))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["message"], "Invalid or expired token");
        assert!(body.get("details").is_none());

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Token abc"))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["message"], "Authorization header must start with Bearer");
    }
}
