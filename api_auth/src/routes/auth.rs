use std::sync::Arc;

use actix_web::{Responder, post, web};
use common::{env_config::Config, error::Res, http::Success};

use crate::{dtos::auth::LoginRequest, services};

/// Authenticates the operator with the configured password.
///
/// # Input
/// - `req`: JSON payload `{ "password": "..." }`
/// - `config`: Application configuration holding the password hash and JWT settings
///
/// # Output
/// - Success: `{ "token": "<jwt>" }`, to be sent as `Authorization: Bearer <jwt>`
/// - Error: 401 Unauthorized for a wrong password
#[post("/admin/login")]
pub async fn post_login(
    req: web::Json<LoginRequest>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let response = services::auth::login(&config, &req.into_inner())?;
    Success::ok(response)
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web};
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use common::env_config::{Config, GatewayConfig, JwtConfig};
    use serde_json::json;

    use super::*;

    fn config() -> Arc<Config> {
        let salt = SaltString::from_b64("c2FsdHNhbHRzYWx0").unwrap();
        let admin_password_hash = Argon2::default()
            .hash_password(b"hunter2", &salt)
            .unwrap()
            .to_string();
        Arc::new(Config {
            environment: "development".to_string(),
            database_url: String::new(),
            jwt_config: JwtConfig {
                secret: "route-secret".to_string(),
                expiration_hours: 1,
            },
            admin_password_hash,
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            num_workers: 1,
            cors_allowed_origin: String::new(),
            console_logging_enabled: false,
            log_file: String::new(),
            gateway: GatewayConfig {
                merchant_key: String::new(),
                api_url: String::new(),
            },
            notifier_url: None,
            quota_check_interval_secs: 3600,
            provision_max_attempts: 3,
            provision_retry_delay_secs: 0,
            public_rate_limit_per_second: 20,
            seed_servers: Vec::new(),
        })
    }

    #[actix_web::test]
    async fn login_issues_token_for_correct_password() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config()))
                .service(post_login),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/admin/login")
            .set_json(json!({ "password": "hunter2" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let token = body["token"].as_str().unwrap();
        assert!(common::jwt::validate_jwt(token, "route-secret").is_ok());

        let req = test::TestRequest::post()
            .uri("/admin/login")
            .set_json(json!({ "password": "wrong" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
