use std::sync::Arc;

use actix_web::web;
use common::env_config::Config;
use middleware::auth::AuthMiddleware;

pub mod routes {
    pub mod auth;
}
pub mod middleware {
    pub mod auth;
}
mod services {
    pub(crate) mod auth;
}
mod dtos {
    pub(crate) mod auth;
}

/// Operator login. Registered as a plain resource so it stays outside the
/// JWT-protected admin scope.
pub fn mount_auth(cfg: &mut web::ServiceConfig) {
    cfg.service(routes::auth::post_login);
}

/// Requires a valid operator JWT on every request of the wrapped scope.
pub fn auth_middleware(config: Arc<Config>) -> AuthMiddleware {
    AuthMiddleware::new(config.jwt_config.secret.clone())
}
