use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::jwt;
use futures::future::{Ready, ok};

pub struct AuthMiddleware {
    jwt_secret: Rc<String>,
}

impl AuthMiddleware {
    pub fn new(jwt_secret: String) -> Self {
        AuthMiddleware {
            jwt_secret: Rc::new(jwt_secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_secret: self.jwt_secret.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_secret: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token_value = req
            .headers()
            .get("Authorization")
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::to_string);

        let Some(token) = token_value else {
            let response = HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "No authorization token provided"}))
                .map_into_boxed_body();
            return Box::pin(async move { Ok(req.into_response(response)) });
        };

        match jwt::validate_jwt(&token, &self.jwt_secret) {
            Ok(claims) => {
                // claims are available to handlers as `web::ReqData<AdminClaims>`
                req.extensions_mut().insert(claims);
                let srv = Arc::clone(&self.service);
                Box::pin(async move { srv.call(req).await.map(|res| res.map_into_boxed_body()) })
            }
            Err(e) => {
                log::warn!("Rejected admin request to {}: {}", req.path(), e);
                let response = HttpResponse::Unauthorized()
                    .json(serde_json::json!({"error": "Invalid token"}))
                    .map_into_boxed_body();
                Box::pin(async move { Ok(req.into_response(response)) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};
    use common::env_config::JwtConfig;

    use super::*;

    const SECRET: &str = "middleware-secret";

    async fn protected() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new().service(
                    web::scope("/admin")
                        .wrap(AuthMiddleware::new(SECRET.to_string()))
                        .route("/orders", web::get().to(protected)),
                ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_token_is_rejected() {
        let app = app!();
        let req = test::TestRequest::get().uri("/admin/orders").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn foreign_token_is_rejected() {
        let app = app!();
        let token = jwt::generate_admin_jwt(&JwtConfig {
            secret: "another-secret".to_string(),
            expiration_hours: 1,
        })
        .unwrap();
        let req = test::TestRequest::get()
            .uri("/admin/orders")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn operator_token_passes() {
        let app = app!();
        let token = jwt::generate_admin_jwt(&JwtConfig {
            secret: SECRET.to_string(),
            expiration_hours: 1,
        })
        .unwrap();
        let req = test::TestRequest::get()
            .uri("/admin/orders")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
