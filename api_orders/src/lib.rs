//! Order lifecycle: purchase, payment settlement and the operator actions around it.

use actix_web::web;

pub mod routes {
    pub mod admin;
    pub mod order;
    pub mod webhook;
}

pub mod services {
    pub mod order;
    pub mod settlement;
}

pub mod dtos {
    pub mod order;
    pub mod webhook;
}

pub mod misc {
    pub mod gateway;
    pub(crate) mod secret;
}

pub use misc::gateway::GatewayClient;
pub use services::settlement::Settlement;

/// Payment gateway callbacks. Authenticated by the merchant secret in the body.
pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/webhooks").service(routes::webhook::post_gateway_webhook)
}

/// Customer-facing endpoints used by the chat front end.
pub fn mount_public(cfg: &mut web::ServiceConfig) {
    cfg.service(routes::order::post_user)
        .service(routes::order::get_user_subscriptions)
        .service(routes::order::post_order);
}

/// Operator actions. Must be wrapped in the admin JWT middleware.
pub fn mount_admin() -> actix_web::Scope {
    web::scope("/orders")
        .service(routes::admin::get_order)
        .service(routes::admin::post_approve)
        .service(routes::admin::post_reject)
        .service(routes::admin::post_manual_provision)
}
