use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use common::{error::Res, http::Success};
use db::Store;

use crate::{
    dtos::order::{CreateOrderRequest, CreateUserRequest},
    misc::gateway::GatewayClient,
    services,
};

/// Registers a customer by chat id, or returns the existing record.
#[post("/users")]
pub async fn post_user(
    store: web::Data<Arc<dyn Store>>,
    req: web::Json<CreateUserRequest>,
) -> Res<impl Responder> {
    let user = services::order::register_user(store.get_ref().as_ref(), req.into_inner()).await?;
    Success::ok(user)
}

#[get("/users/{external_id}/subscriptions")]
pub async fn get_user_subscriptions(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<i64>,
) -> Res<impl Responder> {
    let subscriptions =
        services::order::get_user_subscriptions(store.get_ref().as_ref(), path.into_inner())
            .await?;
    Success::ok(subscriptions)
}

/// Creates a pending order.
///
/// # Output
/// - Success: 201 with `{ order, payment_link }`; the link is set for crypto orders
/// - Error: 404 when the user or an active plan does not exist
#[post("/orders")]
pub async fn post_order(
    store: web::Data<Arc<dyn Store>>,
    gateway: web::Data<Arc<GatewayClient>>,
    req: web::Json<CreateOrderRequest>,
) -> Res<impl Responder> {
    let response =
        services::order::create_order(store.get_ref().as_ref(), &gateway, req.into_inner())
            .await?;
    Success::created(response)
}
