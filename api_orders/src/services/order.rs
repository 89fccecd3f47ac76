use common::{
    error::{AppError, Res},
    misc::PaymentMethod,
};
use db::{
    Store,
    dtos::order::OrderCreateRequest,
    models::{subscription::Subscription, user::User},
};

use crate::{
    dtos::order::{CreateOrderRequest, CreateOrderResponse, CreateUserRequest},
    misc::gateway::GatewayClient,
};

/// Returns the user known under `external_id`, registering it on first contact.
pub async fn register_user(store: &dyn Store, req: CreateUserRequest) -> Res<User> {
    let language = req.language.unwrap_or_else(|| "en".to_string());
    store.upsert_user(req.external_id, &language).await
}

/// Creates a pending order for an active plan. Crypto orders also get an invoice
/// link; a gateway failure leaves the link empty but keeps the order.
pub async fn create_order(
    store: &dyn Store,
    gateway: &GatewayClient,
    req: CreateOrderRequest,
) -> Res<CreateOrderResponse> {
    let user = store
        .get_user_by_external_id(req.user_external_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", req.user_external_id)))?;
    let plan = store
        .get_plan(req.plan_id)
        .await?
        .filter(|plan| plan.is_active)
        .ok_or_else(|| AppError::NotFound(format!("Plan {}", req.plan_id)))?;

    let amount = plan.price;

    let order = store
        .insert_order(OrderCreateRequest {
            user_id: user.id,
            plan_id: plan.id,
            amount,
            payment_method: req.payment_method,
        })
        .await?;
    log::info!(
        "Order {} created for user {} (plan {}, {})",
        order.id,
        user.external_id,
        plan.id,
        order.payment_method
    );

    let payment_link = match order.payment_method {
        PaymentMethod::Crypto => match gateway.create_invoice(order.id, amount).await {
            Ok(link) => Some(link),
            Err(e) => {
                log::error!("Invoice for order {} failed: {}", order.id, e);
                None
            }
        },
        PaymentMethod::Card => None,
    };

    Ok(CreateOrderResponse {
        order,
        payment_link,
    })
}

pub async fn get_user_subscriptions(store: &dyn Store, external_id: i64) -> Res<Vec<Subscription>> {
    let user = store
        .get_user_by_external_id(external_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", external_id)))?;
    store.get_subscriptions_by_user(user.id).await
}
