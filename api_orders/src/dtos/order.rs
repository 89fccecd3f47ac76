use common::misc::PaymentMethod;
use db::models::{order::Order, subscription::Subscription};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub external_id: i64,
    pub language: Option<String>,
}

/// The order amount is always the plan price; clients cannot choose it.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_external_id: i64,
    pub plan_id: i64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order: Order,
    /// Crypto orders only. Empty when the gateway could not issue an invoice.
    pub payment_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManualProvisionRequest {
    pub config_payload: String,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailsResponse {
    pub order: Order,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub message: &'static str,
    pub order_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}
