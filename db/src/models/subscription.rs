use chrono::{DateTime, Utc};
use common::misc::SubscriptionStatus;
use serde::Serialize;

/// The entitlement created for an approved order. Exactly one row exists per order.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    /// `None` for subscriptions issued manually by an operator.
    pub server_id: Option<i64>,
    pub config_payload: String,
    /// Identity derived from (user, order) under which the account was requested.
    pub account_name: String,
    /// Key of the account/peer on the remote backend, as reported in usage data.
    pub external_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
