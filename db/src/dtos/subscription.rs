use chrono::{DateTime, Utc};
use common::misc::SubscriptionStatus;

use crate::models::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct SubscriptionCreateRequest {
    pub order_id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub server_id: Option<i64>,
    pub config_payload: String,
    pub account_name: String,
    pub external_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
}

/// An active subscription joined with what the quota monitor needs to judge it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeteredSubscription {
    #[sqlx(flatten)]
    pub subscription: Subscription,
    pub data_limit_gb: f64,
    pub user_external_id: i64,
}
