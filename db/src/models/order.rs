use chrono::{DateTime, Utc};
use common::misc::{PaymentMethod, PaymentStatus};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub amount: f64,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    /// Gateway track id for crypto payments.
    pub external_tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
