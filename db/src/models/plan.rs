use chrono::{DateTime, Utc};
use common::misc::ServerKind;
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub server_kind: ServerKind,
    pub duration_days: i32,
    /// Data allowance; zero or negative means unlimited.
    pub data_limit_gb: f64,
    pub price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
