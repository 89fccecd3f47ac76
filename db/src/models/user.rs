use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer. `external_id` is the id the customer is known by on the chat platform
/// and is the recipient of notification events.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub external_id: i64,
    pub language: String,
    pub created_at: DateTime<Utc>,
}
