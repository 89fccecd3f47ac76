use chrono::{DateTime, Utc};
use common::misc::ServerKind;
use serde::Serialize;

/// A VPN management backend the service can provision accounts on.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub server_kind: ServerKind,
    pub base_url: String,
    /// Backend-specific credential blob. Only the provider layer interprets it.
    #[serde(skip_serializing)]
    pub credentials: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
