use serde::Deserialize;

/// Gateway status code of a completed payment.
pub const PAID_STATUS: i64 = 100;

/// An id the gateway may send as a JSON number or as text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Number(i64),
    Text(String),
}

impl LooseId {
    pub fn as_text(&self) -> String {
        match self {
            LooseId::Number(n) => n.to_string(),
            LooseId::Text(s) => s.trim().to_string(),
        }
    }
}

/// Payment confirmation posted by the gateway, as JSON or as a form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayWebhook {
    pub merchant: String,
    pub status: i64,
    #[serde(default)]
    pub amount: Option<f64>,
    pub order_id: LooseId,
    #[serde(default)]
    pub track_id: Option<LooseId>,
    #[serde(default)]
    pub description: Option<String>,
}
