use std::time::Duration;

use common::{
    env_config::GatewayConfig,
    error::{AppError, Res},
};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceResponse {
    result: i64,
    pay_link: Option<String>,
    message: Option<String>,
}

/// Crypto payment gateway. Only used to obtain an invoice link for an order.
pub struct GatewayClient {
    merchant_key: String,
    api_url: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Res<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            merchant_key: config.merchant_key.clone(),
            api_url: config.api_url.clone(),
            http,
        })
    }

    /// Requests an invoice and returns its payment link. The order id is echoed back
    /// by the gateway in the payment webhook.
    pub async fn create_invoice(&self, order_id: i64, amount: f64) -> Res<String> {
        let response = self
            .http
            .post(&self.api_url)
            .json(&json!({
                "merchant": self.merchant_key,
                "amount": amount,
                "currency": "USDT",
                "orderId": order_id.to_string(),
                "description": format!("Payment for Order {}", order_id),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Invoice request failed with status {}",
                response.status()
            )));
        }

        let invoice: InvoiceResponse = response.json().await?;
        match invoice {
            InvoiceResponse {
                result: 100,
                pay_link: Some(link),
                ..
            } => Ok(link),
            InvoiceResponse { message, .. } => Err(AppError::Internal(format!(
                "Gateway refused invoice: {}",
                message.unwrap_or_else(|| "unknown error".to_string())
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    use super::*;

    async fn client(server: &MockServer) -> GatewayClient {
        GatewayClient::new(&GatewayConfig {
            merchant_key: "mk".to_string(),
            api_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_pay_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "merchant": "mk", "orderId": "7" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": 100,
                "payLink": "https://pay.example/abc",
            })))
            .mount(&server)
            .await;

        let link = client(&server).await.create_invoice(7, 4.5).await.unwrap();
        assert_eq!(link, "https://pay.example/abc");
    }

    #[tokio::test]
    async fn refused_invoice_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": 102,
                "message": "Invalid merchant",
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.create_invoice(7, 4.5).await.unwrap_err();
        assert!(err.to_string().contains("Invalid merchant"));
    }
}
