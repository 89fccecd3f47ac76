use std::sync::Arc;

use actix_web::{Either, HttpResponse, post, web};
use common::{error::Res, http::Success};

use crate::{dtos::webhook::GatewayWebhook, services::settlement::Settlement};

/// Payment confirmation from the crypto gateway. Accepts JSON or form bodies.
///
/// Answers a bare `OK` whenever the notification was handled, so the gateway stops
/// retrying; 403 for a wrong merchant secret, 404 for an unknown order and 400 for
/// an unreadable order id.
#[post("/gateway")]
pub async fn post_gateway_webhook(
    settlement: web::Data<Arc<Settlement>>,
    body: Either<web::Json<GatewayWebhook>, web::Form<GatewayWebhook>>,
) -> Res<HttpResponse> {
    let payload = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };
    settlement.handle_webhook(payload).await?;
    Ok(Success::ack("OK"))
}
