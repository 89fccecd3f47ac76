use actix_web::{HttpResponse, Responder};
use serde::Serialize;

use super::error::Res;

/// Shorthand constructors for successful handler results.
pub struct Success;
impl Success {
    pub fn created<T: Serialize>(body: T) -> Res<impl Responder> {
        Result::Ok(HttpResponse::Created().json(body))
    }
    pub fn ok<T: Serialize>(body: T) -> Res<impl Responder> {
        Result::Ok(HttpResponse::Ok().json(body))
    }
    /// Bare text acknowledgment, as payment gateways expect from webhook receivers.
    pub fn ack(body: &'static str) -> HttpResponse {
        HttpResponse::Ok().content_type("text/plain").body(body)
    }
}
