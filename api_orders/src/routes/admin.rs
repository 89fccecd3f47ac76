use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use common::{
    error::{AppError, Res},
    http::Success,
};
use db::Store;

use crate::{
    dtos::order::{ManualProvisionRequest, OrderDetailsResponse, SettlementResponse},
    services::settlement::{ApprovalOutcome, RejectionOutcome, Settlement},
};

#[get("/{id}")]
pub async fn get_order(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<i64>,
) -> Res<impl Responder> {
    let order_id = path.into_inner();
    let order = store
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;
    let subscription = store.get_subscription_by_order(order_id).await?;
    Success::ok(OrderDetailsResponse {
        order,
        subscription,
    })
}

/// Approves an order after the operator confirmed the payment, and provisions it.
///
/// # Output
/// - 200 with the new subscription, or `already_approved` when nothing changed
/// - 409 for a rejected order
/// - 502 `provisioning_failed` when the backend refused every attempt
/// - 503 when no usable server exists for the plan
#[post("/{id}/approve")]
pub async fn post_approve(
    settlement: web::Data<Arc<Settlement>>,
    path: web::Path<i64>,
) -> Res<impl Responder> {
    let order_id = path.into_inner();
    let response = match settlement.approve(order_id, None).await? {
        ApprovalOutcome::Provisioned(subscription) => SettlementResponse {
            message: "approved",
            order_id,
            subscription: Some(subscription),
        },
        ApprovalOutcome::AlreadyApproved(subscription) => SettlementResponse {
            message: "already_approved",
            order_id,
            subscription,
        },
    };
    Success::ok(response)
}

#[post("/{id}/reject")]
pub async fn post_reject(
    settlement: web::Data<Arc<Settlement>>,
    path: web::Path<i64>,
) -> Res<impl Responder> {
    let order_id = path.into_inner();
    let message = match settlement.reject(order_id).await? {
        RejectionOutcome::Rejected(_) => "rejected",
        RejectionOutcome::AlreadyRejected(_) => "already_rejected",
    };
    Success::ok(SettlementResponse {
        message,
        order_id,
        subscription: None,
    })
}

/// Attaches an externally obtained configuration to the order.
#[post("/{id}/manual-provision")]
pub async fn post_manual_provision(
    settlement: web::Data<Arc<Settlement>>,
    path: web::Path<i64>,
    req: web::Json<ManualProvisionRequest>,
) -> Res<impl Responder> {
    let order_id = path.into_inner();
    let subscription = settlement
        .manual_provision(order_id, &req.config_payload)
        .await?;
    Success::ok(SettlementResponse {
        message: "manually_provisioned",
        order_id,
        subscription: Some(subscription),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actix_web::{App, http::StatusCode, test};
    use common::misc::ServerKind;
    use db::MemoryStore;
    use notifier::{Notifier, RecordingNotifier};
    use provisioning::{Provisioner, RetryPolicy};
    use providers::scripted::{ScriptedFactory, ScriptedProvider};
    use serde_json::{Value, json};

    use super::*;

    async fn state() -> (Arc<dyn Store>, Arc<Settlement>) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::creating(0, "https://x/sub/u7/"));
        let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::new());

        store.add_user(42).await;
        store.add_plan(3, ServerKind::TokenPanel, 30, 50.0).await;
        let server = store
            .add_server(
                ServerKind::TokenPanel,
                "https://panel",
                r#"{"username":"a","password":"b"}"#,
                true,
            )
            .await;
        store.add_order(7, 1, 3).await;
        store.add_order(8, 1, 3).await;

        let store: Arc<dyn Store> = store;
        let provisioner = Arc::new(Provisioner::new(
            store.clone(),
            Arc::new(ScriptedFactory::new().with(server.id, provider)),
            notifier.clone(),
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::ZERO,
            },
        ));
        let settlement = Arc::new(Settlement::new(
            store.clone(),
            provisioner,
            notifier,
            "merchant-key".to_string(),
        ));
        (store, settlement)
    }

    #[actix_web::test]
    async fn operator_order_actions() {
        let (store, settlement) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .app_data(web::Data::new(settlement))
                .service(
                    web::scope("/orders")
                        .service(get_order)
                        .service(post_approve)
                        .service(post_reject)
                        .service(post_manual_provision),
                ),
        )
        .await;

        let req = test::TestRequest::post().uri("/orders/7/approve").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "approved");
        assert_eq!(body["subscription"]["config_payload"], "https://x/sub/u7/");

        let req = test::TestRequest::post().uri("/orders/7/approve").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "already_approved");

        let req = test::TestRequest::post().uri("/orders/7/reject").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/orders/8/manual-provision")
            .set_json(json!({ "config_payload": "vless://manual" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["subscription"]["server_id"], Value::Null);

        let req = test::TestRequest::get().uri("/orders/8").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["order"]["payment_status"], "approved");
        assert_eq!(body["subscription"]["status"], "active");

        let req = test::TestRequest::get().uri("/orders/99").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
