//! Payment settlement: the only place an order leaves `pending`.
//!
//! Every transition goes through `Store::settle_order`, a conditional update on the
//! pending status, so concurrent webhook deliveries and operator clicks agree on a
//! single winner and provisioning runs at most once per order.

use std::sync::Arc;

use chrono::Utc;
use common::{
    error::{AppError, Res},
    misc::{PaymentStatus, SubscriptionStatus},
};
use db::{
    Store,
    dtos::subscription::SubscriptionCreateRequest,
    models::{order::Order, subscription::Subscription},
};
use notifier::{Notification, NotificationKind, Notifier, dispatch};
use provisioning::{Provisioner, manual_identity};
use serde_json::json;

use crate::{
    dtos::webhook::{GatewayWebhook, PAID_STATUS},
    misc::secret::constant_time_eq,
};

#[derive(Debug)]
pub enum ApprovalOutcome {
    /// This call approved the order and provisioning succeeded.
    Provisioned(Subscription),
    /// The order was approved before; nothing changed.
    AlreadyApproved(Option<Subscription>),
}

#[derive(Debug)]
pub enum RejectionOutcome {
    Rejected(Order),
    AlreadyRejected(Order),
}

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment recorded (or recorded before). Acknowledge.
    Settled,
    /// Non-success payment status. Acknowledge without touching the order.
    Ignored,
    /// Paid less than the order amount, or no amount at all. The order stays pending.
    Underpaid,
}

/// Rounding slack when comparing a reported payment with the order amount.
const AMOUNT_TOLERANCE: f64 = 0.005;

pub struct Settlement {
    store: Arc<dyn Store>,
    provisioner: Arc<Provisioner>,
    notifier: Arc<dyn Notifier>,
    merchant_key: String,
}

impl Settlement {
    pub fn new(
        store: Arc<dyn Store>,
        provisioner: Arc<Provisioner>,
        notifier: Arc<dyn Notifier>,
        merchant_key: String,
    ) -> Self {
        Self {
            store,
            provisioner,
            notifier,
            merchant_key,
        }
    }

    async fn load_order(&self, order_id: i64) -> Res<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))
    }

    /// Approves a pending order and provisions it before returning.
    ///
    /// Re-approving is a no-op. A rejected order cannot be approved. Provisioning
    /// runs on its own task, so a caller that goes away does not interrupt it.
    pub async fn approve(
        &self,
        order_id: i64,
        external_tx_ref: Option<String>,
    ) -> Res<ApprovalOutcome> {
        let Some(order) = self
            .store
            .settle_order(order_id, PaymentStatus::Approved, external_tx_ref)
            .await?
        else {
            let order = self.load_order(order_id).await?;
            return match order.payment_status {
                PaymentStatus::Approved => {
                    log::info!("[Settlement] Order {} already approved", order_id);
                    let subscription = self.store.get_subscription_by_order(order_id).await?;
                    Ok(ApprovalOutcome::AlreadyApproved(subscription))
                }
                PaymentStatus::Rejected => Err(AppError::Conflict(format!(
                    "Order {} was rejected",
                    order_id
                ))),
                PaymentStatus::Pending => Err(AppError::Internal(format!(
                    "Order {} stayed pending after approval",
                    order_id
                ))),
            };
        };

        log::info!("[Settlement] Order {} approved", order_id);
        let provisioner = self.provisioner.clone();
        let subscription = tokio::spawn(async move { provisioner.provision_order(&order).await })
            .await
            .map_err(|e| AppError::Internal(format!("Provisioning task failed: {}", e)))??;
        Ok(ApprovalOutcome::Provisioned(subscription))
    }

    /// Rejects a pending order and tells the customer. Rejecting twice is a no-op;
    /// an approved order cannot be rejected.
    pub async fn reject(&self, order_id: i64) -> Res<RejectionOutcome> {
        let Some(order) = self
            .store
            .settle_order(order_id, PaymentStatus::Rejected, None)
            .await?
        else {
            let order = self.load_order(order_id).await?;
            return match order.payment_status {
                PaymentStatus::Rejected => Ok(RejectionOutcome::AlreadyRejected(order)),
                PaymentStatus::Approved => Err(AppError::Conflict(format!(
                    "Order {} is already approved",
                    order_id
                ))),
                PaymentStatus::Pending => Err(AppError::Internal(format!(
                    "Order {} stayed pending after rejection",
                    order_id
                ))),
            };
        };

        log::info!("[Settlement] Order {} rejected", order_id);
        if let Some(user) = self.store.get_user(order.user_id).await? {
            dispatch(
                &self.notifier,
                Notification::new(
                    user.external_id,
                    NotificationKind::Rejected,
                    json!({ "order_id": order.id }),
                ),
            )
            .await;
        }
        Ok(RejectionOutcome::Rejected(order))
    }

    /// Attaches a configuration obtained outside the system to an order.
    ///
    /// A pending order is approved on the way. The subscription is written like the
    /// provisioner would, with no server. An earlier `provision_failed` row is
    /// replaced in place; any other existing subscription is a conflict.
    pub async fn manual_provision(&self, order_id: i64, config_payload: &str) -> Res<Subscription> {
        let config_payload = config_payload.trim();
        if config_payload.is_empty() {
            return Err(AppError::BadRequest("config_payload is required".to_string()));
        }

        let order = match self
            .store
            .settle_order(order_id, PaymentStatus::Approved, None)
            .await?
        {
            Some(order) => {
                log::info!("[Settlement] Order {} approved for manual provisioning", order_id);
                order
            }
            None => self.load_order(order_id).await?,
        };
        if order.payment_status != PaymentStatus::Approved {
            return Err(AppError::Conflict(format!(
                "Order {} is {}",
                order_id, order.payment_status
            )));
        }

        let plan = self
            .store
            .get_plan(order.plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", order.plan_id)))?;
        let user = self
            .store
            .get_user(order.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", order.user_id)))?;

        let start_date = Utc::now();
        let request = SubscriptionCreateRequest {
            order_id: order.id,
            user_id: user.id,
            plan_id: plan.id,
            server_id: None,
            config_payload: config_payload.to_string(),
            account_name: manual_identity(user.external_id, order.id),
            external_id: None,
            start_date,
            expiry_date: start_date + chrono::Duration::days(i64::from(plan.duration_days)),
            status: SubscriptionStatus::Active,
        };

        let subscription = match self.store.get_subscription_by_order(order.id).await? {
            None => self.store.insert_subscription(request).await?,
            Some(existing) if existing.status == SubscriptionStatus::ProvisionFailed => self
                .store
                .replace_failed_subscription(existing.id, request)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict(format!("Subscription {} changed meanwhile", existing.id))
                })?,
            Some(existing) => {
                return Err(AppError::Conflict(format!(
                    "Order {} already has a subscription in status {}",
                    order.id, existing.status
                )));
            }
        };

        log::info!(
            "[Settlement] Order {} manually provisioned as subscription {}",
            order.id,
            subscription.id
        );
        dispatch(
            &self.notifier,
            Notification::new(
                user.external_id,
                NotificationKind::ConfigReady,
                json!({
                    "order_id": order.id,
                    "plan": plan.name,
                    "config": subscription.config_payload,
                    "expiry_date": subscription.expiry_date,
                }),
            ),
        )
        .await;
        Ok(subscription)
    }

    /// Applies a gateway payment notification.
    ///
    /// Failures past the approval itself (provisioning, deployment problems, an
    /// order already rejected) are logged and acknowledged, so the gateway stops
    /// redelivering; the operator takes over from there.
    pub async fn handle_webhook(&self, payload: GatewayWebhook) -> Res<WebhookOutcome> {
        if !constant_time_eq(payload.merchant.as_bytes(), self.merchant_key.as_bytes()) {
            log::warn!("[Webhook] Merchant secret mismatch");
            return Err(AppError::Forbidden("Invalid merchant".to_string()));
        }

        let order_ref = payload.order_id.as_text();
        if payload.status != PAID_STATUS {
            log::info!(
                "[Webhook] Order {} reported status {}, ignoring",
                order_ref,
                payload.status
            );
            return Ok(WebhookOutcome::Ignored);
        }

        let order_id: i64 = order_ref
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid orderId '{}'", order_ref)))?;
        let order = self.load_order(order_id).await?;
        if order.payment_status == PaymentStatus::Pending {
            let paid = payload.amount.unwrap_or(0.0);
            if paid + AMOUNT_TOLERANCE < order.amount {
                log::warn!(
                    "[Webhook] Order {} reported paid {:?} of {}, leaving it pending",
                    order_id,
                    payload.amount,
                    order.amount
                );
                return Ok(WebhookOutcome::Underpaid);
            }
        }

        let track_id = payload.track_id.as_ref().map(|id| id.as_text());
        log::info!(
            "[Webhook] Payment for order {} (track {:?}, amount {:?})",
            order_id,
            track_id,
            payload.amount
        );

        match self.approve(order_id, track_id).await {
            Ok(_) => Ok(WebhookOutcome::Settled),
            Err(
                e @ (AppError::ProvisioningFailed(_)
                | AppError::Configuration(_)
                | AppError::Conflict(_)),
            ) => {
                log::error!(
                    "[Webhook] Order {} paid but needs operator attention: {}",
                    order_id,
                    e
                );
                Ok(WebhookOutcome::Settled)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::misc::ServerKind;
    use db::MemoryStore;
    use notifier::RecordingNotifier;
    use provisioning::RetryPolicy;
    use providers::scripted::{ScriptedFactory, ScriptedProvider};

    use super::*;
    use crate::dtos::webhook::LooseId;

    const CREDS: &str = r#"{"username":"admin","password":"pw"}"#;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        provider: Arc<ScriptedProvider>,
        settlement: Settlement,
    }

    async fn fixture(provider: ScriptedProvider) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let provider = Arc::new(provider);

        store.add_user(42).await;
        store.add_plan(3, ServerKind::TokenPanel, 30, 50.0).await;
        let server = store
            .add_server(ServerKind::TokenPanel, "https://panel", CREDS, true)
            .await;
        store.add_order(7, 1, 3).await;

        let provisioner = Arc::new(Provisioner::new(
            store.clone(),
            Arc::new(ScriptedFactory::new().with(server.id, provider.clone())),
            notifier.clone(),
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::ZERO,
            },
        ));
        let settlement = Settlement::new(
            store.clone(),
            provisioner,
            notifier.clone(),
            "merchant-key".to_string(),
        );
        Fixture {
            store,
            notifier,
            provider,
            settlement,
        }
    }

    fn paid_webhook(order_id: &str) -> GatewayWebhook {
        GatewayWebhook {
            merchant: "merchant-key".to_string(),
            status: PAID_STATUS,
            amount: Some(10.0),
            order_id: LooseId::Text(order_id.to_string()),
            track_id: Some(LooseId::Number(991)),
            description: None,
        }
    }

    #[tokio::test]
    async fn approval_provisions_scenario_order() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;

        let outcome = f.settlement.approve(7, None).await.unwrap();
        let ApprovalOutcome::Provisioned(subscription) = outcome else {
            panic!("expected provisioning");
        };
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.config_payload, "https://x/sub/u7/");
        let days = (subscription.expiry_date - subscription.start_date).num_days();
        assert_eq!(days, 30);
        assert!(subscription.expiry_date > Utc::now() + chrono::Duration::days(29));
    }

    #[tokio::test]
    async fn second_approval_is_a_noop() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;

        f.settlement.approve(7, None).await.unwrap();
        let again = f.settlement.approve(7, None).await.unwrap();

        assert!(matches!(again, ApprovalOutcome::AlreadyApproved(Some(_))));
        assert_eq!(f.provider.create_calls(), 1);
        assert_eq!(f.store.subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_approvals_provision_once() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;

        let (a, b) = tokio::join!(
            f.settlement.approve(7, None),
            f.settlement.handle_webhook(paid_webhook("7"))
        );
        a.unwrap();
        assert_eq!(b.unwrap(), WebhookOutcome::Settled);
        assert_eq!(f.provider.create_calls(), 1);
        assert_eq!(f.store.subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_provisioning_keeps_order_approved() {
        let f = fixture(ScriptedProvider::creating(3, "unused")).await;

        let err = f.settlement.approve(7, None).await.unwrap_err();
        assert!(matches!(err, AppError::ProvisioningFailed(_)));

        let order = f.store.order(7).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Approved);
        let subscriptions = f.store.subscriptions().await;
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].status, SubscriptionStatus::ProvisionFailed);
    }

    #[tokio::test]
    async fn reject_then_approve_conflicts() {
        let f = fixture(ScriptedProvider::creating(0, "unused")).await;

        let outcome = f.settlement.reject(7).await.unwrap();
        assert!(matches!(outcome, RejectionOutcome::Rejected(_)));
        let again = f.settlement.reject(7).await.unwrap();
        assert!(matches!(again, RejectionOutcome::AlreadyRejected(_)));

        let err = f.settlement.approve(7, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(f.provider.create_calls(), 0);

        let sent = f.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Rejected);
    }

    #[tokio::test]
    async fn approved_order_cannot_be_rejected() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;
        f.settlement.approve(7, None).await.unwrap();

        let err = f.settlement.reject(7).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            f.store.order(7).await.unwrap().payment_status,
            PaymentStatus::Approved
        );
    }

    #[tokio::test]
    async fn manual_provision_replaces_failed_subscription() {
        let f = fixture(ScriptedProvider::creating(3, "unused")).await;
        f.settlement.approve(7, None).await.unwrap_err();

        let subscription = f
            .settlement
            .manual_provision(7, " vless://manual@host:443 ")
            .await
            .unwrap();

        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.server_id, None);
        assert_eq!(subscription.config_payload, "vless://manual@host:443");
        assert_eq!(subscription.account_name, "manual_42_7");
        assert_eq!(f.store.subscriptions().await.len(), 1);

        let err = f
            .settlement
            .manual_provision(7, "vless://again")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn manual_provision_approves_pending_order() {
        let f = fixture(ScriptedProvider::creating(0, "unused")).await;

        f.settlement.manual_provision(7, "wg-config").await.unwrap();

        assert_eq!(
            f.store.order(7).await.unwrap().payment_status,
            PaymentStatus::Approved
        );
        assert_eq!(f.provider.create_calls(), 0);
        let again = f.settlement.approve(7, None).await.unwrap();
        assert!(matches!(again, ApprovalOutcome::AlreadyApproved(Some(_))));
    }

    #[tokio::test]
    async fn manual_provision_requires_payload() {
        let f = fixture(ScriptedProvider::creating(0, "unused")).await;
        let err = f.settlement.manual_provision(7, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(
            f.store.order(7).await.unwrap().payment_status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn webhook_records_track_id() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;

        let outcome = f.settlement.handle_webhook(paid_webhook("7")).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Settled);
        let order = f.store.order(7).await.unwrap();
        assert_eq!(order.external_tx_ref.as_deref(), Some("991"));
    }

    #[tokio::test]
    async fn webhook_with_unpaid_status_changes_nothing() {
        let f = fixture(ScriptedProvider::creating(0, "unused")).await;
        let mut payload = paid_webhook("7");
        payload.status = 0;

        let outcome = f.settlement.handle_webhook(payload).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert_eq!(
            f.store.order(7).await.unwrap().payment_status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn webhook_with_wrong_secret_is_forbidden() {
        let f = fixture(ScriptedProvider::creating(0, "unused")).await;
        let mut payload = paid_webhook("7");
        payload.merchant = "guess".to_string();

        let err = f.settlement.handle_webhook(payload).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(
            f.store.order(7).await.unwrap().payment_status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn webhook_acknowledges_failed_provisioning() {
        let f = fixture(ScriptedProvider::creating(3, "unused")).await;
        let outcome = f.settlement.handle_webhook(paid_webhook("7")).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Settled);
    }

    #[tokio::test]
    async fn underpaid_webhook_leaves_order_pending() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;
        let mut payload = paid_webhook("7");
        payload.amount = Some(0.01);

        let outcome = f.settlement.handle_webhook(payload).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Underpaid);
        assert_eq!(
            f.store.order(7).await.unwrap().payment_status,
            PaymentStatus::Pending
        );
        assert_eq!(f.provider.create_calls(), 0);
        assert!(f.store.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn webhook_without_amount_is_not_settled() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;
        let mut payload = paid_webhook("7");
        payload.amount = None;

        let outcome = f.settlement.handle_webhook(payload).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Underpaid);
        assert!(f.store.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn paid_replay_after_approval_still_settles() {
        let f = fixture(ScriptedProvider::creating(0, "https://x/sub/u7/")).await;
        f.settlement.approve(7, None).await.unwrap();
        let mut payload = paid_webhook("7");
        payload.amount = None;

        let outcome = f.settlement.handle_webhook(payload).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Settled);
        assert_eq!(f.provider.create_calls(), 1);
    }
}
