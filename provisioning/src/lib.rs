//! Turns an approved order into a persisted subscription.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use common::{
    env_config::Config,
    error::{AppError, Res},
    misc::{PaymentStatus, SubscriptionStatus},
};
use db::{
    Store,
    dtos::subscription::SubscriptionCreateRequest,
    models::{order::Order, subscription::Subscription},
};
use notifier::{Notification, NotificationKind, Notifier, dispatch};
use providers::{AccountRequest, ProviderFactory, ProvisionedAccount, VpnProvider};
use serde_json::json;

pub mod identity;

pub use identity::{account_identity, manual_identity};

/// Fixed-delay retry budget for account creation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.provision_max_attempts.max(1),
            delay: Duration::from_secs(config.provision_retry_delay_secs),
        }
    }
}

pub struct Provisioner {
    store: Arc<dyn Store>,
    providers: Arc<dyn ProviderFactory>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn Store>,
        providers: Arc<dyn ProviderFactory>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            providers,
            notifier,
            policy,
        }
    }

    /// Creates the backend account for an approved order and records the outcome.
    ///
    /// Exactly one subscription row is written per call: `active` with the
    /// backend's config on success, `provision_failed` with an empty payload once
    /// the attempts are used up. The latter is reported as
    /// `AppError::ProvisioningFailed`; the order stays approved either way.
    /// Missing servers and unreadable credentials fail immediately with
    /// `AppError::Configuration` and write nothing.
    pub async fn provision_order(&self, order: &Order) -> Res<Subscription> {
        if order.payment_status != PaymentStatus::Approved {
            return Err(AppError::Conflict(format!(
                "Order {} is {}, not approved",
                order.id, order.payment_status
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
        let server = self
            .store
            .first_active_server(plan.server_kind)
            .await?
            .ok_or_else(|| {
                AppError::Configuration(format!("No active {} server", plan.server_kind))
            })?;
        let provider = self.providers.connect(&server).map_err(AppError::from)?;

        let start_date = Utc::now();
        let expiry_date = start_date + chrono::Duration::days(i64::from(plan.duration_days));
        let request = AccountRequest {
            identity: account_identity(plan.server_kind, user.external_id, order.id),
            quota_gb: plan.data_limit_gb,
            expires_at: Some(expiry_date),
        };

        log::info!(
            "[Provision] Order {}: creating {} on server {} ({})",
            order.id,
            request.identity,
            server.id,
            server.name
        );

        let mut subscription = SubscriptionCreateRequest {
            order_id: order.id,
            user_id: user.id,
            plan_id: plan.id,
            server_id: Some(server.id),
            config_payload: String::new(),
            account_name: request.identity.clone(),
            external_id: None,
            start_date,
            expiry_date,
            status: SubscriptionStatus::ProvisionFailed,
        };

        match self.create_with_retries(provider.as_ref(), &request).await {
            Ok(account) => {
                subscription.config_payload = account.config_payload;
                subscription.external_id = Some(account.external_id.clone());
                subscription.status = SubscriptionStatus::Active;
                let subscription = match self.store.insert_subscription(subscription).await {
                    Ok(subscription) => subscription,
                    Err(e @ AppError::Conflict(_)) => {
                        // Another path fulfilled the order while the account was being created.
                        log::error!(
                            "[Provision] Order {}: already fulfilled, account {} on server {} is orphaned",
                            order.id,
                            account.external_id,
                            server.id
                        );
                        if let Err(disable_err) = provider.disable_account(&account.external_id).await {
                            log::error!(
                                "[Provision] Disabling orphaned account {} failed: {}",
                                account.external_id,
                                disable_err
                            );
                        }
                        return Err(e);
                    }
                    Err(e) => return Err(e),
                };

                log::info!(
                    "[Provision] Order {}: subscription {} active until {}",
                    order.id,
                    subscription.id,
                    subscription.expiry_date
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
            Err(last_error) => {
                let subscription = self.store.insert_subscription(subscription).await?;
                log::error!(
                    "[Provision] Order {}: giving up after {} attempts, subscription {} marked provision_failed: {}",
                    order.id,
                    self.policy.max_attempts,
                    subscription.id,
                    last_error
                );
                dispatch(
                    &self.notifier,
                    Notification::new(
                        user.external_id,
                        NotificationKind::ProvisionFailed,
                        json!({
                            "order_id": order.id,
                            "message": "We could not set up your VPN account. Please try again later or contact support.",
                        }),
                    ),
                )
                .await;
                Err(AppError::ProvisioningFailed(format!(
                    "order {}: {}",
                    order.id, last_error
                )))
            }
        }
    }

    async fn create_with_retries(
        &self,
        provider: &dyn VpnProvider,
        request: &AccountRequest,
    ) -> Result<ProvisionedAccount, providers::ProviderError> {
        let mut attempt = 1;
        loop {
            match provider.create_account(request).await {
                Ok(account) => return Ok(account),
                Err(e) if attempt >= self.policy.max_attempts => return Err(e),
                Err(e) => {
                    log::warn!(
                        "[Provision] Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        request.identity,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }
}
