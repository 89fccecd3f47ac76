use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::Res,
    misc::{PaymentStatus, ServerKind},
};
use sqlx::PgPool;

use crate::{
    dtos::{
        order::OrderCreateRequest,
        subscription::{MeteredSubscription, SubscriptionCreateRequest},
    },
    models::{order::Order, plan::Plan, server::Server, subscription::Subscription, user::User},
    order, plan, server, subscription, user,
};

/// Persistence seam shared by settlement, provisioning and the quota monitor.
///
/// Every state transition is a conditional write: it reports whether it happened
/// instead of letting callers read, decide and write back.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Res<Option<User>>;
    async fn get_user_by_external_id(&self, external_id: i64) -> Res<Option<User>>;
    async fn upsert_user(&self, external_id: i64, language: &str) -> Res<User>;

    async fn get_plan(&self, plan_id: i64) -> Res<Option<Plan>>;

    async fn get_server(&self, server_id: i64) -> Res<Option<Server>>;
    async fn first_active_server(&self, kind: ServerKind) -> Res<Option<Server>>;

    async fn get_order(&self, order_id: i64) -> Res<Option<Order>>;
    async fn insert_order(&self, data: OrderCreateRequest) -> Res<Order>;
    /// Atomic `pending -> status` transition. `None` means the order was not pending.
    async fn settle_order(
        &self,
        order_id: i64,
        status: PaymentStatus,
        external_tx_ref: Option<String>,
    ) -> Res<Option<Order>>;

    async fn get_subscription_by_order(&self, order_id: i64) -> Res<Option<Subscription>>;
    async fn get_subscriptions_by_user(&self, user_id: i64) -> Res<Vec<Subscription>>;
    /// Fails with `AppError::Conflict` when the order already has a subscription.
    async fn insert_subscription(&self, data: SubscriptionCreateRequest) -> Res<Subscription>;
    /// Rewrites a `provision_failed` row. `None` when the row is in another state.
    async fn replace_failed_subscription(
        &self,
        subscription_id: i64,
        data: SubscriptionCreateRequest,
    ) -> Res<Option<Subscription>>;
    async fn get_active_metered_subscriptions(
        &self,
        kind: ServerKind,
    ) -> Res<Vec<MeteredSubscription>>;
    /// Atomic `active -> limit_reached` transition.
    async fn mark_limit_reached(&self, subscription_id: i64) -> Res<bool>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, user_id: i64) -> Res<Option<User>> {
        user::get_user_by_id(self.pool(), user_id).await
    }

    async fn get_user_by_external_id(&self, external_id: i64) -> Res<Option<User>> {
        user::get_user_by_external_id(self.pool(), external_id).await
    }

    async fn upsert_user(&self, external_id: i64, language: &str) -> Res<User> {
        user::upsert_user(self.pool(), external_id, language).await
    }

    async fn get_plan(&self, plan_id: i64) -> Res<Option<Plan>> {
        plan::get_plan_by_id(self.pool(), plan_id).await
    }

    async fn get_server(&self, server_id: i64) -> Res<Option<Server>> {
        server::get_server_by_id(self.pool(), server_id).await
    }

    async fn first_active_server(&self, kind: ServerKind) -> Res<Option<Server>> {
        server::first_active_server(self.pool(), kind).await
    }

    async fn get_order(&self, order_id: i64) -> Res<Option<Order>> {
        order::get_order_by_id(self.pool(), order_id).await
    }

    async fn insert_order(&self, data: OrderCreateRequest) -> Res<Order> {
        order::insert_order(self.pool(), data).await
    }

    async fn settle_order(
        &self,
        order_id: i64,
        status: PaymentStatus,
        external_tx_ref: Option<String>,
    ) -> Res<Option<Order>> {
        order::settle_order(self.pool(), order_id, status, external_tx_ref).await
    }

    async fn get_subscription_by_order(&self, order_id: i64) -> Res<Option<Subscription>> {
        subscription::get_subscription_by_order(self.pool(), order_id).await
    }

    async fn get_subscriptions_by_user(&self, user_id: i64) -> Res<Vec<Subscription>> {
        subscription::get_subscriptions_by_user(self.pool(), user_id).await
    }

    async fn insert_subscription(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        subscription::insert_subscription(self.pool(), data).await
    }

    async fn replace_failed_subscription(
        &self,
        subscription_id: i64,
        data: SubscriptionCreateRequest,
    ) -> Res<Option<Subscription>> {
        subscription::replace_failed_subscription(self.pool(), subscription_id, data).await
    }

    async fn get_active_metered_subscriptions(
        &self,
        kind: ServerKind,
    ) -> Res<Vec<MeteredSubscription>> {
        subscription::get_active_metered_subscriptions(self.pool(), kind).await
    }

    async fn mark_limit_reached(&self, subscription_id: i64) -> Res<bool> {
        subscription::mark_limit_reached(self.pool(), subscription_id).await
    }
}
