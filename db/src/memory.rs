use async_trait::async_trait;
use chrono::Utc;
use common::{
    error::{AppError, Res},
    misc::{PaymentStatus, ServerKind, SubscriptionStatus},
};
use tokio::sync::Mutex;

use crate::{
    dtos::{
        order::OrderCreateRequest,
        subscription::{MeteredSubscription, SubscriptionCreateRequest},
    },
    models::{order::Order, plan::Plan, server::Server, subscription::Subscription, user::User},
    store::Store,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    plans: Vec<Plan>,
    servers: Vec<Server>,
    orders: Vec<Order>,
    subscriptions: Vec<Subscription>,
}

fn next_id<T>(rows: &[T], id: impl Fn(&T) -> i64) -> i64 {
    rows.iter().map(id).max().unwrap_or(0) + 1
}

/// `Store` kept entirely in memory. Mirrors the conditional writes of the SQL
/// store, one lock per call, and backs the tests of the service crates.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, external_id: i64) -> User {
        let mut tables = self.tables.lock().await;
        let user = User {
            id: next_id(&tables.users, |u| u.id),
            external_id,
            language: "en".to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        user
    }

    pub async fn add_plan(
        &self,
        id: i64,
        server_kind: ServerKind,
        duration_days: i32,
        data_limit_gb: f64,
    ) -> Plan {
        let plan = Plan {
            id,
            name: format!("plan-{}", id),
            server_kind,
            duration_days,
            data_limit_gb,
            price: 10.0,
            is_active: true,
            created_at: Utc::now(),
        };
        self.tables.lock().await.plans.push(plan.clone());
        plan
    }

    pub async fn add_server(
        &self,
        server_kind: ServerKind,
        base_url: &str,
        credentials: &str,
        is_active: bool,
    ) -> Server {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let server = Server {
            id: next_id(&tables.servers, |s| s.id),
            name: format!("{}-{}", server_kind, tables.servers.len() + 1),
            server_kind,
            base_url: base_url.to_string(),
            credentials: credentials.to_string(),
            is_active,
            created_at: now,
            updated_at: now,
        };
        tables.servers.push(server.clone());
        server
    }

    /// Inserts a pending order with a caller-chosen id.
    pub async fn add_order(&self, id: i64, user_id: i64, plan_id: i64) -> Order {
        let now = Utc::now();
        let order = Order {
            id,
            user_id,
            plan_id,
            amount: 10.0,
            payment_method: common::misc::PaymentMethod::Crypto,
            payment_status: PaymentStatus::Pending,
            external_tx_ref: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.orders.push(order.clone());
        order
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.tables.lock().await.subscriptions.clone()
    }

    pub async fn order(&self, order_id: i64) -> Option<Order> {
        self.tables
            .lock()
            .await
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, user_id: i64) -> Res<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn get_user_by_external_id(&self, external_id: i64) -> Res<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn upsert_user(&self, external_id: i64, language: &str) -> Res<User> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter().find(|u| u.external_id == external_id) {
            return Ok(user.clone());
        }
        let user = User {
            id: next_id(&tables.users, |u| u.id),
            external_id,
            language: language.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_plan(&self, plan_id: i64) -> Res<Option<Plan>> {
        let tables = self.tables.lock().await;
        Ok(tables.plans.iter().find(|p| p.id == plan_id).cloned())
    }

    async fn get_server(&self, server_id: i64) -> Res<Option<Server>> {
        let tables = self.tables.lock().await;
        Ok(tables.servers.iter().find(|s| s.id == server_id).cloned())
    }

    async fn first_active_server(&self, kind: ServerKind) -> Res<Option<Server>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .servers
            .iter()
            .filter(|s| s.server_kind == kind && s.is_active)
            .min_by_key(|s| s.id)
            .cloned())
    }

    async fn get_order(&self, order_id: i64) -> Res<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn insert_order(&self, data: OrderCreateRequest) -> Res<Order> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let order = Order {
            id: next_id(&tables.orders, |o| o.id),
            user_id: data.user_id,
            plan_id: data.plan_id,
            amount: data.amount,
            payment_method: data.payment_method,
            payment_status: PaymentStatus::Pending,
            external_tx_ref: None,
            created_at: now,
            updated_at: now,
        };
        tables.orders.push(order.clone());
        Ok(order)
    }

    async fn settle_order(
        &self,
        order_id: i64,
        status: PaymentStatus,
        external_tx_ref: Option<String>,
    ) -> Res<Option<Order>> {
        let mut tables = self.tables.lock().await;
        let Some(order) = tables
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && o.payment_status == PaymentStatus::Pending)
        else {
            return Ok(None);
        };
        order.payment_status = status;
        if external_tx_ref.is_some() {
            order.external_tx_ref = external_tx_ref;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn get_subscription_by_order(&self, order_id: i64) -> Res<Option<Subscription>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.order_id == order_id)
            .cloned())
    }

    async fn get_subscriptions_by_user(&self, user_id: i64) -> Res<Vec<Subscription>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_subscription(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        let mut tables = self.tables.lock().await;
        if tables.subscriptions.iter().any(|s| s.order_id == data.order_id) {
            return Err(AppError::Conflict(
                "Subscription for this order already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let subscription = Subscription {
            id: next_id(&tables.subscriptions, |s| s.id),
            order_id: data.order_id,
            user_id: data.user_id,
            plan_id: data.plan_id,
            server_id: data.server_id,
            config_payload: data.config_payload,
            account_name: data.account_name,
            external_id: data.external_id,
            start_date: data.start_date,
            expiry_date: data.expiry_date,
            status: data.status,
            created_at: now,
            updated_at: now,
        };
        tables.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn replace_failed_subscription(
        &self,
        subscription_id: i64,
        data: SubscriptionCreateRequest,
    ) -> Res<Option<Subscription>> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables.subscriptions.iter_mut().find(|s| {
            s.id == subscription_id && s.status == SubscriptionStatus::ProvisionFailed
        }) else {
            return Ok(None);
        };
        row.server_id = data.server_id;
        row.config_payload = data.config_payload;
        row.account_name = data.account_name;
        row.external_id = data.external_id;
        row.start_date = data.start_date;
        row.expiry_date = data.expiry_date;
        row.status = data.status;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn get_active_metered_subscriptions(
        &self,
        kind: ServerKind,
    ) -> Res<Vec<MeteredSubscription>> {
        let tables = self.tables.lock().await;
        let mut rows = Vec::new();
        for subscription in &tables.subscriptions {
            if subscription.status != SubscriptionStatus::Active {
                continue;
            }
            let Some(server_id) = subscription.server_id else {
                continue;
            };
            let on_kind = tables
                .servers
                .iter()
                .any(|s| s.id == server_id && s.server_kind == kind);
            let plan = tables.plans.iter().find(|p| p.id == subscription.plan_id);
            let user = tables.users.iter().find(|u| u.id == subscription.user_id);
            if let (true, Some(plan), Some(user)) = (on_kind, plan, user) {
                rows.push(MeteredSubscription {
                    subscription: subscription.clone(),
                    data_limit_gb: plan.data_limit_gb,
                    user_external_id: user.external_id,
                });
            }
        }
        rows.sort_by_key(|row| (row.subscription.server_id, row.subscription.id));
        Ok(rows)
    }

    async fn mark_limit_reached(&self, subscription_id: i64) -> Res<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && s.status == SubscriptionStatus::Active)
        {
            Some(row) => {
                row.status = SubscriptionStatus::LimitReached;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
