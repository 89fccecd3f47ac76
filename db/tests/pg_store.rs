//! Runs against a disposable Postgres database named by `TEST_DATABASE_URL`.
//! `cargo test -p db -- --ignored`

use chrono::{Duration, Utc};
use common::{
    error::AppError,
    misc::{PaymentMethod, PaymentStatus, ServerKind, SubscriptionStatus},
};
use db::{
    PgStore, Store,
    dtos::{order::OrderCreateRequest, subscription::SubscriptionCreateRequest},
};

async fn store() -> PgStore {
    dotenvy::dotenv().ok();
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = db::setup(&url, false).await.expect("database setup");
    PgStore::new(pool)
}

async fn plan_id(store: &PgStore) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO plans (name, server_kind, duration_days, data_limit_gb, price)
         VALUES ('test', $1, 30, 50, 5) RETURNING id",
    )
    .bind(ServerKind::PeerPanel.as_str())
    .fetch_one(store.pool())
    .await
    .unwrap()
}

fn subscription(order_id: i64, user_id: i64, plan_id: i64) -> SubscriptionCreateRequest {
    let now = Utc::now();
    SubscriptionCreateRequest {
        order_id,
        user_id,
        plan_id,
        server_id: None,
        config_payload: String::new(),
        account_name: format!("user_0_{}", order_id),
        external_id: None,
        start_date: now,
        expiry_date: now + Duration::days(30),
        status: SubscriptionStatus::ProvisionFailed,
    }
}

#[tokio::test]
#[ignore]
async fn order_settles_once_and_subscription_is_unique() {
    let store = store().await;
    let external_id = Utc::now().timestamp_micros();
    let user = store.upsert_user(external_id, "en").await.unwrap();
    let plan_id = plan_id(&store).await;

    let order = store
        .insert_order(OrderCreateRequest {
            user_id: user.id,
            plan_id,
            amount: 5.0,
            payment_method: PaymentMethod::Card,
        })
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let approved = store
        .settle_order(order.id, PaymentStatus::Approved, None)
        .await
        .unwrap();
    assert!(approved.is_some());
    let again = store
        .settle_order(order.id, PaymentStatus::Rejected, None)
        .await
        .unwrap();
    assert!(again.is_none());

    let failed = store
        .insert_subscription(subscription(order.id, user.id, plan_id))
        .await
        .unwrap();
    let err = store
        .insert_subscription(subscription(order.id, user.id, plan_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let mut manual = subscription(order.id, user.id, plan_id);
    manual.status = SubscriptionStatus::Active;
    manual.config_payload = "vless://manual".to_string();
    let replaced = store
        .replace_failed_subscription(failed.id, manual.clone())
        .await
        .unwrap();
    assert_eq!(replaced.unwrap().status, SubscriptionStatus::Active);
    assert!(
        store
            .replace_failed_subscription(failed.id, manual)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore]
async fn upsert_user_keeps_first_registration() {
    let store = store().await;
    let external_id = Utc::now().timestamp_micros();
    let first = store.upsert_user(external_id, "fa").await.unwrap();
    let second = store.upsert_user(external_id, "en").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.language, "fa");
}
