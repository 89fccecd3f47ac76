use common::{
    error::{AppError, Res},
    misc::ServerKind,
};
use sqlx::{Executor, Postgres};

use crate::{
    dtos::subscription::{MeteredSubscription, SubscriptionCreateRequest},
    models::subscription::Subscription,
};

pub async fn get_subscription_by_order<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    order_id: i64,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_subscriptions_by_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: i64,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Fails with `Conflict` when the order already owns a subscription.
pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SubscriptionCreateRequest,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (
            order_id, user_id, plan_id, server_id, config_payload,
            account_name, external_id, start_date, expiry_date, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(data.order_id)
    .bind(data.user_id)
    .bind(data.plan_id)
    .bind(data.server_id)
    .bind(data.config_payload)
    .bind(data.account_name)
    .bind(data.external_id)
    .bind(data.start_date)
    .bind(data.expiry_date)
    .bind(data.status.as_str())
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::from_write(e, "Subscription for this order"))
}

/// Overwrites a `provision_failed` subscription in place. Returns `None` when the row
/// is in any other state.
pub async fn replace_failed_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: i64,
    data: SubscriptionCreateRequest,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET server_id = $1,
            config_payload = $2,
            account_name = $3,
            external_id = $4,
            start_date = $5,
            expiry_date = $6,
            status = $7,
            updated_at = NOW()
        WHERE id = $8 AND status = 'provision_failed'
        RETURNING *
        "#,
    )
    .bind(data.server_id)
    .bind(data.config_payload)
    .bind(data.account_name)
    .bind(data.external_id)
    .bind(data.start_date)
    .bind(data.expiry_date)
    .bind(data.status.as_str())
    .bind(subscription_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Active subscriptions on servers of `kind`, with their plan limit and recipient.
/// Manual subscriptions (no server) are never metered.
pub async fn get_active_metered_subscriptions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    kind: ServerKind,
) -> Res<Vec<MeteredSubscription>> {
    sqlx::query_as::<_, MeteredSubscription>(
        r#"
        SELECT s.*, p.data_limit_gb, u.external_id AS user_external_id
        FROM subscriptions s
        JOIN plans p ON p.id = s.plan_id
        JOIN users u ON u.id = s.user_id
        JOIN servers sv ON sv.id = s.server_id
        WHERE s.status = 'active' AND sv.server_kind = $1
        ORDER BY s.server_id, s.id
        "#,
    )
    .bind(kind.as_str())
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Returns `false` when the subscription was not active anymore.
pub async fn mark_limit_reached<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: i64,
) -> Res<bool> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'limit_reached', updated_at = NOW()
        WHERE id = $1 AND status = 'active'
        "#,
    )
    .bind(subscription_id)
    .execute(executor)
    .await
    .map(|result| result.rows_affected() == 1)
    .map_err(AppError::from)
}
