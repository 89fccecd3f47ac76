use common::{
    error::{AppError, Res},
    misc::PaymentStatus,
};
use sqlx::{Executor, Postgres};

use crate::{dtos::order::OrderCreateRequest, models::order::Order};

pub async fn get_order_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    order_id: i64,
) -> Res<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_order<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: OrderCreateRequest,
) -> Res<Order> {
    sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (user_id, plan_id, amount, payment_method)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.plan_id)
    .bind(data.amount)
    .bind(data.payment_method.as_str())
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Moves a pending order to `status`. Returns `None` when the order was no longer
/// pending, so at most one caller ever wins the transition.
pub async fn settle_order<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    order_id: i64,
    status: PaymentStatus,
    external_tx_ref: Option<String>,
) -> Res<Option<Order>> {
    sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET payment_status = $1,
            external_tx_ref = COALESCE($2, external_tx_ref),
            updated_at = NOW()
        WHERE id = $3 AND payment_status = 'pending'
        RETURNING *
        "#,
    )
    .bind(status.as_str())
    .bind(external_tx_ref)
    .bind(order_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
