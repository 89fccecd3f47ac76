use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::models::plan::Plan;

pub async fn get_plan_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: i64,
) -> Res<Option<Plan>> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(plan_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}
