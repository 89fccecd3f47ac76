use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::models::user::User;

pub async fn get_user_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: i64,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_user_by_external_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    external_id: i64,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Returns the user registered under `external_id`, creating it on first contact.
/// The stored language of an existing user is left untouched.
pub async fn upsert_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    external_id: i64,
    language: &str,
) -> Res<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (external_id, language)
        VALUES ($1, $2)
        ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
        RETURNING *
        "#,
    )
    .bind(external_id)
    .bind(language)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
