use common::{
    error::{AppError, Res},
    misc::ServerKind,
};
use sqlx::{Executor, Postgres};

use crate::{dtos::server::ServerCreateRequest, models::server::Server};

pub async fn get_server_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    server_id: i64,
) -> Res<Option<Server>> {
    sqlx::query_as::<_, Server>("SELECT * FROM servers WHERE id = $1")
        .bind(server_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Lowest-id active server of the given kind.
pub async fn first_active_server<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    kind: ServerKind,
) -> Res<Option<Server>> {
    sqlx::query_as::<_, Server>(
        "SELECT * FROM servers WHERE server_kind = $1 AND is_active = TRUE ORDER BY id LIMIT 1",
    )
    .bind(kind.as_str())
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn count_servers<'e, E: Executor<'e, Database = Postgres>>(executor: E) -> Res<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM servers")
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_server<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: ServerCreateRequest,
) -> Res<Server> {
    sqlx::query_as::<_, Server>(
        r#"
        INSERT INTO servers (name, server_kind, base_url, credentials)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(data.name)
    .bind(data.server_kind.as_str())
    .bind(data.base_url)
    .bind(data.credentials)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
