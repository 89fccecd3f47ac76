use common::{env_config::ServerSeed, error::Res};
use db::{PgStore, dtos::server::ServerCreateRequest, server};
use serde_json::json;

/// Inserts the configured servers, but only into an empty servers table so that
/// rows edited by an operator are never overwritten.
pub async fn seed_servers(store: &PgStore, seeds: &[ServerSeed]) -> Res<()> {
    if seeds.is_empty() || server::count_servers(store.pool()).await? > 0 {
        return Ok(());
    }

    for seed in seeds {
        let credentials = json!({
            "username": seed.username,
            "password": seed.password,
        });
        let created = server::insert_server(
            store.pool(),
            ServerCreateRequest {
                name: seed.name.clone(),
                server_kind: seed.kind,
                base_url: seed.base_url.clone(),
                credentials: credentials.to_string(),
            },
        )
        .await?;
        log::info!(
            "Seeded {} server {} ({})",
            created.server_kind,
            created.id,
            created.base_url
        );
    }
    Ok(())
}
