mod cors;
mod seed;

use std::{sync::Arc, time::Duration};

use actix_web::{
    App, HttpServer,
    web::{self},
};
use api_orders::{GatewayClient, Settlement};
use common::env_config::Config;
use db::{PgStore, Store};
use monitor::QuotaMonitor;
use notifier::{LogNotifier, Notifier, WebhookNotifier};
use providers::{PanelProviderFactory, ProviderFactory};
use provisioning::{Provisioner, RetryPolicy};
use tokio::sync::watch;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup(&config.log_file).expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, config.is_production())
        .await
        .expect("Failed to set up database");
    let pg_store = PgStore::new(pool);
    seed::seed_servers(&pg_store, &config.seed_servers)
        .await
        .expect("Failed to seed servers");
    let store: Arc<dyn Store> = Arc::new(pg_store);

    // backends and notifications
    let providers: Arc<dyn ProviderFactory> = Arc::new(PanelProviderFactory::new());
    let notifier: Arc<dyn Notifier> = match &config.notifier_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.as_str()).expect("Failed to build notifier")),
        None => {
            log::warn!("NOTIFIER_URL is not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let provisioner = Arc::new(Provisioner::new(
        store.clone(),
        providers.clone(),
        notifier.clone(),
        RetryPolicy::from_config(&config),
    ));
    let settlement = Arc::new(Settlement::new(
        store.clone(),
        provisioner,
        notifier.clone(),
        config.gateway.merchant_key.clone(),
    ));
    let gateway =
        Arc::new(GatewayClient::new(&config.gateway).expect("Failed to build gateway client"));

    // quota monitor
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = QuotaMonitor::new(
        store.clone(),
        providers,
        notifier,
        Duration::from_secs(config.quota_check_interval_secs.max(1)),
    )
    .spawn(shutdown_rx);

    let rate_limit = config.public_rate_limit_per_second;
    let result = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(settlement.clone()))
            .app_data(web::Data::new(gateway.clone()))
            .wrap(logger::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .configure(api_auth::mount_auth)
                    .service(
                        web::scope("/admin")
                            .wrap(api_auth::auth_middleware(config_data.clone()))
                            .service(api_orders::mount_admin()),
                    )
                    .service(api_orders::mount_webhook())
                    .service(
                        web::scope("")
                            .wrap(limiter::ip_middleware(rate_limit))
                            .configure(api_orders::mount_public),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = monitor.await {
        log::error!("Quota monitor task failed: {}", e);
    }
    result
}
