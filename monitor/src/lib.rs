use std::{collections::BTreeMap, sync::Arc, time::Duration};

use common::{
    error::Res,
    misc::{ServerKind, gb_to_bytes},
};
use db::{Store, dtos::subscription::MeteredSubscription};
use notifier::{Notification, NotificationKind, Notifier, dispatch};
use providers::{ProviderError, ProviderFactory};
use serde_json::json;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

/// What one pass over the metered subscriptions did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QuotaReport {
    /// Subscriptions whose usage was found in their server's usage map.
    pub checked: usize,
    /// Subscriptions moved to `limit_reached`.
    pub revoked: usize,
    /// Servers that could not be queried, and revocations the backend refused.
    pub failures: usize,
}

/// Periodically compares metered usage against plan allowances and revokes
/// subscriptions that used up their data.
pub struct QuotaMonitor {
    store: Arc<dyn Store>,
    providers: Arc<dyn ProviderFactory>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl QuotaMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        providers: Arc<dyn ProviderFactory>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            providers,
            notifier,
            interval,
        }
    }

    /// Runs one pass. Only a failure to read the subscriptions aborts it;
    /// per-server and per-subscription failures are logged and counted.
    pub async fn run_once(&self) -> Res<QuotaReport> {
        let mut report = QuotaReport::default();

        for kind in ServerKind::ALL.into_iter().filter(ServerKind::is_metered) {
            let rows = self.store.get_active_metered_subscriptions(kind).await?;

            let mut by_server: BTreeMap<i64, Vec<MeteredSubscription>> = BTreeMap::new();
            for row in rows {
                if let Some(server_id) = row.subscription.server_id {
                    by_server.entry(server_id).or_default().push(row);
                }
            }

            for (server_id, group) in by_server {
                self.check_server(server_id, group, &mut report).await;
            }
        }

        log::info!(
            "[QuotaMonitor] Pass done: {} checked, {} revoked, {} failures",
            report.checked,
            report.revoked,
            report.failures
        );
        Ok(report)
    }

    async fn check_server(
        &self,
        server_id: i64,
        group: Vec<MeteredSubscription>,
        report: &mut QuotaReport,
    ) {
        let server = match self.store.get_server(server_id).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                log::warn!("[QuotaMonitor] Server {} no longer exists", server_id);
                report.failures += 1;
                return;
            }
            Err(e) => {
                log::error!("[QuotaMonitor] Loading server {} failed: {}", server_id, e);
                report.failures += 1;
                return;
            }
        };

        let provider = match self.providers.connect(&server) {
            Ok(provider) => provider,
            Err(e) => {
                log::error!("[QuotaMonitor] Server {} is misconfigured: {}", server_id, e);
                report.failures += 1;
                return;
            }
        };

        let usage = match provider.fetch_usage().await {
            Ok(usage) => usage,
            Err(ProviderError::Unsupported(what)) => {
                log::debug!("[QuotaMonitor] Server {} does not meter: {}", server_id, what);
                return;
            }
            Err(e) => {
                log::error!("[QuotaMonitor] Usage of server {} unavailable: {}", server_id, e);
                report.failures += 1;
                return;
            }
        };

        for row in group {
            let subscription = &row.subscription;
            let Some(external_id) = subscription.external_id.as_deref() else {
                continue;
            };
            // Peers deleted on the panel are absent from the map.
            let Some(&used) = usage.get(external_id) else {
                log::debug!(
                    "[QuotaMonitor] No usage for {} on server {}",
                    external_id,
                    server_id
                );
                continue;
            };
            report.checked += 1;

            let limit = gb_to_bytes(row.data_limit_gb);
            if limit == 0 || used < limit {
                continue;
            }

            if let Err(e) = provider.disable_account(external_id).await {
                log::error!(
                    "[QuotaMonitor] Disabling {} on server {} failed, retrying next pass: {}",
                    external_id,
                    server_id,
                    e
                );
                report.failures += 1;
                continue;
            }

            match self.store.mark_limit_reached(subscription.id).await {
                Ok(true) => {
                    report.revoked += 1;
                    log::info!(
                        "[QuotaMonitor] Subscription {} reached its limit ({} of {} bytes)",
                        subscription.id,
                        used,
                        limit
                    );
                    dispatch(
                        &self.notifier,
                        Notification::new(
                            row.user_external_id,
                            NotificationKind::LimitReached,
                            json!({
                                "order_id": subscription.order_id,
                                "subscription_id": subscription.id,
                                "used_bytes": used,
                                "limit_bytes": limit,
                            }),
                        ),
                    )
                    .await;
                }
                // Left `active` concurrently; nothing to announce.
                Ok(false) => {}
                Err(e) => {
                    log::error!(
                        "[QuotaMonitor] Marking subscription {} failed: {}",
                        subscription.id,
                        e
                    );
                    report.failures += 1;
                }
            }
        }
    }

    /// Runs a pass right away and then every `interval` until `shutdown` turns true
    /// or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!("[QuotaMonitor] Started, period {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        log::error!("[QuotaMonitor] Pass aborted: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("[QuotaMonitor] Shutdown signal received, stopping");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
