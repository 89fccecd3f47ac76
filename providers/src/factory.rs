use std::sync::Arc;

use dashmap::DashMap;
use db::models::server::Server;

use crate::{Provider, ProviderResult, VpnProvider};

/// Hands out the adapter for a stored server.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, server: &Server) -> ProviderResult<Arc<dyn VpnProvider>>;
}

struct CachedClient {
    fingerprint: String,
    provider: Arc<Provider>,
}

/// Keeps one client per server so session tokens survive between calls.
/// A server whose base URL or credentials changed gets a fresh client.
#[derive(Default)]
pub struct PanelProviderFactory {
    clients: DashMap<i64, CachedClient>,
}

impl PanelProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn fingerprint(server: &Server) -> String {
        format!(
            "{}|{}|{}",
            server.server_kind, server.base_url, server.credentials
        )
    }
}

impl ProviderFactory for PanelProviderFactory {
    fn connect(&self, server: &Server) -> ProviderResult<Arc<dyn VpnProvider>> {
        let fingerprint = Self::fingerprint(server);
        if let Some(cached) = self.clients.get(&server.id) {
            if cached.fingerprint == fingerprint {
                return Ok(cached.provider.clone());
            }
        }

        let provider = Arc::new(Provider::for_server(server)?);
        self.clients.insert(
            server.id,
            CachedClient {
                fingerprint,
                provider: provider.clone(),
            },
        );
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::misc::ServerKind;

    use super::*;

    fn server(base_url: &str) -> Server {
        Server {
            id: 4,
            name: "peer".to_string(),
            server_kind: ServerKind::PeerPanel,
            base_url: base_url.to_string(),
            credentials: r#"{"username":"admin","password":"pw"}"#.to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn same_server_reuses_client() {
        let factory = PanelProviderFactory::new();
        let first = factory.connect(&server("https://peer")).unwrap();
        let second = factory.connect(&server("https://peer")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn changed_base_url_rebuilds_client() {
        let factory = PanelProviderFactory::new();
        let first = factory.connect(&server("https://peer")).unwrap();
        let second = factory.connect(&server("https://peer-2")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
