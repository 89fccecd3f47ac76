use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use db::models::server::Server;
use tokio::sync::Mutex;

use crate::{
    AccountRequest, ProviderError, ProviderFactory, ProviderResult, ProvisionedAccount,
    VpnProvider,
};

/// In-process backend with scripted answers, for exercising the services
/// without a panel.
#[derive(Default)]
pub struct ScriptedProvider {
    create_failures: AtomicU32,
    link: String,
    usage: HashMap<String, i64>,
    fail_disable: bool,
    create_calls: AtomicU32,
    usage_calls: AtomicU32,
    requests: Mutex<Vec<AccountRequest>>,
    disabled: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// `create_account` fails `failures` times, then returns `link`.
    pub fn creating(failures: u32, link: &str) -> Self {
        Self {
            create_failures: AtomicU32::new(failures),
            link: link.to_string(),
            ..Default::default()
        }
    }

    /// `fetch_usage` answers `usage`; `disable_account` fails when `fail_disable`.
    pub fn metering(usage: &[(&str, i64)], fail_disable: bool) -> Self {
        Self {
            usage: usage.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            fail_disable,
            ..Default::default()
        }
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn usage_calls(&self) -> u32 {
        self.usage_calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<AccountRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn disabled(&self) -> Vec<String> {
        self.disabled.lock().await.clone()
    }
}

#[async_trait]
impl VpnProvider for ScriptedProvider {
    async fn create_account(&self, request: &AccountRequest) -> ProviderResult<ProvisionedAccount> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Upstream {
                status: 502,
                body: "scripted failure".to_string(),
            });
        }
        Ok(ProvisionedAccount {
            external_id: request.identity.clone(),
            config_payload: self.link.clone(),
        })
    }

    async fn fetch_usage(&self) -> ProviderResult<HashMap<String, i64>> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.usage.clone())
    }

    async fn disable_account(&self, external_id: &str) -> ProviderResult<()> {
        self.disabled.lock().await.push(external_id.to_string());
        if self.fail_disable {
            return Err(ProviderError::Upstream {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Hands out scripted providers by server id.
#[derive(Default)]
pub struct ScriptedFactory {
    providers: HashMap<i64, Arc<ScriptedProvider>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, server_id: i64, provider: Arc<ScriptedProvider>) -> Self {
        self.providers.insert(server_id, provider);
        self
    }
}

impl ProviderFactory for ScriptedFactory {
    fn connect(&self, server: &Server) -> ProviderResult<Arc<dyn VpnProvider>> {
        match self.providers.get(&server.id) {
            Some(provider) => Ok(provider.clone()),
            None => Err(ProviderError::InvalidCredentials(format!(
                "no scripted provider for server {}",
                server.id
            ))),
        }
    }
}
