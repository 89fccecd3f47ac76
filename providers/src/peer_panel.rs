use std::{collections::HashMap, time::Duration};

use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{
    AccountRequest, PanelCredentials, ProviderError, ProviderResult, ProvisionedAccount,
    ensure_success, parse_base_url,
};

const TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Identified {
    identifier: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountUsage {
    #[serde(default)]
    peer_metrics: Vec<PeerMetrics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PeerMetrics {
    peer_identifier: String,
    #[serde(default)]
    bytes_received: i64,
    #[serde(default)]
    bytes_transmitted: i64,
}

/// Client of the peer-provisioning panel. Every call uses basic authentication.
pub struct PeerPanelClient {
    base: Url,
    credentials: PanelCredentials,
    http: Client,
}

impl PeerPanelClient {
    pub fn new(base_url: &str, credentials: PanelCredentials) -> ProviderResult<Self> {
        let http = Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self {
            base: parse_base_url(base_url)?,
            credentials,
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, segments: &[&str]) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(segments))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        step: &str,
    ) -> ProviderResult<T> {
        ensure_success(builder.send().await?)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", step, e)))
    }

    async fn first_interface(&self) -> ProviderResult<String> {
        let interfaces: Vec<Identified> = self
            .json(self.request(reqwest::Method::GET, &["interfaces"]), "interfaces")
            .await?;
        interfaces
            .into_iter()
            .next()
            .map(|interface| interface.identifier)
            .ok_or_else(|| ProviderError::InvalidResponse("no interface on the panel".into()))
    }

    pub async fn create_account(
        &self,
        request: &AccountRequest,
    ) -> ProviderResult<ProvisionedAccount> {
        let interface = self.first_interface().await?;

        let peer: Identified = self
            .json(
                self.request(reqwest::Method::POST, &["peers"]).json(&json!({
                    "InterfaceIdentifier": interface,
                    "DisplayName": request.identity,
                    "UserIdentifier": request.identity,
                })),
                "create peer",
            )
            .await?;

        if let Some(expires_at) = request.expires_at {
            let response = self
                .request(reqwest::Method::PUT, &["peers", &peer.identifier])
                .json(&json!({
                    "Identifier": peer.identifier,
                    "ExpiresAt": expires_at.to_rfc3339(),
                }))
                .send()
                .await?;
            ensure_success(response).await?;
        }

        let response = self
            .request(reqwest::Method::GET, &["peers", &peer.identifier, "config"])
            .send()
            .await?;
        let config_payload = ensure_success(response).await?.text().await?;

        Ok(ProvisionedAccount {
            external_id: peer.identifier,
            config_payload,
        })
    }

    async fn account_usage(&self, account_id: &str) -> ProviderResult<AccountUsage> {
        self.json(
            self.request(reqwest::Method::GET, &["usage-by-account", account_id]),
            "usage by account",
        )
        .await
    }

    /// Lists the panel accounts, then sums received and transmitted bytes per peer.
    /// Accounts whose usage cannot be read are skipped.
    pub async fn fetch_usage(&self) -> ProviderResult<HashMap<String, i64>> {
        let accounts: Vec<Identified> = self
            .json(self.request(reqwest::Method::GET, &["accounts"]), "accounts")
            .await?;

        let results = join_all(
            accounts
                .iter()
                .map(|account| self.account_usage(&account.identifier)),
        )
        .await;

        let mut usage: HashMap<String, i64> = HashMap::new();
        for (account, result) in accounts.iter().zip(results) {
            match result {
                Ok(account_usage) => {
                    for peer in account_usage.peer_metrics {
                        let bytes = peer.bytes_received.saturating_add(peer.bytes_transmitted);
                        let total = usage.entry(peer.peer_identifier).or_default();
                        *total = total.saturating_add(bytes);
                    }
                }
                Err(e) => {
                    log::warn!(
                        "[PeerPanel] Skipping usage of account {}: {}",
                        account.identifier,
                        e
                    );
                }
            }
        }
        Ok(usage)
    }

    pub async fn disable_account(&self, external_id: &str) -> ProviderResult<()> {
        let response = self
            .request(reqwest::Method::PUT, &["peers", external_id])
            .json(&json!({
                "Identifier": external_id,
                "Disabled": true,
                "DisabledReason": "data limit reached",
            }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
