use std::{collections::HashMap, time::Duration};

use common::misc::gb_to_bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use url::Url;

use crate::{
    AccountRequest, PanelCredentials, ProviderError, ProviderResult, ProvisionedAccount,
    ensure_success, parse_base_url,
};

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct AccountResponse {
    username: Option<String>,
    subscription_url: Option<String>,
    #[serde(default)]
    links: Vec<String>,
}

/// Client of the session-token panel.
///
/// The bearer token lives on the instance. It is fetched on first use and fetched
/// again once after the panel rejects it.
pub struct TokenPanelClient {
    base: Url,
    credentials: PanelCredentials,
    http: Client,
    token: Mutex<Option<String>>,
}

impl TokenPanelClient {
    pub fn new(base_url: &str, credentials: PanelCredentials) -> ProviderResult<Self> {
        let http = Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self {
            base: parse_base_url(base_url)?,
            credentials,
            http,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn login(&self) -> ProviderResult<String> {
        let response = self
            .http
            .post(self.endpoint(&["login"]))
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        let login: LoginResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("login: {}", e)))?;
        log::debug!("[TokenPanel] Logged in to {}", self.base);
        Ok(login.access_token)
    }

    async fn token(&self) -> ProviderResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    /// Sends an authenticated request, logging in again once on 401.
    async fn send_authorized(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> ProviderResult<reqwest::Response> {
        let token = self.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(response).await;
        }

        log::warn!("[TokenPanel] Token rejected by {}, logging in again", self.base);
        self.forget_token().await;
        let token = self.token().await?;
        ensure_success(build(&token).send().await?).await
    }

    /// Picks the link handed to the customer: the subscription URL when present
    /// (joined onto the base URL if relative), otherwise the first well-formed link.
    fn pick_link(&self, account: &AccountResponse) -> Option<String> {
        if let Some(raw) = account.subscription_url.as_deref().filter(|s| !s.is_empty()) {
            match Url::parse(raw) {
                Ok(url) => return Some(url.to_string()),
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    if let Ok(url) = self.base.join(raw) {
                        return Some(url.to_string());
                    }
                }
                Err(_) => {}
            }
        }

        account
            .links
            .iter()
            .find(|link| Url::parse(link).is_ok())
            .cloned()
    }

    pub async fn create_account(
        &self,
        request: &AccountRequest,
    ) -> ProviderResult<ProvisionedAccount> {
        let body = json!({
            "username": request.identity,
            "proxies": { "vless": {}, "vmess": {} },
            "data_limit": gb_to_bytes(request.quota_gb),
            "expire": request.expires_at.map(|at| at.timestamp()).unwrap_or(0),
            "data_limit_reset_strategy": "no_reset",
        });

        let url = self.endpoint(&["accounts"]);
        let response = self
            .send_authorized(|token| self.http.post(url.clone()).bearer_auth(token).json(&body))
            .await?;
        let account: AccountResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("create account: {}", e)))?;

        let config_payload = self
            .pick_link(&account)
            .ok_or(ProviderError::NoLinkInResponse)?;

        Ok(ProvisionedAccount {
            external_id: account.username.unwrap_or_else(|| request.identity.clone()),
            config_payload,
        })
    }

    /// The token panel enforces its own data limit; usage is not collected here.
    pub async fn fetch_usage(&self) -> ProviderResult<HashMap<String, i64>> {
        Err(ProviderError::Unsupported("usage metering"))
    }

    pub async fn disable_account(&self, external_id: &str) -> ProviderResult<()> {
        let url = self.endpoint(&["accounts", external_id]);
        let body = json!({ "status": "disabled" });
        self.send_authorized(|token| self.http.put(url.clone()).bearer_auth(token).json(&body))
            .await?;
        Ok(())
    }
}
