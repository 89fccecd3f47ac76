//! Uniform access to the VPN management backends.
//!
//! Each backend kind is one variant of [`Provider`]; callers only ever see the
//! [`VpnProvider`] capability set, obtained for a stored server through a
//! [`ProviderFactory`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::misc::ServerKind;
use db::models::server::Server;
use serde::Deserialize;

pub mod error;
pub mod factory;
pub mod peer_panel;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod token_panel;

pub use error::ProviderError;
pub use factory::{PanelProviderFactory, ProviderFactory};

use crate::{peer_panel::PeerPanelClient, token_panel::TokenPanelClient};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// What the caller wants created on the backend.
#[derive(Debug, Clone)]
pub struct AccountRequest {
    /// Deterministic per-order account name.
    pub identity: String,
    /// Data allowance in GB, zero or negative for unlimited.
    pub quota_gb: f64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedAccount {
    /// Key of the account on the backend, as it appears in usage data.
    pub external_id: String,
    /// Subscription link or rendered configuration handed to the customer.
    pub config_payload: String,
}

#[async_trait]
pub trait VpnProvider: Send + Sync {
    async fn create_account(&self, request: &AccountRequest) -> ProviderResult<ProvisionedAccount>;

    /// Bytes used per external id, received plus transmitted.
    async fn fetch_usage(&self) -> ProviderResult<HashMap<String, i64>>;

    async fn disable_account(&self, external_id: &str) -> ProviderResult<()>;
}

/// Username/password pair stored in `servers.credentials` for both panel kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelCredentials {
    pub username: String,
    pub password: String,
}

impl PanelCredentials {
    pub fn parse(blob: &str) -> ProviderResult<Self> {
        serde_json::from_str(blob).map_err(|e| ProviderError::InvalidCredentials(e.to_string()))
    }
}

pub(crate) fn parse_base_url(base_url: &str) -> ProviderResult<url::Url> {
    let url = url::Url::parse(base_url)
        .map_err(|e| ProviderError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
    if url.cannot_be_a_base() {
        return Err(ProviderError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(url)
}

/// Reads the body of a non-2xx answer into `ProviderError::Upstream`.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Upstream {
        status: status.as_u16(),
        body,
    })
}

/// One variant per backend kind.
pub enum Provider {
    TokenPanel(TokenPanelClient),
    PeerPanel(PeerPanelClient),
}

impl Provider {
    /// Builds the client matching the server's kind. The credential blob is only
    /// interpreted here.
    pub fn for_server(server: &Server) -> ProviderResult<Self> {
        match server.server_kind {
            ServerKind::TokenPanel => {
                let credentials = PanelCredentials::parse(&server.credentials)?;
                Ok(Provider::TokenPanel(TokenPanelClient::new(
                    &server.base_url,
                    credentials,
                )?))
            }
            ServerKind::PeerPanel => {
                let credentials = PanelCredentials::parse(&server.credentials)?;
                Ok(Provider::PeerPanel(PeerPanelClient::new(
                    &server.base_url,
                    credentials,
                )?))
            }
        }
    }
}

#[async_trait]
impl VpnProvider for Provider {
    async fn create_account(&self, request: &AccountRequest) -> ProviderResult<ProvisionedAccount> {
        match self {
            Provider::TokenPanel(client) => client.create_account(request).await,
            Provider::PeerPanel(client) => client.create_account(request).await,
        }
    }

    async fn fetch_usage(&self) -> ProviderResult<HashMap<String, i64>> {
        match self {
            Provider::TokenPanel(client) => client.fetch_usage().await,
            Provider::PeerPanel(client) => client.fetch_usage().await,
        }
    }

    async fn disable_account(&self, external_id: &str) -> ProviderResult<()> {
        match self {
            Provider::TokenPanel(client) => client.disable_account(external_id).await,
            Provider::PeerPanel(client) => client.disable_account(external_id).await,
        }
    }
}
