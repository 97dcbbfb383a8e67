//! Client side of the HF-Inferoxy token proxy.
//!
//! The proxy hands out short-lived provider tokens and tracks their health.
//! Every token acquired for a chat turn is reported back exactly once.

use crate::config::ProxyConfig;
use crate::error::{ErrorKind, ModelError, ModelResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROXY_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A provider credential borrowed from the proxy for one request
#[derive(Clone, Deserialize)]
pub struct ProxyToken {
    pub token: String,
    pub token_id: String,
}

impl std::fmt::Debug for ProxyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyToken")
            .field("token", &"<redacted>")
            .field("token_id", &self.token_id)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Success,
    Error,
}

/// Body of a status report
#[derive(Debug, Clone, Serialize)]
pub struct TokenReport {
    pub token_id: String,
    pub status: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl TokenReport {
    pub fn success(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            status: TokenStatus::Success,
            error: None,
            error_type: None,
        }
    }

    pub fn failure(token_id: impl Into<String>, err: &ModelError) -> Self {
        Self::error(token_id, err.report_message(), err.kind())
    }

    pub fn error(token_id: impl Into<String>, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            token_id: token_id.into(),
            status: TokenStatus::Error,
            error: Some(message.into()),
            error_type: Some(kind.report_type().to_string()),
        }
    }
}

#[async_trait]
pub trait TokenProxy: Send + Sync {
    async fn acquire(&self, api_key: &str) -> ModelResult<ProxyToken>;
    async fn report(&self, report: &TokenReport, api_key: &str) -> ModelResult<()>;
}

pub struct HttpTokenProxy {
    base_url: String,
    client: Client,
}

impl HttpTokenProxy {
    pub fn new(config: &ProxyConfig) -> ModelResult<Self> {
        let client = Client::builder().timeout(PROXY_HTTP_TIMEOUT).build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_connect() {
            ModelError::Connection(format!("{}: {}", self.base_url, e))
        } else {
            ModelError::Reqwest(e)
        }
    }
}

#[async_trait]
impl TokenProxy for HttpTokenProxy {
    async fn acquire(&self, api_key: &str) -> ModelResult<ProxyToken> {
        let url = format!("{}/keys/provision/hf", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !resp.status().is_success() {
            return Err(ModelError::Proxy(resp.status(), resp.text().await.unwrap_or_default()));
        }
        let token: ProxyToken = resp.json().await?;
        Ok(token)
    }

    async fn report(&self, report: &TokenReport, api_key: &str) -> ModelResult<()> {
        let url = format!("{}/keys/report/hf", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(report)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !resp.status().is_success() {
            return Err(ModelError::Proxy(resp.status(), resp.text().await.unwrap_or_default()));
        }
        Ok(())
    }
}
