use crate::error::{EnvVarError, ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_PROXY_URL: &str = "http://localhost:8000";
pub const DEFAULT_ROUTER_URL: &str = "https://router.huggingface.co/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_url")]
    pub url: String,
    /// Key used to authenticate against the token proxy
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_router_url")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for opening the completion stream
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Longest gap allowed between content fragments
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_proxy_url() -> String {
    DEFAULT_PROXY_URL.to_string()
}

fn default_router_url() -> String {
    DEFAULT_ROUTER_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_idle_timeout_secs() -> u64 {
    30
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: default_proxy_url(),
            api_key: None,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_base: default_router_url(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ProxyConfig {
    /// The proxy key, or an error naming `PROXY_KEY` when it is absent or blank.
    pub fn validated_key(&self) -> ModelResult<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(EnvVarError {
                var: "PROXY_KEY".to_string(),
                instructions: Some(
                    "Please set it to your HF-Inferoxy API key before chatting.".to_string(),
                ),
            }
            .into()),
        }
    }
}

impl ClientConfig {
    /// Build a config from `PROXY_KEY`, `PROXY_URL` and `HF_ROUTER_URL`.
    pub fn from_env() -> ModelResult<Self> {
        let mut config = Self::default();
        config.proxy.api_key = std::env::var("PROXY_KEY").ok();
        if let Ok(url) = std::env::var("PROXY_URL") {
            config.proxy.url = url;
        }
        if let Ok(url) = std::env::var("HF_ROUTER_URL") {
            config.inference.api_base = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file. A missing `proxy.api_key` falls back to `PROXY_KEY`.
    pub fn from_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModelError::Configuration(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let mut config: Self = serde_json::from_str(&raw)?;
        if config.proxy.api_key.is_none() {
            config.proxy.api_key = std::env::var("PROXY_KEY").ok();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ModelResult<()> {
        Url::parse(&self.proxy.url)?;
        Url::parse(&self.inference.api_base)?;
        if self.timeouts.request_timeout_secs == 0 || self.timeouts.idle_timeout_secs == 0 {
            return Err(ModelError::Configuration(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
