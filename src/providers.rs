use crate::config::InferenceConfig;
use crate::error::{ModelError, ModelResult};
use crate::models::ChatRequest;
use crate::streaming::{open_sse_stream, StreamingResponse};
use crate::types::ProviderId;
use async_trait::async_trait;
use reqwest::Client;
use reqwest_eventsource::{retry::Never, EventSource};
use std::sync::Arc;

#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Open a streaming completion. Resolves once the connection is established.
    async fn chat_stream(&self, req: &ChatRequest) -> ModelResult<StreamingResponse>;
}

/// Builds a provider bound to one short-lived token.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, provider: &ProviderId, token: &str) -> ModelResult<Arc<dyn Provider>>;
}

/// OpenAI-compatible chat completions on the HuggingFace inference router
pub struct HuggingFaceProvider {
    pub provider: ProviderId,
    pub api_key: String,
    pub api_base: String,
    pub client: Client,
}

#[async_trait]
impl Provider for HuggingFaceProvider {
    fn id(&self) -> ProviderId {
        self.provider.clone()
    }

    async fn chat_stream(&self, req: &ChatRequest) -> ModelResult<StreamingResponse> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let mut req = req.clone();
        req.stream = true;
        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req);
        let mut source = EventSource::new(builder)
            .map_err(|e| ModelError::Configuration(format!("cannot build stream request: {}", e)))?;
        source.set_retry_policy(Box::new(Never));
        open_sse_stream(source).await
    }
}

pub struct HuggingFaceFactory {
    client: Client,
    api_base: String,
}

impl HuggingFaceFactory {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.clone(),
        }
    }
}

impl ProviderFactory for HuggingFaceFactory {
    fn create(&self, provider: &ProviderId, token: &str) -> ModelResult<Arc<dyn Provider>> {
        if token.is_empty() {
            return Err(ModelError::Configuration("Missing HuggingFace token".to_string()));
        }
        Ok(Arc::new(HuggingFaceProvider {
            provider: provider.clone(),
            api_key: token.to_string(),
            api_base: self.api_base.clone(),
            client: self.client.clone(),
        }))
    }
}
