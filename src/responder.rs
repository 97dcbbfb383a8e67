//! Streams one chat turn through the token proxy.
//!
//! A turn acquires a token, opens the completion stream under a hard
//! deadline, accumulates content fragments under an idle deadline and
//! reports the token back. Every failure is reported to the proxy and
//! turned into a single user-facing string, so the stream never errors.

use crate::client::ModelClient;
use crate::config::ClientConfig;
use crate::error::{ModelError, ModelResult};
use crate::models::{ChatRequest, ChatTurn};
use crate::providers::ProviderFactory;
use crate::streaming::{PartialStream, StreamingResponse};
use crate::token::{ProxyToken, TokenProxy, TokenReport};
use crate::types::{ModelSpec, RequestId};
use async_stream::stream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct ChatResponder {
    config: Arc<ClientConfig>,
    proxy: Arc<dyn TokenProxy>,
    providers: Arc<dyn ProviderFactory>,
}

impl ChatResponder {
    pub fn new(
        config: ClientConfig,
        proxy: Arc<dyn TokenProxy>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            proxy,
            providers,
        }
    }

    /// Stream the response to `turn`.
    ///
    /// Each item is the whole response so far. A failed turn yields exactly
    /// one formatted error string and ends. Nothing happens until the stream
    /// is polled.
    pub fn respond(&self, turn: ChatTurn) -> PartialStream {
        let this = self.clone();
        Box::pin(stream! {
            let request_id = RequestId::new();

            let api_key = match this.config.proxy.validated_key() {
                Ok(key) => key.to_string(),
                Err(e) => {
                    warn!(%request_id, "proxy key is not configured");
                    yield e.user_message();
                    return;
                }
            };

            info!(%request_id, "requesting token from proxy");
            let token = match this.proxy.acquire(&api_key).await {
                Ok(token) => token,
                Err(e) => {
                    yield this.fail(&request_id, None, &api_key, &e).await;
                    return;
                }
            };
            info!(%request_id, token_id = %token.token_id, "got token");

            let mut stream = match this.open_stream(&request_id, &token, &turn).await {
                Ok(stream) => stream,
                Err(e) => {
                    yield this.fail(&request_id, Some(&token), &api_key, &e).await;
                    return;
                }
            };
            debug!(%request_id, "stream open, reading fragments");

            let idle = this.config.timeouts.idle_timeout();
            let mut response = String::new();
            let mut fragments = 0usize;
            let mut deadline = Instant::now() + idle;
            loop {
                match next_fragment(&mut stream, deadline, idle).await {
                    Ok(Some(content)) => {
                        response.push_str(&content);
                        fragments += 1;
                        deadline = Instant::now() + idle;
                        yield response.clone();
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield this.fail(&request_id, Some(&token), &api_key, &e).await;
                        return;
                    }
                }
            }

            info!(%request_id, fragments, chars = response.len(), "stream complete");
            if fragments == 0 {
                yield response;
            }
            this.report(&TokenReport::success(&token.token_id), &api_key).await;
        })
    }

    async fn open_stream(
        &self,
        request_id: &RequestId,
        token: &ProxyToken,
        turn: &ChatTurn,
    ) -> ModelResult<StreamingResponse> {
        let spec = ModelSpec::parse(&turn.model_name);
        info!(%request_id, model = %spec.model, provider = %spec.provider, "using model");

        let request = ChatRequest::new(spec.routed_model(), turn.messages(), turn.params);
        debug!(%request_id, messages = request.messages.len(), "prepared messages, creating client");
        let client = ModelClient::new(self.providers.create(&spec.provider, &token.token)?);

        let timeout = self.config.timeouts.request_timeout();
        info!(%request_id, ?timeout, "starting streaming request");

        // The open call may block past the deadline; abort is best effort.
        let mut task = tokio::spawn(async move { client.chat_stream(&request).await });
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined?,
            Err(_) => {
                task.abort();
                Err(ModelError::Timeout(timeout))
            }
        }
    }

    async fn fail(
        &self,
        request_id: &RequestId,
        token: Option<&ProxyToken>,
        api_key: &str,
        err: &ModelError,
    ) -> String {
        error!(
            %request_id,
            kind = ?err.kind(),
            status = ?err.status_code(),
            error = %err,
            "chat turn failed"
        );
        if let Some(token) = token {
            self.report(&TokenReport::failure(&token.token_id, err), api_key)
                .await;
        }
        err.user_message()
    }

    async fn report(&self, report: &TokenReport, api_key: &str) {
        match self.proxy.report(report, api_key).await {
            Ok(()) => debug!(token_id = %report.token_id, status = ?report.status, "reported token status"),
            Err(e) => warn!(token_id = %report.token_id, error = %e, "failed to report token status"),
        }
    }
}

/// Next non-empty content fragment, `None` at end of stream.
async fn next_fragment(
    stream: &mut StreamingResponse,
    deadline: Instant,
    idle: Duration,
) -> ModelResult<Option<String>> {
    loop {
        let chunk = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(chunk)) => chunk?,
            Ok(None) => return Ok(None),
            Err(_) => return Err(ModelError::IdleTimeout(idle)),
        };
        if let Some(content) = chunk.content() {
            return Ok(Some(content.to_string()));
        }
    }
}
