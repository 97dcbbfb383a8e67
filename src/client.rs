use crate::error::ModelResult;
use crate::models::ChatRequest;
use crate::providers::Provider;
use crate::streaming::StreamingResponse;
use futures::StreamExt;
use metrics::{counter, decrement_gauge, histogram, increment_gauge};
use std::sync::Arc;
use std::time::Instant;

/// A provider wrapped with request metrics.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
}

/// Labels and clocks for one streamed completion.
#[derive(Clone)]
struct StreamMetrics {
    provider: String,
    model: String,
    started: Instant,
}

impl StreamMetrics {
    fn start(provider: String, model: String) -> Self {
        increment_gauge!("llm_inflight_requests", 1.0, "provider" => provider.clone());
        Self {
            provider,
            model,
            started: Instant::now(),
        }
    }

    /// Stream open finished, successfully or not.
    fn opened(&self, ok: bool) {
        let result = if ok { "success" } else { "error" };
        histogram!("llm_request_latency_seconds", self.started.elapsed().as_secs_f64(), "provider" => self.provider.clone(), "model" => self.model.clone());
        decrement_gauge!("llm_inflight_requests", 1.0, "provider" => self.provider.clone());
        counter!("llm_requests_total", 1, "provider" => self.provider.clone(), "model" => self.model.clone(), "result" => result);
    }

    /// Observe one chunk; `last` is the arrival time of the previous chunk.
    fn chunk(&self, last: Option<Instant>) -> Instant {
        let now = Instant::now();
        match last {
            None => histogram!("llm_first_token_latency_seconds", now.duration_since(self.started).as_secs_f64(), "provider" => self.provider.clone(), "model" => self.model.clone()),
            Some(prev) => histogram!("llm_stream_intertoken_gap_seconds", now.duration_since(prev).as_secs_f64(), "provider" => self.provider.clone(), "model" => self.model.clone()),
        }
        now
    }
}

impl ModelClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub async fn chat_stream(&self, req: &ChatRequest) -> ModelResult<StreamingResponse> {
        let metrics = StreamMetrics::start(self.provider.id().to_string(), req.model.clone());
        let opened = self.provider.chat_stream(req).await;
        metrics.opened(opened.is_ok());

        let mut last = None;
        let stream = opened?.inspect(move |chunk| {
            if chunk.is_ok() {
                last = Some(metrics.chunk(last));
            }
        });
        Ok(Box::pin(stream))
    }
}
