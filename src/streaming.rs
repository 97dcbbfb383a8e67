use crate::error::{ModelError, ModelResult};
use crate::models::StreamingChatResponse;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use std::pin::Pin;

/// A streaming response from an LLM provider
pub type StreamingResponse = Pin<Box<dyn Stream<Item = ModelResult<StreamingChatResponse>> + Send>>;

/// Incremental responses handed to the UI, each the full text so far
pub type PartialStream = Pin<Box<dyn Stream<Item = String> + Send>>;

const DONE_SENTINEL: &str = "[DONE]";

/// Decode one SSE `data:` payload. `None` marks the end of the stream.
///
/// A payload with a top-level `error` field is an in-band failure and
/// becomes an error, with its status when the provider sent one.
pub fn decode_event(data: &str) -> ModelResult<Option<StreamingChatResponse>> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(data)?;
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(in_band_error(error));
    }
    Ok(Some(serde_json::from_value(value)?))
}

fn in_band_error(error: &Value) -> ModelError {
    let message = error
        .as_str()
        .or_else(|| error.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    let status = ["status", "code", "status_code"]
        .iter()
        .find_map(|key| error.get(key).and_then(Value::as_u64))
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|status| status.is_client_error() || status.is_server_error());
    match status {
        Some(status) => ModelError::UnexpectedStatus(status, message),
        None => ModelError::Provider(message),
    }
}

/// Wait for the event source to open, then expose it as a chunk stream.
pub async fn open_sse_stream(mut source: EventSource) -> ModelResult<StreamingResponse> {
    match source.next().await {
        Some(Ok(Event::Open)) => Ok(chunk_stream(source)),
        Some(Ok(Event::Message(_))) => {
            source.close();
            Err(ModelError::Stream("event received before the stream opened".to_string()))
        }
        Some(Err(e)) => {
            source.close();
            Err(map_event_error(e).await)
        }
        None => Ok(Box::pin(futures::stream::empty())),
    }
}

fn chunk_stream(source: EventSource) -> StreamingResponse {
    let stream = futures::stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        loop {
            match source.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => match decode_event(&message.data) {
                    Ok(Some(chunk)) => return Some((Ok(chunk), Some(source))),
                    Ok(None) => {
                        source.close();
                        return None;
                    }
                    Err(e) => {
                        source.close();
                        return Some((Err(e), None));
                    }
                },
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => return None,
                Some(Err(e)) => {
                    source.close();
                    return Some((Err(map_event_error(e).await), None));
                }
            }
        }
    });
    Box::pin(stream)
}

async fn map_event_error(err: reqwest_eventsource::Error) -> ModelError {
    use reqwest_eventsource::Error;
    match err {
        Error::InvalidStatusCode(status, response) => {
            ModelError::UnexpectedStatus(status, response.text().await.unwrap_or_default())
        }
        Error::Transport(e) => ModelError::Reqwest(e),
        Error::InvalidContentType(_, response) => ModelError::UnexpectedStatus(
            response.status(),
            response.text().await.unwrap_or_default(),
        ),
        other => ModelError::Stream(other.to_string()),
    }
}
