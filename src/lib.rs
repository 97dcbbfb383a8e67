//! Streaming chat completions through an HF-Inferoxy token proxy
//!
//! Each chat turn borrows a short-lived HuggingFace token from the proxy,
//! streams the completion from the inference router under an open deadline
//! and an idle deadline, and reports the token's health back to the proxy.

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod providers;
pub mod responder;
pub mod streaming;
pub mod token;
pub mod types;

// Re-export main types for convenience
pub use client::ModelClient;
pub use config::{ClientConfig, InferenceConfig, ProxyConfig, TimeoutConfig};
pub use error::{ErrorKind, ModelError, ModelResult};
pub use history::{submit, HistoryState, HistoryStream};
pub use models::{ChatMessage, ChatTurn, GenerationParams, MessageRole};
pub use providers::{HuggingFaceFactory, HuggingFaceProvider, Provider, ProviderFactory};
pub use responder::ChatResponder;
pub use streaming::{PartialStream, StreamingResponse};
pub use token::{HttpTokenProxy, ProxyToken, TokenProxy, TokenReport, TokenStatus};
pub use types::{ModelId, ModelSpec, ProviderId};

/// Initialize the logging system
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
