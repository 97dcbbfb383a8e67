use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Main error type for a chat turn
#[derive(Error, Debug)]
pub enum ModelError {
    /// Could not reach the token proxy or the inference provider
    #[error("connection failed: {0}")]
    Connection(String),

    /// Opening the stream took longer than the request deadline
    #[error("chat request timed out after {0:?}")]
    Timeout(Duration),

    /// No content fragment arrived within the idle window
    #[error("no response received for {0:?} during streaming")]
    IdleTimeout(Duration),

    /// Stream disconnected before completion
    #[error("stream disconnected before completion: {0}")]
    Stream(String),

    /// Error event sent by the provider inside an open stream
    #[error("provider error: {0}")]
    Provider(String),

    /// Unexpected HTTP status code from the inference provider
    #[error("unexpected status {0}: {1}")]
    UnexpectedStatus(StatusCode, String),

    /// Unexpected HTTP status code from the token proxy
    #[error("token proxy returned {0}: {1}")]
    Proxy(StatusCode, String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Environment variable error
    #[error("missing environment variable: {0}")]
    EnvVar(#[from] EnvVarError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    TokioJoin(#[from] JoinError),
}

/// Environment variable error
#[derive(Debug)]
pub struct EnvVarError {
    /// Name of the environment variable that is missing
    pub var: String,
    /// Optional instructions to help the user get a valid value
    pub instructions: Option<String>,
}

impl std::fmt::Display for EnvVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Missing environment variable: `{}`", self.var)?;
        if let Some(instructions) = &self.instructions {
            write!(f, ". {}", instructions)?;
        }
        Ok(())
    }
}

impl std::error::Error for EnvVarError {}

/// User-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Authentication,
    QuotaExceeded,
    RateLimited,
    Api,
    Unexpected,
}

impl ErrorKind {
    fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => ErrorKind::Authentication,
            402 => ErrorKind::QuotaExceeded,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Api,
        }
    }

    /// Heading shown to the user.
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::Connection => "Connection Error",
            ErrorKind::Timeout => "Timeout Error",
            ErrorKind::Authentication => "Authentication Error",
            ErrorKind::QuotaExceeded => "Quota Exceeded",
            ErrorKind::RateLimited => "Rate Limited",
            ErrorKind::Api => "HuggingFace API Error",
            ErrorKind::Unexpected => "Unexpected Error",
        }
    }

    /// Value of the `error_type` field sent to the token proxy.
    pub fn report_type(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "invalid_credentials",
            ErrorKind::QuotaExceeded => "credits_exceeded",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Api | ErrorKind::Unexpected => "other",
        }
    }
}

impl ModelError {
    /// Classify the error for reporting and display.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Connection(_) => ErrorKind::Connection,
            ModelError::Timeout(_) | ModelError::IdleTimeout(_) => ErrorKind::Timeout,
            ModelError::UnexpectedStatus(status, _) => ErrorKind::from_status(*status),
            ModelError::Reqwest(e) if e.is_connect() => ErrorKind::Connection,
            ModelError::Reqwest(e) if e.is_timeout() => ErrorKind::Timeout,
            ModelError::Reqwest(e) => match e.status() {
                Some(status) => ErrorKind::from_status(status),
                None => ErrorKind::Unexpected,
            },
            _ => ErrorKind::Unexpected,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ModelError::UnexpectedStatus(status, _) => Some(*status),
            ModelError::Proxy(status, _) => Some(*status),
            ModelError::Reqwest(e) => e.status(),
            _ => None,
        }
    }

    /// Detailed message sent to the token proxy alongside an `error` status.
    pub fn report_message(&self) -> String {
        match self.kind() {
            ErrorKind::Connection => format!("Cannot connect to HF-Inferoxy server: {}", self),
            ErrorKind::Timeout => format!("Request timed out: {}", self),
            _ => self.to_string(),
        }
    }

    /// The single formatted string a failed chat turn yields.
    pub fn user_message(&self) -> String {
        if let ModelError::EnvVar(e) = self {
            return format!("❌ Error: {}", e);
        }
        let kind = self.kind();
        let detail = match kind {
            ErrorKind::Connection => {
                "Unable to connect to the proxy server. Please check if it's running.".to_string()
            }
            ErrorKind::Timeout => {
                "The request took too long. The server may be overloaded. Please try again."
                    .to_string()
            }
            ErrorKind::Authentication => {
                "Invalid or expired API token. The proxy will provide a new token on retry."
                    .to_string()
            }
            ErrorKind::QuotaExceeded => {
                "API quota exceeded. The proxy will try alternative providers.".to_string()
            }
            ErrorKind::RateLimited => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ErrorKind::Api => self.to_string(),
            ErrorKind::Unexpected => format!("An unexpected error occurred: {}", self),
        };
        format_error_message(kind.title(), &detail)
    }
}

/// Render a titled error line for the chat transcript.
pub fn format_error_message(title: &str, detail: &str) -> String {
    format!("❌ {}: {}", title, detail)
}
