use serde::{Deserialize, Serialize};
use std::fmt;

/// Model identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Inference provider behind the router, or `auto` to let the router pick
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    pub const AUTO: &'static str = "auto";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn auto() -> Self {
        Self::new(Self::AUTO)
    }

    pub fn is_auto(&self) -> bool {
        self.0 == Self::AUTO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        Self::auto()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A model identifier split into model and provider.
///
/// `"meta-llama/Llama-3.1-8B-Instruct:together"` selects the `together`
/// provider; without a suffix the provider is `auto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub model: ModelId,
    pub provider: ProviderId,
}

impl ModelSpec {
    pub fn parse(model_name: &str) -> Self {
        match model_name.split_once(':') {
            Some((model, provider)) if !provider.trim().is_empty() => Self {
                model: ModelId::from(model.trim()),
                provider: ProviderId::from(provider.trim()),
            },
            Some((model, _)) => Self {
                model: ModelId::from(model.trim()),
                provider: ProviderId::auto(),
            },
            None => Self {
                model: ModelId::from(model_name.trim()),
                provider: ProviderId::auto(),
            },
        }
    }

    /// Model string sent to the router, with the provider suffix when one was chosen.
    pub fn routed_model(&self) -> String {
        if self.provider.is_auto() {
            self.model.to_string()
        } else {
            format!("{}:{}", self.model, self.provider)
        }
    }
}

/// Request ID for tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
