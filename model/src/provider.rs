use crate::types::{GenerationRequest, GenerationResponse, ModelInfo};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    Authentication,

    #[error("Empty generation returned by {provider}")]
    EmptyGeneration { provider: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

pub type ModelResult<T> = Result<T, ModelError>;

/// A text-completion backend: prompt in, raw generated text out.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> ModelResult<GenerationResponse>;

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>>;

    async fn health_check(&self) -> ModelResult<()>;

    fn provider_name(&self) -> &'static str;
}

/// Maps an HTTP status returned by a provider to a typed error.
pub(crate) fn error_for_status(
    provider: &str,
    model: &str,
    status: reqwest::StatusCode,
    body: String,
) -> ModelError {
    match status.as_u16() {
        401 | 403 => ModelError::Authentication,
        404 => ModelError::ModelNotFound {
            model: model.to_string(),
        },
        429 => ModelError::RateLimit,
        503 => ModelError::ServiceUnavailable {
            message: format!("{} is unavailable: {}", provider, body),
        },
        _ => ModelError::Unknown {
            message: format!("{} API returned {}: {}", provider, status, body),
        },
    }
}

pub(crate) fn map_transport_error(provider: &str, err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::ServiceUnavailable {
            message: "Request timeout".to_string(),
        }
    } else if err.is_connect() {
        ModelError::ServiceUnavailable {
            message: format!("Cannot connect to {} service", provider),
        }
    } else {
        ModelError::Network(err)
    }
}
