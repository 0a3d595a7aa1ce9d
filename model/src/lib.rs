pub mod config;
#[cfg(feature = "huggingface")]
pub mod huggingface;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod provider;
pub mod types;

pub use config::{HuggingFaceConfig, OllamaConfig, DEFAULT_HF_MODEL, DEFAULT_OLLAMA_MODEL};
pub use provider::{ModelError, ModelProvider, ModelResult};
pub use types::{
    FinishReason, GenerationOptions, GenerationRequest, GenerationResponse, ModelInfo, Usage,
};

#[cfg(feature = "huggingface")]
pub use huggingface::HuggingFaceProvider;
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::provider::*;
    pub use crate::types::*;

    #[cfg(feature = "huggingface")]
    pub use crate::huggingface::*;
    #[cfg(feature = "ollama")]
    pub use crate::ollama::*;
}
