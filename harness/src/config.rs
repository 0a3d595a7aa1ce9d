//! File-backed settings for the CLI.
//!
//! Every field has a default, so an empty or missing file yields the same
//! behaviour as the built-in configuration. Secrets never live here: the
//! Hugging Face token is read from `HF_TOKEN`.

use crate::executor::ExecutorConfig;
use crate::generation::GenerationConfig;
use clap::ValueEnum;
use model::{
    GenerationOptions, HuggingFaceConfig, HuggingFaceProvider, ModelError, ModelProvider,
    OllamaConfig, OllamaProvider, DEFAULT_HF_MODEL, DEFAULT_OLLAMA_MODEL,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to create model provider: {0}")]
    Provider(#[from] ModelError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    #[value(name = "huggingface")]
    HuggingFace,
    Ollama,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::HuggingFace => DEFAULT_HF_MODEL,
            ProviderKind::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Inference endpoint; provider default when unset.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub wait_for_model: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            timeout_secs: 120,
            wait_for_model: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Provider default when unset.
    pub model: Option<String>,
    pub max_retries: u32,
    pub temperature: f32,
    pub do_sample: bool,
    pub max_new_tokens: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let options = GenerationOptions::default();
        let generation = GenerationConfig::default();
        Self {
            model: None,
            max_retries: generation.max_retries,
            temperature: options.temperature,
            do_sample: options.do_sample,
            max_new_tokens: options.max_new_tokens,
            retry_base_delay_ms: generation.retry_base_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub interpreter: String,
    pub timeout_secs: u64,
    pub max_output_chars: usize,
    pub isolated: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let config = ExecutorConfig::default();
        Self {
            interpreter: config.interpreter,
            timeout_secs: config.timeout.as_secs(),
            max_output_chars: config.max_output_chars,
            isolated: config.isolated,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderSettings,
    pub generation: GenerationSettings,
    pub executor: ExecutorSettings,
}

impl AppConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn model(&self) -> String {
        self.generation
            .model
            .clone()
            .unwrap_or_else(|| self.provider.kind.default_model().to_string())
    }

    pub fn generation_config(&self) -> GenerationConfig {
        let settings = &self.generation;
        GenerationConfig {
            model: self.model(),
            max_retries: settings.max_retries,
            options: GenerationOptions {
                temperature: settings.temperature,
                do_sample: settings.do_sample,
                max_new_tokens: settings.max_new_tokens,
                ..GenerationOptions::default()
            },
            retry_base_delay_ms: settings.retry_base_delay_ms,
            ..GenerationConfig::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            interpreter: self.executor.interpreter.clone(),
            timeout: Duration::from_secs(self.executor.timeout_secs),
            max_output_chars: self.executor.max_output_chars,
            isolated: self.executor.isolated,
            ..ExecutorConfig::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| ConfigError::Invalid { message };

        if self.provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs must be greater than 0".to_string()));
        }
        self.generation_config()
            .validate()
            .map_err(|m| invalid(format!("generation: {}", m)))?;
        self.executor_config()
            .validate()
            .map_err(|m| invalid(format!("executor: {}", m)))?;
        Ok(())
    }

    /// Creates the configured provider. Validation of URLs happens here.
    pub fn build_provider(&self) -> ConfigResult<Box<dyn ModelProvider>> {
        let timeout = Duration::from_secs(self.provider.timeout_secs);

        let provider: Box<dyn ModelProvider> = match self.provider.kind {
            ProviderKind::HuggingFace => {
                let mut config = HuggingFaceConfig::default()
                    .with_timeout(timeout)
                    .with_wait_for_model(self.provider.wait_for_model)
                    .with_token_from_env();
                if let Some(url) = &self.provider.base_url {
                    config = config.with_api_url(url.clone());
                }
                Box::new(HuggingFaceProvider::new(config)?)
            }
            ProviderKind::Ollama => {
                let mut config = OllamaConfig::default().with_timeout(timeout);
                if let Some(url) = &self.provider.base_url {
                    config = config.with_base_url(url.clone());
                }
                Box::new(OllamaProvider::new(config)?)
            }
        };

        Ok(provider)
    }
}
