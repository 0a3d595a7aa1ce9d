use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HF_MODEL: &str = "Salesforce/codegen-350M-mono";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:1.5b";

fn validate_url(name: &str, url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err(format!("{} cannot be empty", name));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("{} must start with http:// or https://", name));
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Send the prompt verbatim, bypassing the model's chat template.
    pub raw_prompt: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(120),
            raw_prompt: true,
        }
    }
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_raw_prompt(mut self, raw_prompt: bool) -> Self {
        self.raw_prompt = raw_prompt;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_url("Base URL", &self.base_url)?;

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Hugging Face Inference API settings.
///
/// The token is never serialized; it is read from the environment by the
/// caller and attached with [`HuggingFaceConfig::with_token`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceConfig {
    pub api_url: String,
    pub hub_url: String,
    #[serde(skip)]
    pub token: Option<String>,
    pub timeout: Duration,
    /// Ask the API to block until a cold model is loaded instead of returning 503.
    pub wait_for_model: bool,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api-inference.huggingface.co".to_string(),
            hub_url: "https://huggingface.co".to_string(),
            token: None,
            timeout: Duration::from_secs(120),
            wait_for_model: true,
        }
    }
}

impl HuggingFaceConfig {
    pub const TOKEN_ENV: &'static str = "HF_TOKEN";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait_for_model(mut self, wait_for_model: bool) -> Self {
        self.wait_for_model = wait_for_model;
        self
    }

    /// Picks up `HF_TOKEN` if it is set and non-empty.
    pub fn with_token_from_env(self) -> Self {
        match std::env::var(Self::TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => self.with_token(token.trim()),
            _ => self,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_url("API URL", &self.api_url)?;
        validate_url("Hub URL", &self.hub_url)?;

        if let Some(token) = &self.token {
            if token.is_empty() {
                return Err("Token cannot be empty when provided".to_string());
            }
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
