//! Bounded retry loop around the generation capability.
//!
//! Each attempt prompts the model, sanitizes the reply and parses it. The
//! first reply that parses is returned; provider failures and unparsable
//! replies are both retryable. Only running out of attempts is an error.

use crate::prompt::TestPrompt;
use crate::sanitize::clean_code;
use crate::syntax::{check_syntax, SyntaxIssue};
use model::{GenerationOptions, GenerationRequest, ModelProvider, DEFAULT_HF_MODEL};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub max_retries: u32,
    pub options: GenerationOptions,
    /// Base delay between attempts; 0 retries immediately.
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Jitter factor for randomizing retry delays (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_HF_MODEL.to_string(),
            max_retries: 3,
            options: GenerationOptions::default(),
            retry_base_delay_ms: 0,
            retry_max_delay_ms: 5000,
            jitter_factor: 0.1,
        }
    }
}

impl GenerationConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, base_delay_ms: u64) -> Self {
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if self.max_retries == 0 {
            return Err("Max retries must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("Jitter factor must be between 0.0 and 1.0".to_string());
        }
        self.options.validate()
    }

    /// Exponential backoff with jitter; zero when no base delay is set.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if self.retry_base_delay_ms == 0 {
            return Duration::ZERO;
        }

        let base_delay = Duration::from_millis(self.retry_base_delay_ms);
        let exponential_delay = base_delay.saturating_mul(2_u32.saturating_pow(attempt));
        let delay = exponential_delay.min(Duration::from_millis(self.retry_max_delay_ms));

        if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.0..=self.jitter_factor);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay + Duration::from_millis(jitter_ms)
        } else {
            delay
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    InvalidSyntax { issue: SyntaxIssue },
    ProviderError { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationAttempt {
    /// 1-based.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Failed to generate valid code after {attempts} attempt(s)")]
    RetriesExhausted {
        attempts: u32,
        history: Vec<GenerationAttempt>,
    },

    #[error("Invalid generation configuration: {message}")]
    InvalidConfig { message: String },
}

/// Sanitized, parse-checked test code.
#[derive(Debug, Clone)]
pub struct GeneratedTests {
    pub code: String,
    pub raw: String,
    pub history: Vec<GenerationAttempt>,
}

impl GeneratedTests {
    pub fn attempts(&self) -> u32 {
        self.history.len() as u32
    }
}

pub struct TestGenerator {
    provider: Box<dyn ModelProvider>,
    config: GenerationConfig,
}

impl TestGenerator {
    pub fn new(
        provider: Box<dyn ModelProvider>,
        config: GenerationConfig,
    ) -> Result<Self, GenerationError> {
        config
            .validate()
            .map_err(|message| GenerationError::InvalidConfig { message })?;
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn ModelProvider {
        self.provider.as_ref()
    }

    pub async fn generate_tests(&self, code: &str) -> Result<GeneratedTests, GenerationError> {
        let prompt = TestPrompt::build(code);
        let max_retries = self.config.max_retries;
        let mut history = Vec::with_capacity(max_retries as usize);

        for attempt in 1..=max_retries {
            if attempt > 1 {
                let delay = self.config.retry_delay(attempt - 2);
                if !delay.is_zero() {
                    debug!("Waiting {:?} before attempt {}", delay, attempt);
                    tokio::time::sleep(delay).await;
                }
            }

            let request = GenerationRequest::new(&self.config.model, &prompt)
                .with_options(self.config.options.clone());

            debug!(
                "Generation attempt {}/{} via {}",
                attempt,
                max_retries,
                self.provider.provider_name()
            );

            let raw = match self.provider.generate(request).await {
                Ok(response) => response.generated_text,
                Err(e) => {
                    warn!("Generation error: {}", e);
                    history.push(GenerationAttempt {
                        attempt,
                        outcome: AttemptOutcome::ProviderError {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let test_code = clean_code(&raw, &prompt);
            match check_syntax(&test_code) {
                Ok(()) => {
                    history.push(GenerationAttempt {
                        attempt,
                        outcome: AttemptOutcome::Accepted,
                    });
                    info!("Accepted generated tests on attempt {}", attempt);
                    return Ok(GeneratedTests {
                        code: test_code,
                        raw,
                        history,
                    });
                }
                Err(issue) => {
                    warn!("Syntax validation failed: {}", issue);
                    warn!("Retry {}/{}...", attempt, max_retries);
                    history.push(GenerationAttempt {
                        attempt,
                        outcome: AttemptOutcome::InvalidSyntax { issue },
                    });
                }
            }
        }

        Err(GenerationError::RetriesExhausted {
            attempts: max_retries,
            history,
        })
    }
}
