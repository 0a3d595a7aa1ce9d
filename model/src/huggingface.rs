use crate::config::HuggingFaceConfig;
use crate::provider::{
    error_for_status, map_transport_error, ModelError, ModelProvider, ModelResult,
};
use crate::types::{FinishReason, GenerationRequest, GenerationResponse, ModelInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Text-generation request for the Hugging Face Inference API.
#[derive(Debug, Serialize)]
struct HfGenerateRequest {
    inputs: String,
    parameters: HfParameters,
    options: HfOptions,
}

#[derive(Debug, Serialize)]
struct HfParameters {
    temperature: f32,
    do_sample: bool,
    max_new_tokens: u32,
    truncation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pad_token_id: Option<u32>,
    /// The pipeline echoes the prompt; the sanitizer strips it again.
    return_full_text: bool,
}

#[derive(Debug, Serialize)]
struct HfOptions {
    wait_for_model: bool,
    use_cache: bool,
}

#[derive(Debug, Deserialize)]
struct HfGeneration {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct HfHubModel {
    id: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default, rename = "lastModified")]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HfWhoAmI {
    name: String,
}

pub struct HuggingFaceProvider {
    client: reqwest::Client,
    config: HuggingFaceConfig,
}

impl HuggingFaceProvider {
    pub fn new(config: HuggingFaceConfig) -> ModelResult<Self> {
        config
            .validate()
            .map_err(|msg| ModelError::InvalidConfig { message: msg })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn is_authenticated(&self) -> bool {
        self.config.token.is_some()
    }

    fn build_request_body(&self, request: &GenerationRequest) -> HfGenerateRequest {
        let options = &request.options;
        HfGenerateRequest {
            inputs: request.prompt.clone(),
            parameters: HfParameters {
                temperature: options.temperature,
                do_sample: options.do_sample,
                max_new_tokens: options.max_new_tokens,
                truncation: options.truncation,
                pad_token_id: options.pad_token_id,
                return_full_text: true,
            },
            options: HfOptions {
                wait_for_model: self.config.wait_for_model,
                use_cache: false,
            },
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn model_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}",
            self.config.api_url.trim_end_matches('/'),
            model
        )
    }

    fn hub_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.hub_url.trim_end_matches('/'), path)
    }

    fn parse_generations(
        request: &GenerationRequest,
        generations: Vec<HfGeneration>,
    ) -> ModelResult<GenerationResponse> {
        let first = generations
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::EmptyGeneration {
                provider: "huggingface".to_string(),
            })?;

        if first.generated_text.trim().is_empty() {
            return Err(ModelError::EmptyGeneration {
                provider: "huggingface".to_string(),
            });
        }

        debug!(
            "Generation for {} returned {} chars",
            request.model,
            first.generated_text.len()
        );

        Ok(GenerationResponse {
            generated_text: first.generated_text,
            finish_reason: Some(FinishReason::Stop),
            usage: None,
        })
    }
}

#[async_trait]
impl ModelProvider for HuggingFaceProvider {
    async fn generate(&self, request: GenerationRequest) -> ModelResult<GenerationResponse> {
        debug!("Starting generation with model: {}", request.model);

        if !self.is_authenticated() {
            warn!("No {} set; using anonymous access", HuggingFaceConfig::TOKEN_ENV);
        }

        let body = self.build_request_body(&request);
        let response = self
            .authorized(self.client.post(self.model_url(&request.model)))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("Hugging Face", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_for_status(
                "Hugging Face",
                &request.model,
                status,
                error_text,
            ));
        }

        let text = response.text().await.map_err(ModelError::Network)?;
        let generations: Vec<HfGeneration> = serde_json::from_str(&text)?;
        let result = Self::parse_generations(&request, generations)?;

        info!("Generation request completed successfully");
        Ok(result)
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        debug!("Listing text-generation models on the hub");

        let response = self
            .authorized(self.client.get(self.hub_url("models")))
            .query(&[
                ("pipeline_tag", "text-generation"),
                ("sort", "downloads"),
                ("direction", "-1"),
                ("limit", "20"),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error("Hugging Face", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_for_status("Hugging Face", "", status, error_text));
        }

        let models: Vec<HfHubModel> = response.json().await.map_err(ModelError::Network)?;
        let model_infos: Vec<ModelInfo> = models
            .into_iter()
            .map(|model| ModelInfo {
                name: model.id,
                size: None,
                digest: model.sha,
                modified_at: model.last_modified,
            })
            .collect();

        info!("Retrieved {} models", model_infos.len());
        Ok(model_infos)
    }

    async fn health_check(&self) -> ModelResult<()> {
        debug!("Checking hub authentication");

        if !self.is_authenticated() {
            error!("Health check failed: {} is not set", HuggingFaceConfig::TOKEN_ENV);
            return Err(ModelError::Authentication);
        }

        let response = self
            .authorized(self.client.get(self.hub_url("whoami-v2")))
            .send()
            .await
            .map_err(|e| map_transport_error("Hugging Face", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Health check failed with status: {}", status);
            return Err(error_for_status("Hugging Face", "", status, error_text));
        }

        let who: HfWhoAmI = response.json().await.map_err(ModelError::Network)?;
        info!("Health check passed, authenticated as {}", who.name);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "huggingface"
    }
}
