use crate::config::OllamaConfig;
use crate::provider::{
    error_for_status, map_transport_error, ModelError, ModelProvider, ModelResult,
};
use crate::types::{
    FinishReason, GenerationRequest, GenerationResponse, ModelInfo, Usage,
};
use async_trait::async_trait;
use ollama_rs::Ollama;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    raw: bool,
    options: OllamaGenerateOptions,
}

#[derive(Serialize)]
struct OllamaGenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

pub struct OllamaProvider {
    client: Ollama,
    http_client: reqwest::Client,
    base_url: String,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> ModelResult<Self> {
        config
            .validate()
            .map_err(|msg| ModelError::InvalidConfig { message: msg })?;

        let host = config
            .base_url
            .strip_suffix("/v1")
            .unwrap_or(&config.base_url)
            .trim_end_matches('/')
            .to_string();

        let base_url = format!("{}/", host);

        let parsed = reqwest::Url::parse(&host).map_err(|e| ModelError::InvalidConfig {
            message: format!("Invalid Ollama URL '{}': {}", host, e),
        })?;
        let port = parsed.port_or_known_default().unwrap_or(11434);
        let scheme_host = format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or("localhost")
        );
        let client = Ollama::new(scheme_host, port);

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            http_client,
            base_url,
            config,
        })
    }

    fn build_request_body(&self, request: &GenerationRequest) -> OllamaGenerateRequest {
        // Ollama has no do_sample switch; greedy decoding is temperature 0.
        let temperature = if request.options.do_sample {
            request.options.temperature
        } else {
            0.0
        };

        OllamaGenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream: false,
            raw: self.config.raw_prompt,
            options: OllamaGenerateOptions {
                temperature,
                num_predict: request.options.max_new_tokens,
            },
        }
    }

    fn parse_response(response: OllamaGenerateResponse) -> GenerationResponse {
        let prompt_tokens = response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = response.eval_count.unwrap_or(0);

        GenerationResponse {
            generated_text: response.response,
            finish_reason: Some(
                response
                    .done_reason
                    .as_deref()
                    .map(FinishReason::from_api)
                    .unwrap_or(FinishReason::Stop),
            ),
            usage: Some(Usage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
                total_tokens: (prompt_tokens + completion_tokens) as u32,
            }),
        }
    }

    fn handle_ollama_error(err: ollama_rs::error::OllamaError) -> ModelError {
        match err {
            // ollama-rs carries its own reqwest major version.
            ollama_rs::error::OllamaError::ReqwestError(e) => {
                if e.is_timeout() {
                    ModelError::ServiceUnavailable {
                        message: "Request timeout".to_string(),
                    }
                } else if e.is_connect() {
                    ModelError::ServiceUnavailable {
                        message: "Cannot connect to Ollama service".to_string(),
                    }
                } else {
                    ModelError::Unknown {
                        message: format!("Network error: {}", e),
                    }
                }
            }
            ollama_rs::error::OllamaError::JsonError(e) => ModelError::Serialization(e),
            _ => ModelError::Unknown {
                message: format!("Ollama error: {}", err),
            },
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn generate(&self, request: GenerationRequest) -> ModelResult<GenerationResponse> {
        debug!("Starting generation with model: {}", request.model);

        let body = self.build_request_body(&request);
        let url = format!("{}api/generate", self.base_url);

        let http_response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("Ollama", e))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response.text().await.unwrap_or_default();
            return Err(error_for_status("Ollama", &request.model, status, error_text));
        }

        let api_response: OllamaGenerateResponse =
            http_response.json().await.map_err(ModelError::Network)?;

        let response = Self::parse_response(api_response);
        if response.generated_text.trim().is_empty() {
            return Err(ModelError::EmptyGeneration {
                provider: "ollama".to_string(),
            });
        }

        info!(
            "Generation completed ({} chars)",
            response.generated_text.len()
        );

        Ok(response)
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        debug!("Listing available models");

        let models = self
            .client
            .list_local_models()
            .await
            .map_err(Self::handle_ollama_error)?;

        let model_infos: Vec<ModelInfo> = models
            .into_iter()
            .map(|model| ModelInfo {
                name: model.name,
                size: Some(model.size),
                digest: None,
                modified_at: Some(model.modified_at),
            })
            .collect();

        info!("Retrieved {} models", model_infos.len());
        Ok(model_infos)
    }

    async fn health_check(&self) -> ModelResult<()> {
        debug!("Performing health check");

        match self.list_models().await {
            Ok(_) => {
                info!("Health check passed");
                Ok(())
            }
            Err(e) => {
                error!("Health check failed: {}", e);
                Err(e)
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationOptions;

    fn provider_for(url: &str) -> OllamaProvider {
        OllamaProvider::new(OllamaConfig::default().with_base_url(url)).unwrap()
    }

    #[test]
    fn test_build_request_body() {
        let provider = provider_for("http://localhost:11434");
        let request = GenerationRequest::new("qwen2.5-coder:1.5b", "def add(a, b):");
        let body = provider.build_request_body(&request);

        assert_eq!(body.model, "qwen2.5-coder:1.5b");
        assert!(!body.stream);
        assert!(body.raw);
        assert_eq!(body.options.temperature, 0.3);
        assert_eq!(body.options.num_predict, 700);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["prompt"], "def add(a, b):");
        assert_eq!(json["options"]["num_predict"], 700);
    }

    #[test]
    fn test_greedy_decoding_forces_zero_temperature() {
        let provider = provider_for("http://localhost:11434");
        let options = GenerationOptions {
            do_sample: false,
            ..Default::default()
        };
        let request = GenerationRequest::new("m", "p").with_options(options);
        assert_eq!(provider.build_request_body(&request).options.temperature, 0.0);
    }

    #[test]
    fn test_parse_response() {
        let api = OllamaGenerateResponse {
            response: "import unittest".to_string(),
            done: true,
            done_reason: Some("length".to_string()),
            prompt_eval_count: Some(12),
            eval_count: Some(30),
        };
        let parsed = OllamaProvider::parse_response(api);
        assert_eq!(parsed.generated_text, "import unittest");
        assert_eq!(parsed.finish_reason, Some(FinishReason::Length));
        assert_eq!(parsed.usage.unwrap().total_tokens, 42);
    }

    #[tokio::test]
    async fn test_provider_creation() {
        let config = OllamaConfig::default();
        let provider = OllamaProvider::new(config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "ollama");
    }

    #[test]
    fn test_provider_creation_url_normalization() {
        let provider = provider_for("http://localhost:11434/v1");
        assert_eq!(provider.base_url, "http://localhost:11434/");

        let provider = provider_for("http://localhost:11434/");
        assert_eq!(provider.base_url, "http://localhost:11434/");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = OllamaProvider::new(OllamaConfig::default().with_base_url("localhost"));
        assert!(matches!(result, Err(ModelError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_service_unavailable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let provider = provider_for(&format!("http://127.0.0.1:{}", port));

        let err = provider.list_models().await.unwrap_err();
        assert!(
            matches!(err, ModelError::ServiceUnavailable { .. }),
            "unexpected error: {err:?}"
        );
        assert!(provider.health_check().await.is_err());

        let err = provider
            .generate(GenerationRequest::new("test-model", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::ServiceUnavailable { .. }));
    }

    #[test]
    fn test_handle_ollama_error_json_error() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let ollama_err = ollama_rs::error::OllamaError::JsonError(json_err);
        let result = OllamaProvider::handle_ollama_error(ollama_err);
        assert!(matches!(result, ModelError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_generate_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":"import unittest\n","done":true,"done_reason":"stop"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let response = provider
            .generate(GenerationRequest::new("test-model", "hi"))
            .await
            .unwrap();
        assert_eq!(response.generated_text, "import unittest\n");
    }

    #[tokio::test]
    async fn test_generate_returns_error_on_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let result = provider
            .generate(GenerationRequest::new("test-model", "hi"))
            .await;
        assert!(matches!(result, Err(ModelError::Unknown { .. })));
    }

    #[tokio::test]
    async fn test_generate_returns_error_on_missing_model() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body(r#"{"error":"model not found"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let result = provider
            .generate(GenerationRequest::new("missing", "hi"))
            .await;
        assert!(matches!(result, Err(ModelError::ModelNotFound { .. })));
    }

    #[tokio::test]
    async fn test_generate_returns_error_on_invalid_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("not valid json")
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let result = provider
            .generate(GenerationRequest::new("test-model", "hi"))
            .await;
        assert!(matches!(result, Err(ModelError::Network(_))));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_completion() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response":"   ","done":true}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let result = provider
            .generate(GenerationRequest::new("test-model", "hi"))
            .await;
        assert!(matches!(result, Err(ModelError::EmptyGeneration { .. })));
    }
}
