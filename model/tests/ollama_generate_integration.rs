use model::{
    FinishReason, GenerationOptions, GenerationRequest, GenerationResponse, ModelProvider,
    OllamaConfig, OllamaProvider, DEFAULT_OLLAMA_MODEL,
};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(120);

fn make_provider() -> OllamaProvider {
    OllamaProvider::new(OllamaConfig::default().with_timeout(TIMEOUT)).expect("provider creation")
}

fn assert_valid_response(response: &GenerationResponse) {
    assert!(
        !response.generated_text.trim().is_empty(),
        "generated text must not be empty"
    );
    assert!(
        response.finish_reason.is_some(),
        "finish_reason must be present"
    );
}

#[tokio::test]
#[ignore]
async fn test_health_check() {
    let provider = make_provider();

    let result = tokio::time::timeout(TIMEOUT, provider.health_check()).await;
    let health = result.expect("health_check timed out");
    health.expect("health_check failed");

    let models = tokio::time::timeout(TIMEOUT, provider.list_models())
        .await
        .expect("list_models timed out")
        .expect("list_models failed");

    assert!(
        models.iter().any(|m| m.name == DEFAULT_OLLAMA_MODEL),
        "{} must be pulled, found: {:?}",
        DEFAULT_OLLAMA_MODEL,
        models.iter().map(|m| &m.name).collect::<Vec<_>>()
    );
}

#[tokio::test]
#[ignore]
async fn test_basic_generation() {
    let provider = make_provider();
    let request = GenerationRequest::new(DEFAULT_OLLAMA_MODEL, "def add(a, b):\n    return");

    let response = tokio::time::timeout(TIMEOUT, provider.generate(request))
        .await
        .expect("generate timed out")
        .expect("generate failed");

    assert_valid_response(&response);

    let usage = response.usage.as_ref().expect("usage must exist");
    assert!(usage.completion_tokens > 0, "completion_tokens must be > 0");
    assert_eq!(
        usage.total_tokens,
        usage.prompt_tokens + usage.completion_tokens,
        "total_tokens must equal prompt_tokens + completion_tokens"
    );
}

#[tokio::test]
#[ignore]
async fn test_generation_respects_token_budget() {
    let provider = make_provider();
    let request = GenerationRequest::new(
        DEFAULT_OLLAMA_MODEL,
        "Write a very long Python module with many functions:\n",
    )
    .with_options(GenerationOptions::default().with_max_new_tokens(8));

    let response = tokio::time::timeout(TIMEOUT, provider.generate(request))
        .await
        .expect("generate timed out")
        .expect("generate failed");

    assert_valid_response(&response);
    assert_eq!(response.finish_reason, Some(FinishReason::Length));
}

#[tokio::test]
#[ignore]
async fn test_invalid_model_returns_error() {
    let provider = make_provider();
    let request = GenerationRequest::new("nonexistent-model-xyz", "Hello");

    let result = tokio::time::timeout(TIMEOUT, provider.generate(request))
        .await
        .expect("generate timed out");

    assert!(result.is_err(), "expected error for nonexistent model");
}
