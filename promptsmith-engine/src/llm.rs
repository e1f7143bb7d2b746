//! OpenAI-compatible chat completion client
//!
//! Transport timeouts, connection failures, 408, 429 and 5xx responses are
//! reported as transient generation errors so the retry policy applies to
//! them; any other failure is permanent.

use crate::config::LlmConfig;
use async_trait::async_trait;
use promptsmith_core::generation::{ChatRole, GenerationRequest, TextGenerator};
use promptsmith_core::{Error as CoreError, Result as CoreResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Text generator backed by a `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTextGenerator {
    pub fn new(config: &LlmConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| crate::Error::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &request.system_prompt,
        });
        for message in &request.messages {
            messages.push(WireMessage {
                role: match message.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: &message.content,
            });
        }

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> CoreResult<String> {
        debug!(
            "POST {} (model {}, {} message(s))",
            self.endpoint,
            self.model,
            request.messages.len() + 1
        );

        let mut call = self.client.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            CoreError::permanent(format!("Failed to parse chat completion response: {}", err))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CoreError::permanent("Chat completion returned no content"))
    }

    fn name(&self) -> &str {
        "http-text-generator"
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Timeouts and failed connections are transient, everything else is permanent
fn map_send_error(err: reqwest::Error) -> CoreError {
    let message = format!("Chat completion request failed: {}", err);
    if err.is_timeout() || err.is_connect() {
        CoreError::transient(message)
    } else {
        CoreError::permanent(message)
    }
}

fn map_http_error(status: StatusCode, body: &str) -> CoreError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    let message = format!("Chat completion failed with {}: {}", status.as_u16(), detail);

    if is_transient(status) {
        CoreError::transient(message)
    } else {
        CoreError::permanent(message)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsmith_core::generation::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer, api_key: Option<&str>) -> HttpTextGenerator {
        HttpTextGenerator::new(&LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            api_key: api_key.map(str::to_string),
            model: "test-model".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a Team Lead.".to_string(),
            messages: vec![ChatMessage::user("Review the design")],
            temperature: 0.4,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("secret"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "max_tokens": 256,
                "messages": [
                    {"role": "system", "content": "You are a Team Lead."},
                    {"role": "user", "content": "Review the design"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Approved."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = generator(&server, Some("secret"))
            .generate(&request())
            .await
            .unwrap();
        assert_eq!(text, "Approved.");
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached"}
            })))
            .mount(&server)
            .await;

        let err = generator(&server, None)
            .generate(&request())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = generator(&server, None)
            .generate(&request())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_unauthorized_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = generator(&server, Some("wrong"))
            .generate(&request())
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let err = generator(&server, None)
            .generate(&request())
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_send_errors_are_classified() {
        let malformed = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        assert!(!map_send_error(malformed).is_recoverable());

        let refused = reqwest::Client::new()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        assert!(refused.is_connect());
        assert!(map_send_error(refused).is_recoverable());
    }

    #[test]
    fn test_endpoint_normalization() {
        let generator = HttpTextGenerator::new(&LlmConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();
        assert_eq!(generator.endpoint(), "http://localhost:8000/v1/chat/completions");
    }
}
