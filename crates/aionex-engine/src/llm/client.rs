//! OpenRouter chat-completions client
//!
//! Every request asks for strict `json_schema` structured output and returns
//! the raw message text; validating it against the schema is the caller's job.

use aionex_core::error::{Error, Result};
use aionex_core::protocol::{AiClient, AiFuture, AiProvider, CompletionRequest};
use aionex_core::util::{sanitize_error_body, truncate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenRouter direct API URL
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;

/// OpenRouter model id used for each provider choice.
pub fn model_id(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::Gemini => "google/gemini-2.5-flash",
        AiProvider::OpenAi => "openai/gpt-4o-mini",
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    stream: bool,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response format configuration for OpenRouter
#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
    json_schema: JsonSchemaWrapper<'a>,
}

/// Wrapper for JSON Schema in structured output mode
#[derive(Serialize)]
struct JsonSchemaWrapper<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Null when the provider refuses or fails upstream
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter sometimes reports upstream failures with a 200 status.
#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterErrorBody,
}

#[derive(Deserialize)]
struct OpenRouterErrorBody {
    message: String,
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    url: String,
    user: Option<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            url: OPENROUTER_URL.to_string(),
            user: None,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Anonymous id forwarded as OpenRouter's `user` field.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    async fn send(&self, request: CompletionRequest) -> Result<String> {
        let model = model_id(request.provider);
        let body = ChatRequest {
            model,
            messages: vec![Message {
                role: "system",
                content: &request.system_prompt,
            }],
            temperature: request.temperature,
            user: self.user.as_deref(),
            stream: false,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaWrapper {
                    name: request.schema.name,
                    strict: true,
                    schema: &request.schema.schema,
                },
            },
        };

        tracing::debug!(
            "OpenRouter request: model={} schema={} temperature={}",
            model,
            request.schema.name,
            request.temperature
        );
        let response = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Title", "aionex")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => Error::PermissionDenied(
                    "Invalid OpenRouter API key. Run 'aionex --setup' to update it.".to_string(),
                ),
                _ => Error::Network(format!(
                    "OpenRouter error ({}): {}",
                    status,
                    sanitize_error_body(&text)
                )),
            });
        }
        extract_content(&text)
    }
}

impl AiClient for OpenRouterClient {
    fn complete<'a>(&'a self, request: CompletionRequest) -> AiFuture<'a, String> {
        Box::pin(self.send(request))
    }
}

fn network_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Network(format!(
            "OpenRouter did not respond within {}s",
            REQUEST_TIMEOUT_SECS
        ))
    } else {
        Error::Network(format!("Request to OpenRouter failed: {}", err))
    }
}

/// Pull the message text out of a successful chat-completions body.
fn extract_content(body: &str) -> Result<String> {
    if let Ok(err) = serde_json::from_str::<OpenRouterError>(body) {
        return Err(Error::Network(format!(
            "OpenRouter error: {}",
            sanitize_error_body(&err.error.message)
        )));
    }
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        Error::Schema(format!(
            "unreadable OpenRouter response ({}): {}",
            e,
            sanitize_error_body(body)
        ))
    })?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| Error::Schema("OpenRouter returned no choices".to_string()))?;

    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(Error::Schema(format!(
            "request was refused: {}",
            truncate(&refusal, 200)
        )));
    }
    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(Error::Schema("the model returned an empty response".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aionex_core::protocol::ResponseSchema;
    use mockito::Matcher;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest {
            provider: AiProvider::OpenAi,
            system_prompt: "SYSTEM".to_string(),
            schema: ResponseSchema::ai_response(),
            temperature: 0.2,
        }
    }

    fn client(server: &mockito::Server) -> OpenRouterClient {
        OpenRouterClient::new("sk-or-test")
            .unwrap()
            .with_url(format!("{}/chat/completions", server.url()))
    }

    #[tokio::test]
    async fn test_sends_strict_schema_and_returns_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-or-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "openai/gpt-4o-mini",
                "messages": [{"role": "system", "content": "SYSTEM"}],
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {"name": "ai_response", "strict": true}
                }
            })))
            .with_body(
                json!({"choices": [{"message": {"content": "{\"previewContent\":\"p\",\"codeContent\":\"c\"}"}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let text = client(&server).complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, r#"{"previewContent":"p","codeContent":"c"}"#);
    }

    #[tokio::test]
    async fn test_status_codes_map_to_taxonomy() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"No auth credentials found"}}"#)
            .create_async()
            .await;
        let err = client(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;
        let err = client(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::Network(msg) if msg.contains("503")));
    }

    #[test]
    fn test_refusal_and_empty_content_are_schema_errors() {
        let refused = r#"{"choices":[{"message":{"content":null,"refusal":"policy"}}]}"#;
        assert!(matches!(extract_content(refused), Err(Error::Schema(msg)) if msg.contains("refused")));

        let empty = r#"{"choices":[{"message":{"content":"  "}}]}"#;
        assert!(matches!(extract_content(empty), Err(Error::Schema(_))));

        let none = r#"{"choices":[]}"#;
        assert!(matches!(extract_content(none), Err(Error::Schema(_))));
    }

    #[test]
    fn test_error_with_success_status_is_network_error() {
        let body = r#"{"error":{"message":"Provider returned error","code":502}}"#;
        assert!(matches!(extract_content(body), Err(Error::Network(_))));
    }

    #[test]
    fn test_model_ids() {
        assert_eq!(model_id(AiProvider::Gemini), "google/gemini-2.5-flash");
        assert_eq!(model_id(AiProvider::OpenAi), "openai/gpt-4o-mini");
    }
}
