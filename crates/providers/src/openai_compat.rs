//! OpenAI-compatible provider implementation.
//!
//! Works with OpenRouter (the default), OpenAI, Ollama, vLLM and any other
//! endpoint exposing `/chat/completions` and `/embeddings`.
//!
//! Supports:
//! - Chat completions with tool use / function calling
//! - Embeddings
//! - Health checks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use supportdesk_config::AppConfig;
use supportdesk_core::error::ProviderError;
use supportdesk_core::message::{Role, Turn};
use supportdesk_core::provider::*;
use supportdesk_core::tool::ToolCall;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(120))
    }

    /// Create a provider whose HTTP client gives up after `timeout`.
    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Build the provider described by the application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "No API key. Set API_KEY (or OPENROUTER_API_KEY / OPENAI_API_KEY)".into(),
            )
        })?;
        let name = if config.provider.api_url.contains("openrouter.ai") {
            "openrouter"
        } else {
            "openai-compatible"
        };
        Ok(Self::with_timeout(
            name,
            config.provider.api_url.clone(),
            api_key,
            Duration::from_secs(config.provider.timeout_secs),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert the request into OpenAI chat messages: the system message
    /// (prompt + retrieved context) followed by the conversation history.
    fn to_api_messages(request: &ModelRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        messages.push(ApiMessage {
            role: "system".into(),
            content: Some(request.system_message()),
            tool_calls: None,
            tool_call_id: None,
        });
        messages.extend(request.history.iter().map(Self::to_api_message));
        messages
    }

    fn to_api_message(turn: &Turn) -> ApiMessage {
        match turn.role {
            Role::User => ApiMessage {
                role: "user".into(),
                content: Some(turn.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant => ApiMessage {
                role: "assistant".into(),
                content: Some(turn.content.clone()),
                tool_calls: turn.tool_call.as_ref().map(|call| {
                    vec![ApiToolCall {
                        id: call.call_id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: call.tool_name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    }]
                }),
                tool_call_id: None,
            },
            Role::Tool => ApiMessage {
                role: "tool".into(),
                content: Some(turn.content.clone()),
                tool_calls: None,
                tool_call_id: turn.call_id().map(String::from),
            },
        }
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(request: &ModelRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    /// Turn the decoded API response into a tagged reply.
    fn parse_response(&self, api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = parse_arguments(&tc.function.name, &tc.function.arguments)?;
                Ok(ToolCall::new(tc.id, tc.function.name, arguments))
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        let (reply, dropped) = ModelReply::from_parts(choice.message.content, calls);
        if dropped > 0 {
            warn!(
                provider = %self.name,
                dropped,
                "Model requested several tools at once; only the first is honoured"
            );
        }

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            reply,
            usage,
            model: api_response.model,
        })
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

/// Decode a tool call's argument string. Empty means no arguments.
fn parse_arguments(tool: &str, raw: &str) -> Result<serde_json::Value, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| {
        ProviderError::MalformedResponse(format!("arguments for '{tool}' are not valid JSON: {e}"))
    })
}

#[async_trait]
impl supportdesk_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            turns = request.history.len(),
            retrieved = request.retrieved.len(),
            "Sending completion request"
        );

        let response = self.post(&url, &body).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        self.parse_response(api_response)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post(&url, &body).await?;

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        if api_resp.data.len() != request.inputs.len() {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                request.inputs.len(),
                api_resp.data.len()
            )));
        }

        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);
        let embeddings = data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}
