//! Native Anthropic Messages API provider.
//!
//! Unlike [`super::openai_compatible`], which speaks the OpenAI chat-completions
//! shape that most gateways normalize to, this provider targets Anthropic's
//! own wire contract directly: `POST /v1/messages` with a top-level `system`
//! string (not a message), content *blocks* (`text`, `tool_use`) instead of a
//! flat `content: String`, and tool results fed back as a `user` message
//! containing a `tool_result` block keyed by `tool_use_id` — not a `role:
//! "tool"` message. The wire contract is byte-faithful; this module is the
//! half of that contract OpenAI-compatible passthrough can't express.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ai::provider::{LLMProvider, Result, StreamResponse};
use crate::ai::types::{
    CompletionRequest, CompletionResponse, Message as AppMessage, MessageRole, ToolSchema,
    ToolUseBlock, TokenUsage,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            default_model: "claude-sonnet-4.5".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

/// One entry of a Messages API `content` array. Request-side we only ever
/// emit `text` (user turns) and `tool_result` (fed-back tool output);
/// response-side Anthropic may send `text` or `tool_use`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct ApiToolSchema {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl From<&ToolSchema> for ApiToolSchema {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            name: schema.name.clone(),
            description: schema.description.clone(),
            input_schema: schema.parameters.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiToolSchema>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Translates the crate's provider-agnostic [`AppMessage`] sequence into
/// Anthropic's shape: a lifted `system` string plus a `messages` array whose
/// `tool` role folds into a `user` turn carrying a `tool_result` block.
fn split_system_and_messages(messages: &[AppMessage]) -> (Option<String>, Vec<ApiMessage>) {
    let mut system = None;
    let mut out: Vec<ApiMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => {
                system = Some(match system {
                    Some(existing) => format!("{existing}\n\n{}", msg.content),
                    None => msg.content.clone(),
                });
            }
            MessageRole::User => {
                out.push(ApiMessage {
                    role: "user".to_string(),
                    content: vec![ContentBlock::Text {
                        text: msg.content.clone(),
                    }],
                });
            }
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                if let Some(tool_use) = &msg.tool_use {
                    for block in tool_use {
                        blocks.push(ContentBlock::ToolUse {
                            id: block.id.clone(),
                            name: block.name.clone(),
                            input: block.arguments.clone(),
                        });
                    }
                }
                out.push(ApiMessage {
                    role: "assistant".to_string(),
                    content: blocks,
                });
            }
            MessageRole::Tool => {
                let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
                out.push(ApiMessage {
                    role: "user".to_string(),
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id,
                        content: msg.content.clone(),
                        is_error: msg.tool_ok.map(|ok| !ok),
                    }],
                });
            }
        }
    }

    (system, out)
}

/// Native client for Anthropic's Messages API (`POST /v1/messages`).
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| format!("failed to build Anthropic HTTP client: {e}"))?;
        Ok(Self { client, config })
    }

    fn build_request(&self, request: &CompletionRequest) -> MessagesRequest {
        let (system, messages) = split_system_and_messages(&request.messages);
        let tools = request
            .tools
            .as_ref()
            .map(|schemas| schemas.iter().map(ApiToolSchema::from).collect());

        MessagesRequest {
            model: request.model.clone(),
            system,
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            top_p: request.top_p,
            stream: None,
            tools,
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.build_request(&request);

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("content-type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("x-api-key", &self.config.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| format!("Anthropic request failed: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read Anthropic response body: {e}"))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(format!("Anthropic API error ({status}): {detail}"));
        }

        let api_response: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| format!("failed to parse Anthropic response: {e}"))?;

        let mut text = String::new();
        let mut tool_use = Vec::new();
        for block in api_response.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_use.push(ToolUseBlock {
                        id,
                        name,
                        arguments: input,
                    });
                }
                ContentBlock::ToolResult { .. } => {}
            }
        }

        Ok(CompletionResponse {
            content: text,
            tool_use: if tool_use.is_empty() {
                None
            } else {
                Some(tool_use)
            },
            model: api_response.model,
            usage: api_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
            finish_reason: api_response.stop_reason,
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<StreamResponse> {
        Err("Anthropic SSE streaming is not yet wired through this provider".to_string())
    }

    fn context_limit(&self) -> usize {
        200_000
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ai::types::ToolUseBlock as AppToolUseBlock;

    #[test]
    fn system_messages_are_lifted_out_of_the_array() {
        let messages = vec![
            AppMessage::system("be helpful"),
            AppMessage::user("hi"),
        ];
        let (system, out) = split_system_and_messages(&messages);
        assert_eq!(system, Some("be helpful".to_string()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, "user");
    }

    #[test]
    fn multiple_system_messages_are_joined() {
        let messages = vec![
            AppMessage::system("first"),
            AppMessage::system("second"),
        ];
        let (system, _) = split_system_and_messages(&messages);
        assert_eq!(system, Some("first\n\nsecond".to_string()));
    }

    #[test]
    fn tool_role_becomes_a_user_turn_with_tool_result_block() {
        let messages = vec![AppMessage::tool_result("call_1", "42")];
        let (_, out) = split_system_and_messages(&messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, "user");
        match &out[0].content[0] {
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "call_1");
                assert_eq!(content, "42");
                assert_eq!(*is_error, Some(false));
            }
            other => panic!("expected tool_result block, got {other:?}"),
        }
    }

    #[test]
    fn failed_tool_result_sets_is_error() {
        let messages = vec![AppMessage::tool_result_with_status("call_2", "denied: blocked path", false)];
        let (_, out) = split_system_and_messages(&messages);
        match &out[0].content[0] {
            ContentBlock::ToolResult { is_error, .. } => assert_eq!(*is_error, Some(true)),
            other => panic!("expected tool_result block, got {other:?}"),
        }
    }

    #[test]
    fn assistant_tool_use_round_trips_id() {
        let messages = vec![AppMessage::assistant_with_tool_use(
            "",
            vec![AppToolUseBlock {
                id: "call_9".to_string(),
                name: "shell".to_string(),
                arguments: serde_json::json!({"command": "ls"}),
            }],
        )];
        let (_, out) = split_system_and_messages(&messages);
        match &out[0].content[0] {
            ContentBlock::ToolUse { id, name, .. } => {
                assert_eq!(id, "call_9");
                assert_eq!(name, "shell");
            }
            other => panic!("expected tool_use block, got {other:?}"),
        }
    }

    #[test]
    fn build_request_lifts_system_and_defaults_max_tokens() {
        let config = AnthropicConfig::new("test-key");
        let provider = AnthropicProvider::new(config).unwrap();
        let request = CompletionRequest::new(
            "claude-sonnet-4.5",
            vec![AppMessage::system("sys"), AppMessage::user("hello")],
        );
        let api_request = provider.build_request(&request);
        assert_eq!(api_request.system, Some("sys".to_string()));
        assert_eq!(api_request.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(api_request.messages.len(), 1);
    }

    #[test]
    fn provider_reports_anthropic_identity() {
        let provider = AnthropicProvider::new(AnthropicConfig::new("k")).unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
        assert!(provider.supports_tools());
        assert_eq!(provider.context_limit(), 200_000);
    }
}
