use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model inside an assistant turn.
///
/// Mirrors Anthropic's `tool_use` content blocks and OpenAI's `tool_calls`
/// closely enough that both wire adapters can losslessly round-trip through
/// it; `id` is the value that a later `Message::tool_result` echoes back via
/// `tool_call_id` so callers can match results to calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,

    /// Tool calls requested by the model, present only on `Assistant`
    /// messages that invoke tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<Vec<ToolUseBlock>>,

    /// The `ToolUseBlock::id` this message's content answers, present only
    /// on `Tool` role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Whether the tool call succeeded, present only on `Tool` role messages.
    /// Wire adapters use this to mark the fed-back result as an error (e.g.
    /// Anthropic's `tool_result.is_error`) without re-deriving it from text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_ok: Option<bool>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_use: None,
            tool_call_id: None,
            tool_ok: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_use: None,
            tool_call_id: None,
            tool_ok: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_use: None,
            tool_call_id: None,
            tool_ok: None,
        }
    }

    /// An assistant turn that requests one or more tool invocations.
    pub fn assistant_with_tool_use(content: impl Into<String>, tool_use: Vec<ToolUseBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_use: Some(tool_use),
            tool_call_id: None,
            tool_ok: None,
        }
    }

    /// The result of executing a tool, linked back to its `ToolUseBlock::id`.
    /// Defaults `tool_ok` to `true`; use [`Message::tool_result_with_status`]
    /// when the caller knows the call failed.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::tool_result_with_status(tool_call_id, content, true)
    }

    /// The result of executing a tool, recording whether it succeeded so wire
    /// adapters can surface that to the model (e.g. Anthropic's
    /// `tool_result.is_error`).
    pub fn tool_result_with_status(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        ok: bool,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_use: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_ok: Some(ok),
        }
    }
}

/// A provider-native tool schema, as handed to a completion call so the
/// model can emit `ToolUseBlock`s against it. Shaped after the JSON-Schema
/// `parameters` object every [`crate::tools::Tool`] already exposes, so
/// building one is just `ToolSchema::from(tool.info())`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request for LLM completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "openai/gpt-4", "anthropic/claude-sonnet-4.5")
    pub model: String,

    /// The messages in the conversation
    pub messages: Vec<Message>,

    /// Temperature for sampling (0.0 to 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top-p sampling parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Tool schemas the model may invoke, intersected down to the caller's
    /// active [`crate::tools::ToolProfile`] before being attached here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: None,
            tools: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        if tools.is_empty() {
            self.tools = None;
        } else {
            self.tools = Some(tools);
        }
        self
    }
}

/// Response from LLM completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated content
    pub content: String,

    /// Tool invocations requested by the model, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<Vec<ToolUseBlock>>,

    /// The model that generated the response
    pub model: String,

    /// Token usage information
    pub usage: Option<TokenUsage>,

    /// Finish reason (e.g., "stop", "length", "content_filter")
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chunk of a streaming response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The delta content for this chunk
    pub delta: String,

    /// Whether this is the final chunk
    pub is_final: bool,

    /// Finish reason if this is the final chunk
    pub finish_reason: Option<String>,
}
