//! Completion and moderation service clients
//!
//! Wire types for OpenAI-style chat completions with tool calling, the
//! service traits the completion engine depends on, and the production
//! client built on `async-openai`.

mod http_utils;
mod openai;

pub use http_utils::create_http_client;
pub use openai::OpenAiService;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the completion or moderation service
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// The call did not finish within the configured bound
    #[error("Timed out after {0}s")]
    Timeout(u64),
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// One part of a multimodal user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// Text content
        text: String,
    },
    /// Image reference (here always a base64 data URI)
    ImageUrl {
        /// Image location
        image_url: ImageUrl,
    },
}

/// Image location inside a [`ContentPart::ImageUrl`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// `data:image/jpeg;base64,...` or a plain URL
    pub url: String,
}

impl ContentPart {
    /// Create a text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image part from a URL or data URI
    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// A message in the chat transcript, tagged by role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Persona instructions
    System {
        /// Prompt text
        content: String,
    },
    /// User turn: text plus zero or more images
    User {
        /// Content parts in order
        content: Vec<ContentPart>,
    },
    /// Model turn, possibly requesting tool calls
    Assistant {
        /// Prose, absent when the model only requests tools
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Tool calls requested by the model
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one tool call
    Tool {
        /// ID of the call this result answers
        tool_call_id: String,
        /// Tool output
        content: String,
    },
}

impl ChatMessage {
    /// Create a system message
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::System {
            content: content.to_string(),
        }
    }

    /// Create a tool response message
    #[must_use]
    pub fn tool(tool_call_id: &str, content: &str) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.to_string(),
            content: content.to_string(),
        }
    }
}

/// Tool definition for LLM function calling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Name of the tool
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON schema for tool parameters
    pub parameters: serde_json::Value,
}

/// Tool as advertised on the wire: `{"type": "function", "function": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    /// Always `function`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Function definition
    pub function: ToolDefinition,
}

impl From<ToolDefinition> for ToolSpec {
    fn from(function: ToolDefinition) -> Self {
        Self {
            kind: "function",
            function,
        }
    }
}

/// Tool call from an LLM response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for the tool call
    pub id: String,
    /// Call type, always `function` today
    #[serde(rename = "type", default = "default_tool_call_kind")]
    pub kind: String,
    /// Function to be called
    pub function: ToolCallFunction,
}

fn default_tool_call_kind() -> String {
    "function".to_string()
}

/// Function details within a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Name of the function being called
    pub name: String,
    /// Arguments for the function call (JSON string)
    #[serde(default)]
    pub arguments: String,
}

/// Tool-selection mode sent with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolChoice {
    /// Model decides whether to call tools
    #[serde(rename = "auto")]
    Auto,
    /// Model must answer in prose
    #[serde(rename = "none")]
    Disabled,
}

/// Chat completion request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier
    pub model: String,
    /// Ordered transcript
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Frequency penalty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Presence penalty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Maximum completion tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Advertised tools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    /// Tool-selection mode, only meaningful with tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// Message part of a completion choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionMessage {
    /// Prose content
    #[serde(default)]
    pub content: Option<String>,
    /// Requested tool calls
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// One choice of a completion response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    /// Generated message
    #[serde(default)]
    pub message: CompletionMessage,
    /// Reason why the model stopped generating
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Chat completion response envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletion {
    /// Choices, usually exactly one
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

impl ChatCompletion {
    /// First choice, if any
    #[must_use]
    pub fn first(&self) -> Option<&CompletionChoice> {
        self.choices.first()
    }

    /// Whether the model stopped to request tool calls
    #[must_use]
    pub fn wants_tools(&self) -> bool {
        self.first()
            .and_then(|c| c.finish_reason.as_deref())
            .is_some_and(|reason| reason == "tool_calls")
    }

    /// Non-blank text of the first choice
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Interface to an OpenAI-style chat completion endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Send one completion request
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, LlmError>;
}

/// Interface to a content moderation classifier
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ModerationService: Send + Sync {
    /// Whether the classifier flags `input`
    async fn is_flagged(&self, input: &str) -> Result<bool, LlmError>;
}
