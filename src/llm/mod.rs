//! Model gateway: message types and the streaming client abstraction.
//!
//! A gateway turns a [`ChatRequest`] into a finite, ordered stream of
//! [`ChatChunk`]s. Text arrives as deltas; structured tool calls (function-call
//! mode) arrive as [`ToolCallDelta`] fragments that the caller accumulates.

mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use openai::OpenAiCompatibleClient;

/// Errors raised by a model gateway. Always fatal to the current turn.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request to {provider} failed: {message}")]
    Request { provider: String, message: String },

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Malformed stream chunk: {0}")]
    Decode(String),
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Ai,
    Tool,
}

/// A single block of multimodal content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { url: String },
}

/// Message content: plain text, or content blocks when multimodal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Text view of the content. Image blocks contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

/// A structured tool invocation attached to an AI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments exactly as the provider produced them.
    pub args: String,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn human(content: impl Into<Content>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn ai(content: impl Into<Content>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn ai_with_tool_calls(content: impl Into<Content>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// A tool result. `tool_call_id` is set when the wire format correlates
    /// results with invocations.
    pub fn tool(content: impl Into<Content>, tool_call_id: Option<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id,
        }
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Function definition advertised to the model in function-call mode.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Everything the gateway needs for one completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<Message>,
    /// Only set in function-call mode.
    pub tools: Option<Vec<ToolSchema>>,
}

/// Fragment of a structured tool call as streamed by the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// One increment of model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    pub text: String,
    pub tool_calls: Vec<ToolCallDelta>,
}

impl ChatChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Lazy sequence of chunks. Finite and not restartable.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>>;

/// A streaming chat model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a completion and return its chunk stream.
    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError>;
}

/// Run a completion to the end and return the concatenated text.
///
/// `on_delta` sees every text delta as it arrives.
pub async fn collect_text(
    client: &dyn LlmClient,
    request: &ChatRequest,
    mut on_delta: impl FnMut(&str),
) -> Result<String, LlmError> {
    let mut stream = client.stream(request).await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        on_delta(&chunk.text);
        text.push_str(&chunk.text);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_text_skips_images() {
        let content = Content::Blocks(vec![
            ContentBlock::Text {
                text: "look".to_string(),
            },
            ContentBlock::ImageUrl {
                url: "data:image/png;base64,AAAA".to_string(),
            },
            ContentBlock::Text {
                text: "here".to_string(),
            },
        ]);
        assert_eq!(content.text(), "look\nhere");
    }

    #[test]
    fn tool_message_keeps_correlation_id() {
        let msg = Message::tool("ok", Some("call_1".to_string()));
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.text(), "ok");
    }
}
