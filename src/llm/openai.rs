//! OpenAI-compatible streaming chat client.
//!
//! Every supported provider exposes an OpenAI-style `/chat/completions`
//! endpoint with server-sent events, so one client covers all of them.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{retry, Event, EventSource};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    ChatChunk, ChatRequest, ChunkStream, Content, ContentBlock, LlmClient, LlmError, Message,
    Role, ToolCallDelta,
};
use crate::config::LlmConfig;

/// Streaming client for `/chat/completions` endpoints.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    provider: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider: config.provider.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system }));
        }
        messages.extend(request.messages.iter().map(wire_message));

        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "messages": messages,
        });

        if let Some(tools) = &request.tools {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }

        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(provider = %self.provider, model = %self.model, "Opening completion stream");

        let mut builder = self.http.post(&url).json(&self.request_body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let mut source = EventSource::new(builder).map_err(|e| LlmError::Request {
            provider: self.provider.clone(),
            message: e.to_string(),
        })?;
        source.set_retry_policy(Box::new(retry::Never));

        let provider = self.provider.clone();
        let stream = async_stream::try_stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            break;
                        }
                        yield parse_chunk(&message.data)?;
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(err) => {
                        source.close();
                        Err::<(), LlmError>(map_stream_error(&provider, err).await)?;
                    }
                }
            }
            source.close();
        };

        Ok(Box::pin(stream))
    }
}

async fn map_stream_error(provider: &str, err: reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            LlmError::Status {
                status: status.as_u16(),
                body,
            }
        }
        reqwest_eventsource::Error::Transport(e) => LlmError::Request {
            provider: provider.to_string(),
            message: e.to_string(),
        },
        other => LlmError::Stream(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

fn parse_chunk(data: &str) -> Result<ChatChunk, LlmError> {
    let wire: WireChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::Decode(format!("{}: {}", e, data)))?;

    if let Some(error) = wire.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(LlmError::Stream(message));
    }

    let mut chunk = ChatChunk::default();
    let Some(delta) = wire.choices.into_iter().next().and_then(|c| c.delta) else {
        return Ok(chunk);
    };

    chunk.text = delta.content.unwrap_or_default();
    chunk.tool_calls = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();

    Ok(chunk)
}

fn wire_content(content: &Content) -> Value {
    match content {
        Content::Text(text) => Value::String(text.clone()),
        Content::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
                ContentBlock::ImageUrl { url } => {
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }
            })
            .collect(),
    }
}

fn wire_message(msg: &Message) -> Value {
    match msg.role {
        Role::Human => json!({ "role": "user", "content": wire_content(&msg.content) }),
        Role::Ai if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.args },
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": msg.text(), "tool_calls": calls })
        }
        Role::Ai => json!({ "role": "assistant", "content": msg.text() }),
        // Without a correlation id the result travels as plain user text (react mode).
        Role::Tool => match &msg.tool_call_id {
            Some(id) => json!({ "role": "tool", "tool_call_id": id, "content": msg.text() }),
            None => json!({ "role": "user", "content": msg.text() }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    #[test]
    fn parses_text_delta() {
        let chunk = parse_chunk(r#"{"choices":[{"delta":{"content":"hel"}}]}"#).unwrap();
        assert_eq!(chunk.text, "hel");
        assert!(chunk.tool_calls.is_empty());
    }

    #[test]
    fn parses_tool_call_fragments_with_null_fields() {
        let chunk = parse_chunk(
            r#"{"choices":[{"delta":{"content":null,"tool_calls":[{"index":0,"id":"call_1","function":{"name":"shell","arguments":"{\"arg\""}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.text, "");
        assert_eq!(
            chunk.tool_calls,
            vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("shell".to_string()),
                arguments: "{\"arg\"".to_string(),
            }]
        );
    }

    #[test]
    fn empty_choices_yield_empty_chunk() {
        let chunk = parse_chunk(r#"{"choices":[]}"#).unwrap();
        assert_eq!(chunk, ChatChunk::default());
    }

    #[test]
    fn api_error_payload_is_surfaced() {
        let err = parse_chunk(r#"{"error":{"message":"quota exceeded"}}"#).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn tool_result_without_id_is_sent_as_user_text() {
        let wire = wire_message(&Message::tool("Tool response:\nhi", None));
        assert_eq!(wire["role"], "user");

        let wire = wire_message(&Message::tool("hi", Some("call_1".to_string())));
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
    }

    #[test]
    fn image_blocks_are_sent_without_an_empty_system_prompt() {
        let config = crate::config::Config::new(crate::config::AgentPattern::React);
        let client = OpenAiCompatibleClient::new(&config.llm);
        let request = ChatRequest {
            system: String::new(),
            messages: vec![Message::human(Content::Blocks(vec![
                ContentBlock::Text {
                    text: "describe".to_string(),
                },
                ContentBlock::ImageUrl {
                    url: "data:image/png;base64,AAAA".to_string(),
                },
            ]))],
            tools: None,
        };
        let body = client.request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"][0]["text"], "describe");
        assert_eq!(messages[0]["content"][1]["type"], "image_url");
        assert_eq!(
            messages[0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn ai_tool_calls_are_serialized_as_functions() {
        let msg = Message::ai_with_tool_calls(
            "",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "shell".to_string(),
                args: r#"{"arg":"ls"}"#.to_string(),
            }],
        );
        let wire = wire_message(&msg);
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "shell");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"arg":"ls"}"#);
    }
}
