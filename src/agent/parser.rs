//! Tool call detection for both wire conventions.
//!
//! Detection runs on every stream increment against everything received so
//! far, so "not a tool call yet" is an ordinary outcome and never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AgentPattern;
use crate::llm::{ToolCall, ToolCallDelta};

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    pub arg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    /// Provider call id (function-call mode only).
    #[serde(skip)]
    pub id: Option<String>,
}

/// Result of polling the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// A valid tool call is present.
    Complete(ToolCallRequest),
    /// Something that may become a tool call is present but does not validate.
    Incomplete,
    /// Nothing resembling a tool call.
    Absent,
}

impl Detection {
    pub fn is_complete(&self) -> bool {
        matches!(self, Detection::Complete(_))
    }

    pub fn into_request(self) -> Option<ToolCallRequest> {
        match self {
            Detection::Complete(request) => Some(request),
            _ => None,
        }
    }
}

/// Poll for a tool call under the configured convention.
pub fn detect(pattern: AgentPattern, text: &str, calls: &ToolCallAccumulator) -> Detection {
    match pattern {
        AgentPattern::React => parse_react(text),
        AgentPattern::FunctionCall => calls.detect(),
    }
}

/// Find a `{tool, arg, thoughts?}` JSON object embedded in free text.
///
/// The object is located with a brace-depth scan from the first `{`. Braces
/// inside JSON string values are counted as well, so an `arg` containing an
/// unmatched brace can end the scan early; the first-to-last-brace retry
/// covers the common cases.
pub fn parse_react(text: &str) -> Detection {
    let Some(start) = text.find('{') else {
        return Detection::Absent;
    };

    let balanced = &text[start..balanced_end(text, start)];
    if let Some(request) = validate(balanced) {
        return Detection::Complete(request);
    }

    match text.rfind('}') {
        Some(last) if last > start => match validate(&text[start..=last]) {
            Some(request) => Detection::Complete(request),
            None => Detection::Incomplete,
        },
        _ => Detection::Incomplete,
    }
}

/// Exclusive end index of the brace group opened at `start`, or the text
/// length when the group never closes.
fn balanced_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut end = start + 1;
    while depth > 0 && end < bytes.len() {
        match bytes[end] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
        end += 1;
    }
    end
}

fn validate(candidate: &str) -> Option<ToolCallRequest> {
    serde_json::from_str::<ToolCallRequest>(candidate).ok()
}

#[derive(Debug, Clone, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    args: String,
}

/// Highest number of parallel tool calls tracked in one response.
pub const MAX_TOOL_CALLS: usize = 16;

/// Assembles streamed tool-call fragments by index, verbatim.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PartialCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, deltas: &[ToolCallDelta]) {
        for delta in deltas {
            if delta.index >= MAX_TOOL_CALLS {
                tracing::warn!(index = delta.index, "Ignoring tool call delta out of range");
                continue;
            }
            if self.calls.len() <= delta.index {
                self.calls.resize_with(delta.index + 1, PartialCall::default);
            }
            let call = &mut self.calls[delta.index];
            if let Some(id) = &delta.id {
                call.id = Some(id.clone());
            }
            if let Some(name) = &delta.name {
                call.name.push_str(name);
            }
            call.args.push_str(&delta.arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.iter().all(|c| c.name.is_empty())
    }

    /// Assembled calls. Ids missing from the stream are left empty.
    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| ToolCall {
                id: c.id.clone().unwrap_or_default(),
                name: c.name.clone(),
                args: c.args.clone(),
            })
            .collect()
    }

    /// The first named call whose arguments form a complete `{"arg": "..."}`
    /// object. Names are not checked against the registry; dispatch reports
    /// unknown ones back to the model.
    pub fn detect(&self) -> Detection {
        if self.is_empty() {
            return Detection::Absent;
        }
        self.calls
            .iter()
            .filter(|c| !c.name.is_empty())
            .find_map(|c| {
                let arg = complete_arg(&c.args)?;
                Some(ToolCallRequest {
                    tool: c.name.clone(),
                    arg,
                    thoughts: None,
                    id: c.id.clone(),
                })
            })
            .map(Detection::Complete)
            .unwrap_or(Detection::Incomplete)
    }

    /// Detection once the stream has ended: any named call counts, with its
    /// raw arguments standing in when they do not parse.
    pub fn finish(&self) -> Detection {
        match self.detect() {
            Detection::Incomplete => self
                .calls
                .iter()
                .find(|c| !c.name.is_empty())
                .map(|c| {
                    Detection::Complete(ToolCallRequest {
                        tool: c.name.clone(),
                        arg: c.args.clone(),
                        thoughts: None,
                        id: c.id.clone(),
                    })
                })
                .unwrap_or(Detection::Incomplete),
            other => other,
        }
    }
}

fn complete_arg(args: &str) -> Option<String> {
    let value: Value = serde_json::from_str(args).ok()?;
    value.get("arg")?.as_str().map(str::to_string)
}
